use std::fmt;

use lazy_static::lazy_static;
use sha3::{Digest, Keccak256};
use triecore_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
};

use crate::codec::CANONICAL_EMPTY_STRING;

/// Length in bytes of the digest H.
pub const HASH_LENGTH: usize = 32;

/// A 32-byte cryptographic digest. This is the opaque `H` of the spec: the
/// trie never inspects its bytes beyond equality/ordering.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash(pub [u8; HASH_LENGTH]);

impl Hash {
    pub const fn from_bytes(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        <[u8; HASH_LENGTH]>::try_from(slice).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LENGTH]
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl RLPEncode for Hash {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        self.0.encode(buf);
    }
}

impl RLPDecode for Hash {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = <[u8; HASH_LENGTH]>::decode_unfinished(rlp)?;
        Ok((Self(bytes), rest))
    }
}

/// Incremental writer around the digest, used while assembling a node's
/// canonical encoding so the hash can be folded in without an intermediate
/// buffer copy when the caller already streams into one.
pub struct HashWriter(Keccak256);

impl HashWriter {
    pub fn new() -> Self {
        Self(Keccak256::new())
    }

    pub fn write(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finish(self) -> Hash {
        Hash(self.0.finalize().into())
    }
}

impl Default for HashWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot digest of a byte slice.
pub fn hash_bytes(data: &[u8]) -> Hash {
    let mut w = HashWriter::new();
    w.write(data);
    w.finish()
}

/// A fixed, non-cryptographic sentinel used in place of a real digest when
/// a trie is committed with `non_crypto` enabled (see [`crate::config::TrieConfig`]).
/// It never collides with a real Keccak digest of meaningful input with
/// overwhelming probability, but it carries no hash-of-anything meaning:
/// two non-crypto roots are never comparable to a cryptographic one.
pub const NON_CRYPTO_HASH: Hash = Hash([0xffu8; HASH_LENGTH]);

lazy_static! {
    /// The canonical hash of the empty trie: `H` of the canonical encoding
    /// of the empty string (a single RLP_NULL byte).
    pub static ref EMPTY_ROOT: Hash = hash_bytes(&CANONICAL_EMPTY_STRING);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_root_is_stable() {
        let first = *EMPTY_ROOT;
        let second = hash_bytes(&CANONICAL_EMPTY_STRING);
        assert_eq!(first, second);
    }

    #[test]
    fn non_crypto_hash_is_not_zero() {
        assert!(!NON_CRYPTO_HASH.is_zero());
    }
}
