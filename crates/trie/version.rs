use std::fmt;

use triecore_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

use crate::hash::Hash;

/// A commit identifier: `(major, minor)` compared lexicographically. The
/// trie never interprets these numbers itself — it only orders them and
/// combines them with a node's path to form a database key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    pub const ZERO: Version = Version { major: 0, minor: 0 };

    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl RLPEncode for Version {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.major)
            .encode_field(&self.minor)
            .finish();
    }
}

impl RLPDecode for Version {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (major, decoder) = decoder.decode_field("major")?;
        let (minor, decoder) = decoder.decode_field("minor")?;
        Ok((Self { major, minor }, decoder.finish()?))
    }
}

/// Identifies and locates a stored node: `hash` is the canonical digest of
/// its structural encoding, `ver` is the commit that first wrote it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Ref {
    pub hash: Hash,
    pub ver: Version,
}

impl Ref {
    pub const fn new(hash: Hash, ver: Version) -> Self {
        Self { hash, ver }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_orders_lexicographically() {
        assert!(Version::new(1, 0) < Version::new(1, 1));
        assert!(Version::new(1, 9) < Version::new(2, 0));
        assert_eq!(Version::new(3, 4), Version::new(3, 4));
    }
}
