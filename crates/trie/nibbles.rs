use std::cmp::{self, Ordering};
use std::mem;

use triecore_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

/// A key in its hex-nibble form: one element per 4-bit nibble, with a
/// trailing terminator nibble (16) appended for leaf paths. See
/// [`keybytes_to_hex`] / [`hex_to_keybytes`] for the byte <-> nibble
/// conversion and [`hex_to_compact`] / [`compact_to_hex`] for the packed
/// on-disk form.
#[derive(Debug, Clone, Default)]
pub struct Nibbles {
    data: Vec<u8>,
    /// Nibbles already consumed while walking down a path, tracked so that
    /// a partially-descended `Nibbles` can still report its full prefix.
    already_consumed: Vec<u8>,
}

// Custom impls: equality/ordering/hash only look at `data`, never at the
// consumed-prefix bookkeeping.

impl PartialEq for Nibbles {
    fn eq(&self, other: &Nibbles) -> bool {
        self.data == other.data
    }
}

impl Eq for Nibbles {}

impl PartialOrd for Nibbles {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Nibbles {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.data.cmp(&other.data)
    }
}

impl std::hash::Hash for Nibbles {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.data.hash(state);
    }
}

impl Nibbles {
    /// Creates `Nibbles` from already hex-encoded nibbles.
    pub const fn from_hex(hex: Vec<u8>) -> Self {
        Self {
            data: hex,
            already_consumed: vec![],
        }
    }

    /// Splits incoming bytes into nibbles and appends the leaf terminator.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::from_raw(bytes, true)
    }

    /// Splits incoming bytes into nibbles, appending the leaf terminator
    /// only if `is_leaf` is true.
    pub fn from_raw(bytes: &[u8], is_leaf: bool) -> Self {
        let mut data = keybytes_to_hex(bytes);
        if !is_leaf {
            data.pop();
        }
        Self {
            data,
            already_consumed: vec![],
        }
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Number of nibbles (including the terminator, if present).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// If `prefix` is a prefix of self, advances past it and returns true.
    pub fn skip_prefix(&mut self, prefix: &Nibbles) -> bool {
        if self.len() >= prefix.len() && &self.data[..prefix.len()] == prefix.as_ref() {
            self.data = self.data[prefix.len()..].to_vec();
            self.already_consumed.extend(&prefix.data);
            true
        } else {
            false
        }
    }

    /// Compares self to `prefix`, comparing only the shorter length's worth
    /// of nibbles when lengths differ.
    pub fn compare_prefix(&self, prefix: &Nibbles) -> cmp::Ordering {
        if self.len() > prefix.len() {
            self.data[..prefix.len()].cmp(&prefix.data)
        } else {
            self.data[..].cmp(&prefix.data[..self.len()])
        }
    }

    /// Number of nibbles shared with `other`, starting from the front.
    pub fn count_prefix(&self, other: &Nibbles) -> usize {
        self.as_ref()
            .iter()
            .zip(other.as_ref().iter())
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// Removes and returns the first nibble.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<u8> {
        (!self.is_empty()).then(|| {
            self.already_consumed.push(self.data[0]);
            self.data.remove(0)
        })
    }

    /// Removes and returns the first nibble if it is a valid branch choice (< 16).
    pub fn next_choice(&mut self) -> Option<usize> {
        self.next().filter(|choice| *choice < 16).map(usize::from)
    }

    /// Nibbles after the given offset.
    pub fn offset(&self, offset: usize) -> Nibbles {
        let mut ret = self.slice(offset, self.len());
        ret.already_consumed = [&self.already_consumed, &self.data[0..offset]].concat();
        ret
    }

    /// Nibbles between the start and end indices.
    pub fn slice(&self, start: usize, end: usize) -> Nibbles {
        Nibbles::from_hex(self.data[start..end].to_vec())
    }

    /// Extends self with another `Nibbles`.
    pub fn extend(&mut self, other: &Nibbles) {
        self.data.extend_from_slice(other.as_ref());
    }

    /// Nibble at the given index; panics if out of range.
    pub fn at(&self, i: usize) -> usize {
        self.data[i] as usize
    }

    pub fn prepend(&mut self, nibble: u8) {
        self.data.insert(0, nibble);
    }

    pub fn append(&mut self, nibble: u8) {
        self.data.push(nibble);
    }

    /// Encodes the nibbles into their compact, packed on-disk form.
    pub fn encode_compact(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.data.len() / 2 + 1);
        hex_to_compact_into(&self.data, &mut buf);
        buf
    }

    /// Same as [`encode_compact`](Self::encode_compact) but appends into an
    /// existing buffer, avoiding an allocation on the hot path taken while
    /// assembling a node's canonical/extended encoding.
    pub fn encode_compact_to_vec(&self, buf: &mut Vec<u8>) {
        hex_to_compact_into(&self.data, buf);
    }

    /// Decodes nibbles from their compact on-disk form.
    pub fn decode_compact(compact: &[u8]) -> Self {
        Self::from_hex(compact_to_hex(compact))
    }

    /// True iff the nibbles end with the leaf terminator (16).
    pub fn is_leaf(&self) -> bool {
        !self.is_empty() && self.data[self.data.len() - 1] == 16
    }

    /// Reassembles nibbles into bytes, dropping the terminator if present.
    pub fn to_bytes(&self) -> Vec<u8> {
        let data = if self.is_leaf() {
            &self.data[..self.len() - 1]
        } else {
            &self.data[..]
        };
        hex_to_keybytes(data)
    }

    /// Concatenation of self and `other` as a new `Nibbles`.
    pub fn concat(&self, other: &Nibbles) -> Nibbles {
        Nibbles {
            data: [&self.data[..], &other.data[..]].concat(),
            already_consumed: self.already_consumed.clone(),
        }
    }

    /// Copy of self with one nibble appended.
    pub fn append_new(&self, nibble: u8) -> Nibbles {
        Nibbles {
            data: [self.data.clone(), vec![nibble]].concat(),
            already_consumed: self.already_consumed.clone(),
        }
    }

    /// Already-consumed prefix of this path (used by the iterator to report
    /// the full path of a node reached mid-descent).
    pub fn current(&self) -> Nibbles {
        Nibbles {
            data: self.already_consumed.clone(),
            already_consumed: vec![],
        }
    }

    /// Empties `self` and returns the previous content.
    pub fn take(&mut self) -> Self {
        Nibbles {
            data: mem::take(&mut self.data),
            already_consumed: mem::take(&mut self.already_consumed),
        }
    }
}

impl AsRef<[u8]> for Nibbles {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl RLPEncode for Nibbles {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf).encode_field(&self.data).finish();
    }
}

impl RLPDecode for Nibbles {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (data, decoder) = decoder.decode_field("data")?;
        Ok((
            Self {
                data,
                already_consumed: vec![],
            },
            decoder.finish()?,
        ))
    }
}

/// Splits a byte key into hex nibbles and appends the terminator (16).
pub fn keybytes_to_hex(keybytes: &[u8]) -> Vec<u8> {
    let l = keybytes.len() * 2 + 1;
    let mut nibbles = vec![0; l];
    for (i, b) in keybytes.iter().enumerate() {
        nibbles[i * 2] = b / 16;
        nibbles[i * 2 + 1] = b % 16;
    }
    nibbles[l - 1] = 16;
    nibbles
}

/// Repacks hex nibbles (without a terminator) back into bytes. Panics if
/// given an odd number of nibbles, mirroring the fact that a valid key is
/// always a whole number of bytes.
pub fn hex_to_keybytes(hex: &[u8]) -> Vec<u8> {
    assert!(hex.len().is_multiple_of(2), "hex_to_keybytes: odd nibble count");
    hex.chunks(2).map(|pair| (pair[0] << 4) | pair[1]).collect()
}

/// Encodes hex nibbles into the compact packed form.
///
/// Taken from <https://github.com/ethereum/go-ethereum/blob/master/trie/encoding.go>:
/// the first nibble of the first byte carries a 2-bit header (terminator?,
/// odd-length?); an odd-length input folds its first nibble into that
/// header byte instead of padding it.
pub fn hex_to_compact(hex: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(hex.len() / 2 + 1);
    hex_to_compact_into(hex, &mut buf);
    buf
}

/// Append-style variant of [`hex_to_compact`] for hot paths that already
/// hold a scratch buffer (e.g. assembling a node's canonical encoding).
pub fn hex_to_compact_into(hex: &[u8], buf: &mut Vec<u8>) {
    let is_leaf = matches!(hex.last(), Some(16));
    let mut hex = if is_leaf { &hex[..hex.len() - 1] } else { hex };

    // node type    path length    |    prefix    hexchar
    // --------------------------------------------------
    // extension    even           |    0000      0x0
    // extension    odd            |    0001      0x1
    // leaf         even           |    0010      0x2
    // leaf         odd            |    0011      0x3
    let header = if hex.len() % 2 == 1 {
        let v = 0x10 + hex[0];
        hex = &hex[1..];
        v
    } else {
        0x00
    };

    buf.push(header + if is_leaf { 0x20 } else { 0x00 });
    for i in 0..(hex.len() / 2) {
        buf.push((hex[i * 2] * 16) + hex[i * 2 + 1]);
    }
}

/// Inverse of [`hex_to_compact`].
pub fn compact_to_hex(compact: &[u8]) -> Vec<u8> {
    if compact.is_empty() {
        return vec![];
    }
    let mut base = keybytes_to_hex(compact);
    // delete terminator flag: header nibble 0/1 means extension (no
    // terminator in the original path), 2/3 means leaf (keep it).
    if base[0] < 2 {
        base = base[..base.len() - 1].to_vec();
    }
    // apply odd flag: chop the padding nibble used to byte-align an
    // odd-length path.
    let chop = 2 - (base[0] & 1) as usize;
    base[chop..].to_vec()
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn skip_prefix_true() {
        let mut a = Nibbles::from_hex(vec![1, 2, 3, 4, 5]);
        let b = Nibbles::from_hex(vec![1, 2, 3]);
        assert!(a.skip_prefix(&b));
        assert_eq!(a.as_ref(), &[4, 5])
    }

    #[test]
    fn skip_prefix_false() {
        let mut a = Nibbles::from_hex(vec![1, 2, 3, 4, 5]);
        let b = Nibbles::from_hex(vec![1, 2, 4]);
        assert!(!a.skip_prefix(&b));
        assert_eq!(a.as_ref(), &[1, 2, 3, 4, 5])
    }

    #[test]
    fn count_prefix_partial() {
        let a = Nibbles::from_hex(vec![1, 2, 3, 4, 5]);
        let b = Nibbles::from_hex(vec![1, 2, 3]);
        assert_eq!(a.count_prefix(&b), b.len());
    }

    #[test]
    fn compare_prefix_variants() {
        let a = Nibbles::from_hex(vec![1, 2, 3, 4, 5]);
        let b = Nibbles::from_hex(vec![1, 2, 4, 4, 5]);
        assert_eq!(a.compare_prefix(&b), Ordering::Less);
        assert_eq!(b.compare_prefix(&a), Ordering::Greater);

        let c = Nibbles::from_hex(vec![1, 2, 3]);
        assert_eq!(a.compare_prefix(&c), Ordering::Equal);
    }

    #[test]
    fn keybytes_hex_roundtrip() {
        let key = b"dog";
        let hex = keybytes_to_hex(key);
        assert_eq!(hex.last(), Some(&16));
        let back = hex_to_keybytes(&hex[..hex.len() - 1]);
        assert_eq!(back, key);
    }

    #[test]
    fn compact_hex_roundtrip_leaf_even() {
        let hex = keybytes_to_hex(b"do");
        let compact = hex_to_compact(&hex);
        let back = compact_to_hex(&compact);
        assert_eq!(back, hex);
    }

    #[test]
    fn compact_hex_roundtrip_extension_odd() {
        let hex = vec![1u8, 2, 3];
        let compact = hex_to_compact(&hex);
        let back = compact_to_hex(&compact);
        assert_eq!(back, hex);
    }

    #[test]
    fn compact_hex_roundtrip_empty() {
        let hex: Vec<u8> = vec![];
        let compact = hex_to_compact(&hex);
        assert!(compact.is_empty() || compact == vec![0x00]);
        let back = compact_to_hex(&compact);
        assert_eq!(back, hex);
    }

    #[test]
    fn to_bytes_strips_terminator() {
        let n = Nibbles::from_bytes(b"cat");
        assert_eq!(n.to_bytes(), b"cat");
    }
}
