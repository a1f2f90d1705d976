//! Merkle-rooting an ordered list of opaque payloads (transaction roots,
//! receipt roots, withdrawal roots, and the like): build a throwaway,
//! database-less [`Trie`] keyed by each index's compact encoding, insert
//! every payload, and take the trie's hash.

use crate::config::TrieConfig;
use crate::hash::Hash;
use crate::vp;
use crate::Trie;

/// An indexed list of already-encoded elements. `get_encoded(i)` must
/// return the exact bytes that should be hashed into the trie at index
/// `i` — the caller is responsible for encoding each element (RLP or
/// otherwise) before handing it here; `DerivableList` never interprets
/// the payload.
pub trait DerivableList {
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn get_encoded(&self, index: usize) -> Vec<u8>;
}

impl<T: AsRef<[u8]>> DerivableList for [T] {
    fn len(&self) -> usize {
        <[T]>::len(self)
    }

    fn get_encoded(&self, index: usize) -> Vec<u8> {
        self[index].as_ref().to_vec()
    }
}

/// The key an index derives to: its minimal big-endian representation,
/// varint-length-prefixed exactly like [`vp::append_minimal_uint`]. Shared
/// with the node codec's version trailer so that index 0 and a zero
/// version shrink the same way, and so that adjacent small indices share
/// long common prefixes (keeping the scratch trie shallow).
pub fn derive_key(index: usize) -> Vec<u8> {
    let mut key = Vec::new();
    vp::append_minimal_uint(&mut key, index as u64);
    key
}

/// Computes the Merkle root of `list` by inserting `(derive_key(i),
/// list.get_encoded(i))` for every index into a scratch trie with no
/// backing database, then taking its hash. Returns [`crate::hash::EMPTY_ROOT`]
/// for an empty list.
pub fn derive_root<L: DerivableList + ?Sized>(list: &L) -> Hash {
    let mut trie = Trie::empty(TrieConfig::default());
    for i in 0..list.len() {
        let key = derive_key(i);
        let value = list.get_encoded(i);
        trie.update(&key, value, Vec::new())
            .expect("inserting into a database-less scratch trie cannot fail");
    }
    trie.hash().expect("hashing a database-less scratch trie cannot fail")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::EMPTY_ROOT;

    #[test]
    fn empty_list_derives_empty_root() {
        let items: Vec<Vec<u8>> = Vec::new();
        assert_eq!(derive_root(items.as_slice()), *EMPTY_ROOT);
    }

    #[test]
    fn derive_root_matches_manual_trie() {
        let items: Vec<Vec<u8>> = vec![b"tx-0".to_vec(), b"tx-1".to_vec(), b"tx-2".to_vec()];

        let mut manual = Trie::empty(TrieConfig::default());
        for (i, item) in items.iter().enumerate() {
            manual.update(&derive_key(i), item.clone(), Vec::new()).unwrap();
        }

        assert_eq!(derive_root(items.as_slice()), manual.hash().unwrap());
    }

    #[test]
    fn derive_key_is_order_preserving_for_small_indices() {
        for i in 0..300usize {
            let a = derive_key(i);
            let b = derive_key(i + 1);
            assert_ne!(a, b, "index {i} and {} derived the same key", i + 1);
        }
    }

    #[test]
    fn single_element_list_hashes_deterministically() {
        let items = vec![b"only".to_vec()];
        let first = derive_root(items.as_slice());
        let second = derive_root(items.as_slice());
        assert_eq!(first, second);
    }
}
