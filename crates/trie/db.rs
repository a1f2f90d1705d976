//! The storage seam: the trie core never touches a concrete key-value
//! store, it only calls [`DatabaseReader`]/[`DatabaseWriter`]. Keys are
//! built from a node's path and version via the `vp` varint-prefix framing,
//! so two tries sharing one physical keyspace never collide on a path
//! that happens to be a prefix of another.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::TrieError;
use crate::nibbles::Nibbles;
use crate::version::Version;
use crate::vp;

/// Builds the composite `(path, version)` key used by [`InMemoryDatabase`]
/// and available to any other backend that wants the same scheme.
pub fn composite_key(path: &Nibbles, ver: Version) -> Vec<u8> {
    let mut key = Vec::new();
    vp::append_string(&mut key, path.as_ref());
    vp::append_uint32(&mut key, ver.major);
    vp::append_uint32(&mut key, ver.minor);
    key
}

/// Read side of the database contract. `get` returning `Ok(None)` means
/// the node was never written at this exact `(path, ver)`; the hasher
/// turns that into a [`TrieError::MissingNode`] with the path and ref that
/// triggered the read.
pub trait DatabaseReader: Send + Sync {
    fn get(&self, path: &Nibbles, ver: Version) -> Result<Option<Vec<u8>>, TrieError>;
}

/// Write side of the database contract. Writes are handed over as a batch
/// per commit so a backend can make them atomic if it wants to.
pub trait DatabaseWriter: Send + Sync {
    fn put_batch(&self, writes: Vec<(Nibbles, Version, Vec<u8>)>) -> Result<(), TrieError>;
}

/// A trivial in-memory backend, useful for tests and for the scratch tries
/// built by [`crate::derivable_list::derive_root`].
#[derive(Clone, Default)]
pub struct InMemoryDatabase {
    inner: Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DatabaseReader for InMemoryDatabase {
    fn get(&self, path: &Nibbles, ver: Version) -> Result<Option<Vec<u8>>, TrieError> {
        let key = composite_key(path, ver);
        Ok(self
            .inner
            .lock()
            .map_err(|_| TrieError::Database(anyhow::anyhow!("in-memory db lock poisoned")))?
            .get(&key)
            .cloned())
    }
}

impl DatabaseWriter for InMemoryDatabase {
    fn put_batch(&self, writes: Vec<(Nibbles, Version, Vec<u8>)>) -> Result<(), TrieError> {
        let mut db = self
            .inner
            .lock()
            .map_err(|_| TrieError::Database(anyhow::anyhow!("in-memory db lock poisoned")))?;
        for (path, ver, blob) in writes {
            db.insert(composite_key(&path, ver), blob);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_versions_do_not_collide() {
        let db = InMemoryDatabase::new();
        let path = Nibbles::from_hex(vec![1, 2, 3]);
        db.put_batch(vec![
            (path.clone(), Version::new(1, 0), b"v1".to_vec()),
            (path.clone(), Version::new(1, 1), b"v2".to_vec()),
        ])
        .unwrap();

        assert_eq!(
            db.get(&path, Version::new(1, 0)).unwrap(),
            Some(b"v1".to_vec())
        );
        assert_eq!(
            db.get(&path, Version::new(1, 1)).unwrap(),
            Some(b"v2".to_vec())
        );
        assert_eq!(db.get(&path, Version::new(2, 0)).unwrap(), None);
    }

    #[test]
    fn distinct_paths_do_not_collide() {
        let db = InMemoryDatabase::new();
        let ver = Version::new(1, 0);
        db.put_batch(vec![
            (Nibbles::from_hex(vec![1]), ver, b"a".to_vec()),
            (Nibbles::from_hex(vec![1, 2]), ver, b"b".to_vec()),
        ])
        .unwrap();

        assert_eq!(
            db.get(&Nibbles::from_hex(vec![1]), ver).unwrap(),
            Some(b"a".to_vec())
        );
        assert_eq!(
            db.get(&Nibbles::from_hex(vec![1, 2]), ver).unwrap(),
            Some(b"b".to_vec())
        );
    }
}
