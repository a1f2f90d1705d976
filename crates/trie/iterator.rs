//! Pre-order, version-filtered traversal over a [`crate::Trie`]'s nodes.
//!
//! The iterator is non-intrusive: resolving a `RefNode` replaces it in the
//! iterator's own stack frame only, never in the trie it was built from. A
//! `MissingNode` error halts traversal at the step that hit it; repairing
//! the database and calling [`NodeIterator::next`] again retries that exact
//! step without losing the rest of the walk.

use std::sync::Arc;

use crate::codec::verify_node_hash;
use crate::db::DatabaseReader;
use crate::error::TrieError;
use crate::nibbles::Nibbles;
use crate::node::Node;
use crate::version::Version;

fn resolve_with_blob(
    db: Option<&dyn DatabaseReader>,
    node: &Arc<Node>,
    path: &Nibbles,
    gen: u16,
    non_crypto: bool,
) -> Result<(Arc<Node>, Option<(Vec<u8>, Version)>), TrieError> {
    match node.as_ref() {
        Node::Ref(r) => {
            let reader = db
                .ok_or_else(|| TrieError::missing_node(r.r, path.clone(), "no database configured"))?;
            let blob = reader
                .get(path, r.r.ver)?
                .ok_or_else(|| TrieError::missing_node(r.r, path.clone(), "not found in database"))?;
            if !non_crypto && !verify_node_hash(&blob, r.r.hash) {
                return Err(TrieError::HashMismatch { path: path.clone() });
            }
            let decoded = crate::codec::decode_extended(&blob, gen)?;
            Ok((decoded, Some((blob, r.r.ver))))
        }
        _ => Ok((node.clone(), None)),
    }
}

/// True iff `child`'s own version is below `min_ver`. A node with no cached
/// ref (never committed, or a bare in-memory value) has no version to
/// compare against and is always kept.
fn passes_version_filter(child: &Arc<Node>, min_ver: Version) -> bool {
    match child.cached_ref() {
        Some(r) => r.ver >= min_ver,
        None => true,
    }
}

struct CurrentFrame {
    path: Nibbles,
    node: Arc<Node>,
    blob: Option<(Vec<u8>, Version)>,
}

/// A pre-order cursor over a trie's nodes, filtered to a minimum version.
///
/// Constructed via [`crate::Trie::node_iterator`]. Starts positioned
/// *before* the root; the first call to [`NodeIterator::next`] visits it.
pub struct NodeIterator {
    stack: Vec<(Nibbles, Arc<Node>)>,
    current: Option<CurrentFrame>,
    db: Option<Arc<dyn DatabaseReader>>,
    min_ver: Version,
    gen: u16,
    non_crypto: bool,
    err: Option<TrieError>,
}

impl NodeIterator {
    pub(crate) fn new(
        root: Option<Arc<Node>>,
        db: Option<Arc<dyn DatabaseReader>>,
        start: &[u8],
        min_ver: Version,
        gen: u16,
        non_crypto: bool,
    ) -> Self {
        let mut stack = Vec::new();
        if let Some(root) = root {
            stack.push((Nibbles::from_hex(Vec::new()), root));
        }
        let mut it = Self {
            stack,
            current: None,
            db,
            min_ver,
            gen,
            non_crypto,
            err: None,
        };
        if !start.is_empty() {
            it.seek(start);
        }
        it
    }

    /// Pushes `node`'s children (already resolved) onto the stack, in the
    /// order that makes them pop out pre-order: the direct value slot
    /// (index 16 of a `FullNode`) first, since its path equals the node's
    /// own path and therefore sorts before any path extended by a further
    /// nibble; then nibble children 0..=15 in ascending order.
    fn push_children(&mut self, path: &Nibbles, node: &Arc<Node>) {
        match node.as_ref() {
            Node::Full(f) => {
                for i in (0..16).rev() {
                    if let Some(child) = &f.children[i] {
                        if passes_version_filter(child, self.min_ver) {
                            self.stack.push((path.append_new(i as u8), child.clone()));
                        }
                    }
                }
                if let Some(child) = &f.children[16] {
                    if passes_version_filter(child, self.min_ver) {
                        self.stack.push((path.clone(), child.clone()));
                    }
                }
            }
            Node::Short(s) => {
                if passes_version_filter(&s.child, self.min_ver) {
                    self.stack.push((path.concat(&s.key), s.child.clone()));
                }
            }
            Node::Ref(_) => {
                unreachable!("push_children only ever sees an already-resolved node")
            }
            Node::Value(_) => {}
        }
    }

    /// Advances the cursor. If `descend` is true and a node is currently
    /// visited, that node's children are pushed before moving on;
    /// otherwise its subtree is skipped entirely. Returns `false` once the
    /// walk is exhausted or a [`TrieError`] halted it — check
    /// [`NodeIterator::error`] to tell the two apart. Calling `next` again
    /// after an error retries the exact step that failed.
    pub fn next(&mut self, descend: bool) -> bool {
        if descend {
            if let Some(frame) = self.current.take() {
                self.push_children(&frame.path, &frame.node);
            }
        } else {
            self.current = None;
        }

        loop {
            let Some((path, node)) = self.stack.pop() else {
                self.err = None;
                return false;
            };
            match resolve_with_blob(self.db.as_deref(), &node, &path, self.gen, self.non_crypto) {
                Ok((resolved, blob)) => {
                    self.err = None;
                    self.current = Some(CurrentFrame {
                        path,
                        node: resolved,
                        blob,
                    });
                    return true;
                }
                Err(e) => {
                    // Leave the failing item in place so the next call
                    // retries this exact step.
                    self.stack.push((path, node));
                    self.err = Some(e);
                    return false;
                }
            }
        }
    }

    /// Fast-forwards to the first path greater than or equal to `prefix`
    /// (hex nibbles, no terminator), skipping the descent into any subtree
    /// that sorts entirely before it. Preserves the stack invariant, so
    /// ordinary pre-order traversal with [`NodeIterator::next`] resumes
    /// correctly from the landing position.
    pub fn seek(&mut self, prefix: &[u8]) {
        let target = Nibbles::from_raw(prefix, false);
        loop {
            let descend = match &self.current {
                None => true,
                Some(frame) => {
                    if frame.path.as_ref() >= target.as_ref() {
                        return;
                    }
                    target.as_ref().starts_with(frame.path.as_ref())
                }
            };
            if !self.next(descend) {
                return;
            }
        }
    }

    /// The error that halted traversal, if any. Cleared by the next
    /// successful [`NodeIterator::next`] call.
    pub fn error(&self) -> Option<&TrieError> {
        self.err.as_ref()
    }

    /// Path (hex nibbles, no terminator stripped) of the currently visited
    /// node.
    pub fn path(&self) -> Option<&Nibbles> {
        self.current.as_ref().map(|f| &f.path)
    }

    /// The node currently visited.
    pub fn node(&self) -> Option<&Arc<Node>> {
        self.current.as_ref().map(|f| &f.node)
    }

    /// The raw extended blob and version the current node was loaded from,
    /// if it was resolved from the database this walk. `None` for a node
    /// that only ever existed in memory (never committed, or reached
    /// without needing a database round trip).
    pub fn blob(&self) -> Option<(&[u8], Version)> {
        self.current
            .as_ref()
            .and_then(|f| f.blob.as_ref())
            .map(|(b, v)| (b.as_slice(), *v))
    }

    /// True iff the current node is a leaf (`ValueNode`).
    pub fn is_leaf(&self) -> bool {
        matches!(self.node(), Some(n) if matches!(n.as_ref(), Node::Value(_)))
    }

    /// `(value, meta)` of the current node, if it is a leaf.
    pub fn leaf(&self) -> Option<(&[u8], &[u8])> {
        match self.node()?.as_ref() {
            Node::Value(v) => Some((v.value.as_slice(), v.meta.as_slice())),
            _ => None,
        }
    }

    /// The original key bytes of the current leaf, reconstructed from its
    /// path.
    pub fn leaf_key(&self) -> Option<Vec<u8>> {
        if !self.is_leaf() {
            return None;
        }
        self.path().map(|p| p.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrieConfig;
    use crate::db::InMemoryDatabase;
    use crate::Trie;
    use std::collections::BTreeMap;

    fn build_committed(
        entries: &[(&[u8], &[u8])],
    ) -> (Trie, InMemoryDatabase, crate::version::Ref) {
        let mut trie = Trie::empty(TrieConfig::default());
        for (k, v) in entries {
            trie.update(k, v.to_vec(), Vec::new()).unwrap();
        }
        let db = InMemoryDatabase::new();
        let root_ref = trie.commit(&db, Version::new(1, 0)).unwrap();
        (trie, db, root_ref)
    }

    #[test]
    fn iterates_every_leaf_exactly_once() {
        let entries: [(&[u8], &[u8]); 5] = [
            (b"do", b"verb"),
            (b"dog", b"puppy"),
            (b"doge", b"coin"),
            (b"horse", b"stallion"),
            (b"shaman", b"wizard"),
        ];
        let (trie, _db, _ver) = build_committed(&entries);
        let mut it = trie.node_iterator(&[], Version::ZERO);
        let mut seen: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        while it.next(true) {
            if let Some((value, _meta)) = it.leaf() {
                seen.insert(it.leaf_key().unwrap(), value.to_vec());
            }
        }
        assert!(it.error().is_none());
        let expected: BTreeMap<Vec<u8>, Vec<u8>> = entries
            .iter()
            .map(|(k, v)| (k.to_vec(), v.to_vec()))
            .collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn version_filter_excludes_older_commit() {
        let mut trie = Trie::empty(TrieConfig::default());
        trie.update(b"old", b"v1".to_vec(), Vec::new()).unwrap();
        let db = InMemoryDatabase::new();
        trie.commit(&db, Version::new(1, 0)).unwrap();

        trie.update(b"new", b"v2".to_vec(), Vec::new()).unwrap();
        trie.commit(&db, Version::new(2, 0)).unwrap();

        let mut it = trie.node_iterator(&[], Version::new(2, 0));
        let mut keys = Vec::new();
        while it.next(true) {
            if it.is_leaf() {
                keys.push(it.leaf_key().unwrap());
            }
        }
        assert!(it.error().is_none());
        assert_eq!(keys, vec![b"new".to_vec()]);
    }

    #[test]
    fn seek_skips_to_requested_prefix() {
        let entries: [(&[u8], &[u8]); 4] = [
            (b"aaa", b"1"),
            (b"bbb", b"2"),
            (b"ccc", b"3"),
            (b"ddd", b"4"),
        ];
        let (trie, _db, _ver) = build_committed(&entries);
        let mut it = trie.node_iterator(b"ccc", Version::ZERO);
        let mut keys = Vec::new();
        while it.next(true) {
            if it.is_leaf() {
                keys.push(it.leaf_key().unwrap());
            }
        }
        assert_eq!(keys, vec![b"ccc".to_vec(), b"ddd".to_vec()]);
    }

    /// A reader that refuses every lookup until [`FlakyReader::heal`] is
    /// called, after which it defers to the wrapped database. Models a
    /// transient outage to exercise the iterator's retry contract.
    struct FlakyReader {
        inner: InMemoryDatabase,
        healed: std::sync::atomic::AtomicBool,
    }

    impl FlakyReader {
        fn new(inner: InMemoryDatabase) -> Self {
            Self {
                inner,
                healed: std::sync::atomic::AtomicBool::new(false),
            }
        }

        fn heal(&self) {
            self.healed.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    impl DatabaseReader for FlakyReader {
        fn get(&self, path: &Nibbles, ver: Version) -> Result<Option<Vec<u8>>, TrieError> {
            if !self.healed.load(std::sync::atomic::Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.get(path, ver)
        }
    }

    #[test]
    fn missing_node_error_is_retryable() {
        let entries: [(&[u8], &[u8]); 3] =
            [(b"dog", b"puppy"), (b"doge", b"coin"), (b"horse", b"stallion")];
        let (_trie, db, root_ref) = build_committed(&entries);

        let flaky = Arc::new(FlakyReader::new(db));
        let mut it = NodeIterator::new(
            Some(Node::reference(root_ref)),
            Some(flaky.clone() as Arc<dyn DatabaseReader>),
            &[],
            Version::ZERO,
            0,
            false,
        );

        assert!(!it.next(true));
        assert!(matches!(it.error(), Some(TrieError::MissingNode { .. })));

        flaky.heal();
        assert!(it.next(true));
        assert!(it.error().is_none());
    }
}
