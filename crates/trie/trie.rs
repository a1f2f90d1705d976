//! # triecore
//!
//! A versioned Merkle Patricia Trie: the node model, the canonical/extended
//! byte codec, the two-phase hash/store engine, a path/version-filtered
//! iterator, and the `DerivableList` helper used to Merkle-root ordered
//! lists (transaction/receipt roots and the like).
//!
//! ## Quick start
//!
//! ```rust
//! use triecore::config::TrieConfig;
//! use triecore::db::InMemoryDatabase;
//! use triecore::version::Version;
//! use triecore::Trie;
//!
//! let mut trie = Trie::empty(TrieConfig::default());
//! trie.update(b"dog", b"puppy".to_vec(), Vec::new()).unwrap();
//! trie.update(b"doge", b"coin".to_vec(), Vec::new()).unwrap();
//!
//! let db = InMemoryDatabase::new();
//! let root = trie.commit(&db, Version::new(1, 0)).unwrap();
//!
//! let reopened = Trie::new(root, Some(std::sync::Arc::new(db)), TrieConfig::default());
//! assert_eq!(reopened.get(b"dog").unwrap(), Some((b"puppy".to_vec(), Vec::new())));
//! ```
//!
//! ## Modules
//!
//! - [`nibbles`]: hex/compact key codec
//! - [`node`]: the four node variants and their cache flags
//! - [`codec`]: canonical and extended (on-disk) node encoding
//! - [`hash`]: the opaque 32-byte digest `H`
//! - [`hasher`]: the two-phase hash/store engine
//! - [`version`]: `Version` and `Ref`
//! - [`db`]: the `DatabaseReader`/`DatabaseWriter` seam
//! - [`vp`]: varint-prefix framing for composite keys and trailers
//! - [`derivable_list`]: Merkle root of an indexed list
//! - [`config`]: `TrieConfig` tunables
//! - [`error`]: `TrieError`

pub mod codec;
pub mod config;
pub mod db;
pub mod derivable_list;
pub mod error;
pub mod hash;
pub mod hasher;
mod iterator;
pub mod nibbles;
pub mod node;
pub mod version;
pub mod vp;

use std::sync::Arc;

use tracing::instrument;

use crate::codec::decode_extended;
use crate::config::TrieConfig;
use crate::db::{DatabaseReader, DatabaseWriter};
use crate::error::TrieError;
use crate::hash::{Hash, EMPTY_ROOT};
use crate::hasher::Hasher;
use crate::nibbles::Nibbles;
use crate::node::{FullNode, Node, NodeFlags, ShortNode};
use crate::version::{Ref, Version};

pub use crate::codec::verify_node_hash;
pub use crate::error::TrieError as Error;
pub use crate::iterator::NodeIterator;

/// A versioned Merkle Patricia Trie.
///
/// Not safe for concurrent mutation (see the crate's non-goals): a `Trie`
/// owns its in-memory tree outright and mutating operations take `&mut
/// self`. Independent `Trie` views over the same read-only database may be
/// constructed and used concurrently.
pub struct Trie {
    root: Option<Arc<Node>>,
    db: Option<Arc<dyn DatabaseReader>>,
    cfg: TrieConfig,
    /// Current cache generation, bumped once per commit. Stamped onto every
    /// node touched by `update` or resolved from the database, and compared
    /// against a clean `FullNode` child's own generation to decide eviction.
    gen: u16,
}

impl Trie {
    /// An empty trie with no backing database. Useful for scratch tries
    /// (see [`derivable_list`]) and for building a tree purely in memory
    /// before ever committing it.
    pub fn empty(cfg: TrieConfig) -> Self {
        Self {
            root: None,
            db: None,
            cfg,
            gen: 0,
        }
    }

    /// Opens a trie at `root`. If `root.hash` is the zero hash or
    /// [`EMPTY_ROOT`], the trie is empty and `db` may be omitted even for a
    /// trie that will later be mutated and committed. Otherwise the root is
    /// installed as a lazy [`Node::Ref`]; it is only resolved against `db`
    /// the first time an operation actually needs to look inside it.
    pub fn new(root: Ref, db: Option<Arc<dyn DatabaseReader>>, cfg: TrieConfig) -> Self {
        let is_empty = root.hash.is_zero() || root.hash == *EMPTY_ROOT;
        let root_node = if is_empty {
            None
        } else {
            Some(Node::reference(root))
        };
        Self {
            root: root_node,
            db,
            cfg,
            gen: 0,
        }
    }

    /// Wraps an already-live root node, continuing to edit it between
    /// commits without re-reading it from the database.
    pub fn from_root_node(node: Arc<Node>, db: Option<Arc<dyn DatabaseReader>>, cfg: TrieConfig) -> Self {
        Self {
            root: Some(node),
            db,
            cfg,
            gen: 0,
        }
    }

    /// The trie's configuration, fixed at construction.
    pub fn config(&self) -> TrieConfig {
        self.cfg
    }

    /// Retrieves the `(value, meta)` pair stored under `key`, or `None` if
    /// `key` is not present. Never caches the absence, and never mutates
    /// the in-memory tree: a `RefNode` encountered on the way is resolved
    /// fresh from the database on every call.
    #[instrument(level = "trace", skip(self), fields(key_len = key.len()))]
    pub fn get(&self, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>, TrieError> {
        let Some(root) = &self.root else {
            return Ok(None);
        };
        get_rec(
            root,
            self.db.as_deref(),
            Nibbles::from_bytes(key),
            Nibbles::default(),
            self.gen,
            self.cfg.non_crypto,
        )
    }

    /// Inserts or replaces the `(value, meta)` pair stored under `key`. An
    /// empty `value` is treated as [`Trie::delete`]. A no-op overwrite
    /// (byte-identical `value` and `meta` already stored at `key`) leaves
    /// the path clean rather than marking it dirty.
    #[instrument(level = "trace", skip(self, value, meta), fields(key_len = key.len(), value_len = value.len()))]
    pub fn update(&mut self, key: &[u8], value: Vec<u8>, meta: Vec<u8>) -> Result<(), TrieError> {
        if value.is_empty() {
            return self.delete(key);
        }
        let key_nibbles = Nibbles::from_bytes(key);
        let value_node = Node::value(value, meta);
        let root = self.root.take();
        let (_dirty, new_root) = insert_rec(
            root,
            self.db.as_deref(),
            &Nibbles::default(),
            key_nibbles,
            value_node,
            self.gen,
            self.cfg.non_crypto,
        )?;
        self.root = Some(new_root);
        Ok(())
    }

    /// Removes `key` from the trie. A no-op (hash unchanged) if `key` is
    /// not present.
    #[instrument(level = "trace", skip(self), fields(key_len = key.len()))]
    pub fn delete(&mut self, key: &[u8]) -> Result<(), TrieError> {
        let Some(root) = self.root.take() else {
            return Ok(());
        };
        let key_nibbles = Nibbles::from_bytes(key);
        let (_dirty, new_root) = delete_rec(
            Some(root),
            self.db.as_deref(),
            &Nibbles::default(),
            key_nibbles,
            self.gen,
            self.cfg.non_crypto,
        )?;
        self.root = new_root;
        Ok(())
    }

    /// The trie's canonical root hash: [`EMPTY_ROOT`] for an empty trie.
    /// Computes (and memoizes on the in-memory tree) the hash without
    /// writing anything to a database.
    pub fn hash(&mut self) -> Result<Hash, TrieError> {
        let Some(root) = self.root.clone() else {
            return Ok(*EMPTY_ROOT);
        };
        let hasher = Hasher::new(self.cfg);
        let (node, hash) = hasher.hash(&root);
        self.root = Some(node);
        Ok(hash)
    }

    /// Writes every dirty subtree to `db` at `new_ver`, ages out cold
    /// cached `FullNode` children, and returns the new root reference.
    ///
    /// Deliberately does NOT take a `skip_hash: bool` parameter. Non-crypto
    /// behaviour is governed by [`TrieConfig::non_crypto`] at construction
    /// instead, so mixing cryptographic and non-cryptographic commits
    /// within one `Trie` is impossible by construction. See `DESIGN.md`,
    /// Open Question decision 1, for the full rationale.
    #[instrument(level = "debug", skip(self, db), fields(new_ver = %new_ver))]
    pub fn commit(&mut self, db: &dyn DatabaseWriter, new_ver: Version) -> Result<Ref, TrieError> {
        let gen_now = self.gen.wrapping_add(1);
        let Some(root) = self.root.clone() else {
            self.gen = gen_now;
            return Ok(Ref::new(*EMPTY_ROOT, new_ver));
        };
        let hasher = Hasher::new(self.cfg);
        let (stored, hash) = hasher.store(&root, db, new_ver, gen_now)?;
        self.root = Some(stored);
        self.gen = gen_now;
        Ok(Ref::new(hash, new_ver))
    }

    /// A pre-order [`NodeIterator`] over the trie, starting at the first
    /// path greater than or equal to `start` (hex form, no terminator) and
    /// skipping any subtree whose stored version is below `min_ver`.
    pub fn node_iterator(&self, start: &[u8], min_ver: Version) -> NodeIterator {
        NodeIterator::new(
            self.root.clone(),
            self.db.clone(),
            start,
            min_ver,
            self.gen,
            self.cfg.non_crypto,
        )
    }
}

/// Resolves a [`Ref`] against `db`, decoding it into a live node stamped
/// with `gen`. The only place the core ever reads from the database on a
/// plain `get`/`update` path.
///
/// When `non_crypto` is false, the fetched blob's canonical bytes are
/// checked against `r.hash` before decoding (see
/// [`crate::codec::verify_node_hash`]); a mismatch is a fatal integrity
/// failure (spec §7), surfaced as [`TrieError::HashMismatch`]. Skipped in
/// non-crypto mode, where a ref's "hash" is the fixed placeholder rather
/// than a real digest and is never comparable to one (see
/// [`crate::config::TrieConfig::non_crypto`]).
fn resolve_ref(
    db: Option<&dyn DatabaseReader>,
    r: Ref,
    path: &Nibbles,
    gen: u16,
    non_crypto: bool,
) -> Result<Arc<Node>, TrieError> {
    let db = db.ok_or_else(|| TrieError::missing_node(r, path.clone(), "no database configured"))?;
    let blob = db
        .get(path, r.ver)?
        .ok_or_else(|| TrieError::missing_node(r, path.clone(), "not found in database"))?;
    if !non_crypto && !verify_node_hash(&blob, r.hash) {
        return Err(TrieError::HashMismatch { path: path.clone() });
    }
    decode_extended(&blob, gen)
}

/// Resolves `node` if it is a [`Node::Ref`], otherwise returns it unchanged.
fn resolve_if_needed(
    db: Option<&dyn DatabaseReader>,
    node: &Arc<Node>,
    path: &Nibbles,
    gen: u16,
    non_crypto: bool,
) -> Result<Arc<Node>, TrieError> {
    match node.as_ref() {
        Node::Ref(r) => resolve_ref(db, r.r, path, gen, non_crypto),
        _ => Ok(node.clone()),
    }
}

fn get_rec(
    node: &Arc<Node>,
    db: Option<&dyn DatabaseReader>,
    mut key: Nibbles,
    path: Nibbles,
    gen: u16,
    non_crypto: bool,
) -> Result<Option<(Vec<u8>, Vec<u8>)>, TrieError> {
    match node.as_ref() {
        Node::Value(v) => Ok(Some((v.value.clone(), v.meta.clone()))),
        Node::Ref(r) => {
            let resolved = resolve_ref(db, r.r, &path, gen, non_crypto)?;
            get_rec(&resolved, db, key, path, gen, non_crypto)
        }
        Node::Short(s) => {
            if key.len() < s.key.len() || key.count_prefix(&s.key) != s.key.len() {
                return Ok(None);
            }
            let rest = key.offset(s.key.len());
            get_rec(&s.child, db, rest, path.concat(&s.key), gen, non_crypto)
        }
        Node::Full(f) => {
            if key.is_empty() {
                return Err(TrieError::malformed("branch lookup with empty key"));
            }
            let idx = key.at(0);
            key.next();
            match &f.children[idx] {
                Some(child) => {
                    let child_path = if idx == 16 { path } else { path.append_new(idx as u8) };
                    get_rec(child, db, key, child_path, gen, non_crypto)
                }
                None => Ok(None),
            }
        }
    }
}

/// Classical MPT insert: matches the longest common nibble prefix against
/// the node in hand and rewrites the path, splitting a [`ShortNode`] into
/// `(short, full, short)` as needed. Returns `(dirty, new_node)`; `dirty`
/// is false exactly when the call was a byte-identical overwrite, letting
/// every ancestor on the path short-circuit without cloning.
fn insert_rec(
    node: Option<Arc<Node>>,
    db: Option<&dyn DatabaseReader>,
    prefix: &Nibbles,
    key: Nibbles,
    value: Arc<Node>,
    gen: u16,
    non_crypto: bool,
) -> Result<(bool, Arc<Node>), TrieError> {
    let Some(node) = node else {
        // No node at this slot: a fully-consumed key attaches `value`
        // directly (this is how a branch's 17th slot, or a re-homed
        // subtree whose extension key is fully spent, ends up holding its
        // child with no intervening wrapper); otherwise wrap the remaining
        // key in a fresh leaf/extension.
        if key.is_empty() {
            return Ok((true, value));
        }
        return Ok((
            true,
            Node::short(ShortNode {
                key,
                child: value,
                flags: NodeFlags::fresh(gen),
            }),
        ));
    };

    match node.as_ref() {
        Node::Ref(r) => {
            let resolved = resolve_ref(db, r.r, prefix, gen, non_crypto)?;
            insert_rec(Some(resolved), db, prefix, key, value, gen, non_crypto)
        }
        Node::Value(_) => Err(TrieError::malformed("insert recursed into a bare value node")),
        Node::Short(s) => {
            let common = key.count_prefix(&s.key);
            if common == s.key.len() {
                if common == key.len() {
                    if let (Node::Value(old), Node::Value(new)) = (s.child.as_ref(), value.as_ref()) {
                        if old.value == new.value && old.meta == new.meta {
                            return Ok((false, node.clone()));
                        }
                    }
                    return Ok((
                        true,
                        Node::short(ShortNode {
                            key: s.key.clone(),
                            child: value,
                            flags: NodeFlags::fresh(gen),
                        }),
                    ));
                }
                let child_prefix = prefix.concat(&s.key);
                let (dirty, new_child) =
                    insert_rec(Some(s.child.clone()), db, &child_prefix, key.offset(common), value, gen, non_crypto)?;
                if !dirty {
                    return Ok((false, node.clone()));
                }
                return Ok((
                    true,
                    Node::short(ShortNode {
                        key: s.key.clone(),
                        child: new_child,
                        flags: NodeFlags::fresh(gen),
                    }),
                ));
            }

            // Diverges partway through `s.key`: split into a branch at the
            // point of divergence, re-homing both the existing subtree and
            // the new value under it.
            let mut branch = FullNode::empty();
            let shared_prefix = s.key.slice(0, common);

            let existing_idx = s.key.at(common);
            if existing_idx == 16 {
                branch.children[16] = Some(s.child.clone());
            } else {
                let existing_rest = s.key.offset(common + 1);
                let existing_path = prefix.concat(&shared_prefix).append_new(existing_idx as u8);
                let (_, existing_child) =
                    insert_rec(None, db, &existing_path, existing_rest, s.child.clone(), gen, non_crypto)?;
                branch.children[existing_idx] = Some(existing_child);
            }

            let new_idx = key.at(common);
            if new_idx == 16 {
                branch.children[16] = Some(value);
            } else {
                let new_rest = key.offset(common + 1);
                let new_path = prefix.concat(&shared_prefix).append_new(new_idx as u8);
                let (_, new_child) = insert_rec(None, db, &new_path, new_rest, value, gen, non_crypto)?;
                branch.children[new_idx] = Some(new_child);
            }

            branch.flags = NodeFlags::fresh(gen);
            let branch_node = Node::full(branch);
            if common == 0 {
                return Ok((true, branch_node));
            }
            Ok((
                true,
                Node::short(ShortNode {
                    key: shared_prefix,
                    child: branch_node,
                    flags: NodeFlags::fresh(gen),
                }),
            ))
        }
        Node::Full(f) => {
            if key.is_empty() {
                return Err(TrieError::malformed("branch insert with empty key"));
            }
            let idx = key.at(0);
            let mut rest = key;
            rest.next();
            let child = f.children[idx].clone();
            let child_prefix = if idx == 16 { prefix.clone() } else { prefix.append_new(idx as u8) };
            let (dirty, new_child) = insert_rec(child, db, &child_prefix, rest, value, gen, non_crypto)?;
            if !dirty {
                return Ok((false, node.clone()));
            }
            let mut new_full = f.clone();
            new_full.children[idx] = Some(new_child);
            new_full.flags = NodeFlags::fresh(gen);
            Ok((true, Node::full(new_full)))
        }
    }
}

/// Classical MPT delete: removes the leaf at `key` if present, collapsing
/// a [`FullNode`] left with a single child back into a [`ShortNode`] and
/// merging adjacent extensions (invariant I2/I3). Returns `(dirty,
/// new_node)`; a `key` not present in the trie is a no-op with `dirty =
/// false` (property P3).
fn delete_rec(
    node: Option<Arc<Node>>,
    db: Option<&dyn DatabaseReader>,
    prefix: &Nibbles,
    key: Nibbles,
    gen: u16,
    non_crypto: bool,
) -> Result<(bool, Option<Arc<Node>>), TrieError> {
    let Some(node) = node else {
        return Ok((false, None));
    };

    match node.as_ref() {
        Node::Ref(r) => {
            let resolved = resolve_ref(db, r.r, prefix, gen, non_crypto)?;
            delete_rec(Some(resolved), db, prefix, key, gen, non_crypto)
        }
        Node::Value(_) => Err(TrieError::malformed("delete recursed into a bare value node")),
        Node::Short(s) => {
            let common = key.count_prefix(&s.key);
            if common < s.key.len() {
                // `s.key` is not a prefix of `key`: nothing to delete here.
                return Ok((false, Some(node.clone())));
            }
            if matches!(s.child.as_ref(), Node::Value(_)) {
                // Leaf carrier: `common == s.key.len()` here implies an exact
                // key match (both paths end with the same terminator nibble).
                return Ok((true, None));
            }
            let child_prefix = prefix.concat(&s.key);
            let (dirty, new_child) =
                delete_rec(Some(s.child.clone()), db, &child_prefix, key.offset(common), gen, non_crypto)?;
            if !dirty {
                return Ok((false, Some(node.clone())));
            }
            match new_child {
                None => Ok((true, None)),
                Some(nc) => match nc.as_ref() {
                    Node::Short(child_short) => Ok((
                        true,
                        Some(Node::short(ShortNode {
                            key: s.key.concat(&child_short.key),
                            child: child_short.child.clone(),
                            flags: NodeFlags::fresh(gen),
                        })),
                    )),
                    _ => Ok((
                        true,
                        Some(Node::short(ShortNode {
                            key: s.key.clone(),
                            child: nc,
                            flags: NodeFlags::fresh(gen),
                        })),
                    )),
                },
            }
        }
        Node::Full(f) => {
            if key.is_empty() {
                return Err(TrieError::malformed("branch delete with empty key"));
            }
            let idx = key.at(0);
            let mut rest = key;
            rest.next();
            let child = f.children[idx].clone();
            let child_prefix = if idx == 16 { prefix.clone() } else { prefix.append_new(idx as u8) };
            let (dirty, new_child) = delete_rec(child, db, &child_prefix, rest, gen, non_crypto)?;
            if !dirty {
                return Ok((false, Some(node.clone())));
            }
            let mut new_full = f.clone();
            new_full.children[idx] = new_child;

            if new_full.count_children() >= 2 {
                new_full.flags = NodeFlags::fresh(gen);
                return Ok((true, Some(Node::full(new_full))));
            }

            // Exactly one child remains (I3 guaranteed >= 2 before delete,
            // so this can't drop to zero): collapse into a short node.
            let pos = new_full
                .only_child()
                .ok_or_else(|| TrieError::malformed("branch collapse found no remaining child"))?;
            let lone = new_full.children[pos]
                .clone()
                .ok_or_else(|| TrieError::malformed("branch collapse lost its remaining child"))?;

            if pos == 16 {
                return Ok((
                    true,
                    Some(Node::short(ShortNode {
                        key: Nibbles::from_hex(vec![16]),
                        child: lone,
                        flags: NodeFlags::fresh(gen),
                    })),
                ));
            }

            let lone_prefix = prefix.append_new(pos as u8);
            let resolved = resolve_if_needed(db, &lone, &lone_prefix, gen, non_crypto)?;
            match resolved.as_ref() {
                Node::Short(cs) => {
                    let mut merged_key = Nibbles::from_hex(vec![pos as u8]);
                    merged_key.extend(&cs.key);
                    Ok((
                        true,
                        Some(Node::short(ShortNode {
                            key: merged_key,
                            child: cs.child.clone(),
                            flags: NodeFlags::fresh(gen),
                        })),
                    ))
                }
                _ => Ok((
                    true,
                    Some(Node::short(ShortNode {
                        key: Nibbles::from_hex(vec![pos as u8]),
                        child: resolved,
                        flags: NodeFlags::fresh(gen),
                    })),
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryDatabase;
    use proptest::collection::hash_map;
    use proptest::prelude::*;

    fn new_trie() -> Trie {
        Trie::empty(TrieConfig::default())
    }

    #[test]
    fn empty_trie_hashes_to_empty_root() {
        let mut trie = new_trie();
        assert_eq!(trie.hash().unwrap(), *EMPTY_ROOT);
    }

    #[test]
    fn get_missing_key_is_none() {
        let trie = new_trie();
        assert_eq!(trie.get(b"anything").unwrap(), None);
    }

    #[test]
    fn basic_insert_and_get() {
        let mut trie = new_trie();
        trie.update(b"doe", b"reindeer".to_vec(), Vec::new()).unwrap();
        trie.update(b"dog", b"puppy".to_vec(), Vec::new()).unwrap();
        trie.update(b"dogglesworth", b"cat".to_vec(), Vec::new()).unwrap();

        assert_eq!(trie.get(b"dog").unwrap(), Some((b"puppy".to_vec(), Vec::new())));
        assert_eq!(trie.get(b"doe").unwrap(), Some((b"reindeer".to_vec(), Vec::new())));
        assert_eq!(trie.get(b"dogglesworth").unwrap(), Some((b"cat".to_vec(), Vec::new())));
        assert_eq!(trie.get(b"unknown").unwrap(), None);
    }

    #[test]
    fn delete_then_get_returns_none() {
        let mut trie = new_trie();
        trie.update(b"do", b"verb".to_vec(), Vec::new()).unwrap();
        trie.update(b"dog", b"puppy".to_vec(), Vec::new()).unwrap();
        trie.delete(b"dog").unwrap();
        assert_eq!(trie.get(b"dog").unwrap(), None);
        assert_eq!(trie.get(b"do").unwrap(), Some((b"verb".to_vec(), Vec::new())));
    }

    #[test]
    fn delete_of_absent_key_is_noop_hash() {
        let mut a = new_trie();
        a.update(b"dog", b"puppy".to_vec(), Vec::new()).unwrap();
        let before = a.hash().unwrap();
        a.delete(b"cat").unwrap();
        let after = a.hash().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn insert_order_does_not_affect_hash() {
        let pairs = [
            (&b"do"[..], &b"verb"[..]),
            (&b"dog"[..], &b"puppy"[..]),
            (&b"doge"[..], &b"coin"[..]),
            (&b"horse"[..], &b"stallion"[..]),
        ];
        let mut forward = new_trie();
        for (k, v) in pairs {
            forward.update(k, v.to_vec(), Vec::new()).unwrap();
        }
        let mut backward = new_trie();
        for (k, v) in pairs.iter().rev() {
            backward.update(k, v.to_vec(), Vec::new()).unwrap();
        }
        assert_eq!(forward.hash().unwrap(), backward.hash().unwrap());
    }

    #[test]
    fn metadata_does_not_affect_hash() {
        let mut a = new_trie();
        a.update(b"dog", b"puppy".to_vec(), b"meta-a".to_vec()).unwrap();
        let mut b = new_trie();
        b.update(b"dog", b"puppy".to_vec(), b"meta-b".to_vec()).unwrap();
        assert_eq!(a.hash().unwrap(), b.hash().unwrap());
    }

    #[test]
    fn delete_then_insert_collapses_back_to_identical_hash() {
        let mut a = new_trie();
        a.update(b"do", b"verb".to_vec(), Vec::new()).unwrap();
        a.update(b"dog", b"puppy".to_vec(), Vec::new()).unwrap();
        let base = a.hash().unwrap();

        a.update(b"doge", b"coin".to_vec(), Vec::new()).unwrap();
        a.delete(b"doge").unwrap();
        assert_eq!(a.hash().unwrap(), base);
    }

    #[test]
    fn commit_then_reopen_round_trips() {
        let mut trie = new_trie();
        let entries = [
            (&b"do"[..], &b"verb"[..]),
            (&b"ether"[..], &b"wookiedoo"[..]),
            (&b"horse"[..], &b"stallion"[..]),
            (&b"shaman"[..], &b"horse"[..]),
            (&b"doge"[..], &b"coin"[..]),
            (&b"dog"[..], &b"puppy"[..]),
        ];
        for (k, v) in entries {
            trie.update(k, v.to_vec(), b"m".to_vec()).unwrap();
        }
        trie.delete(b"ether").unwrap();
        trie.delete(b"shaman").unwrap();

        let db = InMemoryDatabase::new();
        let root = trie.commit(&db, Version::new(1, 0)).unwrap();

        let reopened = Trie::new(root, Some(Arc::new(db)), TrieConfig::default());
        for (k, v) in [
            (&b"do"[..], &b"verb"[..]),
            (&b"doge"[..], &b"coin"[..]),
            (&b"dog"[..], &b"puppy"[..]),
            (&b"horse"[..], &b"stallion"[..]),
        ] {
            assert_eq!(
                reopened.get(k).unwrap(),
                Some((v.to_vec(), b"m".to_vec())),
                "key {k:?} did not round-trip"
            );
        }
        assert_eq!(reopened.get(b"ether").unwrap(), None);
        assert_eq!(reopened.get(b"shaman").unwrap(), None);
    }

    #[test]
    fn missing_blob_surfaces_missing_node_then_recovers() {
        let mut trie = new_trie();
        trie.update(b"dog", b"puppy".to_vec(), Vec::new()).unwrap();
        trie.update(b"doge", b"coin".to_vec(), Vec::new()).unwrap();
        trie.update(b"horse", b"stallion".to_vec(), Vec::new()).unwrap();

        let db = InMemoryDatabase::new();
        let root = trie.commit(&db, Version::new(1, 0)).unwrap();

        // A trie reopened with an empty database can't resolve anything
        // beyond a bare root reference.
        let broken_db = InMemoryDatabase::new();
        let broken = Trie::new(root, Some(Arc::new(broken_db)), TrieConfig::default());
        let err = broken.get(b"dog").unwrap_err();
        assert!(matches!(err, TrieError::MissingNode { .. }));

        // Restoring the real database lets the same call succeed.
        let healed = Trie::new(root, Some(Arc::new(db)), TrieConfig::default());
        assert_eq!(healed.get(b"dog").unwrap(), Some((b"puppy".to_vec(), Vec::new())));
    }

    /// Wraps a database and flips the first byte of every blob it returns,
    /// to exercise hash verification on resolve.
    struct TamperingReader {
        inner: InMemoryDatabase,
    }

    impl crate::db::DatabaseReader for TamperingReader {
        fn get(&self, path: &Nibbles, ver: Version) -> Result<Option<Vec<u8>>, TrieError> {
            let blob = self.inner.get(path, ver)?;
            Ok(blob.map(|mut b| {
                if let Some(first) = b.first_mut() {
                    *first ^= 0xff;
                }
                b
            }))
        }
    }

    #[test]
    fn tampered_blob_surfaces_hash_mismatch() {
        let mut trie = new_trie();
        trie.update(b"dog", b"puppy".to_vec(), Vec::new()).unwrap();
        trie.update(b"doge", b"coin".to_vec(), Vec::new()).unwrap();
        trie.update(b"horse", b"stallion".to_vec(), Vec::new()).unwrap();

        let db = InMemoryDatabase::new();
        let root = trie.commit(&db, Version::new(1, 0)).unwrap();

        let tampered = Trie::new(
            root,
            Some(Arc::new(TamperingReader { inner: db })),
            TrieConfig::default(),
        );
        let err = tampered.get(b"dog").unwrap_err();
        assert!(matches!(err, TrieError::HashMismatch { .. }));
    }

    #[test]
    fn non_crypto_mode_skips_hash_verification_on_resolve() {
        // In non-crypto mode a committed ref's hash is the fixed placeholder,
        // not a real digest of the stored blob — so get() only succeeds if
        // resolve skips the check rather than comparing against it.
        let mut cfg = TrieConfig::default();
        cfg.non_crypto = true;
        let mut trie = Trie::empty(cfg.clone());
        trie.update(b"dog", b"puppy".to_vec(), Vec::new()).unwrap();
        trie.update(b"doge", b"coin".to_vec(), Vec::new()).unwrap();

        let db = InMemoryDatabase::new();
        let root = trie.commit(&db, Version::new(1, 0)).unwrap();

        let reopened = Trie::new(root, Some(Arc::new(db)), cfg);
        assert_eq!(
            reopened.get(b"dog").unwrap(),
            Some((b"puppy".to_vec(), Vec::new()))
        );
    }

    proptest! {
        #[test]
        fn prop_insert_is_order_independent(
            entries in hash_map("[a-z]{1,6}", "[a-z]{1,6}", 1..12)
        ) {
            let pairs: Vec<(String, String)> = entries.into_iter().collect();

            let mut forward = new_trie();
            for (k, v) in &pairs {
                forward.update(k.as_bytes(), v.as_bytes().to_vec(), Vec::new()).unwrap();
            }

            let mut shuffled = pairs.clone();
            shuffled.reverse();
            let mut backward = new_trie();
            for (k, v) in &shuffled {
                backward.update(k.as_bytes(), v.as_bytes().to_vec(), Vec::new()).unwrap();
            }

            prop_assert_eq!(forward.hash().unwrap(), backward.hash().unwrap());
        }

        #[test]
        fn prop_delete_all_inserted_keys_empties_trie(
            entries in hash_map("[a-z]{1,6}", "[a-z]{1,6}", 1..12)
        ) {
            let mut trie = new_trie();
            for (k, v) in &entries {
                trie.update(k.as_bytes(), v.as_bytes().to_vec(), Vec::new()).unwrap();
            }
            for k in entries.keys() {
                trie.delete(k.as_bytes()).unwrap();
            }
            prop_assert_eq!(trie.hash().unwrap(), *EMPTY_ROOT);
        }
    }
}
