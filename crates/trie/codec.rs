//! Canonical and extended (on-disk) node encoding, per the node model in
//! `node.rs`. The canonical encoding is the exact byte string fed to `H`;
//! the extended encoding is the canonical bytes followed by a trailer
//! carrying the version of every non-embedded child and the metadata of
//! every stored leaf, so a blob read back from the database can be turned
//! back into a fully-typed [`Node`] without a second database round trip.

use std::sync::Arc;

use triecore_rlp::{
    constants::RLP_NULL,
    decode::{decode_bytes, decode_rlp_item, get_item_with_prefix},
    encode::{encode_length, RLPEncode},
};

use crate::error::TrieError;
use crate::hash::{hash_bytes, Hash, HASH_LENGTH};
use crate::nibbles::Nibbles;
use crate::node::{FullNode, Node, NodeFlags, ShortNode};
use crate::version::{Ref, Version};
use crate::vp;

/// Canonical encoding of the empty trie: a bare RLP empty string.
pub const CANONICAL_EMPTY_STRING: [u8; 1] = [RLP_NULL];

/// How a single child slot is represented while a node is being assembled
/// for hashing/storage. Built by the hasher engine, which already knows
/// each child's resolved hash/version (or has it embedded in hand).
#[derive(Debug, Clone)]
pub enum ChildEnc {
    /// No child in this slot (a `FullNode`'s unused nibble, never valid for
    /// a `ShortNode`'s single child).
    Empty,
    /// Child too large to embed: referenced by its digest and the version
    /// it was written at.
    Hash(Hash, Version),
    /// Same as `Hash`, but written with the non-crypto placeholder instead
    /// of a real digest (see [`crate::config::TrieConfig::non_crypto`]).
    NonCrypto(Version),
    /// Child small enough to embed verbatim: its own canonical encoding,
    /// plus any trailer entries its own descendants contributed (an
    /// embedded node never gets a database row of its own, so its
    /// descendants' version/meta entries have nowhere else to live and
    /// bubble up into the nearest stored ancestor's trailer).
    Embedded(Vec<u8>, Vec<u8>),
    /// A leaf's value, with opaque metadata carried alongside it.
    Value { value: Vec<u8>, meta: Vec<u8> },
}

fn append_child_canonical(child: &ChildEnc, out: &mut Vec<u8>) {
    match child {
        ChildEnc::Empty => out.push(RLP_NULL),
        ChildEnc::Hash(hash, _) => hash.0.encode(out),
        ChildEnc::NonCrypto(_) => out.push(0x00),
        ChildEnc::Embedded(bytes, _) => out.extend_from_slice(bytes),
        ChildEnc::Value { value, .. } => value.as_slice().encode(out),
    }
}

fn append_version(out: &mut Vec<u8>, ver: Version) {
    let combined = ((ver.major as u64) << 32) | ver.minor as u64;
    vp::append_minimal_uint(out, combined);
}

fn take_version(trailer: &mut &[u8]) -> Result<Version, TrieError> {
    let combined = vp::take_minimal_uint(trailer)
        .map_err(|e| TrieError::encoding(format!("version trailer: {e}")))?;
    Ok(Version::new((combined >> 32) as u32, combined as u32))
}

fn take_meta(trailer: &mut &[u8]) -> Result<Vec<u8>, TrieError> {
    vp::take_string(trailer).map_err(|e| TrieError::encoding(format!("meta trailer: {e}")))
}

fn append_child_trailer(child: &ChildEnc, out: &mut Vec<u8>) {
    match child {
        ChildEnc::Hash(_, ver) | ChildEnc::NonCrypto(ver) => append_version(out, *ver),
        ChildEnc::Value { value, meta } if !value.is_empty() => vp::append_string(out, meta),
        ChildEnc::Embedded(_, bubble) => out.extend_from_slice(bubble),
        _ => {}
    }
}

/// Encodes a `FullNode`'s 17 resolved children. Returns `(canonical, trailer)`;
/// `canonical` alone is what gets hashed, `canonical ++ trailer` is what
/// gets written to the database.
pub fn encode_full(children: &[ChildEnc; 17]) -> (Vec<u8>, Vec<u8>) {
    let mut payload = Vec::new();
    for child in children {
        append_child_canonical(child, &mut payload);
    }
    let mut canonical = Vec::with_capacity(payload.len() + 9);
    encode_length(payload.len(), &mut canonical);
    canonical.extend_from_slice(&payload);

    let mut trailer = Vec::new();
    for child in children {
        append_child_trailer(child, &mut trailer);
    }
    (canonical, trailer)
}

/// Encodes a `ShortNode`'s compact key and its single resolved child.
pub fn encode_short(compact_key: &[u8], child: &ChildEnc) -> (Vec<u8>, Vec<u8>) {
    let mut payload = Vec::new();
    compact_key.encode(&mut payload);
    append_child_canonical(child, &mut payload);
    let mut canonical = Vec::with_capacity(payload.len() + 9);
    encode_length(payload.len(), &mut canonical);
    canonical.extend_from_slice(&payload);

    let mut trailer = Vec::new();
    append_child_trailer(child, &mut trailer);
    (canonical, trailer)
}

/// Returns true iff `H(blob_without_trailer) == expected`. Never panics on
/// malformed input; a blob that does not even parse as an RLP item simply
/// fails verification.
pub fn verify_node_hash(blob: &[u8], expected: Hash) -> bool {
    match get_item_with_prefix(blob) {
        Ok((item, _trailer)) => hash_bytes(item) == expected,
        Err(_) => false,
    }
}

/// Decodes a single child slot: a list means an embedded node, a 32-byte
/// string a hash-referenced child, a single `0x00` byte the non-crypto
/// placeholder, and an empty string an absent slot.
fn decode_child_slot(
    item: &[u8],
    gen: u16,
    trailer: &mut &[u8],
) -> Result<Option<Arc<Node>>, TrieError> {
    let (is_list, payload, _rest) = decode_rlp_item(item)?;
    if is_list {
        return Ok(Some(decode_node_item(item, gen, trailer)?));
    }
    if payload.is_empty() {
        return Ok(None);
    }
    if payload.len() == HASH_LENGTH {
        let hash = Hash::from_slice(payload)
            .ok_or_else(|| TrieError::malformed("child hash of unexpected length"))?;
        let ver = take_version(trailer)?;
        return Ok(Some(Node::reference(Ref::new(hash, ver))));
    }
    if payload == [0x00] {
        let ver = take_version(trailer)?;
        return Ok(Some(Node::reference(Ref::new(Hash::default(), ver))));
    }
    Err(TrieError::malformed(format!(
        "unexpected child slot of {} bytes",
        payload.len()
    )))
}

fn decode_short(
    key_item: &[u8],
    child_item: &[u8],
    gen: u16,
    trailer: &mut &[u8],
) -> Result<Arc<Node>, TrieError> {
    let (key_bytes, _) = decode_bytes(key_item)?;
    let key = Nibbles::decode_compact(key_bytes);
    let child = if key.is_leaf() {
        let (value_bytes, _) = decode_bytes(child_item)?;
        let meta = if value_bytes.is_empty() {
            Vec::new()
        } else {
            take_meta(trailer)?
        };
        Node::value(value_bytes.to_vec(), meta)
    } else {
        decode_child_slot(child_item, gen, trailer)?
            .ok_or_else(|| TrieError::malformed("extension node with no child"))?
    };
    Ok(Node::short(ShortNode {
        key,
        child,
        flags: NodeFlags {
            dirty: false,
            gen,
            cache: None,
        },
    }))
}

fn decode_full(items: &[&[u8]], gen: u16, trailer: &mut &[u8]) -> Result<Arc<Node>, TrieError> {
    let mut full = FullNode::empty();
    for (i, slot) in full.children.iter_mut().enumerate().take(16) {
        *slot = decode_child_slot(items[i], gen, trailer)?;
    }
    let (value_bytes, _) = decode_bytes(items[16])?;
    if !value_bytes.is_empty() {
        let meta = take_meta(trailer)?;
        full.children[16] = Some(Node::value(value_bytes.to_vec(), meta));
    }
    Ok(Node::full(full))
}

/// Decodes a node's canonical list item (2 elements for a `ShortNode`, 17
/// for a `FullNode`), consuming trailer entries as it encounters
/// non-embedded children. `item` must be exactly one complete RLP item.
pub(crate) fn decode_node_item(
    item: &[u8],
    gen: u16,
    trailer: &mut &[u8],
) -> Result<Arc<Node>, TrieError> {
    let (is_list, payload, _rest) = decode_rlp_item(item)?;
    if !is_list {
        return Err(TrieError::malformed("expected a node list"));
    }
    let mut items = Vec::new();
    let mut cur = payload;
    while !cur.is_empty() {
        let (raw, next) = get_item_with_prefix(cur)?;
        items.push(raw);
        cur = next;
    }
    match items.len() {
        2 => decode_short(items[0], items[1], gen, trailer),
        17 => decode_full(&items, gen, trailer),
        n => Err(TrieError::malformed(format!("invalid node arity {n}"))),
    }
}

/// Decodes a full extended (on-disk) blob: the node's canonical list plus
/// its trailer. `gen` stamps the freshly materialized node's cache
/// generation (the trie's current generation counter at resolve time).
pub fn decode_extended(blob: &[u8], gen: u16) -> Result<Arc<Node>, TrieError> {
    let (item, mut trailer) = get_item_with_prefix(blob)?;
    let node = decode_node_item(item, gen, &mut trailer)?;
    if !trailer.is_empty() {
        return Err(TrieError::malformed("trailing bytes after node trailer"));
    }
    Ok(node)
}
