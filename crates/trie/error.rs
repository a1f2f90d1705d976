use thiserror::Error;

use crate::nibbles::Nibbles;
use crate::version::Ref;

/// Errors surfaced by the trie core.
///
/// `MissingNode` is the only recoverable variant: a caller may fetch the
/// blob identified by `ref_` out-of-band, hand it to the database, and
/// retry the exact same operation. Every other variant is fatal for the
/// walk that produced it. `Malformed` covers a node's own structural shape
/// (wrong list arity, an unexpected slot size); `Encoding` covers a failure
/// decoding a value carried *inside* that shape (the vp-framed version/meta
/// trailer, or similar auxiliary framing) — kept distinct so a caller can
/// tell "this isn't a node at all" from "this is a node, but one of its
/// fields didn't decode".
#[derive(Debug, Error)]
pub enum TrieError {
    #[error("missing node at path {path:?}: {ref_:?} ({cause})")]
    MissingNode {
        ref_: Ref,
        path: Nibbles,
        cause: String,
    },

    #[error("malformed node{}", fmt_context(.context))]
    Malformed { context: String },

    #[error("node hash verification failed for path {path:?}")]
    HashMismatch { path: Nibbles },

    #[error("encoding error{}", fmt_context(.context))]
    Encoding { context: String },

    #[error("rlp decode error: {0}")]
    RLPDecode(#[from] triecore_rlp::error::RLPDecodeError),

    #[error("database error: {0}")]
    Database(#[from] anyhow::Error),
}

fn fmt_context(context: &str) -> String {
    if context.is_empty() {
        String::new()
    } else {
        format!(": {context}")
    }
}

impl TrieError {
    pub fn malformed(context: impl Into<String>) -> Self {
        Self::Malformed {
            context: context.into(),
        }
    }

    /// A decode failure confined to a value's own wire encoding (vp framing,
    /// RLP-adjacent helpers), as opposed to [`TrieError::Malformed`]'s
    /// structural node-shape failures (wrong arity, unexpected slot size).
    pub fn encoding(context: impl Into<String>) -> Self {
        Self::Encoding {
            context: context.into(),
        }
    }

    pub fn missing_node(ref_: Ref, path: Nibbles, cause: impl Into<String>) -> Self {
        Self::MissingNode {
            ref_,
            path,
            cause: cause.into(),
        }
    }
}
