/// Tunables for a [`crate::Trie`] instance. Fixed at construction time;
/// nothing here is persisted alongside the trie's data, so opening the same
/// root with a different config is the caller's responsibility to keep
/// consistent (see the non-crypto Open Question in `DESIGN.md`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrieConfig {
    /// Number of generations a clean `FullNode` child may go unused before
    /// `store` evicts it back to a `RefNode`. `0` disables the cache
    /// entirely: every resolved child is evicted the next time its parent
    /// is stored.
    pub cache_generation_ttl: u16,
    /// When set, `store` writes the fixed non-crypto placeholder instead of
    /// a real digest for every non-embedded child, and `hash` returns
    /// [`crate::hash::NON_CRYPTO_HASH`] for the root. Never mix a
    /// non-crypto trie with a cryptographically hashed one: placeholders
    /// are indistinguishable from a genuine collision.
    pub non_crypto: bool,
}

impl TrieConfig {
    pub const fn new(cache_generation_ttl: u16, non_crypto: bool) -> Self {
        Self {
            cache_generation_ttl,
            non_crypto,
        }
    }
}

impl Default for TrieConfig {
    fn default() -> Self {
        Self {
            cache_generation_ttl: 120,
            non_crypto: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_real_hashing() {
        let cfg = TrieConfig::default();
        assert!(!cfg.non_crypto);
        assert!(cfg.cache_generation_ttl > 0);
    }
}
