//! Cache key derivation
//!
//! Maps an (account identity, message identity) pair to a fixed-length,
//! opaque key. Keys are SHA-256 digests so neither identifier is recoverable
//! from the stored key, and distinct messages do not collide in practice.

use std::fmt;

use sha2::{Digest, Sha256};

/// Opaque summary cache key
///
/// Always 64 lowercase hex characters, safe to use as a file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a message under an account
    ///
    /// Each component is length-prefixed before hashing, so
    /// (`"ab"`, `"c"`) and (`"a"`, `"bc"`) hash different inputs. Callers must
    /// not derive keys for an empty message id; caching is skipped instead.
    pub fn derive(account_id: &str, message_id: &str) -> Self {
        let mut hasher = Sha256::new();
        for part in [account_id, message_id] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
