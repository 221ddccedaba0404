//! Content digests for cache fingerprints.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;

/// Prefix carried by every digest string, naming the algorithm.
pub const DIGEST_PREFIX: &str = "sha256-";

/// A SHA-256 digest rendered as `sha256-<64 lowercase hex chars>`.
///
/// Digests are persisted verbatim in the cache manifest, so the type is a
/// transparent string wrapper. Any string loaded from disk is accepted here;
/// whether it is usable is decided by entry validation, not by parsing.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// Computes the digest of a byte slice.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self::from_parts([data])
    }

    /// Computes the digest of several byte slices fed in order, as if they
    /// had been concatenated.
    pub fn from_parts<I, B>(parts: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_ref());
        }
        Self(format!("{DIGEST_PREFIX}{}", hex::encode(hasher.finalize())))
    }

    /// Wraps an existing digest string without recomputing anything.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the digest as a string slice, prefix included.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the wrapped string is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.0.strip_prefix(DIGEST_PREFIX).unwrap_or(&self.0);
        let short: String = hex.chars().take(8).collect();
        write!(f, "Digest({short}..)")
    }
}
