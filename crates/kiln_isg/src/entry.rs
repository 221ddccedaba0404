//! Cache entries: one persisted fingerprint per output page.

use chrono::{DateTime, Utc};
use kiln_common::Digest;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Fingerprint and freshness policy of a previously rendered page.
///
/// Serialized with camelCase keys as part of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Output path, e.g. `/about.html`.
    pub path: String,

    /// Digest over page content plus every dependency file digest.
    pub inputs_hash: Digest,

    /// Normalized absolute paths of every template and partial the render
    /// depends on, in discovery order.
    pub deps: Vec<String>,

    /// Labels usable by invalidation queries.
    pub tags: Vec<String>,

    /// When the page was last rendered successfully.
    pub rendered_at: DateTime<Utc>,

    /// Freshness window starting at `rendered_at`.
    #[serde(deserialize_with = "deserialize_ttl")]
    pub ttl_seconds: u64,

    /// Anchor for age calculations, when the page declares a publication date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,

    /// Age in days after which TTL expiry no longer forces a rebuild.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_cap_days: Option<u32>,
}

impl CacheEntry {
    /// Returns `true` if the entry can be trusted for a rebuild decision.
    ///
    /// Field types are enforced by deserialization; this covers what types
    /// alone cannot, namely the non-empty string fields.
    pub fn is_valid(&self) -> bool {
        !self.path.is_empty()
            && !self.inputs_hash.is_empty()
            && self.deps.iter().all(|d| !d.is_empty())
    }
}

/// A manifest value as found on disk.
///
/// Values that do not fit the [`CacheEntry`] schema are kept verbatim, so
/// loading and saving a manifest never loses an entry. Whether an entry can
/// be trusted is decided at rebuild time, not at load time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StoredEntry {
    /// Fits the schema.
    Parsed(CacheEntry),
    /// Anything else: missing fields, odd types, unparseable timestamps.
    Raw(Value),
}

impl StoredEntry {
    /// Converts an untrusted JSON value, falling back to [`StoredEntry::Raw`].
    pub fn from_value(value: Value) -> Self {
        match CacheEntry::deserialize(&value) {
            Ok(entry) => StoredEntry::Parsed(entry),
            Err(_) => StoredEntry::Raw(value),
        }
    }

    /// The typed entry, when the value fit the schema.
    pub fn parsed(&self) -> Option<&CacheEntry> {
        match self {
            StoredEntry::Parsed(entry) => Some(entry),
            StoredEntry::Raw(_) => None,
        }
    }

    /// Returns `true` if the entry fits the schema and passes
    /// [`CacheEntry::is_valid`].
    pub fn is_valid(&self) -> bool {
        self.parsed().is_some_and(CacheEntry::is_valid)
    }

    /// Tags of the entry. For raw values, the string items of a `tags` array.
    pub fn tags(&self) -> Vec<&str> {
        match self {
            StoredEntry::Parsed(entry) => entry.tags.iter().map(String::as_str).collect(),
            StoredEntry::Raw(value) => value
                .get("tags")
                .and_then(Value::as_array)
                .map(|tags| tags.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default(),
        }
    }

    /// Render time, if the entry carries a readable one.
    pub fn rendered_at(&self) -> Option<DateTime<Utc>> {
        match self {
            StoredEntry::Parsed(entry) => Some(entry.rendered_at),
            StoredEntry::Raw(value) => value
                .get("renderedAt")
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

impl From<CacheEntry> for StoredEntry {
    fn from(entry: CacheEntry) -> Self {
        StoredEntry::Parsed(entry)
    }
}

/// Accepts a TTL written as an integer or as a whole, finite, non-negative float.
fn deserialize_ttl<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    struct TtlVisitor;

    impl<'de> Visitor<'de> for TtlVisitor {
        type Value = u64;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a finite, non-negative number of seconds")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            u64::try_from(v).map_err(|_| E::custom("ttlSeconds must not be negative"))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            if v.is_finite() && v >= 0.0 && v <= u64::MAX as f64 {
                Ok(v.floor() as u64)
            } else {
                Err(E::custom("ttlSeconds must be finite and non-negative"))
            }
        }
    }

    deserializer.deserialize_any(TtlVisitor)
}
