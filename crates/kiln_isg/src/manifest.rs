//! Cache manifest mapping output paths to cache entries.
//!
//! The manifest is stored as `manifest.json` in the cache directory. Entries
//! keep the order in which they were first inserted (or found on disk), which
//! invalidation reports rely on. Loading is fail-safe: a missing or corrupt
//! file reads as "no cache". Individual entries that do not fit the schema
//! are kept as raw JSON and written back unchanged.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::Path;

use kiln_common::{Digest, NavNode};
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::entry::{CacheEntry, StoredEntry};
use crate::error::IsgError;
use crate::hasher;

/// Name of the manifest file within the cache directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Persisted mapping of output path to [`CacheEntry`], plus the navigation
/// tree digest of the build that wrote it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheManifest {
    /// Entries in insertion order.
    #[serde(default)]
    pub entries: EntryMap,

    /// Digest of the navigation tree at the last full build.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation_hash: Option<Digest>,
}

impl CacheManifest {
    /// Creates a new, empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the manifest from the cache directory, returning `None` if
    /// the file doesn't exist or can't be parsed.
    ///
    /// This is fail-safe: any error results in `None` (cache miss),
    /// triggering a full rebuild.
    pub fn load(cache_dir: &Path) -> Option<Self> {
        let path = cache_dir.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt cache manifest");
                None
            }
        }
    }

    /// Saves the manifest to the cache directory, replacing any previous one.
    ///
    /// Creates the cache directory if it doesn't exist. The file is written
    /// to a temporary sibling first and renamed into place, so readers never
    /// observe a half-written manifest.
    pub fn save(&self, cache_dir: &Path) -> Result<(), IsgError> {
        std::fs::create_dir_all(cache_dir).map_err(|e| IsgError::Io {
            path: cache_dir.to_path_buf(),
            source: e,
        })?;
        let path = cache_dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|e| IsgError::Serialization {
            reason: e.to_string(),
        })?;
        let mut tmp = tempfile::NamedTempFile::new_in(cache_dir).map_err(|e| IsgError::Io {
            path: cache_dir.to_path_buf(),
            source: e,
        })?;
        tmp.write_all(json.as_bytes()).map_err(|e| IsgError::Io {
            path: tmp.path().to_path_buf(),
            source: e,
        })?;
        tmp.persist(&path).map_err(|e| IsgError::Io {
            path,
            source: e.error,
        })?;
        Ok(())
    }

    /// Looks up the typed entry for an output path.
    ///
    /// Returns `None` both for unknown paths and for raw entries; use
    /// [`stored`](Self::stored) to tell them apart.
    pub fn get(&self, path: &str) -> Option<&CacheEntry> {
        self.entries.get(path).and_then(StoredEntry::parsed)
    }

    /// Looks up the entry for an output path as it was stored.
    pub fn stored(&self, path: &str) -> Option<&StoredEntry> {
        self.entries.get(path)
    }

    /// Inserts or replaces the entry stored under `entry.path`.
    ///
    /// A replaced entry keeps its original position.
    pub fn insert(&mut self, entry: CacheEntry) -> Option<StoredEntry> {
        self.entries.insert(entry.path.clone(), entry.into())
    }

    /// Removes the entry for an output path.
    pub fn remove(&mut self, path: &str) -> Option<StoredEntry> {
        self.entries.remove(path)
    }

    /// Keeps only the entries for which `keep` returns `true`.
    pub fn retain(&mut self, keep: impl FnMut(&str, &StoredEntry) -> bool) {
        self.entries.retain(keep);
    }

    /// Removes every entry. The navigation digest is kept.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the manifest holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(path, entry)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &StoredEntry)> {
        self.entries.iter()
    }

    /// Output paths in insertion order.
    pub fn paths(&self) -> Vec<String> {
        self.entries.keys().map(str::to_string).collect()
    }

    /// Records the digest of the navigation tree this build used.
    pub fn set_navigation(&mut self, roots: &[NavNode]) {
        self.navigation_hash = Some(hasher::navigation_hash(roots));
    }

    /// Returns `true` if `roots` hashes to the stored navigation digest.
    ///
    /// A manifest without a stored digest is never current.
    pub fn is_navigation_current(&self, roots: &[NavNode]) -> bool {
        self.navigation_hash
            .as_ref()
            .is_some_and(|stored| *stored == hasher::navigation_hash(roots))
    }
}

/// Insertion-ordered map from output path to entry.
///
/// Serialized as a JSON object. On deserialization every value goes through
/// [`StoredEntry::from_value`], so no key is lost.
#[derive(Clone, Default, PartialEq)]
pub struct EntryMap {
    slots: Vec<(String, StoredEntry)>,
    index: HashMap<String, usize>,
}

impl EntryMap {
    /// Looks up an entry by key.
    pub fn get(&self, key: &str) -> Option<&StoredEntry> {
        self.index.get(key).map(|&i| &self.slots[i].1)
    }

    /// Inserts an entry, replacing in place if the key already exists.
    pub fn insert(&mut self, key: String, entry: StoredEntry) -> Option<StoredEntry> {
        match self.index.get(&key) {
            Some(&i) => Some(std::mem::replace(&mut self.slots[i].1, entry)),
            None => {
                self.index.insert(key.clone(), self.slots.len());
                self.slots.push((key, entry));
                None
            }
        }
    }

    /// Removes an entry, preserving the order of the rest.
    pub fn remove(&mut self, key: &str) -> Option<StoredEntry> {
        let i = self.index.remove(key)?;
        let (_, entry) = self.slots.remove(i);
        self.reindex();
        Some(entry)
    }

    /// Keeps only the entries for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &StoredEntry) -> bool) {
        self.slots.retain(|(k, e)| keep(k, e));
        self.reindex();
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterates `(key, entry)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &StoredEntry)> {
        self.slots.iter().map(|(k, e)| (k.as_str(), e))
    }

    /// Iterates keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|(k, _)| k.as_str())
    }

    fn reindex(&mut self) {
        self.index = self
            .slots
            .iter()
            .enumerate()
            .map(|(i, (k, _))| (k.clone(), i))
            .collect();
    }
}

impl fmt::Debug for EntryMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl Serialize for EntryMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.slots.len()))?;
        for (key, entry) in &self.slots {
            map.serialize_entry(key, entry)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for EntryMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntryMapVisitor;

        impl<'de> Visitor<'de> for EntryMapVisitor {
            type Value = EntryMap;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("an object mapping output paths to cache entries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut map = EntryMap::default();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    let entry = StoredEntry::from_value(value);
                    if entry.parsed().is_none() {
                        tracing::warn!(path = %key, "cache entry does not match the schema, keeping it raw");
                    }
                    map.insert(key, entry);
                }
                Ok(map)
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(EntryMap::default())
            }
        }

        deserializer.deserialize_map(EntryMapVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn entry(path: &str, tags: &[&str]) -> CacheEntry {
        CacheEntry {
            path: path.to_string(),
            inputs_hash: Digest::from_bytes(path.as_bytes()),
            deps: vec!["/site/src/_layout.eta".to_string()],
            tags: tags.iter().map(|t| t.to_string()).collect(),
            rendered_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            ttl_seconds: 3600,
            published_at: None,
            max_age_cap_days: None,
        }
    }

    #[test]
    fn new_manifest_is_empty() {
        let m = CacheManifest::new();
        assert!(m.is_empty());
        assert!(m.navigation_hash.is_none());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = CacheManifest::new();
        m.insert(entry("/about.html", &["docs"]));
        m.set_navigation(&[NavNode::leaf("About", "/about")]);
        m.save(dir.path()).unwrap();

        let loaded = CacheManifest::load(dir.path()).unwrap();
        assert_eq!(loaded, m);
    }

    #[test]
    fn preserves_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = CacheManifest::new();
        for p in ["/z.html", "/a.html", "/m.html"] {
            m.insert(entry(p, &[]));
        }
        m.save(dir.path()).unwrap();
        let loaded = CacheManifest::load(dir.path()).unwrap();
        assert_eq!(loaded.paths(), vec!["/z.html", "/a.html", "/m.html"]);
    }

    #[test]
    fn replace_keeps_position() {
        let mut m = CacheManifest::new();
        m.insert(entry("/a.html", &[]));
        m.insert(entry("/b.html", &[]));
        let old = m.insert(entry("/a.html", &["new"]));
        assert!(old.is_some());
        assert_eq!(m.paths(), vec!["/a.html", "/b.html"]);
        assert_eq!(m.get("/a.html").unwrap().tags, vec!["new"]);
        assert_eq!(m.stored("/a.html").unwrap().tags(), vec!["new"]);
    }

    #[test]
    fn remove_and_retain_reindex() {
        let mut m = CacheManifest::new();
        for p in ["/a.html", "/b.html", "/c.html", "/d.html"] {
            m.insert(entry(p, &[]));
        }
        m.remove("/b.html");
        assert_eq!(m.get("/c.html").unwrap().path, "/c.html");
        m.entries.retain(|k, _| k != "/c.html");
        assert_eq!(m.paths(), vec!["/a.html", "/d.html"]);
        assert_eq!(m.get("/d.html").unwrap().path, "/d.html");
        assert!(m.get("/c.html").is_none());
    }

    #[test]
    fn load_nonexistent_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CacheManifest::load(dir.path()).is_none());
    }

    #[test]
    fn load_corrupt_json_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "not valid json {{{").unwrap();
        assert!(CacheManifest::load(dir.path()).is_none());
    }

    #[test]
    fn load_wrong_shape_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), r#"{"entries": [1, 2]}"#).unwrap();
        assert!(CacheManifest::load(dir.path()).is_none());
    }

    #[test]
    fn load_keeps_entries_that_do_not_fit_the_schema() {
        let dir = tempfile::tempdir().unwrap();
        let json = r#"{
            "entries": {
                "/good.html": {
                    "path": "/good.html",
                    "inputsHash": "sha256-1",
                    "deps": [],
                    "tags": [],
                    "renderedAt": "2024-05-01T10:00:00Z",
                    "ttlSeconds": 60
                },
                "/bad.html": { "path": "/bad.html", "tags": ["x"] }
            },
            "navigationHash": "sha256-nav"
        }"#;
        std::fs::write(dir.path().join(MANIFEST_FILE), json).unwrap();
        let m = CacheManifest::load(dir.path()).unwrap();
        assert_eq!(m.paths(), vec!["/good.html", "/bad.html"]);
        assert!(m.get("/good.html").is_some());
        assert!(m.get("/bad.html").is_none());
        assert!(matches!(m.stored("/bad.html"), Some(StoredEntry::Raw(_))));
        assert_eq!(m.navigation_hash.as_ref().unwrap().as_str(), "sha256-nav");

        m.save(dir.path()).unwrap();
        let raw: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap())
                .unwrap();
        assert_eq!(
            raw["entries"]["/bad.html"],
            serde_json::json!({ "path": "/bad.html", "tags": ["x"] })
        );
        assert_eq!(CacheManifest::load(dir.path()).unwrap(), m);
    }

    #[test]
    fn save_creates_directory_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("deeply").join("nested").join("cache");
        let mut m = CacheManifest::new();
        m.insert(entry("/a.html", &[]));
        m.save(&nested).unwrap();
        assert!(nested.join(MANIFEST_FILE).exists());

        m.remove("/a.html");
        m.save(&nested).unwrap();
        assert!(CacheManifest::load(&nested).unwrap().is_empty());
    }

    #[test]
    fn saved_json_uses_camel_case_shape() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = CacheManifest::new();
        m.insert(entry("/a.html", &[]));
        m.save(dir.path()).unwrap();
        let raw: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap())
                .unwrap();
        assert!(raw["entries"]["/a.html"]["inputsHash"].is_string());
        assert!(raw["entries"]["/a.html"]["renderedAt"].is_string());
        assert!(raw.get("navigationHash").is_none());
    }

    #[test]
    fn navigation_currency() {
        let nav = vec![NavNode::leaf("Home", "/")];
        let mut m = CacheManifest::new();
        assert!(!m.is_navigation_current(&nav));
        m.set_navigation(&nav);
        assert!(m.is_navigation_current(&nav));
        assert!(!m.is_navigation_current(&[NavNode::leaf("Home", "/home")]));
    }
}
