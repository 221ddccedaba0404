//! Manual cache invalidation.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::IsgError;
use crate::manifest::CacheManifest;
use crate::query::{matches_term, parse_query};

/// What an invalidation pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationResult {
    /// Number of removed entries.
    pub invalidated_count: usize,
    /// Removed output paths, in manifest order.
    pub invalidated_paths: Vec<String>,
    /// Whether the whole cache was cleared.
    pub cleared_all: bool,
}

enum Selection {
    All,
    Terms(Vec<String>),
    Nothing,
}

fn select(query: Option<&str>) -> Selection {
    match query.map(str::trim).filter(|q| !q.is_empty()) {
        None => Selection::All,
        Some(q) => match parse_query(q) {
            terms if terms.is_empty() => Selection::Nothing,
            terms => Selection::Terms(terms),
        },
    }
}

/// Removes matching entries from the manifest in `cache_dir` and saves it.
///
/// A missing or blank query clears everything. Without a manifest on disk
/// nothing is written and the result is empty.
///
/// # Errors
///
/// Only when the updated manifest cannot be written.
pub fn invalidate(
    cache_dir: &Path,
    query: Option<&str>,
    now: DateTime<Utc>,
) -> Result<InvalidationResult, IsgError> {
    let Some(mut manifest) = CacheManifest::load(cache_dir) else {
        tracing::debug!(cache_dir = %cache_dir.display(), "no manifest, nothing to invalidate");
        return Ok(InvalidationResult::default());
    };
    if matches!(select(query), Selection::Nothing) {
        return Ok(InvalidationResult::default());
    }

    let result = invalidate_manifest(&mut manifest, query, now);
    manifest.save(cache_dir)?;

    tracing::info!(
        count = result.invalidated_count,
        cleared_all = result.cleared_all,
        "cache invalidated"
    );
    Ok(result)
}

/// In-memory variant of [`invalidate`]: prunes `manifest` without saving.
///
/// An entry is removed when any term matches it.
pub fn invalidate_manifest(
    manifest: &mut CacheManifest,
    query: Option<&str>,
    now: DateTime<Utc>,
) -> InvalidationResult {
    match select(query) {
        Selection::All => {
            let invalidated_paths = manifest.paths();
            manifest.clear();
            InvalidationResult {
                invalidated_count: invalidated_paths.len(),
                invalidated_paths,
                cleared_all: true,
            }
        }
        Selection::Nothing => InvalidationResult::default(),
        Selection::Terms(terms) => {
            let mut invalidated_paths = Vec::new();
            manifest.retain(|path, entry| {
                let hit = terms.iter().any(|term| matches_term(entry, path, term, now));
                if hit {
                    invalidated_paths.push(path.to_string());
                }
                !hit
            });
            InvalidationResult {
                invalidated_count: invalidated_paths.len(),
                invalidated_paths,
                cleared_all: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::shift_months;
    use crate::entry::CacheEntry;
    use crate::manifest::MANIFEST_FILE;
    use chrono::{TimeDelta, TimeZone};
    use kiln_common::Digest;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn entry(path: &str, tags: &[&str], rendered_at: DateTime<Utc>) -> CacheEntry {
        CacheEntry {
            path: path.to_string(),
            inputs_hash: Digest::from_bytes(path.as_bytes()),
            deps: Vec::new(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            rendered_at,
            ttl_seconds: 3600,
            published_at: None,
            max_age_cap_days: None,
        }
    }

    /// Entries with at most one tag each; `""` means untagged.
    fn manifest(entries: &[(&str, &str)]) -> CacheManifest {
        let mut m = CacheManifest::new();
        for (path, tag) in entries {
            let tags: Vec<&str> = Some(*tag).filter(|t| !t.is_empty()).into_iter().collect();
            m.insert(entry(path, &tags, now()));
        }
        m
    }

    #[test]
    fn tag_query_removes_only_matches() {
        let dir = tempfile::tempdir().unwrap();
        manifest(&[("/a", "x"), ("/b", "y")]).save(dir.path()).unwrap();

        let result = invalidate(dir.path(), Some("tag:x"), now()).unwrap();
        assert_eq!(
            result,
            InvalidationResult {
                invalidated_count: 1,
                invalidated_paths: vec!["/a".to_string()],
                cleared_all: false,
            }
        );
        let reloaded = CacheManifest::load(dir.path()).unwrap();
        assert_eq!(reloaded.paths(), vec!["/b"]);
    }

    #[test]
    fn tag_only_entries_are_matched_and_kept() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{"entries":{"/a":{"tags":["x"]},"/b":{"tags":["y"]}}}"#,
        )
        .unwrap();

        let result = invalidate(dir.path(), Some("tag:x"), now()).unwrap();
        assert_eq!(
            result,
            InvalidationResult {
                invalidated_count: 1,
                invalidated_paths: vec!["/a".to_string()],
                cleared_all: false,
            }
        );
        let reloaded = CacheManifest::load(dir.path()).unwrap();
        assert_eq!(reloaded.paths(), vec!["/b"]);
        assert_eq!(reloaded.stored("/b").unwrap().tags(), vec!["y"]);
    }

    #[test]
    fn terms_are_ored() {
        let mut m = manifest(&[
            ("/posts/one.html", "blog"),
            ("/about", ""),
            ("/contact.html", "misc"),
        ]);
        let result = invalidate_manifest(&mut m, Some("tag:blog path:/about"), now());
        assert_eq!(result.invalidated_paths, vec!["/posts/one.html", "/about"]);
        assert_eq!(m.paths(), vec!["/contact.html"]);
    }

    #[test]
    fn absent_or_blank_query_clears_all() {
        for query in [None, Some(""), Some("   ")] {
            let mut m = manifest(&[("/z", ""), ("/a", "")]);
            let result = invalidate_manifest(&mut m, query, now());
            assert!(result.cleared_all);
            assert_eq!(result.invalidated_paths, vec!["/z", "/a"]);
            assert!(m.is_empty());
        }
    }

    #[test]
    fn quoted_empty_query_removes_nothing() {
        let mut m = manifest(&[("/a", "x")]);
        let result = invalidate_manifest(&mut m, Some("''"), now());
        assert_eq!(result, InvalidationResult::default());
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn age_query_uses_calendar_months() {
        let mut m = CacheManifest::new();
        m.insert(entry("/day", &[], now() - TimeDelta::days(1)));
        m.insert(entry("/week", &[], now() - TimeDelta::weeks(1)));
        m.insert(entry("/month", &[], shift_months(now(), -1).unwrap()));
        m.insert(entry("/quarter", &[], shift_months(now(), -3).unwrap()));
        m.insert(entry("/year", &[], shift_months(now(), -12).unwrap()));

        let result = invalidate_manifest(&mut m, Some("age:2months"), now());
        assert_eq!(result.invalidated_paths, vec!["/day", "/week", "/month"]);
        assert_eq!(m.paths(), vec!["/quarter", "/year"]);
    }

    #[test]
    fn no_manifest_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let result = invalidate(dir.path(), None, now()).unwrap();
        assert_eq!(result, InvalidationResult::default());
        assert!(!dir.path().join(MANIFEST_FILE).exists());
    }

    #[test]
    fn no_match_still_saves() {
        let dir = tempfile::tempdir().unwrap();
        manifest(&[("/a", "x")]).save(dir.path()).unwrap();
        let result = invalidate(dir.path(), Some("tag:nope"), now()).unwrap();
        assert_eq!(result.invalidated_count, 0);
        assert_eq!(CacheManifest::load(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn result_serializes_camel_case() {
        let json = serde_json::to_value(InvalidationResult {
            invalidated_count: 1,
            invalidated_paths: vec!["/a".into()],
            cleared_all: false,
        })
        .unwrap();
        assert_eq!(json["invalidatedCount"], 1);
        assert_eq!(json["clearedAll"], false);
    }
}
