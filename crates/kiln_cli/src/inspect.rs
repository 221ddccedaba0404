//! `kiln inspect`: lists cache entries and their freshness.

use chrono::{DateTime, SecondsFormat, Utc};
use kiln_isg::aging::{is_frozen, next_rebuild_at};
use kiln_isg::{CacheManifest, StoredEntry};
use serde::Serialize;

use crate::pipeline::load_project;
use crate::{GlobalArgs, InspectArgs, ReportFormat};

/// One row of the listing.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntryStatus {
    /// Output path.
    pub path: String,
    /// Entry tags.
    pub tags: Vec<String>,
    /// Number of tracked template dependencies.
    pub dependencies: usize,
    /// Last render time, when readable.
    pub rendered_at: Option<DateTime<Utc>>,
    /// When the TTL runs out. Unknown for invalid entries.
    pub next_rebuild_at: Option<DateTime<Utc>>,
    /// The entry fails validation and will be rebuilt.
    pub invalid: bool,
    /// Past the age cap; TTL expiry no longer applies.
    pub frozen: bool,
    /// TTL has run out and the entry is not frozen.
    pub expired: bool,
}

/// Runs the `kiln inspect` command. Returns exit code 0.
pub fn run(args: &InspectArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let (_, config) = load_project(global)?;
    let Some(manifest) = CacheManifest::load(config.cache_dir()) else {
        if !global.quiet {
            eprintln!("  No cache manifest in {}", config.cache_dir().display());
        }
        return Ok(0);
    };

    let rows = collect_rows(&manifest, Utc::now());
    match args.format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        ReportFormat::Text => print!("{}", render_text(&rows)),
    }
    Ok(0)
}

/// Freshness of every entry, in manifest order.
pub fn collect_rows(manifest: &CacheManifest, now: DateTime<Utc>) -> Vec<EntryStatus> {
    manifest
        .iter()
        .map(|(path, stored)| match stored.parsed().filter(|e| e.is_valid()) {
            Some(entry) => {
                let next = next_rebuild_at(entry);
                let frozen = is_frozen(entry, now);
                EntryStatus {
                    path: path.to_string(),
                    tags: entry.tags.clone(),
                    dependencies: entry.deps.len(),
                    rendered_at: Some(entry.rendered_at),
                    next_rebuild_at: Some(next),
                    invalid: false,
                    frozen,
                    expired: !frozen && now >= next,
                }
            }
            None => invalid_row(path, stored),
        })
        .collect()
}

fn invalid_row(path: &str, stored: &StoredEntry) -> EntryStatus {
    EntryStatus {
        path: path.to_string(),
        tags: stored.tags().into_iter().map(str::to_string).collect(),
        dependencies: stored.parsed().map_or(0, |e| e.deps.len()),
        rendered_at: stored.rendered_at(),
        next_rebuild_at: None,
        invalid: true,
        frozen: false,
        expired: false,
    }
}

fn render_text(rows: &[EntryStatus]) -> String {
    let width = rows.iter().map(|r| r.path.len()).max().unwrap_or(0);
    let mut out = String::new();
    for row in rows {
        let state = if row.invalid {
            "invalid"
        } else if row.frozen {
            "frozen"
        } else if row.expired {
            "expired"
        } else {
            "fresh"
        };
        out.push_str(&format!(
            "{:<width$}  {:<7}  next {}  deps {}",
            row.path,
            state,
            row.next_rebuild_at
                .map_or_else(|| "-".to_string(), |t| t.to_rfc3339_opts(SecondsFormat::Secs, true)),
            row.dependencies,
        ));
        if !row.tags.is_empty() {
            out.push_str(&format!("  [{}]", row.tags.join(", ")));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use kiln_common::Digest;
    use kiln_isg::CacheEntry;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn entry(path: &str, rendered_ago: TimeDelta, cap: Option<u32>) -> CacheEntry {
        CacheEntry {
            path: path.to_string(),
            inputs_hash: Digest::from_bytes(path.as_bytes()),
            deps: vec!["/site/src/_layout.eta".to_string()],
            tags: vec!["docs".to_string()],
            rendered_at: now() - rendered_ago,
            ttl_seconds: 3600,
            published_at: None,
            max_age_cap_days: cap,
        }
    }

    fn manifest() -> CacheManifest {
        let mut m = CacheManifest::new();
        m.insert(entry("/fresh.html", TimeDelta::minutes(10), None));
        m.insert(entry("/stale.html", TimeDelta::hours(2), None));
        m.insert(entry("/old.html", TimeDelta::days(40), Some(30)));
        m
    }

    #[test]
    fn rows_follow_manifest_order() {
        let rows = collect_rows(&manifest(), now());
        let paths: Vec<&str> = rows.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/fresh.html", "/stale.html", "/old.html"]);
    }

    #[test]
    fn rows_classify_freshness() {
        let rows = collect_rows(&manifest(), now());
        assert!(!rows[0].expired && !rows[0].frozen);
        assert!(rows[1].expired && !rows[1].frozen);
        assert!(!rows[2].expired && rows[2].frozen);
        assert_eq!(rows[0].next_rebuild_at, Some(now() + TimeDelta::minutes(50)));
        assert!(rows.iter().all(|r| !r.invalid));
    }

    #[test]
    fn raw_entries_are_listed_as_invalid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("manifest.json"),
            r#"{"entries":{"/a":{"tags":["x"]}}}"#,
        )
        .unwrap();
        let manifest = CacheManifest::load(dir.path()).unwrap();

        let rows = collect_rows(&manifest, now());
        assert_eq!(rows.len(), 1);
        assert!(rows[0].invalid);
        assert_eq!(rows[0].tags, vec!["x"]);
        assert!(rows[0].next_rebuild_at.is_none());
        assert_eq!(render_text(&rows), "/a  invalid  next -  deps 0  [x]\n");
    }

    #[test]
    fn text_output() {
        let text = render_text(&collect_rows(&manifest(), now()));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("/fresh.html  fresh"));
        assert!(lines[1].contains("expired"));
        assert!(lines[2].contains("frozen"));
        assert!(lines[0].ends_with("deps 1  [docs]"));
    }

    #[test]
    fn json_uses_camel_case() {
        let json = serde_json::to_value(collect_rows(&manifest(), now())).unwrap();
        assert_eq!(json[0]["nextRebuildAt"], "2024-06-15T12:50:00Z");
        assert_eq!(json[2]["frozen"], true);
    }
}
