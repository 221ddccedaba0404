//! Pages as handed over by the content pipeline.
//!
//! Markdown parsing happens elsewhere; by the time a [`Page`] reaches the
//! cache engine it carries its raw body and a decoded front matter map.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Front matter keys consulted for a page's publication date, in priority order.
const PUBLISHED_KEYS: [&str; 3] = ["publishedAt", "published_at", "date"];

/// Decoded front matter of a page.
///
/// Values are kept as JSON so that arbitrary metadata survives untouched and
/// participates in the content hash.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrontMatter(Map<String, Value>);

impl FrontMatter {
    /// Creates an empty front matter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds front matter from a JSON value. Returns `None` unless the value
    /// is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Inserts or replaces a key, returning `self` for chaining.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Inserts or replaces a key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Looks up a raw value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns the front matter as a JSON object value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// The explicitly requested layout name, if any non-empty one is set.
    pub fn layout(&self) -> Option<&str> {
        self.0
            .get("layout")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Tags declared by the page.
    ///
    /// Accepts either a single string or an array; non-string array members
    /// are skipped.
    pub fn tags(&self) -> Vec<String> {
        match self.0.get("tags") {
            Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// The publication date declared in front matter, if it parses.
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        PUBLISHED_KEYS
            .iter()
            .filter_map(|key| self.0.get(*key))
            .filter_map(Value::as_str)
            .find_map(parse_timestamp)
    }
}

/// A content page consumed read-only by the cache engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Path of the source file, absolute or relative to the site's source directory.
    pub source_path: PathBuf,
    /// Public URL of the page, e.g. `/about` or `/`.
    pub url: String,
    /// Raw page body.
    pub content: String,
    /// Decoded front matter.
    pub front_matter: FrontMatter,
    /// Publication date resolved by the content pipeline, overriding front matter.
    pub published_at: Option<DateTime<Utc>>,
}

impl Page {
    /// Creates a page with empty front matter.
    pub fn new(
        source_path: impl Into<PathBuf>,
        url: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            url: url.into(),
            content: content.into(),
            front_matter: FrontMatter::new(),
            published_at: None,
        }
    }

    /// Replaces the front matter.
    pub fn with_front_matter(mut self, front_matter: FrontMatter) -> Self {
        self.front_matter = front_matter;
        self
    }

    /// Sets the pipeline-resolved publication date.
    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }

    /// The effective publication date: the pipeline value, else front matter.
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at
            .or_else(|| self.front_matter.published_at())
    }

    /// Tags from front matter.
    pub fn tags(&self) -> Vec<String> {
        self.front_matter.tags()
    }

    /// The output path this page renders to.
    pub fn output_path(&self) -> String {
        output_path_for_url(&self.url)
    }

    /// Returns `true` if the source file is a directory index (`index.*`).
    pub fn is_index(&self) -> bool {
        self.source_path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|stem| stem == "index")
    }
}

/// Maps a page URL to the output path used as its cache key.
///
/// The root URL maps to `/index.html`; anything else gains an `.html` suffix
/// after trailing slashes are dropped. A leading slash is always present.
pub fn output_path_for_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return "/index.html".to_string();
    }
    let rooted = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    };
    if rooted.ends_with(".html") {
        rooted
    } else {
        format!("{rooted}.html")
    }
}

/// Parses an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
