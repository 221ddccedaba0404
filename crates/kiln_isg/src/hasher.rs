//! Deterministic digests for page content, template files and navigation.
//!
//! Every function here is pure apart from [`file_hash`], which reads a single
//! file. Ordering never leaks into a digest: front matter keys are sorted at
//! every depth and dependency digests are sorted before combining.

use std::path::Path;

use kiln_common::{Digest, FrontMatter, NavNode};
use serde_json::{Map, Value};

/// Separator between page body and canonical front matter in the content hash.
const CONTENT_SEPARATOR: &[u8] = b"\n---\n";

/// Returns a copy of `value` with object keys sorted at every nesting depth.
///
/// Arrays keep their order; primitives and `null` pass through unchanged.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key.as_str()]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Digest of a page body together with its front matter.
///
/// Stable across calls and independent of front matter key insertion order.
pub fn content_hash(content: &str, front_matter: &FrontMatter) -> Digest {
    let canonical = canonicalize(&front_matter.to_value()).to_string();
    Digest::from_parts([
        content.as_bytes(),
        CONTENT_SEPARATOR,
        canonical.as_bytes(),
    ])
}

/// Digest of a file's bytes.
///
/// Returns `None` when the file is missing, unreadable or empty. An empty
/// file contributes nothing to a fingerprint; read failures are logged, not
/// raised.
pub fn file_hash(path: &Path) -> Option<Digest> {
    match std::fs::read(path) {
        Ok(bytes) if bytes.is_empty() => {
            tracing::debug!(path = %path.display(), "empty dependency file ignored");
            None
        }
        Ok(bytes) => Some(Digest::from_bytes(&bytes)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read dependency file");
            None
        }
    }
}

/// Combines a content digest with dependency digests into an inputs hash.
///
/// `None` entries are ignored and the remaining digests are sorted, so the
/// order in which dependencies were discovered never affects the result.
pub fn inputs_hash(content: &Digest, deps: &[Option<Digest>]) -> Digest {
    let mut sorted: Vec<&Digest> = deps.iter().flatten().collect();
    sorted.sort();
    let mut parts: Vec<&[u8]> = Vec::with_capacity(sorted.len() * 2 + 1);
    parts.push(content.as_str().as_bytes());
    for digest in sorted {
        parts.push(b"\n");
        parts.push(digest.as_str().as_bytes());
    }
    Digest::from_parts(parts)
}

/// Digest of the structural part of a navigation tree.
///
/// Only `title`, `url`, `order` and `children` are hashed, so editing a
/// description does not look like a navigation change.
pub fn navigation_hash(roots: &[NavNode]) -> Digest {
    let projected = Value::Array(roots.iter().map(project_nav).collect());
    Digest::from_bytes(canonicalize(&projected).to_string().as_bytes())
}

fn project_nav(node: &NavNode) -> Value {
    let mut map = Map::new();
    map.insert("title".to_string(), Value::String(node.title.clone()));
    map.insert(
        "url".to_string(),
        node.url.clone().map_or(Value::Null, Value::String),
    );
    map.insert(
        "order".to_string(),
        node.order.map_or(Value::Null, Value::from),
    );
    map.insert(
        "children".to_string(),
        Value::Array(node.children.iter().map(project_nav).collect()),
    );
    Value::Object(map)
}
