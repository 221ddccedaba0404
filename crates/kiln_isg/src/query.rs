//! The invalidation query language.
//!
//! A query is a whitespace-separated list of terms, any of which may be
//! quoted. Terms are `tag:<name>`, `path:<prefix>`, `glob:<pattern>`,
//! `age:<N><unit>` or a plain word matched as a substring of the path or of
//! any tag.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use glob::{MatchOptions, Pattern};

use crate::calendar::AgeSpan;
use crate::entry::StoredEntry;

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Splits a query into terms.
///
/// Single or double quotes group text containing spaces; the quote
/// characters themselves are dropped. An unterminated quote runs to the end
/// of the input.
pub fn parse_query(query: &str) -> Vec<String> {
    let mut terms = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in query.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    terms.push(std::mem::take(&mut current));
                }
            }
            None => current.push(c),
        }
    }
    if !current.is_empty() {
        terms.push(current);
    }
    terms
}

/// Joins already-split terms into a query that [`parse_query`] splits back
/// into the same terms.
///
/// Terms holding whitespace or a quote character are wrapped in `"`, or in
/// `'` when they contain a double quote. Blank terms are skipped. A term with
/// both quote characters cannot be expressed and is split by the parser.
pub fn join_terms<S: AsRef<str>>(terms: &[S]) -> String {
    terms
        .iter()
        .map(AsRef::as_ref)
        .filter(|term| !term.trim().is_empty())
        .map(quote_term)
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote_term(term: &str) -> Cow<'_, str> {
    let needs_quotes = term
        .chars()
        .any(|c| c.is_whitespace() || c == '"' || c == '\'');
    if !needs_quotes {
        Cow::Borrowed(term)
    } else if term.contains('"') {
        Cow::Owned(format!("'{term}'"))
    } else {
        Cow::Owned(format!("\"{term}\""))
    }
}

/// Returns `true` if `term` selects the entry stored under `path`.
///
/// Raw entries match on whatever tags and render time they carry.
pub fn matches_term(entry: &StoredEntry, path: &str, term: &str, now: DateTime<Utc>) -> bool {
    let Some((kind, value)) = term.split_once(':') else {
        return matches_plain(entry, path, term);
    };
    if kind.is_empty() {
        return false;
    }
    if !kind.chars().all(|c| c.is_ascii_alphabetic()) {
        return matches_plain(entry, path, term);
    }

    match kind {
        "tag" | "path" | "glob" | "age" if value.is_empty() => false,
        "tag" => entry.tags().contains(&value),
        "path" => path.starts_with(value),
        "glob" => matches_glob(value, path),
        "age" => matches_age(entry, value, now),
        other => {
            tracing::warn!(term_type = other, term, "unknown invalidation term type");
            false
        }
    }
}

fn matches_plain(entry: &StoredEntry, path: &str, term: &str) -> bool {
    path.contains(term) || entry.tags().iter().any(|tag| tag.contains(term))
}

fn matches_glob(pattern: &str, path: &str) -> bool {
    match Pattern::new(pattern) {
        Ok(pattern) => pattern.matches_with(path, GLOB_OPTIONS),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "invalid glob in invalidation term");
            false
        }
    }
}

/// Entries rendered after `now - span` are "younger than" the span.
fn matches_age(entry: &StoredEntry, span: &str, now: DateTime<Utc>) -> bool {
    let span: AgeSpan = match span.parse() {
        Ok(span) => span,
        Err(e) => {
            tracing::warn!(age = span, error = %e, "invalid age in invalidation term");
            return false;
        }
    };
    match (span.before(now), entry.rendered_at()) {
        (Some(cutoff), Some(rendered_at)) => rendered_at > cutoff,
        _ => false,
    }
}
