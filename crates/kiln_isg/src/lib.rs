//! Incremental static generation (ISG) cache.
//!
//! This crate decides, per output page, whether the expensive render step can
//! be skipped. A page's fingerprint combines its content with every template
//! and partial it transitively depends on; freshness is governed by a
//! calendar-aware TTL policy. Results persist in a JSON manifest that a small
//! query language can prune for manual invalidation.

#![warn(missing_docs)]

pub mod aging;
pub mod calendar;
pub mod deps;
pub mod engine;
pub mod entry;
pub mod error;
pub mod hasher;
pub mod invalidate;
pub mod manifest;
pub mod query;

pub use deps::DependencyTracker;
pub use engine::{BuildPlan, IsgEngine, RebuildReason};
pub use entry::{CacheEntry, StoredEntry};
pub use error::IsgError;
pub use invalidate::{invalidate, invalidate_manifest, InvalidationResult};
pub use manifest::CacheManifest;
pub use query::{join_terms, matches_term, parse_query};
