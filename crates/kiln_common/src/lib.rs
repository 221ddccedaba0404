//! Shared foundational types used across the Kiln static-site toolchain.
//!
//! This crate provides the values the content pipeline hands to the incremental
//! static generation engine: prefixed content digests, pages with their front
//! matter, and navigation tree nodes.

#![warn(missing_docs)]

pub mod hash;
pub mod nav;
pub mod page;

pub use hash::Digest;
pub use nav::NavNode;
pub use page::{output_path_for_url, parse_timestamp, FrontMatter, Page};
