//! Parsing and validation of `kiln.toml` site configuration files.
//!
//! This crate reads the site configuration and produces a strongly-typed
//! [`SiteConfig`] with source/cache directories and the incremental static
//! generation policy (default TTL, age-based rules, freeze cap).

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE};
pub use types::*;
