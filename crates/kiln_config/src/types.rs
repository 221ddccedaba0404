//! Configuration types deserialized from `kiln.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default cache directory, relative to the project root.
pub const DEFAULT_CACHE_DIR: &str = ".kiln-cache";

/// Default freshness window for rendered pages: one hour.
pub const DEFAULT_TTL_SECONDS: u64 = 3600;

/// The top-level site configuration parsed from `kiln.toml`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct SiteConfig {
    /// Source and cache locations.
    #[serde(default)]
    pub site: SiteSection,
    /// Incremental static generation policy.
    #[serde(default)]
    pub isg: IsgConfig,
}

/// The `[site]` table.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SiteSection {
    /// Root directory of pages and templates. Without it no template
    /// dependencies are tracked.
    #[serde(default)]
    pub src_dir: Option<PathBuf>,
    /// Directory holding the cache manifest.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            src_dir: None,
            cache_dir: default_cache_dir(),
        }
    }
}

/// The `[isg]` table: when rendered pages go stale.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct IsgConfig {
    /// Whether cached renders may be reused at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// TTL applied when no aging rule matches.
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    /// Age-based TTL overrides, sorted by increasing `max_age_days` after loading.
    #[serde(default)]
    pub aging: Vec<AgingRule>,
    /// Pages older than this many days are frozen: TTL expiry no longer
    /// triggers a rebuild.
    #[serde(default)]
    pub max_age_cap_days: Option<u32>,
}

impl Default for IsgConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            ttl_seconds: default_ttl_seconds(),
            aging: Vec::new(),
            max_age_cap_days: None,
        }
    }
}

/// Pages younger than `max_age_days` use `ttl_seconds`.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct AgingRule {
    /// Upper age bound in days (exclusive).
    pub max_age_days: u32,
    /// TTL for pages under the bound.
    pub ttl_seconds: u64,
}

impl SiteConfig {
    /// Creates a default configuration rooted at the given source directory.
    pub fn with_src_dir(src_dir: impl Into<PathBuf>) -> Self {
        Self {
            site: SiteSection {
                src_dir: Some(src_dir.into()),
                ..SiteSection::default()
            },
            ..Self::default()
        }
    }

    /// The configured source directory, if any.
    pub fn src_dir(&self) -> Option<&Path> {
        self.site.src_dir.as_deref()
    }

    /// The configured cache directory.
    pub fn cache_dir(&self) -> &Path {
        &self.site.cache_dir
    }

    /// Makes relative `src_dir` and `cache_dir` absolute against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        if let Some(src) = &self.site.src_dir {
            if src.is_relative() {
                self.site.src_dir = Some(base.join(src));
            }
        }
        if self.site.cache_dir.is_relative() {
            self.site.cache_dir = base.join(&self.site.cache_dir);
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIR)
}

fn default_enabled() -> bool {
    true
}

fn default_ttl_seconds() -> u64 {
    DEFAULT_TTL_SECONDS
}
