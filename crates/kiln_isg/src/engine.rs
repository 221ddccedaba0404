//! Rebuild decisions and cache entry construction.
//!
//! [`IsgEngine`] ties the hasher, the dependency tracker and the aging policy
//! together. It owns the site configuration and a [`DependencyTracker`], so a
//! long-lived process keeps its template caches warm across builds.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use kiln_common::{Digest, Page};
use kiln_config::SiteConfig;
use rayon::prelude::*;

use crate::aging;
use crate::deps::DependencyTracker;
use crate::entry::{CacheEntry, StoredEntry};
use crate::error::IsgError;
use crate::hasher;
use crate::manifest::CacheManifest;

/// How many dependency mtimes a fast update samples.
const FAST_UPDATE_SAMPLE: usize = 3;

/// Why a page has to be rendered again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildReason {
    /// Caching is turned off in the configuration.
    Disabled,
    /// No cache entry exists for the page.
    Missing,
    /// The cache entry failed validation.
    Invalid,
    /// Page content or a dependency changed.
    InputsChanged,
    /// A tracked dependency no longer exists.
    DependencyMissing,
    /// The entry's TTL has run out.
    Expired,
    /// Dependency tracking failed for a non-fatal reason.
    TrackingFailed,
}

impl fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RebuildReason::Disabled => "caching disabled",
            RebuildReason::Missing => "no cache entry",
            RebuildReason::Invalid => "invalid cache entry",
            RebuildReason::InputsChanged => "inputs changed",
            RebuildReason::DependencyMissing => "dependency missing",
            RebuildReason::Expired => "ttl expired",
            RebuildReason::TrackingFailed => "dependency tracking failed",
        };
        f.write_str(s)
    }
}

/// Outcome of [`IsgEngine::plan`], in page order.
#[derive(Debug, Default)]
pub struct BuildPlan {
    /// Output paths that need rendering, with the reason.
    pub rebuild: Vec<(String, RebuildReason)>,
    /// Output paths whose cached render is still good.
    pub fresh: Vec<String>,
    /// Pages that cannot be built, e.g. because of a template cycle.
    pub failures: Vec<(String, IsgError)>,
}

impl BuildPlan {
    /// Returns `true` if nothing needs rendering and nothing failed.
    pub fn is_up_to_date(&self) -> bool {
        self.rebuild.is_empty() && self.failures.is_empty()
    }
}

/// The rebuild decision engine.
#[derive(Debug)]
pub struct IsgEngine {
    config: SiteConfig,
    tracker: DependencyTracker,
}

impl IsgEngine {
    /// Creates an engine with a fresh dependency tracker.
    pub fn new(config: SiteConfig) -> Self {
        Self::with_tracker(config, DependencyTracker::new())
    }

    /// Creates an engine around an existing tracker, keeping its caches.
    pub fn with_tracker(config: SiteConfig, tracker: DependencyTracker) -> Self {
        Self { config, tracker }
    }

    /// The site configuration.
    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    /// The dependency tracker.
    pub fn tracker(&self) -> &DependencyTracker {
        &self.tracker
    }

    /// Returns `true` if `page` has to be rendered.
    ///
    /// # Errors
    ///
    /// Only [`IsgError::CircularDependency`]; any other tracking failure
    /// counts as "rebuild".
    pub fn should_rebuild(
        &self,
        page: &Page,
        existing: Option<&CacheEntry>,
        now: DateTime<Utc>,
    ) -> Result<bool, IsgError> {
        self.decide(page, existing, now).map(|reason| reason.is_some())
    }

    /// Like [`should_rebuild`](Self::should_rebuild), but says why.
    ///
    /// `None` means the existing entry is still good.
    pub fn decide(
        &self,
        page: &Page,
        existing: Option<&CacheEntry>,
        now: DateTime<Utc>,
    ) -> Result<Option<RebuildReason>, IsgError> {
        if !self.config.isg.enabled {
            return Ok(Some(RebuildReason::Disabled));
        }
        let Some(existing) = existing else {
            return Ok(Some(RebuildReason::Missing));
        };
        if !existing.is_valid() {
            return Ok(Some(RebuildReason::Invalid));
        }

        let deps = match self.tracker.track(page, &self.config) {
            Ok(deps) => deps,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(page = %existing.path, error = %e, "dependency tracking failed, rebuilding");
                return Ok(Some(RebuildReason::TrackingFailed));
            }
        };

        if let Some(missing) = deps.iter().find(|dep| !Path::new(dep).is_file()) {
            tracing::debug!(page = %existing.path, dependency = %missing, "dependency missing");
            return Ok(Some(RebuildReason::DependencyMissing));
        }

        if self.fingerprint(page, &deps) != existing.inputs_hash {
            return Ok(Some(RebuildReason::InputsChanged));
        }
        if aging::is_frozen(existing, now) {
            tracing::debug!(page = %existing.path, "frozen, ignoring ttl");
            return Ok(None);
        }
        if now >= aging::next_rebuild_at(existing) {
            return Ok(Some(RebuildReason::Expired));
        }
        Ok(None)
    }

    /// [`decide`](Self::decide) for an entry as it sits in the manifest.
    ///
    /// A raw entry, one that did not fit the schema on load, is
    /// [`RebuildReason::Invalid`].
    pub fn decide_stored(
        &self,
        page: &Page,
        stored: Option<&StoredEntry>,
        now: DateTime<Utc>,
    ) -> Result<Option<RebuildReason>, IsgError> {
        match stored {
            Some(StoredEntry::Raw(_)) if self.config.isg.enabled => Ok(Some(RebuildReason::Invalid)),
            Some(StoredEntry::Raw(_)) | None => self.decide(page, None, now),
            Some(StoredEntry::Parsed(entry)) => self.decide(page, Some(entry), now),
        }
    }

    /// Builds a cache entry for a page rendered at `now`.
    ///
    /// # Errors
    ///
    /// Any dependency tracking error.
    pub fn create_entry(&self, page: &Page, now: DateTime<Utc>) -> Result<CacheEntry, IsgError> {
        let deps = self.tracker.track(page, &self.config)?;
        let published_at = page.published_at();
        Ok(CacheEntry {
            path: page.output_path(),
            inputs_hash: self.fingerprint(page, &deps),
            deps,
            tags: page.tags(),
            rendered_at: now,
            ttl_seconds: aging::ttl_for_published(published_at, &self.config.isg, now),
            published_at,
            max_age_cap_days: self.config.isg.max_age_cap_days,
        })
    }

    /// Rebuilds `existing` after the page was rendered again at `now`.
    ///
    /// The output path is kept. Tags and the publication date fall back to
    /// the existing entry when the page no longer carries them.
    ///
    /// With `fast_update`, up to three dependency mtimes are sampled; if all
    /// predate the previous render, the previous dependency list is reused
    /// instead of re-discovering it. A dependency-set change that touches none
    /// of the sampled files goes unnoticed on this path.
    pub fn update_entry(
        &self,
        existing: &CacheEntry,
        page: &Page,
        now: DateTime<Utc>,
        fast_update: bool,
    ) -> Result<CacheEntry, IsgError> {
        let deps = if fast_update && deps_untouched_since_render(existing) {
            tracing::debug!(page = %existing.path, "fast update, reusing dependency list");
            existing.deps.clone()
        } else {
            self.tracker.track(page, &self.config)?
        };

        let published_at = page.published_at().or(existing.published_at);
        let tags = match page.tags() {
            tags if tags.is_empty() => existing.tags.clone(),
            tags => tags,
        };

        Ok(CacheEntry {
            path: existing.path.clone(),
            inputs_hash: self.fingerprint(page, &deps),
            deps,
            tags,
            rendered_at: now,
            ttl_seconds: aging::ttl_for_published(published_at, &self.config.isg, now),
            published_at,
            max_age_cap_days: self
                .config
                .isg
                .max_age_cap_days
                .or(existing.max_age_cap_days),
        })
    }

    /// Decides every page in parallel.
    ///
    /// Templates are only tracked for pages with a usable cache entry, so a
    /// template cycle shows up in [`BuildPlan::failures`] for those pages; a
    /// page without an entry is planned as [`RebuildReason::Missing`] and the
    /// cycle surfaces when its entry is created. A failing page does not
    /// affect the others.
    pub fn plan(&self, pages: &[Page], manifest: &CacheManifest, now: DateTime<Utc>) -> BuildPlan {
        let outcomes: Vec<(String, Result<Option<RebuildReason>, IsgError>)> = pages
            .par_iter()
            .map(|page| {
                let path = page.output_path();
                let outcome = self.decide_stored(page, manifest.stored(&path), now);
                (path, outcome)
            })
            .collect();

        let mut plan = BuildPlan::default();
        for (path, outcome) in outcomes {
            match outcome {
                Ok(Some(reason)) => {
                    tracing::debug!(page = %path, %reason, "rebuild");
                    plan.rebuild.push((path, reason));
                }
                Ok(None) => plan.fresh.push(path),
                Err(e) => {
                    tracing::error!(page = %path, error = %e, "cannot build page");
                    plan.failures.push((path, e));
                }
            }
        }

        tracing::info!(
            rebuild = plan.rebuild.len(),
            fresh = plan.fresh.len(),
            failed = plan.failures.len(),
            "build plan ready"
        );
        plan
    }

    fn fingerprint(&self, page: &Page, deps: &[String]) -> Digest {
        let content = hasher::content_hash(&page.content, &page.front_matter);
        let dep_digests: Vec<Option<Digest>> = deps
            .iter()
            .map(|dep| hasher::file_hash(Path::new(dep)))
            .collect();
        hasher::inputs_hash(&content, &dep_digests)
    }
}

/// `true` when the sampled dependencies all exist and were last modified
/// before `entry` was rendered.
fn deps_untouched_since_render(entry: &CacheEntry) -> bool {
    if entry.deps.is_empty() {
        return false;
    }
    entry.deps.iter().take(FAST_UPDATE_SAMPLE).all(|dep| {
        match std::fs::metadata(dep).and_then(|meta| meta.modified()) {
            Ok(mtime) => DateTime::<Utc>::from(mtime) < entry.rendered_at,
            Err(e) => {
                tracing::debug!(dependency = %dep, error = %e, "mtime probe failed");
                false
            }
        }
    })
}
