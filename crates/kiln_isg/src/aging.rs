//! Freshness policy: effective TTL, next rebuild time and frozen status.
//!
//! All functions are pure and take `now` explicitly.

use chrono::{DateTime, TimeDelta, Utc};
use kiln_common::Page;
use kiln_config::IsgConfig;

use crate::calendar::days_before;
use crate::entry::CacheEntry;

/// TTL for `page` under the configured aging rules.
pub fn effective_ttl(page: &Page, isg: &IsgConfig, now: DateTime<Utc>) -> u64 {
    ttl_for_published(page.published_at(), isg, now)
}

/// TTL for a page published at `published_at`.
///
/// Rules are checked in order of increasing `max_age_days`; the first rule
/// whose window still contains the publication date wins. Without a
/// publication date, or when every window has passed, the default TTL applies.
pub fn ttl_for_published(
    published_at: Option<DateTime<Utc>>,
    isg: &IsgConfig,
    now: DateTime<Utc>,
) -> u64 {
    let Some(published) = published_at else {
        return isg.ttl_seconds;
    };

    let mut rules = isg.aging.clone();
    rules.sort_by_key(|rule| rule.max_age_days);

    rules
        .iter()
        .find(|rule| days_before(now, rule.max_age_days).is_some_and(|cutoff| published > cutoff))
        .map_or(isg.ttl_seconds, |rule| rule.ttl_seconds)
}

/// `rendered_at + ttl_seconds`, saturating at the end of the calendar.
pub fn next_rebuild_at(entry: &CacheEntry) -> DateTime<Utc> {
    i64::try_from(entry.ttl_seconds)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|ttl| entry.rendered_at.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Whether `entry` is past its age cap and exempt from TTL expiry.
///
/// The age is measured from `published_at`, falling back to `rendered_at`.
pub fn is_frozen(entry: &CacheEntry, now: DateTime<Utc>) -> bool {
    let Some(cap) = entry.max_age_cap_days else {
        return false;
    };
    let anchor = entry.published_at.unwrap_or(entry.rendered_at);
    days_before(now, cap).is_some_and(|cutoff| anchor < cutoff)
}
