//! Least-recently-used eviction.

use std::collections::HashSet;
use std::time::{Duration, SystemTime};

use serde::Serialize;

use super::{CacheError, ImageCache};

/// Size and age bounds for the cache. `None` disables a bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionPolicy {
    pub max_bytes: Option<u64>,
    pub max_age: Option<Duration>,
}

impl EvictionPolicy {
    #[must_use]
    pub const fn is_unbounded(&self) -> bool { self.max_bytes.is_none() && self.max_age.is_none() }
}

/// What an eviction pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvictionReport {
    pub removed: Vec<String>,
    pub freed: u64,
    pub remaining: u64,
}

impl ImageCache {
    /// Applies `policy`, never touching keys in `protected`.
    ///
    /// Entries older than `max_age` go first; then the least recently used
    /// entries are removed until the cache fits into `max_bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if the cache cannot be listed or an entry
    /// cannot be deleted.
    pub fn evict(
        &self,
        policy: &EvictionPolicy,
        protected: &HashSet<String>,
    ) -> Result<EvictionReport, CacheError> {
        let entries = self.entries()?;
        let mut total: u64 = entries.iter().map(|entry| entry.size).sum();
        let mut report = EvictionReport::default();

        if policy.is_unbounded() {
            report.remaining = total;
            return Ok(report);
        }

        let now = SystemTime::now();
        let expired = |accessed: SystemTime| {
            policy.max_age.is_some_and(|max_age| {
                now.duration_since(accessed).is_ok_and(|age| age > max_age)
            })
        };

        // `entries` is sorted oldest access first.
        for entry in &entries {
            if protected.contains(&entry.key) {
                continue;
            }

            let over_budget = policy.max_bytes.is_some_and(|max| total > max);
            if !expired(entry.accessed) && !over_budget {
                continue;
            }

            if self.remove(&entry.key)? {
                total = total.saturating_sub(entry.size);
                report.freed += entry.size;
                report.removed.push(entry.key.clone());
            }
        }

        if !report.removed.is_empty() {
            tracing::debug!(
                removed = report.removed.len(),
                freed = report.freed,
                remaining = total,
                "evicted cache entries"
            );
        }

        report.remaining = total;
        Ok(report)
    }
}
