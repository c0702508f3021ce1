use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use regex::Regex;

use crate::clock::Clock;

/// Entry count above which an insert sweeps expired entries.
pub const DEFAULT_SWEEP_THRESHOLD: usize = 100;

/// Which entries a [`TtlCache::clear`] removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope {
    All,
    /// Exact keys.
    Keys(Vec<String>),
    /// Glob over keys, `*` matching any run of characters.
    Pattern(String),
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

/// Expiring memo table keyed by string.
///
/// Concurrent misses for the same key may both run the fetch; the last
/// write wins.
pub struct TtlCache<V> {
    entries: DashMap<String, Entry<V>>,
    ttl: Duration,
    sweep_threshold: usize,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            sweep_threshold: DEFAULT_SWEEP_THRESHOLD,
            clock,
        }
    }

    pub fn with_sweep_threshold(mut self, threshold: usize) -> Self {
        self.sweep_threshold = threshold;
        self
    }

    /// Live value under `key`. Expired entries are dropped on the way.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
            Some(_) => {}
            None => return None,
        }

        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        None
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.insert_with_ttl(key, value, self.ttl);
    }

    pub fn insert_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let expires_at = self.clock.now() + ttl;
        self.entries.insert(key.into(), Entry { value, expires_at });

        if self.entries.len() > self.sweep_threshold {
            let removed = self.sweep();
            tracing::debug!(removed, remaining = self.entries.len(), "Swept cache");
        }
    }

    /// Cached value for `key`, or the result of `fetch`, which is stored on success.
    /// Errors are passed through and leave the cache untouched.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: &str, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(hit) = self.get(key) {
            tracing::debug!(key, "Cache hit");
            return Ok(hit);
        }

        tracing::debug!(key, "Cache miss");
        let value = fetch().await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    /// Drop every expired entry, returning how many went.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Remove the entries in `scope`, returning how many were removed.
    pub fn clear(&self, scope: &ClearScope) -> usize {
        match scope {
            ClearScope::All => {
                let count = self.entries.len();
                self.entries.clear();
                count
            }
            ClearScope::Keys(keys) => keys
                .iter()
                .filter(|key| self.entries.remove(key.as_str()).is_some())
                .count(),
            ClearScope::Pattern(pattern) => {
                let Some(matcher) = glob_regex(pattern) else {
                    tracing::warn!(pattern, "Unusable cache key pattern");
                    return 0;
                };
                let before = self.entries.len();
                self.entries.retain(|key, _| !matcher.is_match(key));
                before.saturating_sub(self.entries.len())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn glob_regex(pattern: &str) -> Option<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{body}$")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache(ttl_secs: i64) -> (Arc<ManualClock>, TtlCache<u32>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let cache = TtlCache::new(clock.clone(), Duration::seconds(ttl_secs));
        (clock, cache)
    }

    #[test]
    fn test_entries_expire() {
        let (clock, cache) = cache(60);
        cache.insert("a", 1);
        assert_eq!(cache.get("a"), Some(1));

        clock.advance(Duration::seconds(59));
        assert_eq!(cache.get("a"), Some(1));

        clock.advance(Duration::seconds(1));
        assert_eq!(cache.get("a"), None);
        assert!(cache.is_empty(), "expired entry removed on read");
    }

    #[test]
    fn test_custom_ttl() {
        let (clock, cache) = cache(60);
        cache.insert_with_ttl("short", 1, Duration::seconds(5));
        clock.advance(Duration::seconds(10));
        assert_eq!(cache.get("short"), None);
    }

    #[tokio::test]
    async fn test_fetch_runs_once_within_ttl() {
        let (clock, cache) = cache(300);
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let fetch = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(7)
        };

        assert_eq!(cache.get_or_try_insert_with("k", fetch).await, Ok(7));
        assert_eq!(cache.get_or_try_insert_with("k", fetch).await, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::seconds(301));
        assert_eq!(cache.get_or_try_insert_with("k", fetch).await, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let (_clock, cache) = cache(300);
        let result = cache
            .get_or_try_insert_with("k", || async { Err::<u32, _>("boom") })
            .await;
        assert_eq!(result, Err("boom"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_sweep_on_insert_above_threshold() {
        let (clock, cache) = cache(10);
        let cache = cache.with_sweep_threshold(3);
        for key in ["a", "b", "c"] {
            cache.insert(key, 0);
        }
        clock.advance(Duration::seconds(11));

        cache.insert("d", 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("d"), Some(1));
    }

    #[test]
    fn test_no_sweep_at_threshold() {
        let (clock, cache) = cache(10);
        let cache = cache.with_sweep_threshold(3);
        cache.insert("a", 0);
        cache.insert("b", 0);
        clock.advance(Duration::seconds(11));
        cache.insert("c", 0);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_clear_scopes() {
        let (_clock, cache) = cache(60);
        for key in ["dashboard:1", "dashboard:2", "analytics:global", "other"] {
            cache.insert(key, 0);
        }

        assert_eq!(cache.clear(&ClearScope::Keys(vec!["other".into(), "missing".into()])), 1);
        assert_eq!(cache.clear(&ClearScope::Pattern("dashboard:*".into())), 2);
        assert_eq!(cache.get("analytics:global"), Some(0));

        assert_eq!(cache.clear(&ClearScope::All), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_glob_is_anchored_and_literal() {
        let re = glob_regex("dash.board:*").unwrap();
        assert!(re.is_match("dash.board:42"));
        assert!(!re.is_match("dashXboard:42"));
        assert!(!re.is_match("x-dash.board:42"));

        let exact = glob_regex("analytics:global").unwrap();
        assert!(exact.is_match("analytics:global"));
        assert!(!exact.is_match("analytics:global:2"));
    }
}
