//! Time-bounded memoization for external lookups.
//!
//! The clock is injected so that expiry can be exercised in tests without
//! touching the wall clock.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct TtlCache<K, V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<K, (V, DateTime<Utc>)>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value for `key` if it was stored less than `ttl` ago
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let expired = match entries.get(key) {
            Some((value, stored_at)) if now - *stored_at < self.ttl => return Some(value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        None
    }

    /// Store `value` under `key`, dropping any entries that have expired
    pub fn insert(&self, key: K, value: V) {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, (_, stored_at)| now - *stored_at < self.ttl);
        entries.insert(key, (value, now));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap())
    }

    #[test]
    fn test_entry_served_within_ttl() {
        let clock = clock();
        let cache = TtlCache::new(Duration::minutes(15), Arc::new(clock.clone()));
        cache.insert("Nashik".to_string(), 42);

        clock.advance(Duration::minutes(14));
        assert_eq!(cache.get(&"Nashik".to_string()), Some(42));
    }

    #[test]
    fn test_entry_expires_at_ttl() {
        let clock = clock();
        let cache = TtlCache::new(Duration::minutes(15), Arc::new(clock.clone()));
        cache.insert("Nashik".to_string(), 42);

        clock.advance(Duration::minutes(15));
        assert_eq!(cache.get(&"Nashik".to_string()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_insert_refreshes_timestamp() {
        let clock = clock();
        let cache = TtlCache::new(Duration::minutes(10), Arc::new(clock.clone()));
        cache.insert(1, "old");
        clock.advance(Duration::minutes(8));
        cache.insert(1, "new");
        clock.advance(Duration::minutes(8));
        assert_eq!(cache.get(&1), Some("new"));
    }

    #[test]
    fn test_insert_drops_expired_entries() {
        let clock = clock();
        let cache = TtlCache::new(Duration::minutes(15), Arc::new(clock.clone()));
        cache.insert("Nashik".to_string(), 1);
        cache.insert("Pune".to_string(), 2);

        clock.advance(Duration::minutes(16));
        cache.insert("Ludhiana".to_string(), 3);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"Ludhiana".to_string()), Some(3));
    }
}
