//! Rate limit state storage
//!
//! The limiter never touches a global table directly. It goes through
//! [`RateLimitStore`], so a deployment with several instances can back the
//! table with a shared cache instead of [`MemoryRateLimitStore`].

use crate::clock::saturating_add;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Tracking state for one identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRecord {
    /// Requests counted in the current window
    pub count: u32,

    /// End of the current window
    pub window_reset_at: DateTime<Utc>,

    /// Length of the current run of rapid-fire requests
    pub burst_count: u32,

    /// Time of the last request seen
    pub last_request_at: DateTime<Utc>,

    /// Requests are rejected until this instant
    pub blocked_until: Option<DateTime<Utc>>,

    /// Number of window-exhaustion blocks imposed so far
    pub violations: u32,
}

impl RateLimitRecord {
    /// Empty record opening a window at `now`
    pub fn new(now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            count: 0,
            window_reset_at: saturating_add(now, window),
            burst_count: 0,
            last_request_at: now,
            blocked_until: None,
            violations: 0,
        }
    }

    /// Start a new counting window, keeping burst tracking and violation history
    pub fn restart_window(&mut self, now: DateTime<Utc>, window: Duration) {
        self.count = 0;
        self.window_reset_at = saturating_add(now, window);
        self.blocked_until = None;
    }

    /// Whether a block is in force at `now`
    pub fn is_blocked(&self, now: DateTime<Utc>) -> bool {
        self.blocked_until.is_some_and(|until| until > now)
    }

    /// Both the window and any block lie in the past
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.window_reset_at <= now && !self.is_blocked(now)
    }
}

/// Keyed storage for [`RateLimitRecord`]s
pub trait RateLimitStore: Send + Sync {
    /// Current record for an identifier
    fn get(&self, identifier: &str) -> Option<RateLimitRecord>;

    /// Replace the record for an identifier
    fn set(&self, identifier: &str, record: RateLimitRecord);

    /// Remove an identifier, returning whether it was tracked
    fn delete(&self, identifier: &str) -> bool;

    /// Atomically read, transform and write one identifier's record.
    ///
    /// `update` receives the current record (if any) and returns the record
    /// to store. Implementations must hold exclusive access to the identifier
    /// for the duration of the call.
    fn compute(
        &self,
        identifier: &str,
        update: &mut dyn FnMut(Option<&RateLimitRecord>) -> RateLimitRecord,
    ) -> RateLimitRecord;

    /// Drop every stale record, returning how many were removed
    fn sweep(&self, now: DateTime<Utc>) -> usize;

    /// Number of tracked identifiers
    fn len(&self) -> usize;

    /// True when nothing is tracked
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local store backed by a sharded concurrent map
#[derive(Debug, Default)]
pub struct MemoryRateLimitStore {
    records: DashMap<String, RateLimitRecord>,
}

impl MemoryRateLimitStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimitStore for MemoryRateLimitStore {
    fn get(&self, identifier: &str) -> Option<RateLimitRecord> {
        self.records.get(identifier).map(|r| r.value().clone())
    }

    fn set(&self, identifier: &str, record: RateLimitRecord) {
        self.records.insert(identifier.to_string(), record);
    }

    fn delete(&self, identifier: &str) -> bool {
        self.records.remove(identifier).is_some()
    }

    fn compute(
        &self,
        identifier: &str,
        update: &mut dyn FnMut(Option<&RateLimitRecord>) -> RateLimitRecord,
    ) -> RateLimitRecord {
        // The entry guard holds the shard lock until it is dropped
        match self.records.entry(identifier.to_string()) {
            Entry::Occupied(mut entry) => {
                let next = update(Some(entry.get()));
                *entry.get_mut() = next.clone();
                next
            }
            Entry::Vacant(entry) => {
                let next = update(None);
                entry.insert(next.clone());
                next
            }
        }
    }

    fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.records.retain(|_, record| {
            let keep = !record.is_stale(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_record_staleness() {
        let now = Utc::now();
        let mut record = RateLimitRecord::new(now, Duration::seconds(60));
        assert!(!record.is_stale(now));
        assert!(record.is_stale(now + Duration::seconds(60)));

        // A block outliving the window keeps the record alive
        record.blocked_until = Some(now + Duration::seconds(120));
        assert!(!record.is_stale(now + Duration::seconds(90)));
        assert!(record.is_stale(now + Duration::seconds(120)));
    }

    #[test]
    fn test_restart_window_keeps_history() {
        let now = Utc::now();
        let mut record = RateLimitRecord::new(now, Duration::seconds(60));
        record.count = 5;
        record.violations = 2;
        record.burst_count = 3;

        let later = now + Duration::seconds(61);
        record.restart_window(later, Duration::seconds(60));

        assert_eq!(record.count, 0);
        assert_eq!(record.violations, 2);
        assert_eq!(record.burst_count, 3);
        assert_eq!(record.window_reset_at, later + Duration::seconds(60));
    }

    #[test]
    fn test_memory_store_crud_and_sweep() {
        let store = MemoryRateLimitStore::new();
        let now = Utc::now();

        store.set("a", RateLimitRecord::new(now, Duration::seconds(10)));
        store.set("b", RateLimitRecord::new(now, Duration::seconds(100)));
        assert_eq!(store.len(), 2);
        assert!(store.get("a").is_some());

        assert_eq!(store.sweep(now + Duration::seconds(50)), 1);
        assert!(store.get("a").is_none());
        assert!(store.get("b").is_some());

        assert!(store.delete("b"));
        assert!(!store.delete("b"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_compute_is_atomic_per_identifier() {
        let store = Arc::new(MemoryRateLimitStore::new());
        let now = Utc::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        store.compute("shared", &mut |existing| {
                            let mut record = existing
                                .cloned()
                                .unwrap_or_else(|| RateLimitRecord::new(now, Duration::hours(1)));
                            record.count += 1;
                            record
                        });
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get("shared").unwrap().count, 4000);
    }
}
