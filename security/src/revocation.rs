//! Token revocation list
//!
//! Revoked token ids are remembered only until the token would have expired
//! anyway. Multi-instance deployments need a shared implementation of
//! [`RevocationStore`].

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Storage for revoked token ids
pub trait RevocationStore: Send + Sync {
    /// Revoke `jti` until `expires_at`.
    ///
    /// Returns true only for the call that first revoked `jti`. The check
    /// and the insert must be a single atomic step.
    fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) -> bool;

    /// Whether `jti` is revoked at `now`
    fn is_revoked(&self, jti: &str, now: DateTime<Utc>) -> bool;

    /// Forget entries whose token lifetime is over, returning how many
    fn sweep(&self, now: DateTime<Utc>) -> usize;

    /// Number of entries held
    fn len(&self) -> usize;

    /// True when nothing is revoked
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local revocation list
#[derive(Debug, Default)]
pub struct MemoryRevocationStore {
    entries: DashMap<String, DateTime<Utc>>,
}

impl MemoryRevocationStore {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }
}

impl RevocationStore for MemoryRevocationStore {
    fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) -> bool {
        match self.entries.entry(jti.to_string()) {
            Entry::Occupied(mut entry) => {
                if expires_at > *entry.get() {
                    entry.insert(expires_at);
                }
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(expires_at);
                true
            }
        }
    }

    fn is_revoked(&self, jti: &str, now: DateTime<Utc>) -> bool {
        self.entries
            .get(jti)
            .is_some_and(|expires_at| *expires_at > now)
    }

    fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, expires_at| {
            let keep = *expires_at > now;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_revocation_expires_with_token() {
        let store = MemoryRevocationStore::new();
        let now = Utc::now();

        store.revoke("jti-1", now + Duration::minutes(5));
        assert!(store.is_revoked("jti-1", now));
        assert!(!store.is_revoked("jti-2", now));
        assert!(!store.is_revoked("jti-1", now + Duration::minutes(5)));

        assert_eq!(store.sweep(now + Duration::minutes(1)), 0);
        assert_eq!(store.sweep(now + Duration::minutes(6)), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_revoke_never_shortens() {
        let store = MemoryRevocationStore::new();
        let now = Utc::now();

        assert!(store.revoke("jti", now + Duration::minutes(10)));
        assert!(!store.revoke("jti", now + Duration::minutes(1)));
        assert!(store.is_revoked("jti", now + Duration::minutes(5)));
    }

    #[test]
    fn test_only_one_concurrent_revoke_wins() {
        let store = MemoryRevocationStore::new();
        let expires_at = Utc::now() + Duration::minutes(5);

        let wins = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| store.revoke("jti", expires_at)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|won| *won)
                .count()
        });
        assert_eq!(wins, 1);
    }
}
