//! Rate Limiting and Brute-Force Protection
//!
//! Fixed-window limiter keyed by an opaque identifier (client IP, user id):
//! - Per-identifier attempt windows
//! - Burst detection for rapid-fire requests
//! - Progressive blocking on repeated window exhaustion
//! - Periodic cleanup of stale identifiers

use crate::audit_log::AuditLogger;
use crate::clock::{clamped_millis, clamped_seconds, saturating_add, system_clock, SharedClock};
use crate::store::{MemoryRateLimitStore, RateLimitRecord, RateLimitStore};
use crate::{Result, SecurityError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Rate limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Counting window length (seconds)
    pub window_secs: i64,

    /// Two requests closer than this count as a burst (milliseconds)
    pub burst_interval_ms: i64,

    /// Fixed block imposed when the burst limit is exceeded (seconds)
    pub burst_block_secs: i64,

    /// First progressive block (seconds), doubled on every further violation
    pub base_block_secs: i64,

    /// Upper bound for progressive blocks (seconds)
    pub max_block_secs: i64,

    /// How often the background sweep runs (seconds)
    pub cleanup_interval_secs: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            window_secs: 15 * 60,
            burst_interval_ms: 1_000,
            burst_block_secs: 5 * 60,
            base_block_secs: 15 * 60,
            max_block_secs: 24 * 60 * 60,
            cleanup_interval_secs: 60,
        }
    }
}

impl RateLimiterConfig {
    fn window(&self) -> Duration {
        clamped_seconds(self.window_secs)
    }

    fn burst_interval(&self) -> Duration {
        clamped_millis(self.burst_interval_ms)
    }

    fn burst_block(&self) -> Duration {
        clamped_seconds(self.burst_block_secs)
    }

    /// Block length after `violations` earlier window-exhaustion blocks
    fn progressive_block(&self, violations: u32) -> Duration {
        let factor = 1i64.checked_shl(violations.min(62)).unwrap_or(i64::MAX);
        let secs = self
            .base_block_secs
            .saturating_mul(factor)
            .min(self.max_block_secs);
        clamped_seconds(secs)
    }
}

/// Named limit applied to one class of endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Key prefix separating this policy's counters from others
    pub scope: String,

    /// Allowed requests per window
    pub max_attempts: u32,

    /// Allowed rapid-fire requests in a row
    pub burst_limit: u32,

    /// Window length (seconds)
    pub window_secs: i64,
}

impl RateLimitPolicy {
    /// Sign-in attempts: 5 per 15 minutes
    pub fn login() -> Self {
        Self {
            scope: "login".to_string(),
            max_attempts: 5,
            burst_limit: 3,
            window_secs: 15 * 60,
        }
    }

    /// Account creation: 3 per hour
    pub fn signup() -> Self {
        Self {
            scope: "signup".to_string(),
            max_attempts: 3,
            burst_limit: 2,
            window_secs: 60 * 60,
        }
    }

    /// Password reset requests: 3 per hour
    pub fn password_reset() -> Self {
        Self {
            scope: "password_reset".to_string(),
            max_attempts: 3,
            burst_limit: 2,
            window_secs: 60 * 60,
        }
    }

    /// General API traffic: 100 per minute
    pub fn api() -> Self {
        Self {
            scope: "api".to_string(),
            max_attempts: 100,
            burst_limit: 20,
            window_secs: 60,
        }
    }

    fn key(&self, identifier: &str) -> String {
        format!("{}:{}", self.scope, identifier)
    }
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub allowed: bool,

    /// Requests left in the current window
    pub remaining: u32,

    /// End of the current window
    pub reset_at: DateTime<Utc>,

    /// End of the active block, if any
    pub blocked_until: Option<DateTime<Utc>>,
}

impl RateLimitDecision {
    /// Earliest time a denied caller should retry
    pub fn retry_at(&self) -> DateTime<Utc> {
        self.blocked_until.unwrap_or(self.reset_at)
    }

    /// Delay suitable for a `Retry-After` header; zero when allowed
    pub fn retry_after(&self, now: DateTime<Utc>) -> std::time::Duration {
        if self.allowed {
            return std::time::Duration::ZERO;
        }
        (self.retry_at() - now)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }

    fn into_result(self) -> Result<Self> {
        if self.allowed {
            Ok(self)
        } else {
            Err(SecurityError::RateLimited {
                reset_at: self.reset_at,
                blocked_until: self.blocked_until,
            })
        }
    }
}

/// Per-identifier rate limiter
pub struct RateLimiter {
    config: RateLimiterConfig,
    store: Arc<dyn RateLimitStore>,
    clock: SharedClock,
    audit: Option<Arc<AuditLogger>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("tracked", &self.store.len())
            .finish()
    }
}

impl RateLimiter {
    /// Create a limiter with an in-memory store and the wall clock
    pub fn new(config: RateLimiterConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryRateLimitStore::new()), system_clock())
    }

    /// Create a limiter over an explicit store and clock
    pub fn with_store(
        config: RateLimiterConfig,
        store: Arc<dyn RateLimitStore>,
        clock: SharedClock,
    ) -> Self {
        Self {
            config,
            store,
            clock,
            audit: None,
        }
    }

    /// Record every newly imposed block in the audit log
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Count one request from `identifier` against the configured window
    pub fn check(&self, identifier: &str, max_attempts: u32, burst_limit: u32) -> RateLimitDecision {
        self.evaluate(identifier, max_attempts, burst_limit, self.config.window())
    }

    /// Count one request under a named policy
    pub fn check_policy(&self, identifier: &str, policy: &RateLimitPolicy) -> RateLimitDecision {
        self.evaluate(
            &policy.key(identifier),
            policy.max_attempts,
            policy.burst_limit,
            clamped_seconds(policy.window_secs),
        )
    }

    /// Like [`check`](Self::check), failing with [`SecurityError::RateLimited`] when denied
    pub fn enforce(
        &self,
        identifier: &str,
        max_attempts: u32,
        burst_limit: u32,
    ) -> Result<RateLimitDecision> {
        self.check(identifier, max_attempts, burst_limit).into_result()
    }

    /// Like [`check_policy`](Self::check_policy), failing when denied
    pub fn enforce_policy(
        &self,
        identifier: &str,
        policy: &RateLimitPolicy,
    ) -> Result<RateLimitDecision> {
        self.check_policy(identifier, policy).into_result()
    }

    fn evaluate(
        &self,
        key: &str,
        max_attempts: u32,
        burst_limit: u32,
        window: Duration,
    ) -> RateLimitDecision {
        let now = self.clock.now();
        let mut decision = None;
        let mut newly_blocked = false;

        self.store.compute(key, &mut |existing| {
            let (record, outcome, blocked) = self.step(existing, now, max_attempts, burst_limit, window);
            decision = Some(outcome);
            newly_blocked = blocked;
            record
        });

        // compute always invokes the closure exactly once
        let decision = decision.unwrap_or(RateLimitDecision {
            allowed: false,
            remaining: 0,
            reset_at: saturating_add(now, window),
            blocked_until: None,
        });

        if newly_blocked {
            let until = decision.retry_at();
            warn!(identifier = %key, blocked_until = %until, "Rate limit block imposed");
            if let Some(audit) = &self.audit {
                audit.rate_limit_exceeded(key, until);
            }
        } else if !decision.allowed {
            debug!(identifier = %key, "Request rejected during active block");
        }

        decision
    }

    /// Advance one identifier's state by a single request.
    ///
    /// Returns the record to store, the decision, and whether this request
    /// imposed a new block.
    fn step(
        &self,
        existing: Option<&RateLimitRecord>,
        now: DateTime<Utc>,
        max_attempts: u32,
        burst_limit: u32,
        window: Duration,
    ) -> (RateLimitRecord, RateLimitDecision, bool) {
        let mut record = match existing {
            Some(record) if record.is_blocked(now) => {
                let decision = RateLimitDecision {
                    allowed: false,
                    remaining: 0,
                    reset_at: record.window_reset_at,
                    blocked_until: record.blocked_until,
                };
                return (record.clone(), decision, false);
            }
            Some(record) if record.window_reset_at <= now => {
                let mut record = record.clone();
                record.restart_window(now, window);
                record
            }
            Some(record) => {
                let mut record = record.clone();
                // Expired block inside a live window
                record.blocked_until = None;
                record
            }
            None => RateLimitRecord::new(now, window),
        };

        let rapid = existing.is_some() && now - record.last_request_at < self.config.burst_interval();
        record.burst_count = if rapid {
            record.burst_count.saturating_add(1)
        } else {
            1
        };
        record.last_request_at = now;

        let mut block_until: Option<DateTime<Utc>> = None;

        if record.burst_count > burst_limit {
            block_until = Some(saturating_add(now, self.config.burst_block()));
        }

        if record.count >= max_attempts {
            let progressive = saturating_add(now, self.config.progressive_block(record.violations));
            record.violations = record.violations.saturating_add(1);
            // The later of the two blocks wins
            block_until = Some(block_until.map_or(progressive, |b| b.max(progressive)));
        }

        if let Some(until) = block_until {
            record.blocked_until = Some(until);
            let decision = RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at: record.window_reset_at,
                blocked_until: Some(until),
            };
            return (record, decision, true);
        }

        record.count += 1;
        let decision = RateLimitDecision {
            allowed: true,
            remaining: max_attempts - record.count,
            reset_at: record.window_reset_at,
            blocked_until: None,
        };
        (record, decision, false)
    }

    /// Forget everything about an identifier (e.g. after a successful login)
    pub fn clear(&self, identifier: &str) {
        if self.store.delete(identifier) {
            debug!("Rate limit state cleared: {}", identifier);
        }
    }

    /// Forget an identifier's counters under a named policy
    pub fn clear_policy(&self, identifier: &str, policy: &RateLimitPolicy) {
        self.clear(&policy.key(identifier));
    }

    /// Current state for an identifier, if tracked
    pub fn status(&self, identifier: &str) -> Option<RateLimitRecord> {
        self.store.get(identifier)
    }

    /// Number of tracked identifiers
    pub fn tracked(&self) -> usize {
        self.store.len()
    }

    /// Purge identifiers whose window and block have both expired
    pub fn cleanup(&self) -> usize {
        let removed = self.store.sweep(self.clock.now());
        info!(
            "Rate limiter cleanup: removed {}, tracking {}",
            removed,
            self.store.len()
        );
        removed
    }

    /// Run [`cleanup`](Self::cleanup) on a fixed interval
    pub fn spawn_cleanup_task(self: Arc<Self>) -> JoinHandle<()> {
        let period = std::time::Duration::from_secs(self.config.cleanup_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                self.cleanup();
            }
        })
    }
}
