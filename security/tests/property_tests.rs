//! Property-based tests for security invariants
//!
//! - A window never admits more than `max_attempts` requests
//! - Identifiers never share counters
//! - Generated passwords contain every required character class
//! - An assessment is valid exactly when it has no errors and meets the score
//! - Audit event hashes survive serialization and catch edits

use chrono::{Duration, Utc};
use proptest::prelude::*;
use serde_json::{Map, Value};
use std::sync::Arc;
use storefront_security::{
    AuditEvent, AuditSeverity, ManualClock, MemoryRateLimitStore, PasswordPolicy,
    PasswordPolicyConfig, RateLimiter, RateLimiterConfig,
};

fn limiter(clock: &ManualClock) -> RateLimiter {
    RateLimiter::with_store(
        RateLimiterConfig::default(),
        Arc::new(MemoryRateLimitStore::new()),
        Arc::new(clock.clone()),
    )
}

fn policy() -> PasswordPolicy {
    PasswordPolicy::new(PasswordPolicyConfig {
        hash_memory_kib: 1024,
        hash_iterations: 1,
        ..PasswordPolicyConfig::default()
    })
    .unwrap()
}

/// Strategy for generating audit severities
fn severity_strategy() -> impl Strategy<Value = AuditSeverity> {
    prop_oneof![
        Just(AuditSeverity::Low),
        Just(AuditSeverity::Medium),
        Just(AuditSeverity::High),
        Just(AuditSeverity::Critical),
    ]
}

proptest! {
    #[test]
    fn prop_window_admits_at_most_max_attempts(
        max_attempts in 1u32..20,
        requests in 1usize..40,
        gap_secs in 2i64..10,
    ) {
        let clock = ManualClock::new(Utc::now());
        let limiter = limiter(&clock);

        let mut allowed = 0u32;
        let mut last_remaining = max_attempts;
        for _ in 0..requests {
            let decision = limiter.check("user@example.com", max_attempts, 10);
            if decision.allowed {
                allowed += 1;
                prop_assert!(decision.remaining < last_remaining);
                last_remaining = decision.remaining;
            } else {
                prop_assert!(decision.blocked_until.is_some());
            }
            clock.advance(Duration::seconds(gap_secs));
        }

        prop_assert_eq!(allowed as usize, requests.min(max_attempts as usize));
    }

    #[test]
    fn prop_identifiers_are_independent(
        first in "[a-z]{1,12}",
        second in "[a-z]{1,12}",
        max_attempts in 1u32..5,
    ) {
        prop_assume!(first != second);
        let clock = ManualClock::new(Utc::now());
        let limiter = limiter(&clock);

        for _ in 0..=max_attempts {
            limiter.check(&first, max_attempts, 100);
            clock.advance(Duration::seconds(2));
        }
        prop_assert!(!limiter.check(&first, max_attempts, 100).allowed);

        let decision = limiter.check(&second, max_attempts, 100);
        prop_assert!(decision.allowed);
        prop_assert_eq!(decision.remaining, max_attempts - 1);
    }

    #[test]
    fn prop_generated_passwords_cover_required_classes(length in 4usize..64) {
        let password = policy().generate_secure_password(length).unwrap();

        prop_assert_eq!(password.chars().count(), length);
        prop_assert!(password.chars().any(|c| c.is_ascii_uppercase()));
        prop_assert!(password.chars().any(|c| c.is_ascii_lowercase()));
        prop_assert!(password.chars().any(|c| c.is_ascii_digit()));
        prop_assert!(password.chars().any(|c| c.is_ascii_punctuation()));
    }

    #[test]
    fn prop_assessment_is_consistent(password in "\\PC{0,40}") {
        let policy = policy();
        let assessment = policy.assess(&password);

        prop_assert!(assessment.score <= 100);
        prop_assert_eq!(
            assessment.valid,
            assessment.errors.is_empty() && assessment.score >= policy.config().min_score
        );
        prop_assert_eq!(assessment.valid, policy.validate(&password).is_ok());
    }

    #[test]
    fn prop_audit_hash_detects_edits(
        name in "[a-z_]{1,24}",
        actor in "[a-z0-9@.]{1,24}",
        note in "\\PC{0,40}",
        severity in severity_strategy(),
    ) {
        let mut detail = Map::new();
        detail.insert("note".to_string(), Value::String(note));
        let event = AuditEvent::new(name, severity, detail, Utc::now()).with_actor(actor.clone());

        let json = serde_json::to_string(&event).unwrap();
        let restored: AuditEvent = serde_json::from_str(&json).unwrap();
        prop_assert!(restored.verify_hash());

        let mut edited = restored;
        edited.actor = Some(format!("{}x", actor));
        prop_assert!(!edited.verify_hash());
    }
}
