//! Security layer for the storefront
//!
//! Request-facing security policy shared by every storefront service:
//! - Rate limiting with burst detection and progressive blocks (`rate_limiter`)
//! - Password strength scoring, Argon2id hashing and MFA backup codes (`password`)
//! - Ed25519-signed access, refresh and MFA tokens (`token`)
//! - Structured audit events with a hash-chained file sink (`audit_log`)
//!
//! # Architecture
//!
//! ```text
//! request ─► RateLimiter ─► PasswordPolicy / TokenIssuer ─► handler
//!                 │                    │
//!                 └────────► AuditLogger ◄┘
//! ```
//!
//! Components are independent and `Send + Sync`. The only shared mutable
//! state lives behind the [`RateLimitStore`] and [`RevocationStore`] traits,
//! and every time-dependent decision reads an injected [`Clock`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use storefront_security::{
//!     system_clock, RateLimitPolicy, SecurityConfig, SecurityContext, TokenKind,
//! };
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SecurityConfig::from_env()?;
//! config.init_tracing()?;
//! let security = SecurityContext::from_config(&config, system_clock())?;
//!
//! // Login attempt
//! security
//!     .rate_limiter
//!     .enforce_policy("alice@example.com", &RateLimitPolicy::login())?;
//!
//! let stored_hash = security.passwords.hash_password("Correct-Horse-42!")?;
//! if security.passwords.verify_password("Correct-Horse-42!", &stored_hash)? {
//!     security.audit.auth_attempt("alice@example.com", true, Some("203.0.113.7"));
//!     let pair = security.tokens.issue_session("user-42", Default::default(), None)?;
//!     let claims = security.tokens.verify(&pair.access_token, Some(TokenKind::Access))?;
//!     assert_eq!(claims.sub, "user-42");
//! }
//!
//! // Inside a tokio runtime
//! let _sweeps = security.spawn_background_tasks();
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod audit_log;
pub mod backup_codes;
pub mod breach;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod fingerprint;
pub mod password;
pub mod rate_limiter;
pub mod revocation;
pub mod store;
pub mod telemetry;
pub mod token;

pub use audit_log::{
    AuditEvent, AuditLogConfig, AuditLogger, AuditSeverity, AuditSink, FileSink,
    IntegrityStatus, MemorySink, TracingSink,
};
pub use breach::{BreachCorpus, Sha256BreachList};
pub use clock::{system_clock, Clock, ManualClock, SharedClock, SystemClock};
pub use config::SecurityConfig;
pub use context::SecurityContext;
pub use error::{Result, SecurityError};
pub use fingerprint::device_fingerprint;
pub use password::{PasswordAssessment, PasswordPolicy, PasswordPolicyConfig};
pub use rate_limiter::{RateLimitDecision, RateLimitPolicy, RateLimiter, RateLimiterConfig};
pub use revocation::{MemoryRevocationStore, RevocationStore};
pub use store::{MemoryRateLimitStore, RateLimitRecord, RateLimitStore};
pub use telemetry::init_tracing;
pub use token::{KeyMaterial, TokenClaims, TokenConfig, TokenIssuer, TokenKind, TokenPair};
