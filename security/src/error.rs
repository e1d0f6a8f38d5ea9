//! Error types for the security layer

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::token::TokenKind;

/// Result type for security operations
pub type Result<T> = std::result::Result<T, SecurityError>;

/// Security layer errors
#[derive(Error, Debug)]
pub enum SecurityError {
    /// Missing or unusable configuration (signing keys, cost parameters).
    /// Fatal: surfaced at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Identifier exceeded its quota
    #[error("Rate limit exceeded, retry after {reset_at}")]
    RateLimited {
        /// When the current window resets
        reset_at: DateTime<Utc>,
        /// When an active block lifts, if one is in force
        blocked_until: Option<DateTime<Utc>>,
    },

    /// Input rejected by the password policy
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Token signature is fine but its lifetime is over
    #[error("Token expired")]
    TokenExpired,

    /// Malformed token, bad signature, or issuer/audience mismatch
    #[error("Invalid token: {0}")]
    TokenInvalid(String),

    /// Token of one kind presented where another was expected
    #[error("Wrong token kind: expected {expected}, got {actual}")]
    TokenWrongKind {
        /// Kind the caller asked for
        expected: TokenKind,
        /// Kind embedded in the token
        actual: TokenKind,
    },

    /// Token id is on the revocation list
    #[error("Token revoked")]
    TokenRevoked,

    /// Password hashing backend failure
    #[error("Hashing error: {0}")]
    Hashing(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SecurityError {
    /// Everything except configuration errors can be handled per request.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SecurityError::Configuration(_))
    }

    /// True for any token verification failure
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            SecurityError::TokenExpired
                | SecurityError::TokenInvalid(_)
                | SecurityError::TokenWrongKind { .. }
                | SecurityError::TokenRevoked
        )
    }

    /// Message safe to show to an end user.
    ///
    /// Token failures collapse into one generic message so verification
    /// internals never leak to the client.
    pub fn user_message(&self) -> String {
        match self {
            SecurityError::RateLimited {
                reset_at,
                blocked_until,
            } => {
                let until = blocked_until.unwrap_or(*reset_at);
                format!(
                    "Too many attempts. Please try again after {}.",
                    until.format("%Y-%m-%d %H:%M:%S UTC")
                )
            }
            SecurityError::Validation(errors) => errors.join(" "),
            e if e.is_token_error() => {
                "Your session has expired. Please log in again.".to_string()
            }
            _ => "An internal error occurred. Please try again later.".to_string(),
        }
    }
}

impl From<argon2::password_hash::Error> for SecurityError {
    fn from(err: argon2::password_hash::Error) -> Self {
        SecurityError::Hashing(err.to_string())
    }
}
