//! Configuration for the security layer

use crate::audit_log::{AuditLogConfig, AuditSeverity};
use crate::clock::MAX_DURATION_SECS;
use crate::password::PasswordPolicyConfig;
use crate::rate_limiter::RateLimiterConfig;
use crate::telemetry;
use crate::token::{KeyMaterial, TokenConfig};
use crate::{Result, SecurityError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix shared by every environment override
pub const ENV_PREFIX: &str = "STOREFRONT_SECURITY_";

/// Security layer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Rate limiting
    pub rate_limit: RateLimiterConfig,

    /// Password rules and hashing cost
    pub password: PasswordPolicyConfig,

    /// Token lifetimes and signing keys
    pub token: TokenConfig,

    /// Audit sinks
    pub audit: AuditLogConfig,

    /// SHA-256 breached password list
    pub breach_list_path: Option<PathBuf>,

    /// Emit logs as JSON
    pub json_logs: bool,
}

impl SecurityConfig {
    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SecurityConfig = toml::from_str(&content)
            .map_err(|e| SecurityError::Configuration(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables.
    ///
    /// `STOREFRONT_SECURITY_CONFIG` names a TOML file to start from; the
    /// remaining variables override individual settings.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var(format!("{}CONFIG", ENV_PREFIX)) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(format!("{}{}", ENV_PREFIX, name)).ok())?;
        Ok(config)
    }

    /// Apply overrides from `lookup`, keyed by variable name without prefix
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(pem) = lookup("JWT_PRIVATE_KEY") {
            self.token.private_key = Some(KeyMaterial::new(pem));
        }
        if let Some(path) = lookup("JWT_PRIVATE_KEY_FILE") {
            self.token.private_key_path = Some(PathBuf::from(path));
        }
        if let Some(pem) = lookup("JWT_PUBLIC_KEY") {
            self.token.public_key = Some(KeyMaterial::new(pem));
        }
        if let Some(path) = lookup("JWT_PUBLIC_KEY_FILE") {
            self.token.public_key_path = Some(PathBuf::from(path));
        }
        if let Some(issuer) = lookup("JWT_ISSUER") {
            self.token.issuer = issuer;
        }
        if let Some(audience) = lookup("JWT_AUDIENCE") {
            self.token.audience = audience;
        }

        if let Some(path) = lookup("AUDIT_LOG_PATH") {
            self.audit.file_path = Some(PathBuf::from(path));
        }
        if let Some(level) = lookup("AUDIT_MIN_SEVERITY") {
            self.audit.min_severity = level
                .parse::<AuditSeverity>()
                .map_err(SecurityError::Configuration)?;
        }

        if let Some(path) = lookup("BREACH_LIST") {
            self.breach_list_path = Some(PathBuf::from(path));
        }
        if let Some(value) = lookup("PASSWORD_MIN_LENGTH") {
            self.password.min_length = parse_number("PASSWORD_MIN_LENGTH", &value)?;
        }
        if let Some(value) = lookup("LOG_JSON") {
            self.json_logs = matches!(value.trim(), "1" | "true" | "yes");
        }

        Ok(())
    }

    /// Install the global tracing subscriber, as JSON when `json_logs` is set.
    ///
    /// Fails with `Configuration` if a subscriber is already installed.
    pub fn init_tracing(&self) -> Result<()> {
        telemetry::init_tracing(self.json_logs)
    }

    /// Reject settings that cannot work
    pub fn validate(&self) -> Result<()> {
        let rl = &self.rate_limit;
        if rl.window_secs <= 0 {
            return invalid("Rate limit window must be positive");
        }
        if rl.burst_interval_ms < 0 || rl.burst_block_secs < 0 || rl.base_block_secs < 0 {
            return invalid("Rate limit durations cannot be negative");
        }
        if rl.base_block_secs > rl.max_block_secs {
            return invalid("Base block cannot exceed max block");
        }
        if rl.window_secs > MAX_DURATION_SECS
            || rl.burst_block_secs > MAX_DURATION_SECS
            || rl.max_block_secs > MAX_DURATION_SECS
            || rl.burst_interval_ms > MAX_DURATION_SECS * 1_000
        {
            return invalid("Rate limit durations cannot exceed ten years");
        }

        let pw = &self.password;
        if pw.min_length == 0 {
            return invalid("Password minimum length must be at least 1");
        }
        if pw.min_score > 100 {
            return invalid("Password minimum score cannot exceed 100");
        }
        if pw.max_repeat < 2 {
            return invalid("Password max repeat must be at least 2");
        }
        if pw.backup_code_length < 6 {
            return invalid("Backup codes need at least 6 digits");
        }

        let token = &self.token;
        if token.issuer.is_empty() || token.audience.is_empty() {
            return invalid("Token issuer and audience are required");
        }
        if token.access_ttl_secs <= 0 || token.refresh_ttl_secs <= 0 || token.mfa_ttl_secs <= 0 {
            return invalid("Token lifetimes must be positive");
        }
        if token.access_ttl_secs > MAX_DURATION_SECS
            || token.refresh_ttl_secs > MAX_DURATION_SECS
            || token.mfa_ttl_secs > MAX_DURATION_SECS
        {
            return invalid("Token lifetimes cannot exceed ten years");
        }
        if !(token.rotation_threshold > 0.0 && token.rotation_threshold <= 1.0) {
            return invalid("Rotation threshold must be in (0, 1]");
        }
        if token.private_key.is_none() && token.private_key_path.is_none() {
            return invalid("No JWT private key configured");
        }
        if token.public_key.is_none() && token.public_key_path.is_none() {
            return invalid("No JWT public key configured");
        }

        Ok(())
    }
}

fn invalid(message: &str) -> Result<()> {
    Err(SecurityError::Configuration(message.to_string()))
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        SecurityError::Configuration(format!("{}{} is not a number: {:?}", ENV_PREFIX, name, value))
    })
}
