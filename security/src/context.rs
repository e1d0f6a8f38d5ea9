//! Wiring of all components from one [`SecurityConfig`]

use crate::audit_log::AuditLogger;
use crate::breach::Sha256BreachList;
use crate::clock::SharedClock;
use crate::config::SecurityConfig;
use crate::password::PasswordPolicy;
use crate::rate_limiter::RateLimiter;
use crate::store::MemoryRateLimitStore;
use crate::token::TokenIssuer;
use crate::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Shared handles to every security component
#[derive(Debug, Clone)]
pub struct SecurityContext {
    /// Audit logger, also fed by the rate limiter on every new block
    pub audit: Arc<AuditLogger>,

    /// Limiter backed by a process-local store
    pub rate_limiter: Arc<RateLimiter>,

    /// Password rules, with the breach list when one is configured
    pub passwords: Arc<PasswordPolicy>,

    /// Token issuer with a process-local revocation list
    pub tokens: Arc<TokenIssuer>,
}

impl SecurityContext {
    /// Validate `config` and build every component, failing on the first
    /// unusable setting
    pub fn from_config(config: &SecurityConfig, clock: SharedClock) -> Result<Self> {
        config.validate()?;

        let audit = Arc::new(AuditLogger::from_config(&config.audit)?.with_clock(clock.clone()));

        let rate_limiter = RateLimiter::with_store(
            config.rate_limit.clone(),
            Arc::new(MemoryRateLimitStore::new()),
            clock.clone(),
        )
        .with_audit(audit.clone());

        let mut passwords = PasswordPolicy::new(config.password.clone())?;
        if let Some(path) = &config.breach_list_path {
            passwords = passwords.with_breach_corpus(Arc::new(Sha256BreachList::from_file(path)?));
        }

        let tokens = TokenIssuer::from_config(config.token.clone())?.with_clock(clock);

        info!("Security context initialised");
        Ok(Self {
            audit,
            rate_limiter: Arc::new(rate_limiter),
            passwords: Arc::new(passwords),
            tokens: Arc::new(tokens),
        })
    }

    /// Start the rate limit and revocation sweeps.
    ///
    /// Both run until their handles are aborted. Must be called inside a
    /// tokio runtime.
    pub fn spawn_background_tasks(&self) -> Vec<JoinHandle<()>> {
        vec![
            self.rate_limiter.clone().spawn_cleanup_task(),
            self.tokens.clone().spawn_revocation_sweep(),
        ]
    }
}
