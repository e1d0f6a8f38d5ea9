//! Tracing subscriber setup

use crate::{Result, SecurityError};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// Honours `RUST_LOG`, defaulting to `info`. Audit records go to the `audit`
/// target, so `RUST_LOG=audit=info,warn` isolates them.
pub fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = if json {
        builder.json().with_current_span(false).try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| SecurityError::Configuration(format!("Tracing init failed: {}", e)))
}
