//! Device fingerprints
//!
//! An opaque digest of request metadata, bound into tokens for informational
//! comparison only. It is not a secret and proves nothing on its own.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Fingerprint of a client from its user agent, IP and the UTC day.
///
/// The day bucket keeps the value stable across requests on the same day.
pub fn device_fingerprint(user_agent: &str, ip: &str, at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_agent.as_bytes());
    hasher.update(b"|");
    hasher.update(ip.as_bytes());
    hasher.update(b"|");
    hasher.update(at.format("%Y-%m-%d").to_string().as_bytes());
    hex::encode(hasher.finalize())
}
