//! MFA backup codes
//!
//! Single-use numeric recovery codes. Each code is hashed independently with a
//! fresh salt, so verification has to try every stored hash.

use crate::password::PasswordPolicy;
use crate::Result;
use rand::rngs::OsRng;
use rand::Rng;
use std::collections::HashSet;
use tracing::warn;

impl PasswordPolicy {
    /// Generate `count` distinct numeric codes of the configured length
    pub fn generate_backup_codes(&self, count: usize) -> Vec<String> {
        let length = self.config.backup_code_length.max(1);
        // Never ask for more distinct codes than the length allows
        let count = count.min(10usize.checked_pow(length as u32).unwrap_or(usize::MAX));
        let mut rng = OsRng;
        let mut seen = HashSet::with_capacity(count);
        let mut codes = Vec::with_capacity(count);

        while codes.len() < count {
            let code: String = (0..length)
                .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
                .collect();
            if seen.insert(code.clone()) {
                codes.push(code);
            }
        }
        codes
    }

    /// Generate the configured number of codes
    pub fn generate_default_backup_codes(&self) -> Vec<String> {
        self.generate_backup_codes(self.config.backup_code_count)
    }

    /// Hash each code for storage
    pub fn hash_backup_codes(&self, codes: &[String]) -> Result<Vec<String>> {
        codes.iter().map(|code| self.hash_password(code)).collect()
    }

    /// Find which stored hash a presented code matches.
    ///
    /// Spaces and dashes in the presented code are ignored. Every hash is
    /// checked even after a match. Returns the index to retire, or `None`.
    pub fn verify_backup_code(&self, code: &str, hashes: &[String]) -> Option<usize> {
        let normalized: String = code
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();

        let mut matched = None;
        for (index, hash) in hashes.iter().enumerate() {
            match self.verify_password(&normalized, hash) {
                Ok(true) if matched.is_none() => matched = Some(index),
                Ok(_) => {}
                Err(e) => warn!("Skipping malformed backup code hash at {}: {}", index, e),
            }
        }
        matched
    }
}
