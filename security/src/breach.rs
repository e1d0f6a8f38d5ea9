//! Breached password corpus
//!
//! Passwords are never kept in clear: the corpus holds SHA-256 digests and
//! candidates are hashed before lookup.

use crate::Result;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

/// Source of known-compromised passwords
pub trait BreachCorpus: Send + Sync {
    /// Whether the password is known to be compromised
    fn is_breached(&self, password: &str) -> bool;
}

/// In-memory set of SHA-256 password digests
#[derive(Debug, Default, Clone)]
pub struct Sha256BreachList {
    digests: HashSet<[u8; 32]>,
}

impl Sha256BreachList {
    /// Build from raw digests
    pub fn from_digests(digests: impl IntoIterator<Item = [u8; 32]>) -> Self {
        Self {
            digests: digests.into_iter().collect(),
        }
    }

    /// Build from clear-text passwords (seeding, tests)
    pub fn from_passwords<'a>(passwords: impl IntoIterator<Item = &'a str>) -> Self {
        Self::from_digests(passwords.into_iter().map(digest))
    }

    /// Load a digest file.
    ///
    /// One hex SHA-256 digest per line, optionally followed by `:count`.
    /// Blank lines and `#` comments are ignored; malformed lines are skipped.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);

        let mut digests = HashSet::new();
        let mut skipped = 0usize;

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let hex_part = line.split(':').next().unwrap_or_default();
            match parse_digest(hex_part) {
                Some(d) => {
                    digests.insert(d);
                }
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            warn!("Skipped {} malformed lines in breach list {:?}", skipped, path);
        }
        info!("Loaded {} breached password digests from {:?}", digests.len(), path);

        Ok(Self { digests })
    }

    /// Number of digests held
    pub fn len(&self) -> usize {
        self.digests.len()
    }

    /// True when empty
    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}

impl BreachCorpus for Sha256BreachList {
    fn is_breached(&self, password: &str) -> bool {
        self.digests.contains(&digest(password))
    }
}

fn digest(password: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(password.as_bytes()));
    out
}

fn parse_digest(hex_digest: &str) -> Option<[u8; 32]> {
    hex::decode(hex_digest.trim()).ok()?.try_into().ok()
}
