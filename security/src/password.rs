//! Password Policy
//!
//! Strength assessment, secure generation and Argon2id hashing:
//! - Independent rules, each reported as an actionable error
//! - 0-100 score with diversity and length bonuses
//! - Known-weak and breached password rejection
//! - Cost-aware rehash detection for online hash upgrades

use crate::breach::BreachCorpus;
use crate::{Result, SecurityError};
use argon2::{
    password_hash::{rand_core::OsRng as SaltRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const DIGITS: &str = "0123456789";
const SPECIAL: &str = "!@#$%^&*()-_=+[]{};:,.<>?";
const NON_ASCII: &str = "äöüßéèçñøåæ";

/// Substrings that make a password trivially guessable
const WEAK_PATTERNS: &[&str] = &[
    "password", "passw0rd", "qwerty", "asdf", "zxcv", "abc123", "abcdef", "123456", "1234",
    "0000", "1111", "letmein", "welcome", "admin", "login", "iloveyou", "monkey", "dragon",
    "master", "football", "baseball", "sunshine",
];

/// Passwords that appear at the top of every leaked-credential list
const KNOWN_WEAK: &[&str] = &[
    "password", "password1", "password123", "passw0rd", "123456", "1234567", "12345678",
    "123456789", "12345", "111111", "000000", "qwerty", "qwerty123", "1q2w3e4r", "abc123",
    "iloveyou", "admin", "admin123", "welcome", "monkey", "dragon", "letmein", "football",
    "baseball", "master", "sunshine", "princess", "trustno1",
];

/// Password policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordPolicyConfig {
    /// Minimum length in characters
    pub min_length: usize,

    /// Require at least one uppercase letter
    pub require_uppercase: bool,

    /// Require at least one lowercase letter
    pub require_lowercase: bool,

    /// Require at least one digit
    pub require_digit: bool,

    /// Require at least one special character
    pub require_special: bool,

    /// Require at least one non-ASCII character
    pub require_non_ascii: bool,

    /// Runs of this many identical characters are rejected
    pub max_repeat: usize,

    /// Minimum score for a password to be accepted
    pub min_score: u8,

    /// Argon2 memory cost (KiB)
    pub hash_memory_kib: u32,

    /// Argon2 iterations
    pub hash_iterations: u32,

    /// Argon2 lanes
    pub hash_parallelism: u32,

    /// Backup codes issued per user
    pub backup_code_count: usize,

    /// Digits per backup code
    pub backup_code_length: usize,
}

impl Default for PasswordPolicyConfig {
    fn default() -> Self {
        Self {
            min_length: 12,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: true,
            require_non_ascii: false,
            max_repeat: 3,
            min_score: 60,
            // OWASP baseline for Argon2id
            hash_memory_kib: 19_456,
            hash_iterations: 2,
            hash_parallelism: 1,
            backup_code_count: 10,
            backup_code_length: 8,
        }
    }
}

/// Result of assessing a candidate password
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordAssessment {
    /// No rule violated and score at or above the threshold
    pub valid: bool,

    /// Violated rules, in rule order
    pub errors: Vec<String>,

    /// Strength score, 0-100
    pub score: u8,

    /// How to improve the password
    pub suggestions: Vec<String>,
}

/// Password policy and hasher
#[derive(Clone)]
pub struct PasswordPolicy {
    pub(crate) config: PasswordPolicyConfig,
    params: Params,
    breach: Option<Arc<dyn BreachCorpus>>,
}

impl std::fmt::Debug for PasswordPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordPolicy")
            .field("config", &self.config)
            .field("breach_corpus", &self.breach.is_some())
            .finish()
    }
}

impl PasswordPolicy {
    /// Create a policy, rejecting unusable hashing costs up front
    pub fn new(config: PasswordPolicyConfig) -> Result<Self> {
        let params = Params::new(
            config.hash_memory_kib,
            config.hash_iterations,
            config.hash_parallelism,
            None,
        )
        .map_err(|e| SecurityError::Configuration(format!("Invalid Argon2 parameters: {}", e)))?;

        Ok(Self {
            config,
            params,
            breach: None,
        })
    }

    /// Also reject passwords found in a breach corpus
    pub fn with_breach_corpus(mut self, corpus: Arc<dyn BreachCorpus>) -> Self {
        self.breach = Some(corpus);
        self
    }

    /// Policy configuration
    pub fn config(&self) -> &PasswordPolicyConfig {
        &self.config
    }

    /// Score a password and list every rule it violates
    pub fn assess(&self, password: &str) -> PasswordAssessment {
        let cfg = &self.config;
        let mut errors = Vec::new();
        let mut suggestions = Vec::new();
        let mut score: i32 = 0;

        let length = password.chars().count();
        if length >= cfg.min_length {
            score += 20;
        } else {
            errors.push(format!(
                "Password must be at least {} characters long.",
                cfg.min_length
            ));
            suggestions.push(format!("Use {} or more characters.", cfg.min_length));
        }

        let has_upper = password.chars().any(char::is_uppercase);
        let has_lower = password.chars().any(char::is_lowercase);
        let has_digit = password.chars().any(|c| c.is_ascii_digit());
        let has_special = password.chars().any(|c| c.is_ascii_punctuation());
        let has_non_ascii = password.chars().any(|c| !c.is_ascii());

        let classes = [
            (has_upper, cfg.require_uppercase, 10, "an uppercase letter", "Add uppercase letters."),
            (has_lower, cfg.require_lowercase, 10, "a lowercase letter", "Add lowercase letters."),
            (has_digit, cfg.require_digit, 10, "a digit", "Add numbers."),
            (has_special, cfg.require_special, 15, "a special character", "Add symbols such as !, # or %."),
        ];
        for (present, required, points, name, hint) in classes {
            if present {
                score += points;
            } else if required {
                errors.push(format!("Password must contain {}.", name));
                suggestions.push(hint.to_string());
            }
        }

        if has_non_ascii {
            score += 5;
        } else if cfg.require_non_ascii {
            errors.push("Password must contain a non-ASCII character.".to_string());
            suggestions.push("Add an accented or non-Latin character.".to_string());
        }

        if cfg.max_repeat > 1 && has_repeated_run(password, cfg.max_repeat) {
            score -= 20;
            errors.push(format!(
                "Password must not repeat a character {} or more times in a row.",
                cfg.max_repeat
            ));
            suggestions.push("Avoid runs like \"aaa\" or \"111\".".to_string());
        }

        let lowered = password.to_lowercase();
        if WEAK_PATTERNS.iter().any(|p| lowered.contains(p)) {
            score -= 20;
            errors.push("Password contains a common, easily guessed pattern.".to_string());
            suggestions.push("Avoid keyboard walks, sequences and dictionary words.".to_string());
        }

        if KNOWN_WEAK.contains(&lowered.as_str()) {
            score -= 40;
            errors.push("Password is too common.".to_string());
            suggestions.push("Choose a password that is unique to this site.".to_string());
        }

        if let Some(corpus) = &self.breach {
            if corpus.is_breached(password) {
                score -= 40;
                errors.push("Password has appeared in a data breach.".to_string());
                suggestions.push("Choose a password you have never used before.".to_string());
            }
        }

        if length > 0 {
            let unique = password.chars().collect::<HashSet<_>>().len();
            if unique * 10 >= length * 6 {
                score += 10;
            }
        }

        let extra = length.saturating_sub(cfg.min_length).min(10) as i32;
        score += extra * 2;

        let score = score.clamp(0, 100) as u8;
        if errors.is_empty() && score < cfg.min_score {
            suggestions.push("Make the password longer or more varied.".to_string());
        }

        PasswordAssessment {
            valid: errors.is_empty() && score >= cfg.min_score,
            errors,
            score,
            suggestions,
        }
    }

    /// Assess a password, failing with [`SecurityError::Validation`] if it is rejected
    pub fn validate(&self, password: &str) -> Result<PasswordAssessment> {
        let assessment = self.assess(password);
        if assessment.valid {
            return Ok(assessment);
        }

        let mut errors = assessment.errors;
        if errors.is_empty() {
            errors.push(format!(
                "Password is too weak (score {} of required {}).",
                assessment.score, self.config.min_score
            ));
        }
        Err(SecurityError::Validation(errors))
    }

    fn required_alphabets(&self) -> Vec<Vec<char>> {
        let cfg = &self.config;
        let mut alphabets: Vec<Vec<char>> = [
            (cfg.require_uppercase, UPPERCASE),
            (cfg.require_lowercase, LOWERCASE),
            (cfg.require_digit, DIGITS),
            (cfg.require_special, SPECIAL),
            (cfg.require_non_ascii, NON_ASCII),
        ]
        .into_iter()
        .filter(|(required, _)| *required)
        .map(|(_, alphabet)| alphabet.chars().collect())
        .collect();

        if alphabets.is_empty() {
            alphabets.push(LOWERCASE.chars().chain(DIGITS.chars()).collect());
        }
        alphabets
    }

    /// Generate a random password containing every required character class
    pub fn generate_secure_password(&self, length: usize) -> Result<String> {
        let alphabets = self.required_alphabets();
        if length < alphabets.len() {
            return Err(SecurityError::Validation(vec![format!(
                "Generated passwords need at least {} characters.",
                alphabets.len()
            )]));
        }

        let mut rng = OsRng;
        let pool: Vec<char> = alphabets.iter().flatten().copied().collect();

        let mut chars: Vec<char> = alphabets
            .iter()
            .map(|alphabet| alphabet[rng.gen_range(0..alphabet.len())])
            .collect();
        while chars.len() < length {
            chars.push(pool[rng.gen_range(0..pool.len())]);
        }
        chars.shuffle(&mut rng);

        Ok(chars.into_iter().collect())
    }

    fn hasher(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password with a fresh random salt, returning a PHC string
    pub fn hash_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut SaltRng);
        let hash = self
            .hasher()
            .hash_password(password.as_bytes(), &salt)?
            .to_string();
        Ok(hash)
    }

    /// Check a password against a stored PHC hash in constant time.
    ///
    /// A mismatch is `Ok(false)`; a malformed hash is an error.
    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash)?;
        match self.hasher().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// True when a stored hash is weaker than the current configuration
    pub fn needs_rehash(&self, hash: &str) -> bool {
        let parsed = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Unparseable password hash flagged for rehash: {}", e);
                return true;
            }
        };

        if parsed.algorithm != argon2::ARGON2ID_IDENT {
            debug!("Non-Argon2id hash flagged for rehash: {}", parsed.algorithm);
            return true;
        }

        match Params::try_from(&parsed) {
            Ok(stored) => {
                stored.m_cost() < self.params.m_cost()
                    || stored.t_cost() < self.params.t_cost()
                    || stored.p_cost() < self.params.p_cost()
            }
            Err(_) => true,
        }
    }

    /// [`hash_password`](Self::hash_password) on the blocking thread pool
    pub async fn hash_password_async(&self, password: String) -> Result<String> {
        let policy = self.clone();
        tokio::task::spawn_blocking(move || policy.hash_password(&password))
            .await
            .map_err(|e| SecurityError::Hashing(format!("Hashing task failed: {}", e)))?
    }

    /// [`verify_password`](Self::verify_password) on the blocking thread pool
    pub async fn verify_password_async(&self, password: String, hash: String) -> Result<bool> {
        let policy = self.clone();
        tokio::task::spawn_blocking(move || policy.verify_password(&password, &hash))
            .await
            .map_err(|e| SecurityError::Hashing(format!("Verification task failed: {}", e)))?
    }
}

/// Whether any character repeats `run` or more times consecutively
fn has_repeated_run(password: &str, run: usize) -> bool {
    let mut previous = None;
    let mut streak = 0;
    for c in password.chars() {
        if Some(c) == previous {
            streak += 1;
        } else {
            previous = Some(c);
            streak = 1;
        }
        if streak >= run {
            return true;
        }
    }
    false
}
