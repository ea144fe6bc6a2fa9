//! Password hashing, constant-time verification, and policy checks.

use anyhow::{Context, Result};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

const SALT_LEN: usize = 16;

/// Hash a plaintext password as `hex(salt):hex(digest)`.
///
/// The salt is freshly generated per call, so hashing the same password twice
/// yields different stored values.
pub fn hash_password(plaintext: &str) -> Result<String> {
    let mut salt = [0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .context("failed to generate password salt")?;
    let digest = digest_with_salt(plaintext, &salt);
    Ok(format!("{}:{}", hex::encode(salt), hex::encode(digest)))
}

/// Verify a plaintext password against a stored `hex(salt):hex(digest)` value.
///
/// Malformed stored values fail closed: the caller only ever sees `false`.
#[must_use]
pub fn verify_password(plaintext: &str, stored: &str) -> bool {
    let Some((salt_hex, digest_hex)) = stored.split_once(':') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    let Ok(expected) = hex::decode(digest_hex) else {
        return false;
    };
    if salt.len() != SALT_LEN {
        return false;
    }
    let actual = digest_with_salt(plaintext, &salt);
    constant_time_eq(&actual, &expected)
}

fn digest_with_salt(plaintext: &str, salt: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hasher.update(salt);
    hasher.finalize().to_vec()
}

/// Constant-time byte comparison to prevent timing attacks.
///
/// Never short-circuits on the first differing byte; digest lengths are
/// fixed-size and not secret.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Password-policy configuration; each rule is independently toggleable.
#[derive(Clone, Debug)]
pub struct PasswordPolicy {
    min_length: usize,
    require_uppercase: bool,
    require_lowercase: bool,
    require_digit: bool,
    require_symbol: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_symbol: false,
        }
    }
}

impl PasswordPolicy {
    #[must_use]
    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length;
        self
    }

    #[must_use]
    pub fn with_require_uppercase(mut self, required: bool) -> Self {
        self.require_uppercase = required;
        self
    }

    #[must_use]
    pub fn with_require_lowercase(mut self, required: bool) -> Self {
        self.require_lowercase = required;
        self
    }

    #[must_use]
    pub fn with_require_digit(mut self, required: bool) -> Self {
        self.require_digit = required;
        self
    }

    #[must_use]
    pub fn with_require_symbol(mut self, required: bool) -> Self {
        self.require_symbol = required;
        self
    }

    /// Check a plaintext against the policy, accumulating every unmet rule so
    /// all violations are reported together.
    #[must_use]
    pub fn violations(&self, plaintext: &str) -> Vec<String> {
        let mut errors = Vec::new();
        if plaintext.chars().count() < self.min_length {
            errors.push(format!(
                "Password must be at least {} characters long",
                self.min_length
            ));
        }
        if self.require_uppercase && !plaintext.chars().any(char::is_uppercase) {
            errors.push("Password must contain an uppercase letter".to_string());
        }
        if self.require_lowercase && !plaintext.chars().any(char::is_lowercase) {
            errors.push("Password must contain a lowercase letter".to_string());
        }
        if self.require_digit && !plaintext.chars().any(|c| c.is_ascii_digit()) {
            errors.push("Password must contain a digit".to_string());
        }
        if self.require_symbol && plaintext.chars().all(char::is_alphanumeric) {
            errors.push("Password must contain a symbol".to_string());
        }
        errors
    }
}
