//! Small helpers for credential validation and session token generation.

use anyhow::{Context, Result};
use rand::{RngCore, rngs::OsRng};
use regex::Regex;

/// Normalize an email for lookup/lockout keys.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Login names are optional; when present they must be at least three
/// characters from `[A-Za-z0-9._-]`.
#[must_use]
pub fn valid_login_name(login_name: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9._-]{3,}$").is_ok_and(|regex| regex.is_match(login_name))
}

/// Create a new opaque session token (32 random bytes, hex-encoded).
///
/// The raw value lives only inside the session records; it is never logged.
pub fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(hex::encode(bytes))
}
