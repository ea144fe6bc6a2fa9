//! Error taxonomy for the credential and session paths.
//!
//! Raw remote-store errors never reach callers; everything is normalized here
//! before leaving the security boundary. "Unknown user" and "wrong password"
//! are deliberately the same variant to prevent account enumeration.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Credential format or password-policy violations, one message per rule.
    #[error("invalid input: {0:?}")]
    InvalidInput(Vec<String>),

    /// Too many failed attempts inside the lockout window.
    #[error("account temporarily locked, retry in {retry_after_minutes} minutes")]
    Locked { retry_after_minutes: u64 },

    /// Covers both "no such user" and "wrong password".
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Remote-store or token-generation failure, already logged internally.
    #[error("internal error")]
    Internal,

    #[error("session expired")]
    SessionExpired,

    #[error("session corrupted")]
    SessionCorrupted,
}

impl AuthError {
    /// User-facing message; never includes stack traces or store errors.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidInput(errors) => errors.join("; "),
            Self::Locked {
                retry_after_minutes,
            } => {
                format!("Account temporarily locked, retry in {retry_after_minutes} minutes")
            }
            Self::InvalidCredentials => "Invalid email or password".to_string(),
            Self::Internal => "Something went wrong, try again".to_string(),
            Self::SessionExpired | Self::SessionCorrupted => {
                "Your session has ended, please sign in again".to_string()
            }
        }
    }
}
