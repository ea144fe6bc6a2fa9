//! Core data model: credentials, authenticated users, and sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use super::permissions::Role;

/// Login request payload. The password never appears in debug output.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    pub login_name: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("login_name", &self.login_name)
            .finish()
    }
}

/// Authenticated user; immutable for the lifetime of a session. A renewed
/// session carries a copy of the same user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SecureUser {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_name: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    pub permissions: BTreeSet<String>,
}

/// Session minted on login, replaced on renewal, deleted on logout/expiry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user: SecureUser,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub permissions: BTreeSet<String>,
}

/// Lightweight sibling record written next to the session in both scopes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefreshRecord {
    pub user_id: Uuid,
    pub token: String,
    pub created_at: DateTime<Utc>,
}
