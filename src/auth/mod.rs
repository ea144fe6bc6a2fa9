//! Credential authentication and session minting.
//!
//! Flow Overview: validate input → lockout gate → fetch credential record →
//! constant-time verify → resolve role and permissions → mint session.
//!
//! Unknown users and wrong passwords are indistinguishable to callers, and a
//! failed attempt is recorded against the submitted email even when no such
//! profile exists, so probing unknown accounts trips the same lockout as
//! guessing a real password.

mod error;
mod lockout;
mod password;
mod permissions;
mod types;
mod utils;

pub use error::AuthError;
pub use lockout::LockoutTracker;
pub use password::{PasswordPolicy, hash_password, verify_password};
pub use permissions::Role;
pub use types::{AuthSession, Credentials, RefreshRecord, SecureUser};
pub use utils::{generate_session_token, normalize_email, valid_email, valid_login_name};

use chrono::Duration;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

use crate::audit::{AuditEventType, AuditLogQueue};
use crate::clock::Clock;
use crate::store::{CredentialRecord, ProfileStore, RoleStore};

const DEFAULT_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_LOCKOUT_SECONDS: i64 = 15 * 60;
const DEFAULT_SESSION_TTL_SECONDS: i64 = 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct SecurityConfig {
    max_attempts: u32,
    lockout_seconds: i64,
    session_ttl_seconds: i64,
    password_policy: PasswordPolicy,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            lockout_seconds: DEFAULT_LOCKOUT_SECONDS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            password_policy: PasswordPolicy::default(),
        }
    }
}

impl SecurityConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_lockout_seconds(mut self, seconds: i64) -> Self {
        self.lockout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_password_policy(mut self, policy: PasswordPolicy) -> Self {
        self.password_policy = policy;
        self
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    pub(crate) fn password_policy(&self) -> &PasswordPolicy {
        &self.password_policy
    }
}

/// Explicitly constructed, dependency-injected security orchestrator; owns
/// the lockout state and nothing else mutable.
pub struct SecurityManager {
    config: SecurityConfig,
    profiles: Arc<dyn ProfileStore>,
    roles: Arc<dyn RoleStore>,
    audit: Arc<AuditLogQueue>,
    lockout: LockoutTracker,
    clock: Arc<dyn Clock>,
}

impl SecurityManager {
    #[must_use]
    pub fn new(
        config: SecurityConfig,
        profiles: Arc<dyn ProfileStore>,
        roles: Arc<dyn RoleStore>,
        audit: Arc<AuditLogQueue>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let lockout =
            LockoutTracker::new(config.max_attempts, config.lockout_seconds, clock.clone());
        Self {
            config,
            profiles,
            roles,
            audit,
            lockout,
            clock,
        }
    }

    /// Authenticate a login request.
    ///
    /// # Errors
    /// `InvalidInput` for format/policy violations (all accumulated),
    /// `Locked` while the lockout window holds, `InvalidCredentials` for both
    /// unknown users and wrong passwords, `Internal` only for failures the
    /// caller cannot act on.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<SecureUser, AuthError> {
        let email = normalize_email(&credentials.email);

        let mut errors = Vec::new();
        if !valid_email(&email) {
            errors.push("Invalid email address".to_string());
        }
        errors.extend(self.config.password_policy().violations(&credentials.password));
        if let Some(login_name) = &credentials.login_name {
            if !valid_login_name(login_name) {
                errors.push(
                    "Login name must be at least 3 characters from letters, digits, '.', '_', '-'"
                        .to_string(),
                );
            }
        }
        if !errors.is_empty() {
            return Err(AuthError::InvalidInput(errors));
        }

        if self.lockout.is_locked(&email) {
            self.audit.log_auth_event(
                AuditEventType::AccountLocked,
                &email,
                None,
                "Login rejected while account is locked",
            );
            return Err(AuthError::Locked {
                retry_after_minutes: self.lockout.retry_after_minutes(&email),
            });
        }

        let record = match self
            .profiles
            .fetch_credential(&email, credentials.login_name.as_deref())
            .await
        {
            Ok(record) => record,
            Err(err) => {
                // Store failures must look like a failed login to the caller.
                error!("Credential lookup failed: {err}");
                self.audit
                    .log_system_error("credential lookup failed", json!({ "email": email }));
                return Err(self.record_failure(&email));
            }
        };

        let Some(record) = record else {
            return Err(self.record_failure(&email));
        };

        if !verify_password(&credentials.password, &record.hashed_password) {
            return Err(self.record_failure(&email));
        }

        self.lockout.record_attempt(&email, true);
        let role = self.resolve_role(&record).await;
        let user = self.build_user(&record, role);
        self.audit.log_auth_event(
            AuditEventType::LoginSuccess,
            &user.email,
            Some(&user),
            "User signed in",
        );
        Ok(user)
    }

    /// Mint a fresh session for an authenticated user.
    ///
    /// # Errors
    /// `Internal` if token generation fails.
    pub fn create_session(&self, user: &SecureUser) -> Result<AuthSession, AuthError> {
        let token = generate_session_token().map_err(|err| {
            error!("Failed to generate session token: {err}");
            AuthError::Internal
        })?;
        Ok(AuthSession {
            user: user.clone(),
            token,
            expires_at: self.clock.now() + Duration::seconds(self.config.session_ttl_seconds),
            permissions: user.permissions.clone(),
        })
    }

    /// Pure expiry check; no remote calls. Valid strictly before `expires_at`.
    #[must_use]
    pub fn validate_session(&self, session: &AuthSession) -> bool {
        self.clock.now() < session.expires_at
    }

    #[must_use]
    pub fn lockout(&self) -> &LockoutTracker {
        &self.lockout
    }

    /// Record a failed attempt and decide the caller-visible error. The
    /// attempt that crosses the threshold itself reports `Locked`.
    fn record_failure(&self, email: &str) -> AuthError {
        self.lockout.record_attempt(email, false);
        self.audit.log_auth_event(
            AuditEventType::LoginFailed,
            email,
            None,
            "Failed login attempt",
        );
        if self.lockout.is_locked(email) {
            self.audit.log_auth_event(
                AuditEventType::AccountLocked,
                email,
                None,
                "Account locked after repeated failed logins",
            );
            AuthError::Locked {
                retry_after_minutes: self.lockout.retry_after_minutes(email),
            }
        } else {
            AuthError::InvalidCredentials
        }
    }

    /// Prefer the explicit role store, fall back to the profile's embedded
    /// role, default to least privilege.
    async fn resolve_role(&self, record: &CredentialRecord) -> Role {
        match self.roles.fetch_role(record.id).await {
            Ok(Some(value)) => {
                if let Some(role) = Role::parse(&value) {
                    return role;
                }
                warn!("Unknown role '{value}' for user {}, falling back", record.id);
            }
            Ok(None) => {}
            Err(err) => {
                warn!("Role lookup failed, falling back to profile role: {err}");
            }
        }
        Role::parse(&record.role).unwrap_or(Role::least_privileged())
    }

    fn build_user(&self, record: &CredentialRecord, role: Role) -> SecureUser {
        let display_name = record.login_name.clone().unwrap_or_else(|| {
            record
                .email
                .split_once('@')
                .map_or_else(|| record.email.clone(), |(local, _)| local.to_string())
        });
        SecureUser {
            id: record.id,
            email: record.email.clone(),
            display_name,
            role,
            login_name: record.login_name.clone(),
            active: record.active,
            created_at: self.clock.now(),
            last_login: Some(self.clock.now()),
            permissions: role.permissions(),
        }
    }
}
