//! Session lifecycle: persistence, renewal, teardown, and route authorization.
//!
//! State machine per session: `None → Active → (NearExpiry → Renewed →
//! Active) → Expired/Cleared`. Expiry is evaluated lazily on read; the only
//! scheduled timers live in [`monitor`].

mod monitor;
mod store;

pub use monitor::{SessionMonitorHandle, SessionSignal, spawn_monitors};
pub use store::{DualSessionStore, MemorySessionStore, SessionStore};

use anyhow::{Context, Result};
use chrono::Duration;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::warn;

use crate::audit::{AuditEventType, AuditLogQueue};
use crate::auth::{AuthSession, RefreshRecord, Role, SecurityManager};
use crate::clock::Clock;

pub(crate) const SESSION_KEY: &str = "crm_auth_session";
pub(crate) const REFRESH_KEY: &str = "crm_session_refresh";

const DEFAULT_RENEWAL_BUFFER_SECONDS: i64 = 5 * 60;
const DEFAULT_IDLE_TIMEOUT_SECONDS: u64 = 30 * 60;
const DEFAULT_LIVENESS_INTERVAL_SECONDS: u64 = 60;

#[derive(Clone, Debug)]
pub struct SessionConfig {
    renewal_buffer_seconds: i64,
    idle_timeout_seconds: u64,
    liveness_interval_seconds: u64,
    public_routes: Vec<String>,
    manager_prefixes: Vec<String>,
    agent_prefixes: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            renewal_buffer_seconds: DEFAULT_RENEWAL_BUFFER_SECONDS,
            idle_timeout_seconds: DEFAULT_IDLE_TIMEOUT_SECONDS,
            liveness_interval_seconds: DEFAULT_LIVENESS_INTERVAL_SECONDS,
            public_routes: vec![
                "/".to_string(),
                "/login".to_string(),
                "/forgot-password".to_string(),
            ],
            manager_prefixes: vec!["/admin".to_string()],
            agent_prefixes: vec!["/workspace".to_string()],
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_renewal_buffer_seconds(mut self, seconds: i64) -> Self {
        self.renewal_buffer_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_idle_timeout_seconds(mut self, seconds: u64) -> Self {
        self.idle_timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_liveness_interval_seconds(mut self, seconds: u64) -> Self {
        self.liveness_interval_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_public_routes(mut self, routes: Vec<String>) -> Self {
        self.public_routes = routes;
        self
    }

    #[must_use]
    pub fn with_manager_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.manager_prefixes = prefixes;
        self
    }

    #[must_use]
    pub fn with_agent_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.agent_prefixes = prefixes;
        self
    }

    #[must_use]
    pub fn renewal_buffer_seconds(&self) -> i64 {
        self.renewal_buffer_seconds
    }

    #[must_use]
    pub fn idle_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.idle_timeout_seconds)
    }

    #[must_use]
    pub fn liveness_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.liveness_interval_seconds)
    }
}

/// Owns the persisted session copies in both scopes; the single writer for
/// session state.
pub struct SessionManager {
    security: Arc<SecurityManager>,
    stores: DualSessionStore,
    config: SessionConfig,
    audit: Arc<AuditLogQueue>,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        security: Arc<SecurityManager>,
        stores: DualSessionStore,
        config: SessionConfig,
        audit: Arc<AuditLogQueue>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            security,
            stores,
            config,
            audit,
            clock,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Persist a session (and its refresh record) to both storage scopes.
    ///
    /// # Errors
    /// Only on serialization failure, which indicates a bug rather than an
    /// environmental condition.
    pub fn save(&self, session: &AuthSession) -> Result<()> {
        let payload = serde_json::to_string(session).context("failed to serialize session")?;
        let refresh = RefreshRecord {
            user_id: session.user.id,
            token: session.token.clone(),
            created_at: self.clock.now(),
        };
        let refresh_payload =
            serde_json::to_string(&refresh).context("failed to serialize refresh record")?;

        self.stores.write(SESSION_KEY, &payload);
        self.stores.write(REFRESH_KEY, &refresh_payload);
        Ok(())
    }

    /// Load the current session, renewing it when it is close to expiry.
    ///
    /// Corrupted or expired state clears both scopes and reports `None`. A
    /// failed renewal of a still-valid session returns the original session
    /// rather than forcing a logout.
    pub async fn load(&self) -> Option<AuthSession> {
        let raw = self.stores.read(SESSION_KEY)?;
        let session: AuthSession = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(err) => {
                warn!("Stored session is corrupted, clearing: {err}");
                self.clear();
                return None;
            }
        };

        if !self.security.validate_session(&session) {
            self.clear();
            return None;
        }

        let remaining = session.expires_at - self.clock.now();
        if remaining <= Duration::seconds(self.config.renewal_buffer_seconds) {
            if let Some(renewed) = self.refresh(&session).await {
                return Some(renewed);
            }
        }
        Some(session)
    }

    /// Replace a still-valid session with a brand-new one for the same user.
    ///
    /// Returns `None` (and clears state) if the session already expired, or
    /// `None` without clearing if minting/persisting the replacement failed.
    pub async fn refresh(&self, session: &AuthSession) -> Option<AuthSession> {
        if !self.security.validate_session(session) {
            self.clear();
            return None;
        }

        let renewed = match self.security.create_session(&session.user) {
            Ok(renewed) => renewed,
            Err(err) => {
                warn!("Session renewal failed: {err}");
                return None;
            }
        };
        if let Err(err) = self.save(&renewed) {
            warn!("Failed to persist renewed session: {err}");
            return None;
        }
        self.audit.log_auth_event(
            AuditEventType::SessionRefreshed,
            &renewed.user.email,
            Some(&renewed.user),
            "Session renewed before expiry",
        );
        Some(renewed)
    }

    /// Remove the session and refresh record from both scopes.
    ///
    /// The single choke point for logout, corruption recovery, and forced
    /// logout; idempotent and side-effect-free when nothing is stored.
    pub fn clear(&self) {
        self.stores.remove(SESSION_KEY);
        self.stores.remove(REFRESH_KEY);
    }

    /// Explicit user-initiated logout.
    pub fn logout(&self) {
        if let Some(session) = self.peek() {
            self.audit.log_auth_event(
                AuditEventType::Logout,
                &session.user.email,
                Some(&session.user),
                "User signed out",
            );
        }
        self.clear();
    }

    /// Logout not initiated by the user (idle timeout, liveness loss).
    pub fn force_logout(&self, reason: &str) {
        if let Some(session) = self.peek() {
            self.audit.log_auth_event(
                AuditEventType::ForcedLogout,
                &session.user.email,
                Some(&session.user),
                reason,
            );
        }
        self.clear();
    }

    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.peek().map(|session| session.user.role)
    }

    #[must_use]
    pub fn permissions(&self) -> BTreeSet<String> {
        self.peek()
            .map(|session| session.permissions)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn has_permission(&self, name: &str) -> bool {
        self.peek()
            .is_some_and(|session| session.permissions.contains(name))
    }

    /// Route authorization: public routes are always allowed; manager areas
    /// require the manager role; agent areas allow agent or manager; any
    /// other route requires only a valid session. No session → public only.
    #[must_use]
    pub fn can_access_route(&self, route: &str) -> bool {
        if self.config.public_routes.iter().any(|public| public == route) {
            return true;
        }
        let Some(session) = self.peek() else {
            return false;
        };
        let role = session.user.role;
        if self
            .config
            .manager_prefixes
            .iter()
            .any(|prefix| route.starts_with(prefix))
        {
            return role == Role::Manager;
        }
        if self
            .config
            .agent_prefixes
            .iter()
            .any(|prefix| route.starts_with(prefix))
        {
            return matches!(role, Role::Agent | Role::Manager);
        }
        true
    }

    /// Read the stored session without renewal or cleanup side effects.
    /// Used by the synchronous query paths; `load` owns the state
    /// transitions.
    fn peek(&self) -> Option<AuthSession> {
        let raw = self.stores.read(SESSION_KEY)?;
        let session: AuthSession = serde_json::from_str(&raw).ok()?;
        if self.security.validate_session(&session) {
            Some(session)
        } else {
            None
        }
    }
}
