//! Audit event model and query filters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::auth::Role;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AuditSeverity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    LoginSuccess,
    LoginFailed,
    AccountLocked,
    Logout,
    SessionRefreshed,
    ForcedLogout,
    DataCreated,
    DataUpdated,
    DataDeleted,
    SystemError,
}

impl AuditEventType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoginSuccess => "login_success",
            Self::LoginFailed => "login_failed",
            Self::AccountLocked => "account_locked",
            Self::Logout => "logout",
            Self::SessionRefreshed => "session_refreshed",
            Self::ForcedLogout => "forced_logout",
            Self::DataCreated => "data_created",
            Self::DataUpdated => "data_updated",
            Self::DataDeleted => "data_deleted",
            Self::SystemError => "system_error",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "login_success" => Some(Self::LoginSuccess),
            "login_failed" => Some(Self::LoginFailed),
            "account_locked" => Some(Self::AccountLocked),
            "logout" => Some(Self::Logout),
            "session_refreshed" => Some(Self::SessionRefreshed),
            "forced_logout" => Some(Self::ForcedLogout),
            "data_created" => Some(Self::DataCreated),
            "data_updated" => Some(Self::DataUpdated),
            "data_deleted" => Some(Self::DataDeleted),
            "system_error" => Some(Self::SystemError),
            _ => None,
        }
    }

    /// Severity stamped on events unless the caller overrides it.
    #[must_use]
    pub const fn default_severity(self) -> AuditSeverity {
        match self {
            Self::LoginSuccess | Self::Logout | Self::SessionRefreshed | Self::DataCreated => {
                AuditSeverity::Low
            }
            Self::LoginFailed | Self::ForcedLogout | Self::DataUpdated | Self::DataDeleted => {
                AuditSeverity::Medium
            }
            Self::AccountLocked | Self::SystemError => AuditSeverity::High,
        }
    }
}

/// Immutable record of a security- or business-relevant action.
///
/// `id` and `created_at` are stamped by the queue when the event is enqueued;
/// constructors leave placeholders.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    pub user_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_role: Option<Role>,
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    pub description: String,
    #[serde(default)]
    pub details: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_values: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_values: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    #[must_use]
    pub fn new(event_type: AuditEventType, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::nil(),
            user_id: None,
            user_email: String::new(),
            user_role: None,
            event_type,
            severity: event_type.default_severity(),
            description: description.into(),
            details: Map::new(),
            ip_address: None,
            user_agent: None,
            resource_id: None,
            resource_type: None,
            old_values: None,
            new_values: None,
            created_at: Utc::now(),
        }
    }
}

/// Filters for best-effort audit queries, paginated with limit/offset.
#[derive(Clone, Debug)]
pub struct AuditQuery {
    user_id: Option<Uuid>,
    event_type: Option<AuditEventType>,
    severity: Option<AuditSeverity>,
    from: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    limit: i64,
    offset: i64,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            user_id: None,
            event_type: None,
            severity: None,
            from: None,
            until: None,
            limit: 50,
            offset: 0,
        }
    }
}

impl AuditQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    #[must_use]
    pub fn with_event_type(mut self, event_type: AuditEventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    #[must_use]
    pub fn with_time_range(mut self, from: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.until = Some(until);
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    #[must_use]
    pub fn user_id(&self) -> Option<Uuid> {
        self.user_id
    }

    #[must_use]
    pub fn event_type(&self) -> Option<AuditEventType> {
        self.event_type
    }

    #[must_use]
    pub fn severity(&self) -> Option<AuditSeverity> {
        self.severity
    }

    #[must_use]
    pub fn from(&self) -> Option<DateTime<Utc>> {
        self.from
    }

    #[must_use]
    pub fn until(&self) -> Option<DateTime<Utc>> {
        self.until
    }

    #[must_use]
    pub fn limit(&self) -> i64 {
        self.limit
    }

    #[must_use]
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Whether an event matches every set filter (used by in-memory sinks).
    #[must_use]
    pub fn matches(&self, event: &AuditEvent) -> bool {
        if self.user_id.is_some() && event.user_id != self.user_id {
            return false;
        }
        if let Some(event_type) = self.event_type {
            if event.event_type != event_type {
                return false;
            }
        }
        if let Some(severity) = self.severity {
            if event.severity != severity {
                return false;
            }
        }
        if let Some(from) = self.from {
            if event.created_at < from {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.created_at >= until {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::{AuditEvent, AuditEventType, AuditQuery, AuditSeverity};
    use chrono::Duration;
    use uuid::Uuid;

    #[test]
    fn event_type_round_trips_as_str() {
        for event_type in [
            AuditEventType::LoginSuccess,
            AuditEventType::LoginFailed,
            AuditEventType::AccountLocked,
            AuditEventType::Logout,
            AuditEventType::SessionRefreshed,
            AuditEventType::ForcedLogout,
            AuditEventType::DataCreated,
            AuditEventType::DataUpdated,
            AuditEventType::DataDeleted,
            AuditEventType::SystemError,
        ] {
            assert_eq!(AuditEventType::parse(event_type.as_str()), Some(event_type));
        }
        assert_eq!(AuditEventType::parse("unknown"), None);
    }

    #[test]
    fn severity_defaults_escalate_for_security_events() {
        assert_eq!(
            AuditEventType::LoginSuccess.default_severity(),
            AuditSeverity::Low
        );
        assert_eq!(
            AuditEventType::AccountLocked.default_severity(),
            AuditSeverity::High
        );
        assert_eq!(
            AuditEventType::SystemError.default_severity(),
            AuditSeverity::High
        );
    }

    #[test]
    fn query_matches_respects_all_filters() {
        let user_id = Uuid::new_v4();
        let mut event = AuditEvent::new(AuditEventType::LoginFailed, "failed login");
        event.user_id = Some(user_id);

        assert!(AuditQuery::new().matches(&event));
        assert!(AuditQuery::new().with_user_id(user_id).matches(&event));
        assert!(
            !AuditQuery::new()
                .with_user_id(Uuid::new_v4())
                .matches(&event)
        );
        assert!(
            !AuditQuery::new()
                .with_event_type(AuditEventType::Logout)
                .matches(&event)
        );
        assert!(
            !AuditQuery::new()
                .with_severity(AuditSeverity::Critical)
                .matches(&event)
        );

        let now = event.created_at;
        assert!(
            AuditQuery::new()
                .with_time_range(now - Duration::minutes(1), now + Duration::minutes(1))
                .matches(&event)
        );
        assert!(
            !AuditQuery::new()
                .with_time_range(now + Duration::minutes(1), now + Duration::minutes(2))
                .matches(&event)
        );
    }
}
