//! Remote-store seams: credential profiles, roles, and the audit log.
//!
//! The security core never talks to a database directly; it goes through
//! these traits. Postgres implementations live in [`postgres`], in-memory
//! implementations (for embedding and tests) in [`memory`].

mod memory;
mod postgres;

pub use memory::{MemoryAuditSink, MemoryProfileStore, MemoryRoleStore};
pub use postgres::{PgAuditSink, PgProfileStore, PgRoleStore};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditQuery};

/// Stored credential record, fetched fresh on every login attempt and never
/// cached by the core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub id: Uuid,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_name: Option<String>,
    /// Format `hex(salt):hex(digest)`.
    pub hashed_password: String,
    pub active: bool,
    pub role: String,
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch the active credential record for an email (and login name, when
    /// supplied). Exactly one row is expected; zero or multiple rows are both
    /// reported as `None`.
    async fn fetch_credential(
        &self,
        email: &str,
        login_name: Option<&str>,
    ) -> Result<Option<CredentialRecord>>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Fetch the explicit role assignment for a user, if any.
    async fn fetch_role(&self, user_id: Uuid) -> Result<Option<String>>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Bulk-append a batch of audit events to the remote log.
    async fn append(&self, events: &[AuditEvent]) -> Result<()>;

    /// Filtered, paginated read against the log, newest first.
    async fn query(&self, filter: &AuditQuery) -> Result<Vec<AuditEvent>>;
}
