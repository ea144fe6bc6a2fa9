//! Postgres-backed store implementations.
//!
//! Credential and role reads hit the remote profile store fresh on every
//! call; audit writes go to an append-only log table in bulk.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use tracing::Instrument;
use uuid::Uuid;

use super::{AuditSink, CredentialRecord, ProfileStore, RoleStore};
use crate::audit::{AuditEvent, AuditEventType, AuditQuery, AuditSeverity};
use crate::auth::Role;

#[derive(Clone, Debug)]
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn fetch_credential(
        &self,
        email: &str,
        login_name: Option<&str>,
    ) -> Result<Option<CredentialRecord>> {
        // LIMIT 2 so an ambiguous (duplicated) profile is detectable without
        // scanning further; zero and multiple rows are both "not found".
        let rows = match login_name {
            Some(login_name) => {
                let query = "SELECT id, email, login_name, hashed_password, active, role \
                             FROM profiles \
                             WHERE email = $1 AND login_name = $2 AND active = TRUE LIMIT 2";
                let span = tracing::info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "SELECT",
                    db.statement = query
                );
                sqlx::query(query)
                    .bind(email)
                    .bind(login_name)
                    .fetch_all(&self.pool)
                    .instrument(span)
                    .await
            }
            None => {
                let query = "SELECT id, email, login_name, hashed_password, active, role \
                             FROM profiles \
                             WHERE email = $1 AND active = TRUE LIMIT 2";
                let span = tracing::info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "SELECT",
                    db.statement = query
                );
                sqlx::query(query)
                    .bind(email)
                    .fetch_all(&self.pool)
                    .instrument(span)
                    .await
            }
        }
        .context("failed to fetch credential record")?;

        if rows.len() != 1 {
            return Ok(None);
        }
        let row = &rows[0];
        Ok(Some(CredentialRecord {
            id: row.get("id"),
            email: row.get("email"),
            login_name: row.get("login_name"),
            hashed_password: row.get("hashed_password"),
            active: row.get("active"),
            role: row.get("role"),
        }))
    }
}

#[derive(Clone, Debug)]
pub struct PgRoleStore {
    pool: PgPool,
}

impl PgRoleStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleStore for PgRoleStore {
    async fn fetch_role(&self, user_id: Uuid) -> Result<Option<String>> {
        let query = "SELECT role FROM user_roles WHERE user_id = $1 LIMIT 1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch user role")?;
        Ok(row.map(|row| row.get("role")))
    }
}

#[derive(Clone, Debug)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn append(&self, events: &[AuditEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO audit_logs \
             (id, user_id, user_email, user_role, event_type, severity, description, details, \
              ip_address, user_agent, resource_id, resource_type, old_values, new_values, \
              created_at) ",
        );
        builder.push_values(events, |mut row, event| {
            row.push_bind(event.id)
                .push_bind(event.user_id)
                .push_bind(&event.user_email)
                .push_bind(event.user_role.map(Role::as_str))
                .push_bind(event.event_type.as_str())
                .push_bind(event.severity.as_str())
                .push_bind(&event.description)
                .push_bind(Value::Object(event.details.clone()))
                .push_bind(&event.ip_address)
                .push_bind(&event.user_agent)
                .push_bind(&event.resource_id)
                .push_bind(&event.resource_type)
                .push_bind(&event.old_values)
                .push_bind(&event.new_values)
                .push_bind(event.created_at);
        });

        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = "INSERT INTO audit_logs"
        );
        builder
            .build()
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to append audit events")?;
        Ok(())
    }

    async fn query(&self, filter: &AuditQuery) -> Result<Vec<AuditEvent>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, user_id, user_email, user_role, event_type, severity, description, \
             details, ip_address, user_agent, resource_id, resource_type, old_values, \
             new_values, created_at \
             FROM audit_logs WHERE 1 = 1",
        );
        if let Some(user_id) = filter.user_id() {
            builder.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(event_type) = filter.event_type() {
            builder.push(" AND event_type = ").push_bind(event_type.as_str());
        }
        if let Some(severity) = filter.severity() {
            builder.push(" AND severity = ").push_bind(severity.as_str());
        }
        if let Some(from) = filter.from() {
            builder.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(until) = filter.until() {
            builder.push(" AND created_at < ").push_bind(until);
        }
        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(filter.limit())
            .push(" OFFSET ")
            .push_bind(filter.offset());

        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = "SELECT FROM audit_logs"
        );
        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to query audit events")?;

        rows.iter().map(row_to_event).collect()
    }
}

fn row_to_event(row: &PgRow) -> Result<AuditEvent> {
    let event_type: String = row.get("event_type");
    let event_type = AuditEventType::parse(&event_type)
        .ok_or_else(|| anyhow!("unknown audit event type '{event_type}'"))?;
    let severity: String = row.get("severity");
    let severity = AuditSeverity::parse(&severity)
        .ok_or_else(|| anyhow!("unknown audit severity '{severity}'"))?;
    let user_role: Option<String> = row.get("user_role");
    let details: Value = row.get("details");
    let details = match details {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };

    Ok(AuditEvent {
        id: row.get("id"),
        user_id: row.get("user_id"),
        user_email: row.get("user_email"),
        user_role: user_role.as_deref().and_then(Role::parse),
        event_type,
        severity,
        description: row.get("description"),
        details,
        ip_address: row.get("ip_address"),
        user_agent: row.get("user_agent"),
        resource_id: row.get("resource_id"),
        resource_type: row.get("resource_type"),
        old_values: row.get("old_values"),
        new_values: row.get("new_values"),
        created_at: row.get("created_at"),
    })
}
