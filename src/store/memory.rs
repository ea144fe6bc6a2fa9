//! In-memory store implementations for embedding and tests.
//!
//! The audit sink supports fault injection so retry behavior can be exercised
//! without a real remote log.

use anyhow::{Result, bail};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

use super::{AuditSink, CredentialRecord, ProfileStore, RoleStore};
use crate::audit::{AuditEvent, AuditQuery};

#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<Vec<CredentialRecord>>,
}

impl MemoryProfileStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: CredentialRecord) {
        self.profiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn fetch_credential(
        &self,
        email: &str,
        login_name: Option<&str>,
    ) -> Result<Option<CredentialRecord>> {
        let profiles = self
            .profiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let matches: Vec<&CredentialRecord> = profiles
            .iter()
            .filter(|record| {
                record.active
                    && record.email == email
                    && login_name.is_none_or(|name| record.login_name.as_deref() == Some(name))
            })
            .collect();
        // Zero or multiple rows are both "not found".
        if matches.len() == 1 {
            Ok(Some(matches[0].clone()))
        } else {
            Ok(None)
        }
    }
}

#[derive(Default)]
pub struct MemoryRoleStore {
    roles: Mutex<HashMap<Uuid, String>>,
}

impl MemoryRoleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&self, user_id: Uuid, role: impl Into<String>) {
        self.roles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id, role.into());
    }
}

#[async_trait]
impl RoleStore for MemoryRoleStore {
    async fn fetch_role(&self, user_id: Uuid) -> Result<Option<String>> {
        Ok(self
            .roles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .cloned())
    }
}

#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
    append_calls: AtomicUsize,
    fail_appends: AtomicUsize,
    fail_queries: AtomicUsize,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` append calls fail (fault injection).
    pub fn fail_next_appends(&self, count: usize) {
        self.fail_appends.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` query calls fail (fault injection).
    pub fn fail_next_queries(&self, count: usize) {
        self.fail_queries.store(count, Ordering::SeqCst);
    }

    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }

    fn should_fail(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, events: &[AuditEvent]) -> Result<()> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        if Self::should_fail(&self.fail_appends) {
            bail!("simulated audit sink append failure");
        }
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(events);
        Ok(())
    }

    async fn query(&self, filter: &AuditQuery) -> Result<Vec<AuditEvent>> {
        if Self::should_fail(&self.fail_queries) {
            bail!("simulated audit sink query failure");
        }
        let mut matches: Vec<AuditEvent> = self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|event| filter.matches(event))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let offset = usize::try_from(filter.offset()).unwrap_or(0);
        let limit = usize::try_from(filter.limit()).unwrap_or(usize::MAX);
        Ok(matches.into_iter().skip(offset).take(limit).collect())
    }
}
