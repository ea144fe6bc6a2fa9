//! Asynchronous, retry-capable audit-event queue.
//!
//! Events are appended to an in-memory FIFO buffer and flushed to the remote
//! log in batches of up to ten. A failed batch is pushed back to the front of
//! the buffer (preserving order) and retried after a fixed backoff. A single
//! boolean guard keeps concurrent drains from interleaving; delivery is
//! at-least-once. Audit failures never surface to callers.

mod types;

pub use types::{AuditEvent, AuditEventType, AuditQuery, AuditSeverity};

use serde_json::{Map, Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::auth::SecureUser;
use crate::clock::Clock;
use crate::store::AuditSink;

const BATCH_SIZE: usize = 10;
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Caller context stamped onto every event that does not carry its own.
#[derive(Clone, Debug, Default)]
pub struct AuditContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

pub struct AuditLogQueue {
    sink: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    context: AuditContext,
    pending: Mutex<VecDeque<AuditEvent>>,
    draining: AtomicBool,
}

impl AuditLogQueue {
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            sink,
            clock,
            context: AuditContext::default(),
            pending: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: AuditContext) -> Self {
        self.context = context;
        self
    }

    /// Stamp id, timestamp, and caller context onto `event`, enqueue it, and
    /// trigger a background drain. Triggering is idempotent: overlapping
    /// triggers never double-drain.
    pub fn log_event(self: &Arc<Self>, mut event: AuditEvent) {
        event.id = Uuid::new_v4();
        event.created_at = self.clock.now();
        if event.ip_address.is_none() {
            event.ip_address = self.context.ip_address.clone();
        }
        if event.user_agent.is_none() {
            event.user_agent = self.context.user_agent.clone();
        }

        {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.push_back(event);
        }
        self.trigger_drain();
    }

    /// Record an authentication outcome (login, logout, lockout, renewal).
    pub fn log_auth_event(
        self: &Arc<Self>,
        event_type: AuditEventType,
        email: &str,
        user: Option<&SecureUser>,
        description: &str,
    ) {
        let mut event = AuditEvent::new(event_type, description);
        event.user_email = email.to_string();
        event.user_id = user.map(|user| user.id);
        event.user_role = user.map(|user| user.role);
        self.log_event(event);
    }

    /// Record a business action with before/after value diffs for
    /// auditability.
    #[allow(clippy::too_many_arguments)]
    pub fn log_user_action(
        self: &Arc<Self>,
        user: &SecureUser,
        event_type: AuditEventType,
        resource_type: &str,
        resource_id: &str,
        description: &str,
        old_values: Option<Value>,
        new_values: Option<Value>,
    ) {
        let mut event = AuditEvent::new(event_type, description);
        event.user_id = Some(user.id);
        event.user_email = user.email.clone();
        event.user_role = Some(user.role);
        event.resource_type = Some(resource_type.to_string());
        event.resource_id = Some(resource_id.to_string());
        event.old_values = old_values;
        event.new_values = new_values;
        self.log_event(event);
    }

    /// Record an internal failure with free-form context; stamped `high`
    /// severity by default.
    pub fn log_system_error(self: &Arc<Self>, message: &str, context: Value) {
        let mut event = AuditEvent::new(AuditEventType::SystemError, message);
        event.details = match context {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("context".to_string(), other);
                map
            }
        };
        event
            .details
            .insert("message".to_string(), json!(message));
        self.log_event(event);
    }

    /// Best-effort read-only query; any sink error degrades to an empty list.
    pub async fn query_events(&self, filter: &AuditQuery) -> Vec<AuditEvent> {
        match self.sink.query(filter).await {
            Ok(events) => events,
            Err(err) => {
                warn!("Audit query failed: {err}");
                Vec::new()
            }
        }
    }

    /// Number of events still waiting for a confirmed remote write.
    pub fn pending_events(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Run one drain pass to completion. Used at shutdown and in tests; the
    /// normal path drains in the background via [`Self::log_event`].
    pub async fn flush(self: &Arc<Self>) {
        Self::drain(Arc::clone(self)).await;
    }

    fn trigger_drain(self: &Arc<Self>) {
        // Outside a runtime the event stays queued until the next trigger or
        // an explicit flush.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let queue = Arc::clone(self);
        handle.spawn(async move {
            Self::drain(queue).await;
        });
    }

    // Boxed return type breaks the `Send` inference cycle created by the
    // recursive retry spawn below.
    fn drain(
        self: Arc<Self>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(async move {
        // Single-drain guard: whoever flips the flag owns the loop.
        if self.draining.swap(true, Ordering::SeqCst) {
            return;
        }

        loop {
            let batch: Vec<AuditEvent> = {
                let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
                let take = pending.len().min(BATCH_SIZE);
                pending.drain(..take).collect()
            };
            if batch.is_empty() {
                self.draining.store(false, Ordering::SeqCst);
                // An event enqueued between the empty read and the flag
                // clearing had its trigger bounce off the guard; re-check so
                // it is not stranded until the next trigger.
                let backlog = !self
                    .pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_empty();
                if !backlog || self.draining.swap(true, Ordering::SeqCst) {
                    return;
                }
                continue;
            }

            if let Err(err) = self.sink.append(&batch).await {
                warn!(
                    "Audit batch write failed, requeueing {} events: {err}",
                    batch.len()
                );
                {
                    let mut pending =
                        self.pending.lock().unwrap_or_else(PoisonError::into_inner);
                    // Front re-insertion keeps original FIFO order on retry.
                    for event in batch.into_iter().rev() {
                        pending.push_front(event);
                    }
                }
                let queue = Arc::clone(&self);
                tokio::spawn(async move {
                    tokio::time::sleep(RETRY_BACKOFF).await;
                    Self::drain(queue).await;
                });
                // The scheduled retry re-acquires the guard and picks up any
                // events that arrived meanwhile.
                self.draining.store(false, Ordering::SeqCst);
                return;
            }
        }
        })
    }
}
