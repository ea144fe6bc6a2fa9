//! Idle-timeout and liveness monitors.
//!
//! These are the crate's only actively scheduled timers; every other expiry
//! in the core is evaluated lazily on read. The idle monitor counts down and
//! is re-armed by activity signals; the liveness monitor polls the session
//! store on a fixed cadence and reports when the session disappears.

use std::sync::Arc;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::info;

use super::SessionManager;

/// Why the monitor forced the caller back to the login entry point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionSignal {
    /// No user activity for the configured idle timeout; state was cleared.
    IdleTimeout,
    /// The liveness poll found no session where one previously existed.
    SessionGone,
}

pub struct SessionMonitorHandle {
    activity: Arc<Notify>,
    idle_task: JoinHandle<()>,
    liveness_task: JoinHandle<()>,
}

impl SessionMonitorHandle {
    /// Re-arm the idle countdown; call on any user-activity signal.
    pub fn record_activity(&self) {
        self.activity.notify_one();
    }

    pub fn stop(&self) {
        self.idle_task.abort();
        self.liveness_task.abort();
    }
}

impl Drop for SessionMonitorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start both monitors for `manager`, using the timeouts from its config.
///
/// The receiver yields a signal whenever the caller must redirect to login.
#[must_use]
pub fn spawn_monitors(
    manager: Arc<SessionManager>,
) -> (SessionMonitorHandle, mpsc::UnboundedReceiver<SessionSignal>) {
    let activity = Arc::new(Notify::new());
    let (tx, rx) = mpsc::unbounded_channel();

    let idle_task = tokio::spawn(idle_loop(
        manager.clone(),
        activity.clone(),
        tx.clone(),
    ));
    let liveness_task = tokio::spawn(liveness_loop(manager, tx));

    (
        SessionMonitorHandle {
            activity,
            idle_task,
            liveness_task,
        },
        rx,
    )
}

async fn idle_loop(
    manager: Arc<SessionManager>,
    activity: Arc<Notify>,
    tx: mpsc::UnboundedSender<SessionSignal>,
) {
    let timeout = manager.config().idle_timeout();
    loop {
        tokio::select! {
            () = activity.notified() => {}
            () = tokio::time::sleep(timeout) => {
                info!("Idle timeout elapsed, forcing logout");
                manager.force_logout("Idle timeout");
                if tx.send(SessionSignal::IdleTimeout).is_err() {
                    return;
                }
                // Stay quiet until fresh activity re-arms the countdown.
                activity.notified().await;
            }
        }
    }
}

async fn liveness_loop(manager: Arc<SessionManager>, tx: mpsc::UnboundedSender<SessionSignal>) {
    let mut ticker = tokio::time::interval(manager.config().liveness_interval());
    // The first tick completes immediately; consume it so polling starts one
    // interval from now.
    ticker.tick().await;
    let mut had_session = manager.load().await.is_some();
    loop {
        ticker.tick().await;
        let present = manager.load().await.is_some();
        if had_session && !present {
            info!("Session disappeared, notifying for logout redirect");
            if tx.send(SessionSignal::SessionGone).is_err() {
                return;
            }
        }
        had_session = present;
    }
}

#[cfg(test)]
mod tests {
    use super::{SessionSignal, spawn_monitors};
    use crate::audit::AuditLogQueue;
    use crate::auth::{Credentials, SecurityConfig, SecurityManager, hash_password};
    use crate::clock::SystemClock;
    use crate::session::{DualSessionStore, SessionConfig, SessionManager};
    use crate::store::{CredentialRecord, MemoryAuditSink, MemoryProfileStore, MemoryRoleStore};
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    async fn manager_with_session(config: SessionConfig) -> Arc<SessionManager> {
        let clock = Arc::new(SystemClock);
        let profiles = Arc::new(MemoryProfileStore::new());
        profiles.insert(CredentialRecord {
            id: Uuid::new_v4(),
            email: "a@x.com".to_string(),
            login_name: None,
            hashed_password: hash_password("Righ7Pass!").expect("hash"),
            active: true,
            role: "agent".to_string(),
        });
        let audit = Arc::new(AuditLogQueue::new(
            Arc::new(MemoryAuditSink::new()),
            clock.clone(),
        ));
        let security = Arc::new(SecurityManager::new(
            SecurityConfig::default(),
            profiles,
            Arc::new(MemoryRoleStore::new()),
            audit.clone(),
            clock.clone(),
        ));
        let user = security
            .authenticate(&Credentials {
                email: "a@x.com".to_string(),
                password: "Righ7Pass!".to_string(),
                login_name: None,
            })
            .await
            .expect("authenticate");
        let manager = Arc::new(SessionManager::new(
            security.clone(),
            DualSessionStore::in_memory(),
            config,
            audit,
            clock,
        ));
        let session = security.create_session(&user).expect("session");
        manager.save(&session).expect("save");
        manager
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_clears_session_and_signals() {
        let manager =
            manager_with_session(SessionConfig::default().with_idle_timeout_seconds(60)).await;
        let (_handle, mut rx) = spawn_monitors(manager.clone());

        let signal = rx.recv().await.expect("signal");
        assert_eq!(signal, SessionSignal::IdleTimeout);
        assert!(manager.load().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn activity_re_arms_idle_countdown() {
        let manager =
            manager_with_session(SessionConfig::default().with_idle_timeout_seconds(60)).await;
        let (handle, mut rx) = spawn_monitors(manager.clone());

        // Keep signaling activity for a while; no timeout should fire.
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_secs(30)).await;
            handle.record_activity();
        }
        assert!(rx.try_recv().is_err());
        assert!(manager.load().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn liveness_monitor_reports_session_gone() {
        let manager = manager_with_session(
            SessionConfig::default()
                .with_idle_timeout_seconds(3600)
                .with_liveness_interval_seconds(10),
        )
        .await;
        let (_handle, mut rx) = spawn_monitors(manager.clone());

        // Let the first poll observe the session, then clear it externally.
        tokio::time::sleep(Duration::from_secs(1)).await;
        manager.clear();

        let signal = rx.recv().await.expect("signal");
        assert_eq!(signal, SessionSignal::SessionGone);
    }
}
