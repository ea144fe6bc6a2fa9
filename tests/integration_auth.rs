//! End-to-end flow against the in-memory stores: login, lockout, session
//! lifecycle, route authorization, and audit delivery.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use custodia::audit::{AuditEventType, AuditLogQueue, AuditQuery, AuditSeverity};
use custodia::auth::{
    AuthError, Credentials, Role, SecurityConfig, SecurityManager, hash_password,
};
use custodia::clock::{Clock, ManualClock};
use custodia::session::{DualSessionStore, SessionConfig, SessionManager};
use custodia::store::{CredentialRecord, MemoryAuditSink, MemoryProfileStore, MemoryRoleStore};

struct Stack {
    security: Arc<SecurityManager>,
    sessions: SessionManager,
    audit: Arc<AuditLogQueue>,
    sink: Arc<MemoryAuditSink>,
    clock: Arc<ManualClock>,
    user_id: Uuid,
}

// RUST_LOG=
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn stack(role: &str) -> Stack {
    init_tracing();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let sink = Arc::new(MemoryAuditSink::new());
    let audit = Arc::new(AuditLogQueue::new(sink.clone(), clock.clone()));

    let user_id = Uuid::new_v4();
    let profiles = Arc::new(MemoryProfileStore::new());
    profiles.insert(CredentialRecord {
        id: user_id,
        email: "a@x.com".to_string(),
        login_name: Some("agent.a".to_string()),
        hashed_password: hash_password("Righ7Pass!").expect("hash"),
        active: true,
        role: role.to_string(),
    });

    let security = Arc::new(SecurityManager::new(
        SecurityConfig::default(),
        profiles,
        Arc::new(MemoryRoleStore::new()),
        audit.clone(),
        clock.clone(),
    ));
    let sessions = SessionManager::new(
        security.clone(),
        DualSessionStore::in_memory(),
        SessionConfig::default(),
        audit.clone(),
        clock.clone(),
    );

    Stack {
        security,
        sessions,
        audit,
        sink,
        clock,
        user_id,
    }
}

fn login(email: &str, password: &str) -> Credentials {
    Credentials {
        email: email.to_string(),
        password: password.to_string(),
        login_name: None,
    }
}

#[tokio::test]
async fn happy_path_login_session_and_routes() -> Result<()> {
    let stack = stack("manager");

    let user = stack
        .security
        .authenticate(&login("a@x.com", "Righ7Pass!"))
        .await
        .expect("authenticate");
    assert_eq!(user.id, stack.user_id);
    assert_eq!(user.role, Role::Manager);
    assert!(user.permissions.contains("audit:read"));

    let session = stack.security.create_session(&user).expect("session");
    assert_eq!(session.expires_at, stack.clock.now() + Duration::hours(24));
    stack.sessions.save(&session)?;

    let loaded = stack.sessions.load().await.expect("load");
    assert_eq!(loaded.token, session.token);
    assert!(stack.sessions.can_access_route("/admin/users"));
    assert!(stack.sessions.can_access_route("/workspace/leads"));
    assert!(stack.sessions.has_permission("users:manage"));

    stack.audit.flush().await;
    let events = stack.sink.events();
    assert!(
        events
            .iter()
            .any(|event| event.event_type == AuditEventType::LoginSuccess
                && event.user_id == Some(stack.user_id))
    );
    Ok(())
}

#[tokio::test]
async fn case_and_whitespace_in_email_are_normalized() -> Result<()> {
    let stack = stack("agent");
    let user = stack
        .security
        .authenticate(&login("  A@X.com ", "Righ7Pass!"))
        .await
        .expect("authenticate");
    assert_eq!(user.email, "a@x.com");
    Ok(())
}

#[tokio::test]
async fn lockout_scenario_ten_failures_then_window_elapses() -> Result<()> {
    let stack = stack("agent");

    for _ in 0..9 {
        assert_eq!(
            stack
                .security
                .authenticate(&login("a@x.com", "Wr0ngPass!"))
                .await,
            Err(AuthError::InvalidCredentials)
        );
    }
    let tenth = stack
        .security
        .authenticate(&login("a@x.com", "Wr0ngPass!"))
        .await;
    assert!(matches!(tenth, Err(AuthError::Locked { .. })));

    // Correct password while locked is still rejected.
    let locked = stack
        .security
        .authenticate(&login("a@x.com", "Righ7Pass!"))
        .await;
    let Err(AuthError::Locked {
        retry_after_minutes,
    }) = locked
    else {
        panic!("expected Locked");
    };
    assert!(retry_after_minutes >= 1 && retry_after_minutes <= 15);

    // After the lockout window, the correct password works again.
    stack.clock.advance(Duration::minutes(15));
    assert!(
        stack
            .security
            .authenticate(&login("a@x.com", "Righ7Pass!"))
            .await
            .is_ok()
    );

    stack.audit.flush().await;
    let locked_events = stack
        .audit
        .query_events(&AuditQuery::new().with_event_type(AuditEventType::AccountLocked))
        .await;
    assert!(!locked_events.is_empty());
    assert!(
        locked_events
            .iter()
            .all(|event| event.severity == AuditSeverity::High)
    );
    Ok(())
}

#[tokio::test]
async fn session_renewal_within_buffer_extends_expiry() -> Result<()> {
    let stack = stack("agent");
    let user = stack
        .security
        .authenticate(&login("a@x.com", "Righ7Pass!"))
        .await
        .expect("authenticate");
    let session = stack.security.create_session(&user).expect("session");
    stack.sessions.save(&session)?;

    // Well before the buffer: loading does not replace the session.
    stack.clock.advance(Duration::hours(12));
    let unchanged = stack.sessions.load().await.expect("load");
    assert_eq!(unchanged.token, session.token);

    // Inside the 5-minute buffer: loading returns a renewed session.
    stack
        .clock
        .advance(Duration::hours(12) - Duration::minutes(4));
    let renewed = stack.sessions.load().await.expect("load");
    assert_ne!(renewed.token, session.token);
    assert!(renewed.expires_at > session.expires_at);
    assert_eq!(renewed.user, session.user);

    // The renewed session is what both scopes now hold.
    let reloaded = stack.sessions.load().await.expect("load");
    assert_eq!(reloaded.token, renewed.token);
    Ok(())
}

#[tokio::test]
async fn expired_session_forces_reauthentication() -> Result<()> {
    let stack = stack("agent");
    let user = stack
        .security
        .authenticate(&login("a@x.com", "Righ7Pass!"))
        .await
        .expect("authenticate");
    let session = stack.security.create_session(&user).expect("session");
    stack.sessions.save(&session)?;

    stack.clock.advance(Duration::hours(24));
    assert!(stack.sessions.load().await.is_none());
    assert!(!stack.sessions.can_access_route("/workspace/leads"));
    assert!(stack.sessions.can_access_route("/login"));
    Ok(())
}

#[tokio::test]
async fn agent_denied_manager_routes() -> Result<()> {
    let stack = stack("agent");
    let user = stack
        .security
        .authenticate(&login("a@x.com", "Righ7Pass!"))
        .await
        .expect("authenticate");
    let session = stack.security.create_session(&user).expect("session");
    stack.sessions.save(&session)?;

    assert!(stack.sessions.can_access_route("/workspace/leads"));
    assert!(stack.sessions.can_access_route("/dashboard"));
    assert!(!stack.sessions.can_access_route("/admin/users"));
    assert!(!stack.sessions.has_permission("users:manage"));
    assert!(stack.sessions.has_permission("leads:read:own"));
    Ok(())
}

#[tokio::test]
async fn audit_events_survive_a_failed_flush_in_order() -> Result<()> {
    let stack = stack("agent");

    // A failed login and a successful login queue events in order.
    let _ = stack
        .security
        .authenticate(&login("a@x.com", "Wr0ngPass!"))
        .await;
    let _ = stack
        .security
        .authenticate(&login("a@x.com", "Righ7Pass!"))
        .await;

    stack.sink.fail_next_appends(1);
    stack.audit.flush().await;
    // Nothing delivered yet, everything re-queued.
    assert!(stack.sink.events().is_empty());
    assert!(stack.audit.pending_events() >= 2);

    stack.audit.flush().await;
    assert_eq!(stack.audit.pending_events(), 0);
    let events = stack.sink.events();
    let failed_index = events
        .iter()
        .position(|event| event.event_type == AuditEventType::LoginFailed)
        .expect("failed login event");
    let success_index = events
        .iter()
        .position(|event| event.event_type == AuditEventType::LoginSuccess)
        .expect("success login event");
    assert!(failed_index < success_index);
    Ok(())
}

#[tokio::test]
async fn user_actions_carry_value_diffs_into_the_log() -> Result<()> {
    let stack = stack("manager");
    let user = stack
        .security
        .authenticate(&login("a@x.com", "Righ7Pass!"))
        .await
        .expect("authenticate");

    stack.audit.log_user_action(
        &user,
        AuditEventType::DataUpdated,
        "lead",
        "lead-42",
        "Lead status changed",
        Some(serde_json::json!({ "status": "new" })),
        Some(serde_json::json!({ "status": "contacted" })),
    );
    stack.audit.flush().await;

    let events = stack
        .audit
        .query_events(&AuditQuery::new().with_event_type(AuditEventType::DataUpdated))
        .await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].resource_id.as_deref(), Some("lead-42"));
    assert_eq!(
        events[0].old_values,
        Some(serde_json::json!({ "status": "new" }))
    );
    assert_eq!(
        events[0].new_values,
        Some(serde_json::json!({ "status": "contacted" }))
    );
    Ok(())
}
