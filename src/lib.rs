//! # Custodia (CRM Security Core)
//!
//! `custodia` is the authentication, session, and audit security core behind a
//! CRM service. It handles credential validation and hashing, brute-force
//! lockout, session issuance/renewal/expiry, role-based route authorization,
//! and an asynchronous retry-capable audit-event log.
//!
//! ## Authentication
//!
//! Passwords are stored as `hex(salt):hex(digest)` and verified with a
//! constant-time comparison. Unknown users and wrong passwords are
//! indistinguishable to callers: both surface as the same generic error, and
//! both count against the per-email lockout window.
//!
//! ## Sessions
//!
//! Sessions are persisted to two storage scopes (tab-scoped and cross-tab
//! persistent) behind a dual-write, fallback-read composite. Sessions within
//! the renewal buffer of expiry are proactively replaced; expired or corrupted
//! sessions degrade to "not authenticated" rather than erroring.
//!
//! ## Audit
//!
//! Security and business events are buffered in a FIFO queue and flushed to a
//! remote append-only log in batches. Failed batches are re-queued at the
//! front and retried after a fixed backoff, preserving original order
//! (at-least-once delivery).

pub mod audit;
pub mod auth;
pub mod clock;
pub mod session;
pub mod store;
