//! Sliding-window lockout for repeated failed logins.
//!
//! State is process-local and expires lazily on read; there are no background
//! timers. A successful attempt deletes the entry immediately, and an entry
//! whose window has elapsed is dropped the next time it is consulted.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::clock::Clock;

#[derive(Clone, Copy, Debug)]
struct LockoutEntry {
    failed_count: u32,
    last_attempt_at: DateTime<Utc>,
}

pub struct LockoutTracker {
    entries: Mutex<HashMap<String, LockoutEntry>>,
    max_attempts: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl LockoutTracker {
    #[must_use]
    pub fn new(max_attempts: u32, window_seconds: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_attempts,
            window: Duration::seconds(window_seconds),
            clock,
        }
    }

    /// Record the outcome of an authentication attempt for `identifier`.
    ///
    /// Success resets the identifier to a clean slate. A failure after the
    /// window has elapsed starts a fresh count rather than resuming the old one.
    pub fn record_attempt(&self, identifier: &str, success: bool) {
        let now = self.clock.now();
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if success {
            entries.remove(identifier);
            return;
        }

        let failed_count = match entries.get(identifier) {
            Some(entry) if now - entry.last_attempt_at < self.window => entry.failed_count + 1,
            _ => 1,
        };
        entries.insert(
            identifier.to_string(),
            LockoutEntry {
                failed_count,
                last_attempt_at: now,
            },
        );
    }

    /// Whether `identifier` is currently blocked from authenticating.
    ///
    /// An elapsed window deletes the entry as a side effect and reports the
    /// identifier unlocked. The upper bound is strict: `elapsed < window`.
    pub fn is_locked(&self, identifier: &str) -> bool {
        let now = self.clock.now();
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = entries.get(identifier) else {
            return false;
        };
        if now - entry.last_attempt_at >= self.window {
            entries.remove(identifier);
            return false;
        }
        entry.failed_count >= self.max_attempts
    }

    /// Minutes until the lockout window elapses, rounded up; zero if unlocked.
    pub fn retry_after_minutes(&self, identifier: &str) -> u64 {
        if !self.is_locked(identifier) {
            return 0;
        }
        let now = self.clock.now();
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = entries.get(identifier) else {
            return 0;
        };
        let remaining = self.window - (now - entry.last_attempt_at);
        let seconds = remaining.num_seconds().max(0);
        u64::try_from((seconds + 59) / 60).unwrap_or(0).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::LockoutTracker;
    use crate::clock::ManualClock;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    const WINDOW_SECONDS: i64 = 15 * 60;

    fn tracker_with_clock() -> (LockoutTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let tracker = LockoutTracker::new(3, WINDOW_SECONDS, clock.clone());
        (tracker, clock)
    }

    #[test]
    fn unknown_identifier_is_unlocked() {
        let (tracker, _clock) = tracker_with_clock();
        assert!(!tracker.is_locked("a@x.com"));
        assert_eq!(tracker.retry_after_minutes("a@x.com"), 0);
    }

    #[test]
    fn locks_at_max_attempts() {
        let (tracker, _clock) = tracker_with_clock();
        tracker.record_attempt("a@x.com", false);
        tracker.record_attempt("a@x.com", false);
        assert!(!tracker.is_locked("a@x.com"));

        tracker.record_attempt("a@x.com", false);
        assert!(tracker.is_locked("a@x.com"));
        assert_eq!(tracker.retry_after_minutes("a@x.com"), 15);
    }

    #[test]
    fn success_resets_immediately() {
        let (tracker, _clock) = tracker_with_clock();
        for _ in 0..3 {
            tracker.record_attempt("a@x.com", false);
        }
        assert!(tracker.is_locked("a@x.com"));

        tracker.record_attempt("a@x.com", true);
        assert!(!tracker.is_locked("a@x.com"));
    }

    #[test]
    fn window_elapse_unlocks_without_success() {
        let (tracker, clock) = tracker_with_clock();
        for _ in 0..3 {
            tracker.record_attempt("a@x.com", false);
        }
        assert!(tracker.is_locked("a@x.com"));

        clock.advance(Duration::seconds(WINDOW_SECONDS - 1));
        assert!(tracker.is_locked("a@x.com"));

        // Strict upper bound: elapsed == window means unlocked.
        clock.advance(Duration::seconds(1));
        assert!(!tracker.is_locked("a@x.com"));
    }

    #[test]
    fn failure_after_elapsed_window_starts_fresh_count() {
        let (tracker, clock) = tracker_with_clock();
        for _ in 0..3 {
            tracker.record_attempt("a@x.com", false);
        }
        clock.advance(Duration::seconds(WINDOW_SECONDS));
        tracker.record_attempt("a@x.com", false);
        assert!(!tracker.is_locked("a@x.com"));
    }

    #[test]
    fn identifiers_are_independent() {
        let (tracker, _clock) = tracker_with_clock();
        for _ in 0..3 {
            tracker.record_attempt("a@x.com", false);
        }
        assert!(tracker.is_locked("a@x.com"));
        assert!(!tracker.is_locked("b@x.com"));
    }
}
