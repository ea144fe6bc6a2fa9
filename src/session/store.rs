//! Session persistence scopes and the dual-write composite.
//!
//! Sessions are written to two independent scopes (tab-scoped and cross-tab
//! persistent) so a session survives either one being cleared on its own.
//! Reads prefer the tab scope and fall back to the persistent one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

#[derive(Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn put(&self, key: &str, value: String) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// Dual-write, fallback-read composite over the two storage scopes.
pub struct DualSessionStore {
    tab: Arc<dyn SessionStore>,
    persistent: Arc<dyn SessionStore>,
}

impl DualSessionStore {
    #[must_use]
    pub fn new(tab: Arc<dyn SessionStore>, persistent: Arc<dyn SessionStore>) -> Self {
        Self { tab, persistent }
    }

    /// Two fresh in-memory scopes; the common embedded configuration.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemorySessionStore::new()),
            Arc::new(MemorySessionStore::new()),
        )
    }

    /// Both scopes are written before returning, so a reader never observes
    /// only one scope updated.
    pub(crate) fn write(&self, key: &str, value: &str) {
        self.tab.put(key, value.to_string());
        self.persistent.put(key, value.to_string());
    }

    pub(crate) fn read(&self, key: &str) -> Option<String> {
        self.tab.get(key).or_else(|| self.persistent.get(key))
    }

    pub(crate) fn remove(&self, key: &str) {
        self.tab.remove(key);
        self.persistent.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::{DualSessionStore, MemorySessionStore, SessionStore};
    use std::sync::Arc;

    #[test]
    fn memory_store_round_trips() {
        let store = MemorySessionStore::new();
        assert_eq!(store.get("key"), None);
        store.put("key", "value".to_string());
        assert_eq!(store.get("key"), Some("value".to_string()));
        store.remove("key");
        assert_eq!(store.get("key"), None);
        // Removing again is a no-op.
        store.remove("key");
    }

    #[test]
    fn dual_store_writes_both_scopes() {
        let tab = Arc::new(MemorySessionStore::new());
        let persistent = Arc::new(MemorySessionStore::new());
        let dual = DualSessionStore::new(tab.clone(), persistent.clone());

        dual.write("key", "value");
        assert_eq!(tab.get("key"), Some("value".to_string()));
        assert_eq!(persistent.get("key"), Some("value".to_string()));
    }

    #[test]
    fn dual_store_read_falls_back_to_persistent() {
        let tab = Arc::new(MemorySessionStore::new());
        let persistent = Arc::new(MemorySessionStore::new());
        let dual = DualSessionStore::new(tab.clone(), persistent.clone());

        dual.write("key", "value");
        // Simulate the tab scope being cleared independently.
        tab.remove("key");
        assert_eq!(dual.read("key"), Some("value".to_string()));

        persistent.remove("key");
        assert_eq!(dual.read("key"), None);
    }

    #[test]
    fn dual_store_remove_clears_both_scopes() {
        let tab = Arc::new(MemorySessionStore::new());
        let persistent = Arc::new(MemorySessionStore::new());
        let dual = DualSessionStore::new(tab.clone(), persistent.clone());

        dual.write("key", "value");
        dual.remove("key");
        assert_eq!(tab.get("key"), None);
        assert_eq!(persistent.get("key"), None);
    }
}
