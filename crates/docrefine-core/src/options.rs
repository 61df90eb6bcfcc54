//! Per-task enhancement options and their thread-safe store.
//!
//! The surrounding service accepts enhancement flags when a conversion
//! request comes in, but the conversion job itself runs elsewhere; the
//! store bridges the two, keyed by an opaque task id. Options are set
//! once at request accept and consumed exactly once when the response is
//! prepared.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Enhancement flags scoped to one conversion task.
///
/// Both default to off; the whole enhancement pass is an identity
/// transform unless at least one is enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnhancementOptions {
    /// Re-recognize spans that look like mathematical notation, in
    /// formula mode.
    #[serde(default)]
    pub enable_formula_enrichment: bool,
    /// Re-recognize spans showing corrupted-encoding symptoms.
    #[serde(default)]
    pub enable_encoding_fix: bool,
}

impl EnhancementOptions {
    /// Whether any enhancement is enabled at all.
    #[inline]
    #[must_use = "flag state is returned but not used"]
    pub const fn any_enabled(&self) -> bool {
        self.enable_formula_enrichment || self.enable_encoding_fix
    }
}

/// Thread-safe store of enhancement options per task.
///
/// Task ids are disjoint across concurrent requests, but the backing map
/// itself is guarded by a single lock.
#[derive(Debug, Default)]
pub struct EnhancementStore {
    inner: Mutex<HashMap<String, EnhancementOptions>>,
}

impl EnhancementStore {
    /// Creates an empty store.
    #[must_use = "creates a new EnhancementStore"]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record options for a task.
    pub fn set_options(&self, task_id: &str, options: EnhancementOptions) {
        self.lock().insert(task_id.to_string(), options);
    }

    /// Look up options for a task without consuming them.
    #[must_use = "looked-up options are returned but not used"]
    pub fn get_options(&self, task_id: &str) -> Option<EnhancementOptions> {
        self.lock().get(task_id).copied()
    }

    /// Remove a task's options. Called once, at response preparation.
    pub fn remove_options(&self, task_id: &str) {
        self.lock().remove(task_id);
    }

    /// Drop all stored options.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, EnhancementOptions>> {
        // A poisoned map only ever holds plain flag values; recover it.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn set_get_remove_cycle() {
        let store = EnhancementStore::new();
        let options = EnhancementOptions {
            enable_formula_enrichment: true,
            enable_encoding_fix: false,
        };

        store.set_options("task-1", options);
        assert_eq!(store.get_options("task-1"), Some(options));

        store.remove_options("task-1");
        assert_eq!(store.get_options("task-1"), None);
    }

    #[test]
    fn missing_task_yields_none() {
        let store = EnhancementStore::new();
        assert_eq!(store.get_options("absent"), None);
        // Removing an absent task is a no-op, not an error.
        store.remove_options("absent");
    }

    #[test]
    fn clear_empties_the_store() {
        let store = EnhancementStore::new();
        store.set_options("a", EnhancementOptions::default());
        store.set_options("b", EnhancementOptions::default());
        store.clear();
        assert_eq!(store.get_options("a"), None);
        assert_eq!(store.get_options("b"), None);
    }

    #[test]
    fn concurrent_tasks_do_not_interfere() {
        let store = Arc::new(EnhancementStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let task_id = format!("task-{i}");
                    let options = EnhancementOptions {
                        enable_formula_enrichment: i % 2 == 0,
                        enable_encoding_fix: i % 2 == 1,
                    };
                    store.set_options(&task_id, options);
                    assert_eq!(store.get_options(&task_id), Some(options));
                    store.remove_options(&task_id);
                    assert_eq!(store.get_options(&task_id), None);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: EnhancementOptions = serde_json::from_str("{}").unwrap();
        assert!(!options.any_enabled());

        let options: EnhancementOptions =
            serde_json::from_str(r#"{"enable_formula_enrichment": true}"#).unwrap();
        assert!(options.any_enabled());
        assert!(!options.enable_encoding_fix);
    }
}
