//! Named shared primitives registered with the pool (C11 "Isolation").
//!
//! Workers share an address space via threads rather than separate OS
//! processes, so a raw shared-memory segment has no analogue here: a named
//! `Arc<Mutex<Vec<Value>>>` gives workers the same "shared array" capability
//! without one. The pool is authoritative for every primitive's lifetime: it
//! owns the registry and nothing else may construct one directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// Registry of named shared primitives, owned by the [`super::pool::WorkerPool`]
/// that created it and handed to user work functions that ask for shared state.
#[derive(Default)]
pub struct SharedRegistry {
    mutexes: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    counters: Mutex<HashMap<String, Arc<AtomicI64>>>,
    arrays: Mutex<HashMap<String, Arc<Mutex<Vec<serde_json::Value>>>>>,
}

impl SharedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the named mutex, creating it on first use.
    pub fn mutex(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut mutexes = self.mutexes.lock().expect("shared registry mutexes poisoned");
        mutexes.entry(name.to_string()).or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))).clone()
    }

    /// Returns the named counter, creating it (initialized to `initial`) on first use.
    pub fn counter(&self, name: &str, initial: i64) -> Arc<AtomicI64> {
        let mut counters = self.counters.lock().expect("shared registry counters poisoned");
        counters.entry(name.to_string()).or_insert_with(|| Arc::new(AtomicI64::new(initial))).clone()
    }

    /// Returns the named shared array, creating it empty on first use.
    pub fn array(&self, name: &str) -> Arc<Mutex<Vec<serde_json::Value>>> {
        let mut arrays = self.arrays.lock().expect("shared registry arrays poisoned");
        arrays.entry(name.to_string()).or_insert_with(|| Arc::new(Mutex::new(Vec::new()))).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_is_shared_across_lookups() {
        let registry = SharedRegistry::new();
        let a = registry.counter("tasks", 0);
        let b = registry.counter("tasks", 99);
        a.fetch_add(1, Ordering::SeqCst);
        assert_eq!(b.load(Ordering::SeqCst), 1, "second lookup returns the same counter");
    }

    #[test]
    fn distinct_names_are_independent() {
        let registry = SharedRegistry::new();
        let a = registry.counter("a", 0);
        let b = registry.counter("b", 0);
        a.fetch_add(5, Ordering::SeqCst);
        assert_eq!(b.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn mutex_is_shared_across_lookups() {
        let registry = SharedRegistry::new();
        let m1 = registry.mutex("critical-section");
        let m2 = registry.mutex("critical-section");
        let _guard = m1.lock().await;
        assert!(m2.try_lock().is_err(), "second handle sees the first handle's lock held");
    }

    #[test]
    fn array_appends_are_visible_to_other_handles() {
        let registry = SharedRegistry::new();
        let arr1 = registry.array("items");
        arr1.lock().unwrap().push(serde_json::json!("a"));
        let arr2 = registry.array("items");
        assert_eq!(arr2.lock().unwrap().len(), 1);
    }
}
