//! Per-process registry of resources with a task in flight.
//!
//! Each queue owns one registry. A handler registers the resource id before
//! doing work and holds the returned guard until it is done; a second
//! registration for the same id fails until the guard is dropped.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, error};

/// Returned when the resource already has a task running in this process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{queue}: task already in progress for {resource_id}")]
pub struct AlreadyInProgress {
    pub queue: String,
    pub resource_id: String,
}

/// Set of resource ids currently being processed for one queue.
#[derive(Debug, Clone)]
pub struct ActiveTaskRegistry {
    queue: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl ActiveTaskRegistry {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Atomically claim `resource_id`. The claim lasts as long as the guard.
    pub fn register(&self, resource_id: &str) -> Result<ActiveTaskGuard, AlreadyInProgress> {
        let mut active = self.lock();
        if !active.insert(resource_id.to_string()) {
            return Err(AlreadyInProgress {
                queue: self.queue.clone(),
                resource_id: resource_id.to_string(),
            });
        }
        debug!(queue = %self.queue, resource_id, "Registered active task");
        Ok(ActiveTaskGuard {
            registry: self.clone(),
            resource_id: resource_id.to_string(),
        })
    }

    fn unregister(&self, resource_id: &str) {
        if self.lock().remove(resource_id) {
            debug!(queue = %self.queue, resource_id, "Unregistered active task");
        } else {
            error!(queue = %self.queue, resource_id, "Unregistering a task that was not registered");
        }
    }

    /// Snapshot of the ids currently registered.
    pub fn current_tasks(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().iter().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_active(&self, resource_id: &str) -> bool {
        self.lock().contains(resource_id)
    }
}

/// Holds a registration; dropping it releases the resource id.
#[derive(Debug)]
pub struct ActiveTaskGuard {
    registry: ActiveTaskRegistry,
    resource_id: String,
}

impl ActiveTaskGuard {
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }
}

impl Drop for ActiveTaskGuard {
    fn drop(&mut self) {
        self.registry.unregister(&self.resource_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_blocks_duplicate_until_dropped() {
        let registry = ActiveTaskRegistry::new("Transcribe_0");

        let guard = registry.register("v1").unwrap();
        assert!(registry.is_active("v1"));

        let err = registry.register("v1").unwrap_err();
        assert_eq!(err.resource_id, "v1");
        assert_eq!(err.queue, "Transcribe_0");
        assert_eq!(err.to_string(), "Transcribe_0: task already in progress for v1");

        let other = registry.register("v2").unwrap();
        assert_eq!(registry.current_tasks(), vec!["v1", "v2"]);

        drop(guard);
        assert!(!registry.is_active("v1"));
        assert_eq!(registry.current_tasks(), vec!["v2"]);

        let again = registry.register("v1").unwrap();
        assert_eq!(again.resource_id(), "v1");
        drop(other);
        drop(again);
        assert!(registry.current_tasks().is_empty());
    }

    #[test]
    fn test_concurrent_registration_admits_one() {
        let registry = ActiveTaskRegistry::new("q");
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.register("same").map(std::mem::forget).is_ok())
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 1);
    }

    #[test]
    fn test_guard_released_on_panic() {
        let registry = ActiveTaskRegistry::new("q");
        let r = registry.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = r.register("v1").unwrap();
            panic!("handler failed");
        }));
        assert!(result.is_err());
        assert!(!registry.is_active("v1"));
    }
}
