//! Registry of live workers, the diagnostics loop's view of the process.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Description of one live worker.
#[derive(Debug, Clone)]
pub struct WorkerInfo {
    /// Worker name, unique within the registry.
    pub name: String,

    /// Daemon workers are not waited for at shutdown.
    pub daemon: bool,

    /// Free-form "what am I doing" line, updated by the worker.
    pub status: String,

    /// When the worker registered.
    pub since: Instant,
}

/// Shared registry of named workers.
///
/// Every spawned task or thread the supervisor owns registers here so that
/// heartbeats, history records and diagnostic snapshots can report a live
/// count and a per-worker status line. One mutex guards the map; all
/// operations are short.
#[derive(Default)]
pub struct WorkerRegistry {
    inner: Mutex<BTreeMap<String, WorkerInfo>>,
}

impl WorkerRegistry {
    /// Create an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a worker, returning a guard that deregisters it on drop.
    pub fn register(self: &Arc<Self>, name: impl Into<String>, daemon: bool) -> WorkerGuard {
        let name = name.into();
        let info = WorkerInfo {
            name: name.clone(),
            daemon,
            status: "started".to_string(),
            since: Instant::now(),
        };
        if let Ok(mut map) = self.inner.lock() {
            map.insert(name.clone(), info);
        }
        WorkerGuard {
            registry: self.clone(),
            name,
        }
    }

    /// Number of live workers.
    pub fn count(&self) -> usize {
        self.inner.lock().map(|map| map.len()).unwrap_or(0)
    }

    /// Snapshot of every live worker, ordered by name.
    pub fn snapshot(&self) -> Vec<WorkerInfo> {
        self.inner
            .lock()
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default()
    }

    fn set_status(&self, name: &str, status: &str) {
        if let Ok(mut map) = self.inner.lock() {
            if let Some(info) = map.get_mut(name) {
                info.status = status.to_string();
            }
        }
    }

    fn deregister(&self, name: &str) {
        if let Ok(mut map) = self.inner.lock() {
            map.remove(name);
        }
    }
}

/// Handle held by a live worker; dropping it removes the registration.
pub struct WorkerGuard {
    registry: Arc<WorkerRegistry>,
    name: String,
}

impl WorkerGuard {
    /// Update this worker's status line.
    pub fn set_status(&self, status: &str) {
        self.registry.set_status(&self.name, status);
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.registry.deregister(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_register_and_drop() {
        let registry = WorkerRegistry::new();
        assert_eq!(registry.count(), 0);

        let guard = registry.register("control", false);
        let daemon = registry.register("dashboard", true);
        assert_eq!(registry.count(), 2);

        drop(daemon);
        assert_eq!(registry.count(), 1);

        guard.set_status("sleeping");
        let snap = registry.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].name, "control");
        assert_eq!(snap[0].status, "sleeping");
        assert!(!snap[0].daemon);
    }
}
