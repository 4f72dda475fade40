//! Collaborator ports: the narrow interfaces the supervisor drives.
//!
//! Baseline building, change detection, result persistence and the console
//! all live outside this crate. Each port ships a no-op default so the
//! supervisor runs (and tests run) without any collaborator wired in.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{debug, info};

/// External change-detection handler.
///
/// `stop` must be idempotent and cheap; the shutdown coordinator calls it
/// from the signal listener and the shutdown sequence calls it again.
pub trait DetectionHandler: Send + Sync {
    /// Stop detecting changes.
    fn stop(&self);
}

/// Console resource (status window, raw terminal mode, ...).
///
/// `stop` must be idempotent and safe to call from both the control task and
/// the signal listener.
pub trait ConsoleResource: Send + Sync {
    /// Release the console.
    fn stop(&self);
}

/// Builds baseline snapshots of watched files, once, at startup.
pub trait BaselineBuilder: Send + Sync {
    /// Build baselines for `files`. Errors are this collaborator's concern.
    fn build_baselines(&self, files: &[PathBuf]);
}

/// Handle on the external task queue.
pub trait QueueHandle: Send + Sync {
    /// Stop the queue, draining or abandoning in-flight work per its own
    /// contract.
    fn stop(&self);
}

/// Access to the task-queue singleton.
///
/// The supervisor only ever obtains the queue to stop it; the no-op worker
/// semantics of the original singleton accessor live behind this trait.
pub trait QueueProvider: Send + Sync {
    /// Get (or lazily construct) the queue handle.
    fn get(&self) -> Arc<dyn QueueHandle>;
}

/// Optional capability: sample this process's resident memory.
pub trait MemorySampler: Send + Sync {
    /// Resident set size in MiB, or `None` when unavailable.
    fn resident_mb(&self) -> Option<f64>;
}

/// Marker naming the file currently mid-processing, shared with the signal
/// listener so an interrupted operator sees what was in flight.
#[derive(Clone, Default)]
pub struct ProcessingMarker(Arc<Mutex<Option<PathBuf>>>);

impl ProcessingMarker {
    /// Create an empty marker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the file now being processed.
    pub fn set(&self, path: impl Into<PathBuf>) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = Some(path.into());
        }
    }

    /// Clear the marker.
    pub fn clear(&self) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = None;
        }
    }

    /// The file currently mid-processing, if any.
    pub fn current(&self) -> Option<PathBuf> {
        self.0.lock().ok().and_then(|slot| slot.clone())
    }
}

/// Detection handler that has nothing to stop.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDetectionHandler;

impl DetectionHandler for NoopDetectionHandler {
    fn stop(&self) {
        debug!("detection handler stop (noop)");
    }
}

/// Console resource that has nothing to release.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopConsole;

impl ConsoleResource for NoopConsole {
    fn stop(&self) {
        debug!("console stop (noop)");
    }
}

/// Baseline builder that only logs what it was asked to do.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBaselineBuilder;

impl BaselineBuilder for NoopBaselineBuilder {
    fn build_baselines(&self, files: &[PathBuf]) {
        info!(files = files.len(), "baseline builder not wired, skipping");
    }
}

/// Queue provider handing out an already-stopped queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopQueueProvider;

#[derive(Debug, Clone, Copy, Default)]
struct NoopQueueHandle;

impl QueueHandle for NoopQueueHandle {
    fn stop(&self) {
        debug!("task queue stop (noop)");
    }
}

impl QueueProvider for NoopQueueProvider {
    fn get(&self) -> Arc<dyn QueueHandle> {
        Arc::new(NoopQueueHandle)
    }
}

/// Memory sampler that never reports a value.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMemorySampler;

impl MemorySampler for NoopMemorySampler {
    fn resident_mb(&self) -> Option<f64> {
        None
    }
}

/// Memory sampler backed by `sysinfo`.
pub struct SysinfoMemorySampler {
    system: Mutex<System>,
    pid: Pid,
}

impl SysinfoMemorySampler {
    /// Create a sampler for the current process.
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: Pid::from_u32(std::process::id()),
        }
    }
}

impl Default for SysinfoMemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler for SysinfoMemorySampler {
    fn resident_mb(&self) -> Option<f64> {
        let mut system = self.system.lock().ok()?;
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            ProcessRefreshKind::new().with_memory(),
        );
        system
            .process(self.pid)
            .map(|p| p.memory() as f64 / (1024.0 * 1024.0))
    }
}
