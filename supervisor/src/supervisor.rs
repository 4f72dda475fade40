//! The supervisor: startup, control loop, shutdown sequence.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::time::Instant;

use fsmon_watcher::{
    register_all, select_backend, EventSink, NotifyObserverFactory, NullSink, Observer, WatchRoot,
};
use tracing::{error, info, warn};

use crate::config::{EnvOverrides, SupervisorConfig};
use crate::dashboard::spawn_dashboard;
use crate::diagnostics::{Diagnostics, RecordReason};
use crate::error::Result;
use crate::ports::{
    BaselineBuilder, ConsoleResource, DetectionHandler, MemorySampler, NoopBaselineBuilder,
    NoopConsole, NoopDetectionHandler, NoopMemorySampler, NoopQueueProvider, ProcessingMarker,
    QueueProvider,
};
use crate::scan;
use crate::shutdown::{ShutdownCoordinator, SignalOutcome};
use crate::workers::WorkerRegistry;

/// How the supervisor ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The control loop exited through the orderly shutdown sequence.
    Clean,
}

/// The external collaborators the supervisor drives.
///
/// Defaults are all no-ops, which is enough to run a watch that only logs.
pub struct Collaborators {
    /// Receives file events from the backend.
    pub sink: Arc<dyn EventSink>,

    /// External change-detection handler.
    pub handler: Arc<dyn DetectionHandler>,

    /// Console resource released at shutdown.
    pub console: Arc<dyn ConsoleResource>,

    /// Builds baselines once at startup.
    pub baseline: Arc<dyn BaselineBuilder>,

    /// Task-queue singleton access for shutdown.
    pub queue: Arc<dyn QueueProvider>,

    /// Optional resident-memory sampling capability.
    pub memory: Box<dyn MemorySampler>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            sink: Arc::new(NullSink),
            handler: Arc::new(NoopDetectionHandler),
            console: Arc::new(NoopConsole),
            baseline: Arc::new(NoopBaselineBuilder),
            queue: Arc::new(NoopQueueProvider),
            memory: Box::new(NoopMemorySampler),
        }
    }
}

/// Owns the backend, registrar, coordinator and diagnostics, and runs the
/// control loop.
pub struct Supervisor {
    config: SupervisorConfig,
    collaborators: Collaborators,
    registry: Arc<WorkerRegistry>,
    coordinator: Arc<ShutdownCoordinator>,
    processing: ProcessingMarker,
}

impl Supervisor {
    /// Create a supervisor from configuration and collaborators.
    pub fn new(config: SupervisorConfig, collaborators: Collaborators) -> Self {
        let processing = ProcessingMarker::new();
        let coordinator = Arc::new(ShutdownCoordinator::new(
            config.dump.on_first_interrupt,
            collaborators.handler.clone(),
            collaborators.console.clone(),
            processing.clone(),
        ));

        Self {
            config,
            collaborators,
            registry: WorkerRegistry::new(),
            coordinator,
            processing,
        }
    }

    /// The shutdown coordinator; also the programmatic stop handle.
    pub fn coordinator(&self) -> Arc<ShutdownCoordinator> {
        self.coordinator.clone()
    }

    /// The worker registry diagnostics report on.
    pub fn registry(&self) -> Arc<WorkerRegistry> {
        self.registry.clone()
    }

    /// Marker collaborators use to name the file currently mid-processing.
    pub fn processing_marker(&self) -> ProcessingMarker {
        self.processing.clone()
    }

    /// Run to completion: startup, control loop, shutdown sequence.
    ///
    /// Returns when an orderly stop finishes. A forced exit terminates the
    /// process from the signal listener and never returns here.
    pub async fn run(mut self) -> Result<ExitStatus> {
        let mut diagnostics = Diagnostics::new(
            self.config.heartbeat.clone(),
            self.config.history.clone(),
            self.config.dump.clone(),
            self.registry.clone(),
            std::mem::replace(&mut self.collaborators.memory, Box::new(NoopMemorySampler)),
        );
        diagnostics.init(Instant::now());

        info!(
            version = env!("CARGO_PKG_VERSION"),
            scan_all = self.config.scan_all,
            backend_override = ?self.config.backend_override,
            "fsmon starting"
        );

        // Everything expensive happens here, before the loop.
        let baseline_files = self.gather_baseline_files();
        if !baseline_files.is_empty() {
            info!(files = baseline_files.len(), "building baselines");
            self.collaborators.baseline.build_baselines(&baseline_files);
        }

        let roots: Vec<WatchRoot> = self
            .config
            .all_watch_roots()
            .into_iter()
            .map(WatchRoot::new)
            .collect();
        if roots.is_empty() {
            warn!("no watch roots configured");
        }

        let env = EnvOverrides::from_env();
        let override_kind = env.backend.or(self.config.backend_override);
        let chosen = select_backend(&roots, override_kind, env.force_polling);
        info!(backend = %chosen, roots = roots.len(), "backend selected");

        let factory = NotifyObserverFactory::new(self.collaborators.sink.clone());
        let mut registration = register_all(&factory, &roots, chosen)?;
        registration.observer.start()?;

        let observer_guard = self.registry.register("observer", false);
        observer_guard.set_status(&format!(
            "watching {} roots on {}",
            registration.watched.len(),
            registration.backend
        ));

        if let Some(addr) = self.config.dashboard_addr.clone() {
            spawn_dashboard(
                addr,
                self.registry.clone(),
                registration.backend.to_string(),
                registration.watched.clone(),
            );
        }

        self.spawn_signal_listener();

        let control_guard = self.registry.register("control", false);
        control_guard.set_status("control loop");
        info!(backend = %registration.backend, "fsmon started, interrupt to stop");

        while !self.coordinator.should_stop() {
            if self.coordinator.diagnostic_pending() {
                diagnostics.dump_workers("sigint-first");
                diagnostics.list_workers();
                diagnostics.record_now(RecordReason::SigintDump, Instant::now());
                self.coordinator.consume_diagnostic();
            }

            diagnostics.tick(Instant::now());
            tokio::time::sleep(self.config.poll_quantum()).await;
        }

        info!("stopping watch");
        self.shutdown_sequence(registration.observer);
        info!("watch stopped");
        Ok(ExitStatus::Clean)
    }

    /// Union of manual baseline targets and the startup scan.
    fn gather_baseline_files(&self) -> Vec<std::path::PathBuf> {
        let mut files = scan::existing_targets(&self.config.manual_baseline_targets);

        if self.config.scan_all {
            for found in scan::scan_for_files(
                &self.config.effective_scan_roots(),
                &self.config.supported_extensions,
            ) {
                if !files.contains(&found) {
                    files.push(found);
                }
            }
        }

        files
    }

    fn spawn_signal_listener(&self) {
        let coordinator = self.coordinator.clone();
        let registry = self.registry.clone();

        tokio::spawn(async move {
            let guard = registry.register("signal-listener", true);
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("signal listener unavailable: {e}");
                    return;
                }
                guard.set_status("interrupt received");
                match coordinator.on_interrupt() {
                    SignalOutcome::DiagnosticRequested | SignalOutcome::StopRequested => {}
                    SignalOutcome::ForceExit => std::process::exit(1),
                }
            }
        });
    }

    /// Unwind in fixed order; a failing step never blocks the next one.
    fn shutdown_sequence(&self, mut observer: Box<dyn Observer>) {
        guard_step("observer stop", move || observer.stop());

        let handler = self.collaborators.handler.clone();
        guard_step("detection handler stop", move || handler.stop());

        let queue = self.collaborators.queue.clone();
        guard_step("task queue stop", move || queue.get().stop());

        let console = self.collaborators.console.clone();
        guard_step("console release", move || console.stop());
    }
}

fn guard_step(name: &str, step: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(step)).is_err() {
        error!("shutdown step failed: {name}");
    }
}
