//! Escalating interrupt-driven shutdown protocol.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::ports::{ConsoleResource, DetectionHandler, ProcessingMarker};

/// Where the process is in its lifecycle.
///
/// The state only ever advances; the single exception is the main loop
/// consuming `DiagnosticPending` back to `Running` once the requested dump
/// has been emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ShutdownState {
    /// Normal operation.
    Running = 0,

    /// A first interrupt requested a diagnostic snapshot; the main loop will
    /// emit it and resume.
    DiagnosticPending = 1,

    /// Orderly stop requested; the main loop exits within one quantum.
    StopRequested = 2,

    /// Immediate termination; the shutdown sequence is skipped.
    ForceExit = 3,
}

impl ShutdownState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Running,
            1 => Self::DiagnosticPending,
            2 => Self::StopRequested,
            _ => Self::ForceExit,
        }
    }
}

/// What the signal listener should do after reporting an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    /// A diagnostic snapshot was requested; keep running.
    DiagnosticRequested,

    /// Orderly stop begun; the main loop will unwind.
    StopRequested,

    /// Terminate the process immediately with a non-zero code.
    ForceExit,
}

/// Interprets repeated interrupts as an escalating state machine.
///
/// `on_interrupt` runs on the signal listener task and restricts itself to
/// atomic state changes plus the side effects the ports declare signal-safe
/// (all idempotent, none blocking). The expensive work, the diagnostic dump
/// itself, is produced by the main loop's reaction to the new state.
pub struct ShutdownCoordinator {
    state: AtomicU8,
    first_dump_armed: AtomicBool,
    stop_effects_done: AtomicBool,
    handler: Arc<dyn DetectionHandler>,
    console: Arc<dyn ConsoleResource>,
    processing: ProcessingMarker,
}

impl ShutdownCoordinator {
    /// Create a coordinator in the `Running` state.
    ///
    /// `dump_on_first_interrupt` arms the first-signal diagnostic snapshot.
    pub fn new(
        dump_on_first_interrupt: bool,
        handler: Arc<dyn DetectionHandler>,
        console: Arc<dyn ConsoleResource>,
        processing: ProcessingMarker,
    ) -> Self {
        Self {
            state: AtomicU8::new(ShutdownState::Running as u8),
            first_dump_armed: AtomicBool::new(dump_on_first_interrupt),
            stop_effects_done: AtomicBool::new(false),
            handler,
            console,
            processing,
        }
    }

    /// Current state.
    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Whether the main loop should exit.
    pub fn should_stop(&self) -> bool {
        self.state() >= ShutdownState::StopRequested
    }

    /// Whether a first-signal diagnostic snapshot is waiting to be emitted.
    pub fn diagnostic_pending(&self) -> bool {
        self.state() == ShutdownState::DiagnosticPending
    }

    /// Consume a pending diagnostic request after the dump has been emitted.
    ///
    /// Called only by the main loop. A stop that raced in between wins; the
    /// consume is then a no-op.
    pub fn consume_diagnostic(&self) {
        let _ = self.transition(ShutdownState::DiagnosticPending, ShutdownState::Running);
    }

    /// React to one interrupt signal.
    pub fn on_interrupt(&self) -> SignalOutcome {
        loop {
            match self.state() {
                ShutdownState::Running => {
                    if self.first_dump_armed.swap(false, Ordering::SeqCst) {
                        if self.transition(ShutdownState::Running, ShutdownState::DiagnosticPending)
                        {
                            info!("interrupt: dumping diagnostics, interrupt again to stop");
                            return SignalOutcome::DiagnosticRequested;
                        }
                        // Lost a race against a concurrent signal; the armed
                        // flag is spent either way, re-evaluate the state.
                        continue;
                    }
                    if self.transition(ShutdownState::Running, ShutdownState::StopRequested) {
                        self.stop_side_effects();
                        return SignalOutcome::StopRequested;
                    }
                }
                ShutdownState::DiagnosticPending => {
                    if self.transition(
                        ShutdownState::DiagnosticPending,
                        ShutdownState::StopRequested,
                    ) {
                        self.stop_side_effects();
                        return SignalOutcome::StopRequested;
                    }
                }
                ShutdownState::StopRequested | ShutdownState::ForceExit => {
                    self.state
                        .store(ShutdownState::ForceExit as u8, Ordering::SeqCst);
                    warn!("interrupt: forcing exit");
                    self.console.stop();
                    return SignalOutcome::ForceExit;
                }
            }
        }
    }

    fn transition(&self, from: ShutdownState, to: ShutdownState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn stop_side_effects(&self) {
        if self.stop_effects_done.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("interrupt: stopping");
        if let Some(current) = self.processing.current() {
            info!(file = %current.display(), "file mid-processing at stop");
        }
        self.handler.stop();
        self.console.stop();
        info!("interrupt again to force exit");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counting {
        stops: AtomicUsize,
    }

    impl Counting {
        fn count(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }
    }

    impl DetectionHandler for Counting {
        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl ConsoleResource for Counting {
        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn coordinator(armed: bool) -> (ShutdownCoordinator, Arc<Counting>, Arc<Counting>) {
        let handler = Arc::new(Counting::default());
        let console = Arc::new(Counting::default());
        let coordinator = ShutdownCoordinator::new(
            armed,
            handler.clone(),
            console.clone(),
            ProcessingMarker::new(),
        );
        (coordinator, handler, console)
    }

    #[test]
    fn test_first_interrupt_requests_diagnostics_and_keeps_running() {
        let (coordinator, handler, _console) = coordinator(true);

        assert_eq!(coordinator.on_interrupt(), SignalOutcome::DiagnosticRequested);
        assert_eq!(coordinator.state(), ShutdownState::DiagnosticPending);
        assert!(!coordinator.should_stop());
        assert_eq!(handler.count(), 0);

        coordinator.consume_diagnostic();
        assert_eq!(coordinator.state(), ShutdownState::Running);
    }

    #[test]
    fn test_second_interrupt_stops_with_side_effects_once() {
        let (coordinator, handler, console) = coordinator(true);

        coordinator.on_interrupt();
        coordinator.consume_diagnostic();

        assert_eq!(coordinator.on_interrupt(), SignalOutcome::StopRequested);
        assert_eq!(coordinator.state(), ShutdownState::StopRequested);
        assert!(coordinator.should_stop());
        assert_eq!(handler.count(), 1);
        assert_eq!(console.count(), 1);
    }

    #[test]
    fn test_interrupt_while_pending_escalates_to_stop() {
        let (coordinator, handler, _console) = coordinator(true);

        coordinator.on_interrupt();
        // Dump not yet consumed; the operator presses again anyway.
        assert_eq!(coordinator.on_interrupt(), SignalOutcome::StopRequested);
        assert_eq!(handler.count(), 1);

        // The main loop's late consume must not resurrect Running.
        coordinator.consume_diagnostic();
        assert_eq!(coordinator.state(), ShutdownState::StopRequested);
    }

    #[test]
    fn test_disabled_first_dump_goes_straight_to_stop() {
        let (coordinator, handler, _console) = coordinator(false);

        assert_eq!(coordinator.on_interrupt(), SignalOutcome::StopRequested);
        assert_eq!(handler.count(), 1);
    }

    #[test]
    fn test_third_interrupt_forces_exit() {
        let (coordinator, handler, console) = coordinator(false);

        coordinator.on_interrupt();
        assert_eq!(coordinator.on_interrupt(), SignalOutcome::ForceExit);
        assert_eq!(coordinator.state(), ShutdownState::ForceExit);

        // Handler stopped exactly once; console released again, idempotently.
        assert_eq!(handler.count(), 1);
        assert_eq!(console.count(), 2);
    }
}
