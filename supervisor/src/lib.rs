//! # fsmon supervisor
//!
//! The long-running process that keeps a filesystem watch alive. The
//! supervisor selects a watch backend for the configured roots, registers
//! them with fallback, then sits in a one-second control loop producing
//! heartbeats and worker history until an operator stops it through the
//! escalating interrupt protocol:
//!
//! 1. first interrupt: full diagnostic snapshot, keep running,
//! 2. second interrupt: orderly stop (observer, handler, queue, console),
//! 3. third interrupt: immediate forced exit.
//!
//! Baseline building, change comparison and persistence live behind the
//! collaborator ports in [`ports`]; the supervisor never inspects file
//! content itself.

pub mod config;
pub mod dashboard;
pub mod diagnostics;
pub mod error;
pub mod ports;
pub mod scan;
pub mod shutdown;
pub mod supervisor;
pub mod workers;

pub use config::SupervisorConfig;
pub use error::{Result, SupervisorError};
pub use shutdown::{ShutdownCoordinator, ShutdownState, SignalOutcome};
pub use supervisor::{Collaborators, ExitStatus, Supervisor};
pub use workers::{WorkerGuard, WorkerRegistry};
