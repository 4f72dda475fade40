//! Error types for the supervisor.

use thiserror::Error;

/// Result type alias for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Errors that can abort supervisor startup.
///
/// Once the control loop is running, almost nothing propagates: backend
/// trouble downgrades to polling, diagnostics failures are swallowed with a
/// log line, and shutdown steps are individually fault-isolated.
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// Watch backend error that survived the fallback path.
    #[error("watch error: {0}")]
    Watch(#[from] fsmon_watcher::WatchError),

    /// Configuration file could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
