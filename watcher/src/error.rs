//! Error types for the watch backends.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, WatchError>;

/// Errors that can occur while constructing or registering watch backends.
#[derive(Error, Debug)]
pub enum WatchError {
    /// The backend could not be constructed.
    #[error("backend construction failed: {0}")]
    Construction(#[source] notify::Error),

    /// A root could not be attached to the active observer.
    #[error("registration failed for {root}: {source}")]
    Registration {
        /// Root that failed to attach.
        root: PathBuf,
        /// Underlying backend error.
        #[source]
        source: notify::Error,
    },

    /// Attachment was attempted on an observer that has been stopped.
    #[error("observer already stopped")]
    ObserverStopped,
}
