//! Observer handles over the notify backends.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{PollWatcher, RecursiveMode, Watcher};
use tracing::{debug, error, info};

use crate::backend::BackendKind;
use crate::error::{Result, WatchError};
use crate::event::{EventSink, FileEvent, FileEventKind};

/// Default re-scan cadence for the polling backend.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// An active set of watch registrations.
///
/// At most one observer is live and started at any time; replacing one on
/// fallback stops the old instance before the new one takes registrations so
/// the same event is never delivered twice.
pub trait Observer: Send {
    /// Backend this observer was built with.
    fn kind(&self) -> BackendKind;

    /// Attach a root, optionally recursively.
    fn attach(&mut self, root: &Path, recursive: bool) -> Result<()>;

    /// Mark the observer live. Registration must be complete first.
    fn start(&mut self) -> Result<()>;

    /// Detach every root and shut the backend's worker down.
    fn stop(&mut self);
}

/// Builds observers of a requested backend kind.
///
/// The seam exists so the registrar's fallback path can be exercised without
/// a real backend; production code uses [`NotifyObserverFactory`].
pub trait ObserverFactory {
    /// Construct an observer of `kind`.
    fn build(&self, kind: BackendKind) -> Result<Box<dyn Observer>>;
}

/// Production observer wrapping a `notify` watcher.
pub struct NotifyObserver {
    kind: BackendKind,
    inner: Option<Box<dyn Watcher + Send>>,
    watched: Vec<PathBuf>,
    started: bool,
}

impl NotifyObserver {
    /// Construct an observer of `kind`, forwarding events to `sink`.
    pub fn new(
        kind: BackendKind,
        sink: Arc<dyn EventSink>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let handler = move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                let event_kind = FileEventKind::from(event.kind);
                for path in event.paths {
                    sink.deliver(FileEvent::new(event_kind, path));
                }
            }
            Err(e) => error!("watch backend error: {e}"),
        };

        let inner: Box<dyn Watcher + Send> = match kind {
            BackendKind::Native => Box::new(
                notify::recommended_watcher(handler).map_err(WatchError::Construction)?,
            ),
            BackendKind::Polling => Box::new(
                PollWatcher::new(
                    handler,
                    notify::Config::default().with_poll_interval(poll_interval),
                )
                .map_err(WatchError::Construction)?,
            ),
        };

        Ok(Self {
            kind,
            inner: Some(inner),
            watched: Vec::new(),
            started: false,
        })
    }
}

impl Observer for NotifyObserver {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn attach(&mut self, root: &Path, recursive: bool) -> Result<()> {
        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        let watcher = self.inner.as_mut().ok_or(WatchError::ObserverStopped)?;

        watcher
            .watch(root, mode)
            .map_err(|source| WatchError::Registration {
                root: root.to_path_buf(),
                source,
            })?;

        self.watched.push(root.to_path_buf());
        debug!(root = %root.display(), backend = %self.kind, "root attached");
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        // notify backends deliver as soon as a root is attached; starting the
        // handle records it as the single live instance.
        self.started = true;
        info!(backend = %self.kind, roots = self.watched.len(), "observer started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(ref mut watcher) = self.inner {
            for root in &self.watched {
                let _ = watcher.unwatch(root);
            }
        }

        // Dropping the watcher joins its worker thread.
        self.inner = None;
        self.watched.clear();

        if self.started {
            self.started = false;
            info!(backend = %self.kind, "observer stopped");
        }
    }
}

impl Drop for NotifyObserver {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Factory producing [`NotifyObserver`]s wired to one event sink.
pub struct NotifyObserverFactory {
    sink: Arc<dyn EventSink>,
    poll_interval: Duration,
}

impl NotifyObserverFactory {
    /// Create a factory delivering to `sink`.
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the polling backend's re-scan cadence.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl ObserverFactory for NotifyObserverFactory {
    fn build(&self, kind: BackendKind) -> Result<Box<dyn Observer>> {
        Ok(Box::new(NotifyObserver::new(
            kind,
            self.sink.clone(),
            self.poll_interval,
        )?))
    }
}
