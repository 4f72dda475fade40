//! # fsmon watcher
//!
//! Filesystem-watch backends for the fsmon supervisor. This crate decides
//! which backend a set of watch roots should use, attaches a backend to each
//! root, and downgrades to polling when the event-driven backend cannot be
//! constructed or refuses a registration.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        fsmon watcher                          │
//! ├───────────────────────────────────────────────────────────────┤
//! │  WatchRoot ──► select_backend ──► BackendKind                 │
//! │                      │                                        │
//! │                      ▼                                        │
//! │  ObserverFactory ──► register_all ──► Registration            │
//! │                      │                                        │
//! │                      ▼                                        │
//! │  Observer ──► FileEvent ──► EventSink (external)              │
//! └───────────────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod error;
pub mod event;
pub mod observer;
pub mod registrar;

pub use backend::{select_backend, BackendKind, RootClass, WatchRoot};
pub use error::{Result, WatchError};
pub use event::{EventSink, FileEvent, FileEventKind, NullSink};
pub use observer::{NotifyObserver, NotifyObserverFactory, Observer, ObserverFactory};
pub use registrar::{register_all, Registration};
