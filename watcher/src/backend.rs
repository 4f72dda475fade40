//! Backend kinds and the per-root-set backend selection rule.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which watch backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// OS-level, event-driven change notification.
    Native,

    /// Periodic directory re-scan; reliable on network shares and volume
    /// roots where native notification is not.
    Polling,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Polling => write!(f, "polling"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "polling" => Ok(Self::Polling),
            other => Err(UnknownBackend(other.to_string())),
        }
    }
}

/// Error returned when a backend name override is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownBackend(pub String);

impl fmt::Display for UnknownBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown backend name: {:?}", self.0)
    }
}

impl std::error::Error for UnknownBackend {}

/// Classification of a watch root for backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootClass {
    /// Regular directory somewhere below a volume root.
    Ordinary,

    /// Network share root (`\\server\share` style prefix).
    ShareRoot,

    /// Drive or volume root (`C:\`, `/`).
    DriveRoot,
}

impl RootClass {
    /// Whether native notification is considered unreliable here.
    pub fn is_boundary(self) -> bool {
        !matches!(self, Self::Ordinary)
    }
}

/// A filesystem root supplied at startup.
///
/// Roots are configuration data: they are never mutated after startup, and a
/// root that does not exist on disk is skipped at registration time rather
/// than treated as fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchRoot(pub PathBuf);

impl WatchRoot {
    /// Create a root from anything path-like.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// The underlying path.
    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Whether the root currently exists on disk.
    pub fn exists(&self) -> bool {
        self.0.exists()
    }

    /// Classify the root for backend selection.
    ///
    /// Classification is string-based so that Windows-style roots are
    /// recognized regardless of the host platform; malformed paths classify
    /// as [`RootClass::Ordinary`].
    pub fn classify(&self) -> RootClass {
        classify_path(&self.0.to_string_lossy())
    }
}

fn classify_path(raw: &str) -> RootClass {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return RootClass::Ordinary;
    }

    // UNC prefix: \\server\share or the verbatim \\?\ form.
    if trimmed.starts_with("\\\\") {
        return RootClass::ShareRoot;
    }

    // Unix volume root.
    if trimmed == "/" {
        return RootClass::DriveRoot;
    }

    // Drive designator: a single ASCII letter followed by ':' with nothing
    // but a separator after it.
    let bytes = trimmed.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        let rest = &trimmed[2..];
        if rest.is_empty() || rest == "\\" || rest == "/" {
            return RootClass::DriveRoot;
        }
    }

    RootClass::Ordinary
}

/// Choose the watch backend for a set of roots.
///
/// Pure decision function: explicit overrides win, then the environment
/// force-polling flag, then auto-classification. Any boundary root in the
/// set pushes the whole set to polling because a single unreliable root
/// would otherwise silently drop events.
pub fn select_backend(
    roots: &[WatchRoot],
    override_kind: Option<BackendKind>,
    force_polling: bool,
) -> BackendKind {
    if force_polling || override_kind == Some(BackendKind::Polling) {
        return BackendKind::Polling;
    }
    if override_kind == Some(BackendKind::Native) {
        return BackendKind::Native;
    }

    if roots.iter().any(|r| r.classify().is_boundary()) {
        BackendKind::Polling
    } else {
        BackendKind::Native
    }
}
