//! Configuration for the watch supervisor.

use std::path::{Path, PathBuf};
use std::time::Duration;

use fsmon_watcher::BackendKind;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, SupervisorError};

/// Environment variable forcing the polling backend.
pub const ENV_FORCE_POLLING: &str = "FSMON_FORCE_POLLING";

/// Environment variable naming the backend to use.
pub const ENV_BACKEND: &str = "FSMON_BACKEND";

/// Top-level supervisor configuration.
///
/// Every diagnostics feature is individually switchable; the evolving set of
/// entry points the supervisor replaces becomes one binary plus flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Roots to watch for changes.
    pub watch_roots: Vec<PathBuf>,

    /// Additional roots that are watched but excluded from the startup scan.
    pub monitor_only_roots: Vec<PathBuf>,

    /// Whether to scan for existing files at startup.
    pub scan_all: bool,

    /// Roots to scan at startup; falls back to `watch_roots` when empty.
    pub scan_roots: Vec<PathBuf>,

    /// Files always handed to the baseline builder, scan or no scan.
    pub manual_baseline_targets: Vec<PathBuf>,

    /// File extensions the startup scan collects (lowercase, no dot).
    pub supported_extensions: Vec<String>,

    /// Backend override; `None` means auto-selection by root classification.
    pub backend_override: Option<BackendKind>,

    /// Control loop quantum in seconds.
    pub poll_quantum_secs: u64,

    /// Heartbeat settings.
    pub heartbeat: HeartbeatConfig,

    /// Worker-count history settings.
    pub history: HistoryConfig,

    /// Diagnostic snapshot settings.
    pub dump: DumpConfig,

    /// Directory for crash records.
    pub log_dir: PathBuf,

    /// Optional status endpoint, e.g. `127.0.0.1:5000`.
    pub dashboard_addr: Option<String>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            watch_roots: Vec::new(),
            monitor_only_roots: Vec::new(),
            scan_all: false,
            scan_roots: Vec::new(),
            manual_baseline_targets: Vec::new(),
            supported_extensions: vec!["xlsx".to_string(), "xlsm".to_string(), "xls".to_string()],
            backend_override: None,
            poll_quantum_secs: 1,
            heartbeat: HeartbeatConfig::default(),
            history: HistoryConfig::default(),
            dump: DumpConfig::default(),
            log_dir: PathBuf::from("logs"),
            dashboard_addr: None,
        }
    }
}

impl SupervisorConfig {
    /// Create a configuration watching the given roots.
    pub fn new(watch_roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            watch_roots: watch_roots.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Load a configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SupervisorError::Config(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| SupervisorError::Config(format!("{}: {e}", path.display())))
    }

    /// Set the backend override.
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend_override = Some(backend);
        self
    }

    /// Add a monitor-only root.
    pub fn with_monitor_only_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.monitor_only_roots.push(root.into());
        self
    }

    /// Set the dashboard bind address.
    pub fn with_dashboard(mut self, addr: impl Into<String>) -> Self {
        self.dashboard_addr = Some(addr.into());
        self
    }

    /// Control loop quantum.
    pub fn poll_quantum(&self) -> Duration {
        Duration::from_secs(self.poll_quantum_secs.max(1))
    }

    /// Watch roots and monitor-only roots, deduplicated, first-seen order.
    pub fn all_watch_roots(&self) -> Vec<PathBuf> {
        let mut out: Vec<PathBuf> = Vec::new();
        for root in self.watch_roots.iter().chain(&self.monitor_only_roots) {
            if !out.contains(root) {
                out.push(root.clone());
            }
        }
        out
    }

    /// Roots the startup scan walks.
    pub fn effective_scan_roots(&self) -> Vec<PathBuf> {
        if self.scan_roots.is_empty() {
            self.watch_roots.clone()
        } else {
            self.scan_roots.clone()
        }
    }
}

/// Heartbeat settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Whether the heartbeat line is emitted at all.
    pub enabled: bool,

    /// Seconds between heartbeat lines.
    pub interval_secs: u64,

    /// Include the live worker count in the line.
    pub show_worker_count: bool,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            show_worker_count: true,
        }
    }
}

impl HeartbeatConfig {
    /// Heartbeat interval as a duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Worker-count history settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Whether history records are written at all.
    pub enabled: bool,

    /// Append-only CSV the records land in.
    pub path: PathBuf,

    /// Record whenever the worker count changes.
    pub on_change: bool,

    /// Seconds between interval records written even absent change.
    pub interval_secs: u64,

    /// Sample resident memory into each record when a sampler is wired.
    pub include_memory: bool,

    /// Log the lightweight worker listing when the count changes.
    pub list_on_change: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("worker_history.csv"),
            on_change: true,
            interval_secs: 300,
            include_memory: true,
            list_on_change: false,
        }
    }
}

impl HistoryConfig {
    /// Interval-record cadence as a duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Diagnostic snapshot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DumpConfig {
    /// First interrupt dumps diagnostics instead of stopping.
    pub on_first_interrupt: bool,

    /// Mirror dumps into a file as well as the console.
    pub to_file: bool,

    /// Dump file path.
    pub path: PathBuf,

    /// Write a timestamped separator line before each dump.
    pub timestamp_separator: bool,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            on_first_interrupt: true,
            to_file: true,
            path: PathBuf::from("worker_dump_raw.txt"),
            timestamp_separator: true,
        }
    }
}

/// Backend-related process environment inputs, read once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    /// Truthy `FSMON_FORCE_POLLING` forces the polling backend.
    pub force_polling: bool,

    /// `FSMON_BACKEND` names a backend explicitly.
    pub backend: Option<BackendKind>,
}

impl EnvOverrides {
    /// Read the overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_values(
            std::env::var(ENV_FORCE_POLLING).ok().as_deref(),
            std::env::var(ENV_BACKEND).ok().as_deref(),
        )
    }

    /// Build overrides from raw variable values.
    pub fn from_values(force_polling: Option<&str>, backend: Option<&str>) -> Self {
        let backend = backend.and_then(|raw| match raw.parse::<BackendKind>() {
            Ok(kind) => Some(kind),
            Err(e) => {
                warn!("{ENV_BACKEND} ignored: {e}");
                None
            }
        });

        Self {
            force_polling: force_polling.is_some_and(is_truthy),
            backend,
        }
    }
}

fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_all_watch_roots_dedups_preserving_order() {
        let config = SupervisorConfig::new(["/data/a", "/data/b"])
            .with_monitor_only_root("/data/b")
            .with_monitor_only_root("/data/c");

        assert_eq!(
            config.all_watch_roots(),
            vec![
                PathBuf::from("/data/a"),
                PathBuf::from("/data/b"),
                PathBuf::from("/data/c")
            ]
        );
    }

    #[test]
    fn test_scan_roots_fall_back_to_watch_roots() {
        let config = SupervisorConfig::new(["/data/a"]);
        assert_eq!(config.effective_scan_roots(), vec![PathBuf::from("/data/a")]);

        let mut config = config;
        config.scan_roots = vec![PathBuf::from("/scan/only")];
        assert_eq!(config.effective_scan_roots(), vec![PathBuf::from("/scan/only")]);
    }

    #[test]
    fn test_env_override_parsing() {
        assert_eq!(
            EnvOverrides::from_values(Some("1"), None),
            EnvOverrides {
                force_polling: true,
                backend: None
            }
        );
        assert_eq!(
            EnvOverrides::from_values(Some("off"), Some("polling")),
            EnvOverrides {
                force_polling: false,
                backend: Some(BackendKind::Polling)
            }
        );
        // Unknown backend names are ignored, not fatal.
        assert_eq!(
            EnvOverrides::from_values(None, Some("kqueue-turbo")),
            EnvOverrides::default()
        );
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = SupervisorConfig::new(["/data/a"]).with_backend(BackendKind::Polling);
        let json = serde_json::to_string(&config).unwrap();
        let back: SupervisorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.watch_roots, config.watch_roots);
        assert_eq!(back.backend_override, Some(BackendKind::Polling));
    }

    #[test]
    fn test_partial_config_file_uses_defaults() {
        let parsed: SupervisorConfig =
            serde_json::from_str(r#"{"watch_roots": ["/data/a"]}"#).unwrap();
        assert_eq!(parsed.watch_roots, vec![PathBuf::from("/data/a")]);
        assert!(parsed.heartbeat.enabled);
        assert_eq!(parsed.history.interval_secs, 300);
    }
}
