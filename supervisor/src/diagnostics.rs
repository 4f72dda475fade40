//! Heartbeats, worker-count history and diagnostic snapshots.
//!
//! Everything here is best-effort: a failed history or dump-file write is
//! logged and swallowed, never allowed to abort the watch loop. The control
//! task is the only writer, so records land in wall-clock order.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::{DumpConfig, HeartbeatConfig, HistoryConfig};
use crate::ports::MemorySampler;
use crate::workers::WorkerRegistry;

/// Why a history record was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordReason {
    /// First record of the run.
    Initial,

    /// Worker count changed.
    Change,

    /// Fixed cadence, written even absent change.
    Interval,

    /// First-interrupt diagnostic snapshot.
    SigintDump,

    /// Operator-requested record.
    Manual,
}

impl RecordReason {
    /// Stable name used in the history CSV.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Change => "change",
            Self::Interval => "interval",
            Self::SigintDump => "sigint-dump",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for RecordReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One appended history row.
#[derive(Debug, Clone)]
pub struct HeartbeatRecord {
    /// Wall-clock timestamp, ISO-8601 seconds precision.
    pub timestamp: String,

    /// Live worker count at the instant of the record.
    pub workers: usize,

    /// Resident memory in MiB when sampling is enabled and available.
    pub memory_mb: Option<f64>,

    /// Why the record was written.
    pub reason: RecordReason,
}

impl HeartbeatRecord {
    fn csv_row(&self, include_memory: bool) -> String {
        if include_memory {
            let memory = self
                .memory_mb
                .map(|mb| format!("{mb:.2}"))
                .unwrap_or_default();
            format!("{},{},{},{}\n", self.timestamp, self.workers, memory, self.reason)
        } else {
            format!("{},{},{}\n", self.timestamp, self.workers, self.reason)
        }
    }
}

/// The diagnostics side of the control loop.
///
/// Owned and driven by the supervisor; `tick` runs once per loop iteration
/// and never blocks beyond the file appends it performs.
pub struct Diagnostics {
    heartbeat: HeartbeatConfig,
    history: HistoryConfig,
    dump: DumpConfig,
    registry: Arc<WorkerRegistry>,
    memory: Box<dyn MemorySampler>,

    last_heartbeat: Option<Instant>,
    prev_worker_count: usize,
    interval_anchor: Instant,
    last_history_write: Option<Instant>,
    min_write_gap: Duration,
}

impl Diagnostics {
    /// Create the diagnostics driver.
    pub fn new(
        heartbeat: HeartbeatConfig,
        history: HistoryConfig,
        dump: DumpConfig,
        registry: Arc<WorkerRegistry>,
        memory: Box<dyn MemorySampler>,
    ) -> Self {
        let prev_worker_count = registry.count();
        Self {
            heartbeat,
            history,
            dump,
            registry,
            memory,
            last_heartbeat: None,
            prev_worker_count,
            interval_anchor: Instant::now(),
            last_history_write: None,
            min_write_gap: Duration::from_secs(1),
        }
    }

    /// Tighten or relax the history write throttle.
    pub fn with_min_write_gap(mut self, gap: Duration) -> Self {
        self.min_write_gap = gap;
        self
    }

    /// Prepare the history log and write the run's `initial` record.
    pub fn init(&mut self, now: Instant) {
        if self.history.enabled {
            init_history_file(&self.history.path, self.history.include_memory);
            self.record(RecordReason::Initial, true, now);
        }
        self.interval_anchor = now;
    }

    /// One control-loop iteration's worth of diagnostics.
    pub fn tick(&mut self, now: Instant) {
        let count = self.registry.count();

        if self.heartbeat.enabled {
            let due = self
                .last_heartbeat
                .is_none_or(|at| now.duration_since(at) >= self.heartbeat.interval());
            if due {
                if self.heartbeat.show_worker_count {
                    info!(workers = count, "heartbeat alive {}", Local::now().format("%H:%M:%S"));
                } else {
                    info!("heartbeat alive {}", Local::now().format("%H:%M:%S"));
                }
                self.last_heartbeat = Some(now);
            }
        }

        if self.history.enabled {
            let changed = count != self.prev_worker_count;

            if changed && self.history.on_change {
                self.record(RecordReason::Change, false, now);
                if self.history.list_on_change {
                    self.list_workers();
                }
            }

            if now.duration_since(self.interval_anchor) >= self.history.interval() {
                self.record(RecordReason::Interval, true, now);
                self.interval_anchor = now;
            }

            if changed {
                self.prev_worker_count = count;
            }
        }
    }

    /// Append a history record immediately, bypassing the throttle.
    pub fn record_now(&mut self, reason: RecordReason, now: Instant) {
        if self.history.enabled {
            self.record(reason, true, now);
        }
    }

    /// Emit a full diagnostic snapshot of every live worker.
    ///
    /// Console always; mirrored into the dump file when file logging is
    /// enabled, with a timestamped separator per dump.
    pub fn dump_workers(&self, reason: &str) {
        let snapshot = self.registry.snapshot();
        let header = format!(
            "==== WORKER DUMP ({} | reason={reason}) ====",
            Local::now().format("%Y-%m-%dT%H:%M:%S")
        );

        info!("{header}");
        for worker in &snapshot {
            info!(
                "-- worker: {} (daemon={}) [{}] age={}s",
                worker.name,
                worker.daemon,
                worker.status,
                worker.since.elapsed().as_secs()
            );
        }
        info!("==== END DUMP ====");

        if self.dump.to_file {
            let result = append_dump(
                &self.dump.path,
                self.dump.timestamp_separator.then_some(header.as_str()),
                &snapshot,
            );
            if let Err(e) = result {
                warn!(path = %self.dump.path.display(), "dump file write failed: {e}");
            }
        }
    }

    /// Log the lightweight worker listing (names only, no status history).
    ///
    /// Same sink discipline as the full dump: console always, mirrored into
    /// the dump file when file logging is enabled.
    pub fn list_workers(&self) {
        let snapshot = self.registry.snapshot();
        let header = format!("=== WORKERS ({}) ===", Local::now().format("%H:%M:%S"));

        info!("{header}");
        for worker in &snapshot {
            info!("{} (daemon={})", worker.name, worker.daemon);
        }
        info!("===============");

        if self.dump.to_file {
            let result = append_listing(
                &self.dump.path,
                self.dump.timestamp_separator.then_some(header.as_str()),
                &snapshot,
            );
            if let Err(e) = result {
                warn!(path = %self.dump.path.display(), "listing file write failed: {e}");
            }
        }
    }

    fn record(&mut self, reason: RecordReason, force: bool, now: Instant) {
        if !force {
            if let Some(last) = self.last_history_write {
                if now.duration_since(last) < self.min_write_gap {
                    return;
                }
            }
        }

        let record = HeartbeatRecord {
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
            workers: self.registry.count(),
            memory_mb: if self.history.include_memory {
                self.memory.resident_mb()
            } else {
                None
            },
            reason,
        };

        match append_row(&self.history.path, &record.csv_row(self.history.include_memory)) {
            Ok(()) => self.last_history_write = Some(now),
            Err(e) => warn!(path = %self.history.path.display(), "history write failed: {e}"),
        }
    }
}

fn init_history_file(path: &Path, include_memory: bool) {
    if path.exists() {
        return;
    }
    let header = if include_memory {
        "timestamp,workers,memory_mb,reason\n"
    } else {
        "timestamp,workers,reason\n"
    };
    if let Err(e) = append_row(path, header) {
        warn!(path = %path.display(), "history init failed: {e}");
    }
}

fn append_row(path: &Path, row: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(row.as_bytes())
}

fn append_dump(
    path: &Path,
    separator: Option<&str>,
    snapshot: &[crate::workers::WorkerInfo],
) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if let Some(header) = separator {
        writeln!(file, "\n{header}")?;
    }
    for worker in snapshot {
        writeln!(
            file,
            "-- worker: {} (daemon={}) [{}] age={}s",
            worker.name,
            worker.daemon,
            worker.status,
            worker.since.elapsed().as_secs()
        )?;
    }
    writeln!(file, "==== END DUMP ====")
}

fn append_listing(
    path: &Path,
    separator: Option<&str>,
    snapshot: &[crate::workers::WorkerInfo],
) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if let Some(header) = separator {
        writeln!(file, "\n{header}")?;
    }
    for worker in snapshot {
        writeln!(file, "{} (daemon={})", worker.name, worker.daemon)?;
    }
    writeln!(file, "===============")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn setup(history_interval_secs: u64) -> (Diagnostics, Arc<WorkerRegistry>, TempDir) {
        let temp = TempDir::new().unwrap();
        let registry = WorkerRegistry::new();

        let history = HistoryConfig {
            path: temp.path().join("history.csv"),
            interval_secs: history_interval_secs,
            include_memory: false,
            ..HistoryConfig::default()
        };
        let dump = DumpConfig {
            path: temp.path().join("dump.txt"),
            ..DumpConfig::default()
        };

        let diagnostics = Diagnostics::new(
            HeartbeatConfig::default(),
            history,
            dump,
            registry.clone(),
            Box::new(crate::ports::NoopMemorySampler),
        )
        .with_min_write_gap(Duration::ZERO);

        (diagnostics, registry, temp)
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap_or_default()
    }

    #[test]
    fn test_history_header_written_once() {
        let (mut diagnostics, _registry, temp) = setup(3600);
        let now = Instant::now();

        diagnostics.init(now);
        diagnostics.init(now);

        let contents = read(&temp.path().join("history.csv"));
        assert_eq!(contents.matches("timestamp,workers,reason").count(), 1);
        assert_eq!(contents.matches(",initial").count(), 2);
    }

    #[test]
    fn test_worker_change_recorded_within_one_tick() {
        let (mut diagnostics, registry, temp) = setup(3600);
        let now = Instant::now();
        diagnostics.init(now);

        let _guard = registry.register("injected", false);
        diagnostics.tick(now);

        let contents = read(&temp.path().join("history.csv"));
        assert_eq!(contents.matches(",change").count(), 1);

        // No further change, no further change record.
        diagnostics.tick(now);
        let contents = read(&temp.path().join("history.csv"));
        assert_eq!(contents.matches(",change").count(), 1);
    }

    #[test]
    fn test_interval_record_not_before_interval_elapses() {
        let (mut diagnostics, _registry, temp) = setup(3600);
        let now = Instant::now();
        diagnostics.init(now);

        diagnostics.tick(now);
        diagnostics.tick(now);
        assert_eq!(read(&temp.path().join("history.csv")).matches(",interval").count(), 0);

        let (mut eager, _registry2, temp2) = setup(0);
        let now = Instant::now();
        eager.init(now);
        eager.tick(now);
        assert_eq!(read(&temp2.path().join("history.csv")).matches(",interval").count(), 1);
    }

    #[test]
    fn test_heartbeat_at_most_once_per_interval() {
        let (mut diagnostics, _registry, _temp) = setup(3600);
        let now = Instant::now();
        diagnostics.init(now);

        diagnostics.tick(now);
        let first = diagnostics.last_heartbeat;
        assert!(first.is_some());

        // Same instant again: not due, timestamp unchanged.
        diagnostics.tick(now);
        assert_eq!(diagnostics.last_heartbeat, first);
    }

    #[test]
    fn test_change_records_are_throttled() {
        let (mut diagnostics, registry, temp) = setup(3600);
        diagnostics.min_write_gap = Duration::from_secs(60);
        let start = Instant::now();
        diagnostics.init(start);

        let _a = registry.register("a", false);
        diagnostics.tick(start + Duration::from_secs(61));
        let _b = registry.register("b", false);
        diagnostics.tick(start + Duration::from_secs(62));

        // Second change arrives inside the write gap and is dropped.
        let contents = read(&temp.path().join("history.csv"));
        assert_eq!(contents.matches(",change").count(), 1);
    }

    #[test]
    fn test_listing_mirrored_into_dump_file() {
        let (diagnostics, registry, temp) = setup(3600);
        let _guard = registry.register("control", false);

        diagnostics.list_workers();

        let contents = read(&temp.path().join("dump.txt"));
        assert_eq!(contents.matches("=== WORKERS").count(), 1);
        assert!(contents.contains("control (daemon=false)"));
        assert_eq!(contents.matches("===============").count(), 1);
    }

    #[test]
    fn test_dump_written_with_separator() {
        let (diagnostics, registry, temp) = setup(3600);
        let _guard = registry.register("control", false);

        diagnostics.dump_workers("manual");
        diagnostics.dump_workers("manual");

        let contents = read(&temp.path().join("dump.txt"));
        assert_eq!(contents.matches("==== WORKER DUMP").count(), 2);
        assert_eq!(contents.matches("-- worker: control").count(), 2);
        assert_eq!(contents.matches("==== END DUMP ====").count(), 2);
    }
}
