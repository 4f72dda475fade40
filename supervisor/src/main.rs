//! `fsmon` process entry point.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use fsmon_supervisor::ports::SysinfoMemorySampler;
use fsmon_supervisor::{Collaborators, Supervisor, SupervisorConfig};
use fsmon_watcher::BackendKind;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Watch filesystem roots and keep the watch alive until interrupted.
#[derive(Debug, Parser)]
#[command(name = "fsmon", version, about)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Watch root; may be given multiple times (appended to the config's).
    #[arg(long = "root")]
    roots: Vec<PathBuf>,

    /// Force the polling backend regardless of root classification.
    #[arg(long)]
    force_polling: bool,

    /// Disable the heartbeat line.
    #[arg(long)]
    no_heartbeat: bool,

    /// Disable the diagnostic dump on the first interrupt.
    #[arg(long)]
    no_first_interrupt_dump: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run(Cli::parse()).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => SupervisorConfig::load(path)?,
        None => SupervisorConfig::default(),
    };
    config.watch_roots.extend(cli.roots);
    if cli.force_polling {
        config.backend_override = Some(BackendKind::Polling);
    }
    if cli.no_heartbeat {
        config.heartbeat.enabled = false;
    }
    if cli.no_first_interrupt_dump {
        config.dump.on_first_interrupt = false;
    }

    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("creating log dir {}", config.log_dir.display()))?;
    let crash_path = config.log_dir.join(format!(
        "fsmon_crash_{}.log",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ));
    write_start_banner(&crash_path);

    let collaborators = Collaborators {
        memory: Box::new(SysinfoMemorySampler::new()),
        ..Collaborators::default()
    };

    match Supervisor::new(config, collaborators).run().await {
        Ok(_) => {
            info!("fsmon stopped cleanly");
            Ok(())
        }
        Err(e) => {
            append_crash_record(&crash_path, &e);
            Err(e.into())
        }
    }
}

/// Persist an identifying banner so a crash record can be tied to its run
/// even when the process dies before logging anything else.
fn write_start_banner(path: &Path) {
    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| {
            writeln!(
                file,
                "fsmon {} started {}\n{}",
                env!("CARGO_PKG_VERSION"),
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S"),
                "=".repeat(50)
            )
        });
    if let Err(e) = result {
        error!(path = %path.display(), "could not write crash-record banner: {e}");
    }
}

fn append_crash_record(path: &Path, err: &fsmon_supervisor::SupervisorError) {
    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| {
            writeln!(
                file,
                "\nfatal error at {}:\n{err:?}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S")
            )
        });
    if let Err(e) = result {
        error!(path = %path.display(), "could not write crash record: {e}");
    }
}
