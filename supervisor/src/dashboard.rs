//! Optional auxiliary status endpoint.
//!
//! Fire-and-forget: the server runs on its own daemon worker, failures are
//! logged and never fatal, and nothing waits for it at shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::workers::WorkerRegistry;

/// Status document served by the dashboard.
#[derive(Debug, Serialize)]
struct Status {
    uptime_secs: u64,
    backend: String,
    workers: usize,
    watched_roots: Vec<String>,
}

/// Start the status endpoint on `addr` (e.g. `127.0.0.1:5000`).
///
/// Returns immediately; the serving thread registers itself as a daemon
/// worker and runs for the life of the process.
pub fn spawn_dashboard(
    addr: String,
    registry: Arc<WorkerRegistry>,
    backend: String,
    watched_roots: Vec<PathBuf>,
) {
    std::thread::spawn(move || {
        let server = match tiny_http::Server::http(&addr) {
            Ok(server) => server,
            Err(e) => {
                warn!(%addr, "dashboard failed to start: {e}");
                return;
            }
        };
        info!(%addr, "dashboard serving");

        let guard = registry.register("dashboard", true);
        let started_at = Instant::now();
        let roots: Vec<String> = watched_roots
            .iter()
            .map(|r| r.display().to_string())
            .collect();

        for request in server.incoming_requests() {
            guard.set_status("responding");
            let status = Status {
                uptime_secs: started_at.elapsed().as_secs(),
                backend: backend.clone(),
                workers: registry.count(),
                watched_roots: roots.clone(),
            };

            let body = serde_json::to_string_pretty(&status)
                .unwrap_or_else(|_| "{}".to_string());
            let mut response = tiny_http::Response::from_string(body);
            if let Ok(header) =
                tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
            {
                response = response.with_header(header);
            }

            if let Err(e) = request.respond(response) {
                warn!("dashboard response failed: {e}");
            }
            guard.set_status("idle");
        }
    });
}
