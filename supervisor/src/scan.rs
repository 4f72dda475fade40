//! Startup scan for files that need a baseline.

use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

/// Walk `roots` and collect every file whose extension is in `extensions`
/// (lowercase, without the dot).
///
/// Runs once, before the control loop starts; unreadable entries are skipped
/// with a warning. Lock and temp artifacts (`~$` owner files) are excluded.
pub fn scan_for_files(roots: &[PathBuf], extensions: &[String]) -> Vec<PathBuf> {
    let mut found = Vec::new();

    for root in roots {
        if !root.exists() {
            warn!(root = %root.display(), "scan root does not exist, skipping");
            continue;
        }

        let before = found.len();
        for entry in WalkDir::new(root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(root = %root.display(), "scan entry skipped: {e}");
                    continue;
                }
            };

            let path = entry.path();
            if !entry.file_type().is_file() || is_owner_file(path) {
                continue;
            }
            if matches_extension(path, extensions) {
                found.push(path.to_path_buf());
            }
        }
        info!(root = %root.display(), files = found.len() - before, "scan complete");
    }

    found.sort();
    found.dedup();
    found
}

/// Filter `targets` down to the ones that exist, logging the ones that do
/// not. Missing manual targets are an operator mistake worth announcing, not
/// an error.
pub fn existing_targets(targets: &[PathBuf]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for target in targets {
        if target.exists() {
            out.push(target.clone());
        } else {
            warn!(target = %target.display(), "manual baseline target does not exist");
        }
    }
    out
}

fn matches_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| extensions.iter().any(|want| *want == e))
}

fn is_owner_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("~$"))
}
