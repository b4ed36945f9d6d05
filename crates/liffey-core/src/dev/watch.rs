//! Filesystem watching for the dev server.
//!
//! Events from notify are funneled through a coalescing thread: the
//! first event opens a window, everything arriving inside it is merged
//! into one batch, and the batch is handed to the async side over a
//! tokio channel. Paths under the output and cache directories are
//! ignored so the server's own writes never trigger rebuilds.

use crate::error::BuildWarning;
use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

/// A running watcher. Dropping it stops the backend.
pub struct Watcher {
    _inner: RecommendedWatcher,
    /// Batches of changed paths, one per coalescing window.
    pub rx: tokio::sync::mpsc::Receiver<Vec<PathBuf>>,
}

fn ignored(path: &Path, ignore: &[PathBuf]) -> bool {
    if ignore.iter().any(|dir| path.starts_with(dir)) {
        return true;
    }
    // Editor temp files and the atomic-write staging names.
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.') || n.ends_with('~'))
}

/// Start watching `root` recursively.
///
/// # Errors
/// Returns a [`BuildWarning::Watch`] when the platform backend cannot
/// be initialized; the caller keeps serving without rebuilds.
pub fn start(
    root: &Path,
    ignore: Vec<PathBuf>,
    coalesce: Duration,
) -> std::result::Result<Watcher, BuildWarning> {
    let (raw_tx, raw_rx) = mpsc::channel::<Vec<PathBuf>>();
    let (batch_tx, batch_rx) = tokio::sync::mpsc::channel::<Vec<PathBuf>>(16);

    let mut inner = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(event) = res {
            if !event.paths.is_empty() {
                let _ = raw_tx.send(event.paths);
            }
        }
    })
    .map_err(|e| BuildWarning::Watch {
        reason: e.to_string(),
    })?;
    inner
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| BuildWarning::Watch {
            reason: e.to_string(),
        })?;

    std::thread::spawn(move || {
        while let Ok(first) = raw_rx.recv() {
            let mut batch = first;
            // Window open: merge everything arriving inside it.
            while let Ok(more) = raw_rx.recv_timeout(coalesce) {
                batch.extend(more);
            }
            batch.retain(|p| !ignored(p, &ignore));
            batch.sort();
            batch.dedup();
            if batch.is_empty() {
                continue;
            }
            if batch_tx.blocking_send(batch).is_err() {
                break;
            }
        }
    });

    Ok(Watcher {
        _inner: inner,
        rx: batch_rx,
    })
}
