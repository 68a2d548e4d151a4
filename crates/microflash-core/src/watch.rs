//! Polling file watcher.
//!
//! The loop checks a file's modification time at a fixed interval and runs
//! the callback synchronously whenever it changes. Cancellation is observed
//! between polls only, so a running callback always completes.

use crate::error::{Error, Result};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

/// Default time between modification checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Watch `path` and call `on_change` each time it is modified.
///
/// Returns when `cancel` is set, or with the first error from reading the
/// file's metadata or from the callback. A path that does not exist yields
/// [`Error::MissingScript`].
pub fn watch_file<F>(
    path: &Path,
    interval: Duration,
    cancel: &AtomicBool,
    on_change: F,
) -> Result<()>
where
    F: FnMut() -> Result<()>,
{
    info!("Watching {} for changes", path.display());
    poll_loop(|| modified(path), interval, cancel, on_change)
}

fn modified(path: &Path) -> Result<SystemTime> {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::MissingScript,
            _ => Error::file_read(path, e),
        })
}

fn poll_loop<M, F>(
    mut modified: M,
    interval: Duration,
    cancel: &AtomicBool,
    mut on_change: F,
) -> Result<()>
where
    M: FnMut() -> Result<SystemTime>,
    F: FnMut() -> Result<()>,
{
    let mut last = modified()?;

    while !cancel.load(Ordering::SeqCst) {
        thread::sleep(interval);
        if cancel.load(Ordering::SeqCst) {
            break;
        }

        let current = modified()?;
        if current != last {
            debug!("Change detected");
            last = current;
            on_change()?;
        }
    }

    debug!("Watch cancelled");
    Ok(())
}
