//! # Retention Sweeper
//!
//! Periodic age-based pruning of rotated/compressed files. Modeled
//! on the same spawned-thread-with-explicit-shutdown shape as
//! [`crate::compression::CompressionPool`]: a single background thread
//! wakes on a tick, takes the destination list under its read lock (with a
//! bounded timeout so a hung write never wedges the sweeper), and asks each
//! file-backed destination to prune its own stale siblings.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::RwLock;

use crate::destination::Destination;
use crate::error::{Error, ErrorHandler, ErrorKind, Severity};

/// Sweeper's own wake cadence. Each destination still governs whether it
/// is actually due for a sweep via its own `cleanup_interval` (enforced to
/// a one-minute floor at configuration time), so this only needs to be at
/// least as fine as the smallest configured interval.
const SWEEP_TICK: Duration = Duration::from_secs(30);

/// How long the sweeper waits for the destination-list lock before giving
/// up for this tick; on timeout it reports a non-fatal error and retries
/// on the next tick.
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RetentionSweeper {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RetentionSweeper {
    /// Spawned only when at least one destination configures `max_age > 0`;
    /// the caller is responsible for that gating decision since `max_age`
    /// lives per-destination.
    pub fn start(
        destinations: Arc<RwLock<Vec<Arc<Destination>>>>,
        error_handler: ErrorHandler,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let handle = std::thread::spawn(move || {
            while !shutdown_clone.load(Ordering::Relaxed) {
                std::thread::sleep(SWEEP_TICK);
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                sweep_once(&destinations, &error_handler);
            }
        });
        RetentionSweeper {
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RetentionSweeper {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn sweep_once(destinations: &Arc<RwLock<Vec<Arc<Destination>>>>, error_handler: &ErrorHandler) {
    let Some(guard) = destinations.try_read_for(LOCK_TIMEOUT) else {
        error_handler(&Error::new(
            ErrorKind::Unknown,
            "retention_sweep",
            Severity::Low,
        ).with_cause("timed out waiting for destination list lock"));
        return;
    };
    for dest in guard.iter() {
        if !dest.is_enabled() {
            continue;
        }
        match dest.retain() {
            Ok(deleted) => {
                if deleted > 0 {
                    tracing::debug!(destination = %dest.name, deleted, "retention sweep pruned stale files");
                }
            }
            Err(err) => error_handler(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::CompressionHandle;
    use crate::config::RotationPolicy;
    use crate::destination::FileDestination;
    use crate::error::silent_error_handler;
    use crate::format::TextFormatter;
    use std::io::Write as _;

    #[test]
    fn sweep_once_prunes_stale_rotated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let backend = FileDestination::open(
            &path,
            RotationPolicy {
                max_age: Some(Duration::from_secs(0)),
                ..RotationPolicy::default()
            },
            CompressionHandle::disabled(),
        )
        .unwrap();
        let stale = dir.path().join("app.log.1");
        let mut f = std::fs::File::create(&stale).unwrap();
        writeln!(f, "old").unwrap();
        drop(f);
        let past = std::time::SystemTime::now() - Duration::from_secs(120);
        std::fs::File::options()
            .write(true)
            .open(&stale)
            .unwrap()
            .set_modified(past)
            .unwrap();

        let dest = Arc::new(Destination::new(
            "primary",
            Box::new(backend),
            Box::new(TextFormatter::new(crate::config::TextFormatOptions::default())),
            Arc::new(crate::metrics::Metrics::default()),
        ));
        let destinations = Arc::new(RwLock::new(vec![dest]));
        sweep_once(&destinations, &silent_error_handler());
        assert!(!stale.exists());
    }
}
