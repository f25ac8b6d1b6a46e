//! # Compression Pool
//!
//! Worker set that gzips rotated files asynchronously. Activated
//! when a destination's [`crate::config::CompressionPolicy`] is non-None;
//! the bounded job channel means a burst of rotations degrades to "some
//! files stay uncompressed until the next cycle" rather than blocking the
//! dispatcher.

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{Error, ErrorHandler, ErrorKind, Severity};
use crate::metrics::Metrics;

pub const COMPRESSION_QUEUE_CAPACITY: usize = 100;

enum Job {
    Compress(PathBuf),
    Shutdown,
}

/// Handle producers hold to enqueue rotated files. Cloned into every
/// [`crate::destination::FileDestination`] that has compression enabled.
#[derive(Clone)]
pub struct CompressionHandle {
    sender: Option<Sender<Job>>,
}

impl CompressionHandle {
    pub fn disabled() -> Self {
        CompressionHandle { sender: None }
    }

    /// Non-blocking enqueue: a full queue reports
    /// `CompressionQueueFull` and the caller moves on, relying on the next
    /// rotation cycle to retry.
    pub fn enqueue(&self, path: PathBuf) -> Result<(), Error> {
        let Some(sender) = &self.sender else {
            return Ok(());
        };
        match sender.try_send(Job::Compress(path)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Error::new(
                ErrorKind::CompressionQueueFull,
                "enqueue",
                Severity::Medium,
            )),
            Err(TrySendError::Disconnected(_)) => Ok(()),
        }
    }
}

/// Owns the worker threads; dropping it (or calling `shutdown`) drains and
/// joins them.
pub struct CompressionPool {
    sender: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl CompressionPool {
    pub fn start(worker_count: usize, metrics: Arc<Metrics>, error_handler: ErrorHandler) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(COMPRESSION_QUEUE_CAPACITY);
        let workers = (0..worker_count.max(1))
            .map(|_| spawn_worker(rx.clone(), metrics.clone(), error_handler.clone()))
            .collect();
        CompressionPool { sender: tx, workers }
    }

    pub fn handle(&self) -> CompressionHandle {
        CompressionHandle {
            sender: Some(self.sender.clone()),
        }
    }

    /// Drains and restarts workers, used when worker count or compression
    /// type changes at runtime.
    pub fn shutdown(self) {
        for _ in &self.workers {
            let _ = self.sender.send(Job::Shutdown);
        }
        for worker in self.workers {
            let _ = worker.join();
        }
    }
}

fn spawn_worker(
    rx: Receiver<Job>,
    metrics: Arc<Metrics>,
    error_handler: ErrorHandler,
) -> JoinHandle<()> {
    std::thread::spawn(move || loop {
        match rx.recv() {
            Ok(Job::Shutdown) | Err(_) => break,
            Ok(Job::Compress(path)) => {
                match compress_file(&path) {
                    Ok(()) => metrics.record_compression(),
                    Err(err) => error_handler(&err),
                }
                drain_pending_without_blocking(&rx, &metrics, &error_handler);
            }
        }
    })
}

fn drain_pending_without_blocking(rx: &Receiver<Job>, metrics: &Arc<Metrics>, error_handler: &ErrorHandler) {
    loop {
        match rx.try_recv() {
            Ok(Job::Compress(path)) => match compress_file(&path) {
                Ok(()) => metrics.record_compression(),
                Err(err) => error_handler(&err),
            },
            Ok(Job::Shutdown) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => break,
        }
    }
}

/// Opens `path`, streams it through a gzip encoder into `<path>.gz`, then
/// deletes the source on success. Leaves the source intact on any failure.
fn compress_file(path: &Path) -> Result<(), Error> {
    let compress = || -> io::Result<()> {
        let source = File::open(path)?;
        let mut reader = BufReader::new(source);
        let mut gz_path = path.as_os_str().to_os_string();
        gz_path.push(".gz");
        let dest = File::create(&gz_path)?;
        let mut encoder = GzEncoder::new(BufWriter::new(dest), Compression::default());
        io::copy(&mut reader, &mut encoder)?;
        encoder.finish()?;
        Ok(())
    };
    compress().map_err(|e| {
        Error::new(ErrorKind::CompressionFailed, "compress", Severity::Medium)
            .with_path(path.display().to_string())
            .with_cause(e)
    })?;
    std::fs::remove_file(path).map_err(|e| {
        Error::new(ErrorKind::CompressionFailed, "remove_source", Severity::Medium)
            .with_path(path.display().to_string())
            .with_cause(e)
    })?;
    tracing::debug!(path = %path.display(), "compressed rotated file");
    Ok(())
}
