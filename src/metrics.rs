//! # Metrics
//!
//! Process-wide counters tracked with atomics and sharded maps so that the
//! producer and dispatcher threads never contend on a single lock just to
//! bump a counter. A point-in-time [`MetricsSnapshot`] is handed back to
//! embedders calling `Logger::metrics()`.

use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::error::{Error, ErrorKind};
use crate::record::Level;

#[derive(Debug, Default, Clone, Copy)]
pub struct LevelCounters {
    pub trace: u64,
    pub debug: u64,
    pub info: u64,
    pub warn: u64,
    pub error: u64,
}

impl LevelCounters {
    pub fn get(&self, level: Level) -> u64 {
        match level {
            Level::Trace => self.trace,
            Level::Debug => self.debug,
            Level::Info => self.info,
            Level::Warn => self.warn,
            Level::Error => self.error,
        }
    }
}

/// Point-in-time snapshot returned by `Logger::metrics()`.
#[derive(Debug, Default, Clone)]
pub struct MetricsSnapshot {
    pub messages_logged: LevelCounters,
    pub bytes_written: u64,
    pub write_count: u64,
    pub dropped: u64,
    pub rotation_count: u64,
    pub compression_count: u64,
    pub error_count: u64,
    pub errors_by_kind: AHashMap<String, u64>,
    pub last_error: Option<Error>,
}

#[derive(Default)]
struct AtomicLevelCounters {
    trace: AtomicU64,
    debug: AtomicU64,
    info: AtomicU64,
    warn: AtomicU64,
    error: AtomicU64,
}

impl AtomicLevelCounters {
    fn incr(&self, level: Level) {
        let counter = match level {
            Level::Trace => &self.trace,
            Level::Debug => &self.debug,
            Level::Info => &self.info,
            Level::Warn => &self.warn,
            Level::Error => &self.error,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> LevelCounters {
        LevelCounters {
            trace: self.trace.load(Ordering::Relaxed),
            debug: self.debug.load(Ordering::Relaxed),
            info: self.info.load(Ordering::Relaxed),
            warn: self.warn.load(Ordering::Relaxed),
            error: self.error.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.trace.store(0, Ordering::Relaxed);
        self.debug.store(0, Ordering::Relaxed);
        self.info.store(0, Ordering::Relaxed);
        self.warn.store(0, Ordering::Relaxed);
        self.error.store(0, Ordering::Relaxed);
    }
}

/// Live process-wide metrics. Cheap to update from any thread; reset and
/// snapshot take the sharded error map's mutex only, never the hot counters.
#[derive(Default)]
pub struct Metrics {
    messages_logged: AtomicLevelCounters,
    bytes_written: AtomicU64,
    write_count: AtomicU64,
    dropped: AtomicU64,
    rotation_count: AtomicU64,
    compression_count: AtomicU64,
    error_count: AtomicU64,
    errors_by_kind: Mutex<AHashMap<ErrorKind, u64>>,
    last_error: Mutex<Option<Error>>,
}

impl Metrics {
    pub fn record_logged(&self, level: Level) {
        self.messages_logged.incr(level);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self, bytes: u64) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_rotation(&self) {
        self.rotation_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_compression(&self) {
        self.compression_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, err: &Error) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
        *self.errors_by_kind.lock().entry(err.kind).or_insert(0) += 1;
        *self.last_error.lock() = Some(err.clone());
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let errors_by_kind = self
            .errors_by_kind
            .lock()
            .iter()
            .map(|(k, v)| (format!("{k:?}"), *v))
            .collect();
        MetricsSnapshot {
            messages_logged: self.messages_logged.snapshot(),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            write_count: self.write_count.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            rotation_count: self.rotation_count.load(Ordering::Relaxed),
            compression_count: self.compression_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            errors_by_kind,
            last_error: self.last_error.lock().clone(),
        }
    }

    pub fn reset(&self) {
        self.messages_logged.reset();
        self.bytes_written.store(0, Ordering::Relaxed);
        self.write_count.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        self.rotation_count.store(0, Ordering::Relaxed);
        self.compression_count.store(0, Ordering::Relaxed);
        self.error_count.store(0, Ordering::Relaxed);
        self.errors_by_kind.lock().clear();
        *self.last_error.lock() = None;
    }
}

/// Per-destination metrics: bytes written, write count, error count, rotation
/// count, tracked independently of the process-wide [`Metrics`].
#[derive(Default)]
pub struct DestinationMetrics {
    pub bytes_written: AtomicU64,
    pub write_count: AtomicU64,
    pub error_count: AtomicU64,
    pub rotation_count: AtomicU64,
}

impl DestinationMetrics {
    pub fn record_write(&self, bytes: u64) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rotation(&self) {
        self.rotation_count.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Severity;

    #[test]
    fn counters_increment_and_reset() {
        let m = Metrics::default();
        m.record_logged(Level::Info);
        m.record_logged(Level::Info);
        m.record_dropped();
        m.record_write(128);
        let snap = m.snapshot();
        assert_eq!(snap.messages_logged.info, 2);
        assert_eq!(snap.dropped, 1);
        assert_eq!(snap.bytes_written, 128);
        m.reset();
        assert_eq!(m.snapshot().messages_logged.info, 0);
    }

    #[test]
    fn last_error_tracked() {
        let m = Metrics::default();
        let err = Error::new(ErrorKind::FileWrite, "write", Severity::High);
        m.record_error(&err);
        let snap = m.snapshot();
        assert_eq!(snap.error_count, 1);
        assert_eq!(snap.last_error.unwrap().kind, ErrorKind::FileWrite);
    }
}
