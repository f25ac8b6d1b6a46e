//! # Destination
//!
//! Per-sink state machine: owns the writer, the formatter, the optional
//! batch buffer, and per-destination metrics. All destinations are driven
//! exclusively from the dispatcher thread; the mutex here exists for the
//! rare case of an externally-triggered `flush`/`rotate` call racing the
//! dispatcher, not for producer access.

mod file;
mod syslog;

pub use file::FileDestination;
pub use syslog::{SyslogDestination, SyslogProtocol};

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use crate::compression::CompressionHandle;
use crate::config::{BatchConfig, RotationPolicy};
use crate::error::{Error, ErrorKind, Severity};
use crate::format::Formatter;
use crate::metrics::{DestinationMetrics, Metrics};
use crate::record::Record;

/// Parsed form of a destination URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationUri {
    File(String),
    SyslogUnix(String),
    SyslogUdp(String),
    SyslogTcp(String),
}

impl DestinationUri {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        if let Some(rest) = raw.strip_prefix("syslog+tcp://") {
            return Ok(DestinationUri::SyslogTcp(rest.to_string()));
        }
        if let Some(rest) = raw.strip_prefix("syslog:///") {
            return Ok(DestinationUri::SyslogUnix(format!("/{rest}")));
        }
        if let Some(rest) = raw.strip_prefix("syslog://") {
            return Ok(DestinationUri::SyslogUdp(rest.to_string()));
        }
        if raw.is_empty() {
            return Err(Error::new(ErrorKind::InvalidConfig, "parse_uri", Severity::Critical)
                .with_cause("empty destination uri"));
        }
        Ok(DestinationUri::File(raw.to_string()))
    }
}

/// Backend-specific write target, behind a single trait so the dispatcher
/// and [`Destination`] wrapper stay backend-agnostic.
pub trait Backend: Send {
    /// Writes already-formatted bytes for `record`. The file backend writes
    /// `bytes` verbatim; the syslog backend wraps them in the `<PRI>...`
    /// frame, which needs the record's level to compute severity.
    fn write_record(&mut self, record: &crate::record::Record, bytes: &[u8]) -> Result<(), Error>;
    fn flush(&mut self) -> Result<(), Error>;
    fn rotate(&mut self) -> Result<(), Error> {
        Ok(())
    }
    fn close(&mut self) -> Result<(), Error>;
    fn size(&self) -> u64 {
        0
    }

    /// Age-based pruning of rotated/compressed siblings. Returns the
    /// number of files deleted. The syslog backend has nothing to sweep, so
    /// the default is a no-op; [`crate::destination::file::FileDestination`]
    /// is the only backend that overrides it.
    fn retain(&mut self) -> Result<u64, Error> {
        Ok(0)
    }

    /// Applies an updated rotation policy without reopening the file, for
    /// `set_max_size`/`set_max_files`/`set_max_age`/`set_cleanup_interval`
    /// reconfiguration. Backends with no notion of rotation ignore it.
    fn set_rotation_policy(&mut self, _policy: RotationPolicy) {}

    /// Swaps the compression handle a rotation enqueues into, for
    /// `set_compression`/`set_compress_workers` reconfiguration. Backends
    /// with no notion of rotation ignore it.
    fn set_compression(&mut self, _handle: CompressionHandle) {}

    /// Updates how many rotations must elapse before a rotated file is
    /// eligible for compression (`set_compress_min_age`).
    fn set_compression_min_age(&mut self, _min_age: u32) {}

    /// Drains the count of rotations the backend has performed since the
    /// last call, so [`Destination`] can mirror each one into its own and
    /// the global rotation counter. Backends with no notion of rotation
    /// (syslog) report 0.
    fn take_rotation_count(&mut self) -> u64 {
        0
    }
}

/// Accumulates formatted bytes until a byte, count, or time threshold is
/// reached. Concatenating pre-rendered lines is only
/// meaningful for backends that write bytes verbatim (the file backend);
/// a syslog destination that enables batching still works but frames the
/// whole accumulated batch under the triggering record's level, so batching
/// is intended for file destinations in practice.
struct BatchBuffer {
    config: BatchConfig,
    bytes: Vec<u8>,
    count: usize,
    deadline: Instant,
}

impl BatchBuffer {
    fn new(config: BatchConfig) -> Self {
        let deadline = Instant::now() + config.flush_interval;
        BatchBuffer {
            config,
            bytes: Vec::new(),
            count: 0,
            deadline,
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
        self.count += 1;
    }

    fn due(&self) -> bool {
        self.bytes.len() >= self.config.max_bytes
            || self.count >= self.config.max_count
            || Instant::now() >= self.deadline
    }

    fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Drains the buffer and resets the deadline, for use by both the
    /// threshold-triggered path in `process` and an explicit `flush`.
    fn take(&mut self) -> Vec<u8> {
        self.count = 0;
        self.deadline = Instant::now() + self.config.flush_interval;
        std::mem::take(&mut self.bytes)
    }
}

/// One configured sink. Wraps a [`Backend`], a [`Formatter`], and the
/// destination-local mutex/metrics pair.
pub struct Destination {
    pub name: String,
    formatter: RwLock<Box<dyn Formatter>>,
    state: Mutex<DestinationState>,
    batch: Mutex<Option<BatchBuffer>>,
    pub metrics: Arc<DestinationMetrics>,
    global_metrics: Arc<Metrics>,
    enabled: std::sync::atomic::AtomicBool,
}

struct DestinationState {
    backend: Box<dyn Backend>,
}

impl Destination {
    pub fn new(
        name: impl Into<String>,
        backend: Box<dyn Backend>,
        formatter: Box<dyn Formatter>,
        global_metrics: Arc<Metrics>,
    ) -> Self {
        Destination {
            name: name.into(),
            formatter: RwLock::new(formatter),
            state: Mutex::new(DestinationState { backend }),
            batch: Mutex::new(None),
            metrics: Arc::new(DestinationMetrics::default()),
            global_metrics,
            enabled: std::sync::atomic::AtomicBool::new(true),
        }
    }

    /// Drains the backend's rotation counter and mirrors each rotation into
    /// the per-destination and global counters.
    fn report_rotations(&self, state: &mut DestinationState) {
        for _ in 0..state.backend.take_rotation_count() {
            self.metrics.record_rotation();
            self.global_metrics.record_rotation();
        }
    }

    /// Enables or replaces the batch buffer. Passing a disabled [`BatchConfig`]
    /// clears any pending buffer without flushing it — callers that need the
    /// pending bytes written out first should call `flush` beforehand.
    pub fn set_batch_config(&self, config: BatchConfig) {
        *self.batch.lock() = if config.enabled {
            Some(BatchBuffer::new(config))
        } else {
            None
        };
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, std::sync::atomic::Ordering::Relaxed);
    }

    /// Swaps the formatter in place, for `set_format`/`set_format_option`
    /// reconfiguration without tearing down the destination.
    pub fn set_formatter(&self, formatter: Box<dyn Formatter>) {
        *self.formatter.write() = formatter;
    }

    /// Formats and writes `record` through the file/syslog write paths.
    /// A disabled destination is a no-op at this boundary, per the
    /// `enabled=false ⇒ writes are no-ops` invariant. When a batch buffer is
    /// configured, the formatted bytes accumulate there instead of hitting
    /// the backend immediately; the backend only sees a write once a
    /// threshold is crossed.
    pub fn process(&self, record: &Record) -> Result<(), Error> {
        if !self.is_enabled() {
            return Ok(());
        }
        let bytes = self.formatter.read().format(record);

        let mut batch_guard = self.batch.lock();
        if let Some(batch) = batch_guard.as_mut() {
            batch.push(&bytes);
            if !batch.due() {
                return Ok(());
            }
            let flushed = batch.take();
            drop(batch_guard);
            return self.write_through(record, &flushed);
        }
        drop(batch_guard);
        self.write_through(record, &bytes)
    }

    fn write_through(&self, record: &Record, bytes: &[u8]) -> Result<(), Error> {
        let mut state = self.state.lock();
        let result = state.backend.write_record(record, bytes);
        match &result {
            Ok(()) => self.metrics.record_write(bytes.len() as u64),
            Err(_) => self.metrics.record_error(),
        }
        self.report_rotations(&mut state);
        result
    }

    /// Flushes any pending batch buffer, then the backend's own writer.
    /// A batched destination loses at most one window's worth of records on
    /// abrupt termination since this is also called from `close`.
    pub fn flush(&self) -> Result<(), Error> {
        let pending = {
            let mut batch_guard = self.batch.lock();
            batch_guard
                .as_mut()
                .filter(|b| !b.is_empty())
                .map(BatchBuffer::take)
        };
        if let Some(bytes) = pending {
            let placeholder = Record::new_raw(crate::record::Level::Info, Arc::from(&b""[..]));
            let mut state = self.state.lock();
            let result = state.backend.write_record(&placeholder, &bytes);
            match &result {
                Ok(()) => self.metrics.record_write(bytes.len() as u64),
                Err(_) => self.metrics.record_error(),
            }
            self.report_rotations(&mut state);
            result?;
        }
        self.state.lock().backend.flush()
    }

    /// Flushes the batch buffer only if its time deadline has elapsed,
    /// leaving byte/count-driven flushing to `process`. Polled by
    /// [`crate::batch::BatchTicker`] so a trickle of writes too slow to
    /// cross the byte/count thresholds still lands within one window.
    pub fn flush_if_batch_due(&self) -> Result<(), Error> {
        let due = {
            let guard = self.batch.lock();
            guard.as_ref().map(|b| !b.is_empty() && b.due()).unwrap_or(false)
        };
        if due {
            self.flush()
        } else {
            Ok(())
        }
    }

    pub fn rotate(&self) -> Result<(), Error> {
        let mut state = self.state.lock();
        let result = state.backend.rotate();
        self.report_rotations(&mut state);
        result
    }

    /// Flushes any pending batch before closing, so shutdown never silently
    /// drops the in-flight window.
    pub fn close(&self) -> Result<(), Error> {
        self.flush()?;
        self.state.lock().backend.close()
    }

    pub fn size(&self) -> u64 {
        self.state.lock().backend.size()
    }

    pub fn retain(&self) -> Result<u64, Error> {
        self.state.lock().backend.retain()
    }

    pub fn set_rotation_policy(&self, policy: RotationPolicy) {
        self.state.lock().backend.set_rotation_policy(policy);
    }

    pub fn set_compression(&self, handle: CompressionHandle) {
        self.state.lock().backend.set_compression(handle);
    }

    pub fn set_compression_min_age(&self, min_age: u32) {
        self.state.lock().backend.set_compression_min_age(min_age);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_file_uri() {
        assert_eq!(
            DestinationUri::parse("/var/log/app.log").unwrap(),
            DestinationUri::File("/var/log/app.log".to_string())
        );
    }

    #[test]
    fn parses_syslog_unix_uri() {
        assert_eq!(
            DestinationUri::parse("syslog:///dev/log").unwrap(),
            DestinationUri::SyslogUnix("/dev/log".to_string())
        );
    }

    #[test]
    fn parses_syslog_udp_and_tcp_uris() {
        assert_eq!(
            DestinationUri::parse("syslog://localhost:514").unwrap(),
            DestinationUri::SyslogUdp("localhost:514".to_string())
        );
        assert_eq!(
            DestinationUri::parse("syslog+tcp://localhost:601").unwrap(),
            DestinationUri::SyslogTcp("localhost:601".to_string())
        );
    }

    #[test]
    fn disabled_destination_write_is_noop() {
        struct CountingBackend(Arc<std::sync::atomic::AtomicUsize>);
        impl Backend for CountingBackend {
            fn write_record(&mut self, _record: &Record, _bytes: &[u8]) -> Result<(), Error> {
                self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                Ok(())
            }
            fn flush(&mut self) -> Result<(), Error> {
                Ok(())
            }
            fn close(&mut self) -> Result<(), Error> {
                Ok(())
            }
        }
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let dest = Destination::new(
            "d",
            Box::new(CountingBackend(counter.clone())),
            Box::new(crate::format::TextFormatter::new(
                crate::config::TextFormatOptions::default(),
            )),
            Arc::new(Metrics::default()),
        );
        dest.set_enabled(false);
        let record = Record::new_text(crate::record::Level::Info, "m", vec![]);
        dest.process(&record).unwrap();
        assert_eq!(counter.load(std::sync::atomic::Ordering::Relaxed), 0);
    }

    #[test]
    fn batched_writes_accumulate_until_count_threshold() {
        struct CountingBackend(Arc<std::sync::atomic::AtomicUsize>);
        impl Backend for CountingBackend {
            fn write_record(&mut self, _record: &Record, _bytes: &[u8]) -> Result<(), Error> {
                self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                Ok(())
            }
            fn flush(&mut self) -> Result<(), Error> {
                Ok(())
            }
            fn close(&mut self) -> Result<(), Error> {
                Ok(())
            }
        }
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let dest = Destination::new(
            "d",
            Box::new(CountingBackend(counter.clone())),
            Box::new(crate::format::TextFormatter::new(
                crate::config::TextFormatOptions::default(),
            )),
            Arc::new(Metrics::default()),
        );
        dest.set_batch_config(crate::config::BatchConfig {
            enabled: true,
            max_bytes: 1 << 20,
            max_count: 3,
            flush_interval: std::time::Duration::from_secs(3600),
        });
        let record = Record::new_text(crate::record::Level::Info, "m", vec![]);
        dest.process(&record).unwrap();
        dest.process(&record).unwrap();
        assert_eq!(counter.load(std::sync::atomic::Ordering::Relaxed), 0);
        dest.process(&record).unwrap();
        assert_eq!(counter.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[test]
    fn explicit_flush_writes_pending_batch() {
        struct CountingBackend(Arc<std::sync::atomic::AtomicUsize>);
        impl Backend for CountingBackend {
            fn write_record(&mut self, _record: &Record, _bytes: &[u8]) -> Result<(), Error> {
                self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                Ok(())
            }
            fn flush(&mut self) -> Result<(), Error> {
                Ok(())
            }
            fn close(&mut self) -> Result<(), Error> {
                Ok(())
            }
        }
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let dest = Destination::new(
            "d",
            Box::new(CountingBackend(counter.clone())),
            Box::new(crate::format::TextFormatter::new(
                crate::config::TextFormatOptions::default(),
            )),
            Arc::new(Metrics::default()),
        );
        dest.set_batch_config(crate::config::BatchConfig {
            enabled: true,
            max_bytes: 1 << 20,
            max_count: 100,
            flush_interval: std::time::Duration::from_secs(3600),
        });
        let record = Record::new_text(crate::record::Level::Info, "m", vec![]);
        dest.process(&record).unwrap();
        assert_eq!(counter.load(std::sync::atomic::Ordering::Relaxed), 0);
        dest.flush().unwrap();
        assert_eq!(counter.load(std::sync::atomic::Ordering::Relaxed), 1);
    }
}
