//! # Logger
//!
//! The single type an embedder holds. Construction wires the
//! gate, the ingestion channel, the dispatcher, every configured
//! destination, and the background threads (compression pools, the
//! retention sweeper, the batch ticker) into one `Arc<Logger>`; every other
//! method is a thin, lock-scoped operation over that wiring.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};

use crate::batch::BatchTicker;
use crate::channel::{self, ChannelSender};
use crate::compression::{CompressionHandle, CompressionPool};
use crate::config::{
    BackendConfig, CompressionPolicy, CompressionType, Config, DestinationConfig, FieldPathRule,
    Format, JsonFormatOptions, RedactionConfig, RotationPolicy, SamplerConfig, TextFormatOptions,
};
use crate::destination::{Backend, Destination, FileDestination, SyslogDestination, SyslogProtocol};
use crate::dispatcher::Dispatcher;
use crate::error::{default_error_handler, Error, ErrorHandler, ErrorKind, Severity};
use crate::filter::{ExcludeRegexFilter, FieldFilter, Filter, IncludeRegexFilter};
use crate::format::build_formatter;
use crate::gate::Gate;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::record::{Fields, Level, Record, StructuredEntry, Value};
use crate::redact::Redactor;
use crate::retention::RetentionSweeper;

/// Snapshot of a configured destination, returned by `list_destinations`.
#[derive(Debug, Clone)]
pub struct DestinationInfo {
    pub name: String,
    pub enabled: bool,
    pub size: u64,
}

/// Per-destination runtime state `Logger` owns outside the `Destination`
/// itself: currently just the compression pool, which needs a full
/// drain-and-restart on `set_compress_workers`/`set_compression` rather than
/// a simple field swap.
#[derive(Default)]
struct DestinationRuntime {
    compression_pool: Option<CompressionPool>,
}

/// Constructs the engine described by `SPEC_FULL.md` gate,
/// channel, dispatcher, destinations, and the background maintenance
/// threads, all reachable only through this type.
pub struct Logger {
    config: RwLock<Config>,
    gate: Arc<Gate>,
    sender: RwLock<Option<ChannelSender>>,
    dispatcher: Mutex<Option<Dispatcher>>,
    destinations: Arc<RwLock<Vec<Arc<Destination>>>>,
    runtimes: Mutex<HashMap<String, DestinationRuntime>>,
    retention_sweeper: Mutex<Option<RetentionSweeper>>,
    batch_ticker: Mutex<Option<BatchTicker>>,
    metrics: Arc<Metrics>,
    redactor: Arc<ArcSwap<Redactor>>,
    user_error_handler: Arc<RwLock<ErrorHandler>>,
    effective_error_handler: ErrorHandler,
    closed: AtomicBool,
}

fn build_effective_handler(metrics: Arc<Metrics>, user: Arc<RwLock<ErrorHandler>>) -> ErrorHandler {
    Arc::new(move |err: &Error| {
        metrics.record_error(err);
        (user.read())(err);
    })
}

fn build_backend(
    backend_cfg: &BackendConfig,
    rotation: RotationPolicy,
    compression_policy: &CompressionPolicy,
    metrics: &Arc<Metrics>,
    error_handler: &ErrorHandler,
) -> Result<(Box<dyn Backend>, Option<CompressionPool>), Error> {
    match backend_cfg {
        BackendConfig::File { path } => {
            let (handle, pool) = if compression_policy.kind != CompressionType::None {
                let pool = CompressionPool::start(
                    compression_policy.workers,
                    metrics.clone(),
                    error_handler.clone(),
                );
                (pool.handle(), Some(pool))
            } else {
                (CompressionHandle::disabled(), None)
            };
            let file = FileDestination::open_with_compression_min_age(
                path,
                rotation,
                handle,
                compression_policy.min_age,
            )?;
            Ok((Box::new(file), pool))
        }
        BackendConfig::SyslogUnix { socket_path, facility, tag } => Ok((
            Box::new(SyslogDestination::connect(
                SyslogProtocol::Unix,
                socket_path,
                *facility,
                tag.clone(),
            )?),
            None,
        )),
        BackendConfig::SyslogUdp { address, facility, tag } => Ok((
            Box::new(SyslogDestination::connect(
                SyslogProtocol::Udp,
                address,
                *facility,
                tag.clone(),
            )?),
            None,
        )),
        BackendConfig::SyslogTcp { address, facility, tag } => Ok((
            Box::new(SyslogDestination::connect(
                SyslogProtocol::Tcp,
                address,
                *facility,
                tag.clone(),
            )?),
            None,
        )),
    }
}

fn build_destination(
    cfg: &DestinationConfig,
    format: Format,
    text_options: &TextFormatOptions,
    json_options: &JsonFormatOptions,
    metrics: &Arc<Metrics>,
    error_handler: &ErrorHandler,
) -> Result<(Arc<Destination>, Option<CompressionPool>), Error> {
    let formatter = build_formatter(format, text_options.clone(), json_options.clone());
    let (backend, pool) = build_backend(
        &cfg.backend,
        cfg.rotation.clone(),
        &cfg.compression,
        metrics,
        error_handler,
    )?;
    let destination = Arc::new(Destination::new(
        cfg.name.clone(),
        backend,
        formatter,
        metrics.clone(),
    ));
    destination.set_enabled(cfg.enabled);
    destination.set_batch_config(cfg.batch.clone());
    Ok((destination, pool))
}

impl Logger {
    /// Validates `config`, opens every configured destination, and spawns
    /// the dispatcher plus whichever background threads the configuration
    /// actually needs (a retention sweeper iff some destination sets
    /// `max_age`, a batch ticker iff some destination enables batching).
    pub fn new(mut config: Config) -> Result<Arc<Self>, Error> {
        config.validate()?;

        let metrics = Arc::new(Metrics::default());
        let user_error_handler = Arc::new(RwLock::new(default_error_handler()));
        let effective_error_handler = build_effective_handler(metrics.clone(), user_error_handler.clone());

        let gate = Arc::new(Gate::new(config.min_level));
        gate.set_sampler(&(&config.sampler).into());

        let redactor = Arc::new(ArcSwap::new(Arc::new(
            Redactor::new(&config.redaction)
                .map_err(|e| Error::new(ErrorKind::InvalidConfig, "new", Severity::Critical).with_cause(e))?,
        )));

        let (sender, receiver) = channel::bounded(config.channel_size);

        let mut destinations = Vec::with_capacity(config.destinations.len());
        let mut runtimes = HashMap::new();
        let mut needs_retention_sweeper = false;
        let mut needs_batch_ticker = false;
        for dest_cfg in &config.destinations {
            let (destination, pool) = build_destination(
                dest_cfg,
                config.format,
                &config.text_options,
                &config.json_options,
                &metrics,
                &effective_error_handler,
            )?;
            if dest_cfg.rotation.max_age.is_some() {
                needs_retention_sweeper = true;
            }
            if dest_cfg.batch.enabled {
                needs_batch_ticker = true;
            }
            destinations.push(destination);
            runtimes.insert(dest_cfg.name.clone(), DestinationRuntime { compression_pool: pool });
        }
        let destinations = Arc::new(RwLock::new(destinations));

        let dispatcher = Dispatcher::start(
            receiver,
            destinations.clone(),
            redactor.clone(),
            metrics.clone(),
            effective_error_handler.clone(),
        );

        let retention_sweeper = needs_retention_sweeper
            .then(|| RetentionSweeper::start(destinations.clone(), effective_error_handler.clone()));
        let batch_ticker = needs_batch_ticker
            .then(|| BatchTicker::start(destinations.clone(), effective_error_handler.clone()));

        Ok(Arc::new(Logger {
            config: RwLock::new(config),
            gate,
            sender: RwLock::new(Some(sender)),
            dispatcher: Mutex::new(Some(dispatcher)),
            destinations,
            runtimes: Mutex::new(runtimes),
            retention_sweeper: Mutex::new(retention_sweeper),
            batch_ticker: Mutex::new(batch_ticker),
            metrics,
            redactor,
            user_error_handler,
            effective_error_handler,
            closed: AtomicBool::new(false),
        }))
    }

    // ---- submission -----------------------------------------------------

    /// Routes a record already past the gate to the channel. Error-level
    /// records that fail to enqueue fall back to a direct stderr write
    /// since they are the class least safe to
    /// drop silently.
    fn submit(&self, record: Record) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let level = record.level;
        let fallback_line = (level == Level::Error).then(|| record.message().to_string());
        let sender = self.sender.read();
        let Some(sender) = sender.as_ref() else {
            return;
        };
        if let Err(err) = sender.try_send(record) {
            self.metrics.record_dropped();
            (self.effective_error_handler)(&err);
            if let Some(line) = fallback_line {
                eprintln!("omni error: submit -: Error-level record dropped from a full channel: {line}");
            }
        }
    }

    /// Plain text submission. `message` is rendered as-is; use
    /// `structured_log` for callers that want file/line/stack-trace capture.
    pub fn log(&self, level: Level, message: impl Into<String>, fields: Fields) {
        let message = message.into();
        if !self.gate.admit(level, &message, &fields) {
            return;
        }
        self.submit(Record::new_text(level, message, fields));
    }

    /// Structured submission: captures call site and,
    /// when enabled, a stack trace. Error-level records always attempt a
    /// stack trace when `enable_stack_traces` is set; other levels only do
    /// so when `capture_all_stacks` is also set — "traces disabled" is the
    /// dominant default either way.
    #[track_caller]
    pub fn structured_log(&self, level: Level, message: impl Into<String>, fields: Fields) {
        let message = message.into();
        if !self.gate.admit(level, &message, &fields) {
            return;
        }
        let location = std::panic::Location::caller();
        let (enable_stack_traces, capture_all_stacks, format, timestamp_pattern) = {
            let cfg = self.config.read();
            (
                cfg.enable_stack_traces,
                cfg.capture_all_stacks,
                cfg.format,
                cfg.text_options.timestamp_pattern.clone(),
            )
        };
        let capture_stack = enable_stack_traces && (level == Level::Error || capture_all_stacks);
        let stack_trace =
            capture_stack.then(|| format!("{:#?}", std::backtrace::Backtrace::force_capture()));
        let timestamp = match format {
            Format::Text => chrono::Utc::now().format(&timestamp_pattern).to_string(),
            Format::Json => chrono::Utc::now().to_rfc3339(),
        };
        let entry = StructuredEntry {
            level_name: level.as_str().to_string(),
            message,
            fields,
            stack_trace,
            file: Some(location.file().to_string()),
            line: Some(location.line()),
            timestamp,
        };
        self.submit(Record::new_structured(level, entry));
    }

    /// Context-aware submission: waits up to `config.submit_timeout`
    /// for channel capacity instead of dropping immediately, returning
    /// whatever classified error `ChannelSender::send_timeout` reports.
    pub fn log_blocking(&self, level: Level, message: impl Into<String>, fields: Fields) -> Result<(), Error> {
        let message = message.into();
        if !self.gate.admit(level, &message, &fields) {
            return Ok(());
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::new(ErrorKind::AlreadyClosed, "submit", Severity::Medium));
        }
        let timeout = self.config.read().submit_timeout;
        let sender = self.sender.read();
        let Some(sender) = sender.as_ref() else {
            return Err(Error::new(ErrorKind::ChannelClosed, "submit", Severity::High));
        };
        sender.send_timeout(Record::new_text(level, message, fields), timeout)
    }

    pub fn trace(&self, message: impl Into<String>) {
        self.log(Level::Trace, message, Vec::new());
    }
    pub fn debug(&self, message: impl Into<String>) {
        self.log(Level::Debug, message, Vec::new());
    }
    pub fn info(&self, message: impl Into<String>) {
        self.log(Level::Info, message, Vec::new());
    }
    pub fn warn(&self, message: impl Into<String>) {
        self.log(Level::Warn, message, Vec::new());
    }
    pub fn error(&self, message: impl Into<String>) {
        self.log(Level::Error, message, Vec::new());
    }

    // ---- destination management ------------------------------------------

    pub fn add_destination(&self, config: DestinationConfig) -> Result<(), Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::new(ErrorKind::AlreadyClosed, "add_destination", Severity::Medium));
        }
        if self.destinations.read().iter().any(|d| d.name == config.name) {
            return Err(Error::new(ErrorKind::InvalidConfig, "add_destination", Severity::Medium)
                .with_destination(config.name.clone())
                .with_cause("destination name already exists"));
        }
        let (format, text_options, json_options) = {
            let cfg = self.config.read();
            (cfg.format, cfg.text_options.clone(), cfg.json_options.clone())
        };
        let (destination, pool) = build_destination(
            &config,
            format,
            &text_options,
            &json_options,
            &self.metrics,
            &self.effective_error_handler,
        )?;
        self.destinations.write().push(destination);
        self.runtimes
            .lock()
            .insert(config.name.clone(), DestinationRuntime { compression_pool: pool });
        if config.rotation.max_age.is_some() {
            self.ensure_retention_sweeper();
        }
        if config.batch.enabled {
            self.ensure_batch_ticker();
        }
        self.config.write().destinations.push(config);
        Ok(())
    }

    pub fn remove_destination(&self, name: &str) -> Result<(), Error> {
        let removed = {
            let mut destinations = self.destinations.write();
            let idx = destinations
                .iter()
                .position(|d| d.name == name)
                .ok_or_else(|| {
                    Error::new(ErrorKind::DestinationNotFound, "remove_destination", Severity::Medium)
                        .with_destination(name.to_string())
                })?;
            destinations.remove(idx)
        };
        if let Err(err) = removed.close() {
            (self.effective_error_handler)(&err);
        }
        if let Some(runtime) = self.runtimes.lock().remove(name) {
            if let Some(pool) = runtime.compression_pool {
                pool.shutdown();
            }
        }
        self.config.write().destinations.retain(|d| d.name != name);
        Ok(())
    }

    pub fn enable_destination(&self, name: &str) -> Result<(), Error> {
        self.set_destination_enabled(name, true)
    }

    pub fn disable_destination(&self, name: &str) -> Result<(), Error> {
        self.set_destination_enabled(name, false)
    }

    fn set_destination_enabled(&self, name: &str, enabled: bool) -> Result<(), Error> {
        let destinations = self.destinations.read();
        let dest = destinations.iter().find(|d| d.name == name).ok_or_else(|| {
            Error::new(ErrorKind::DestinationNotFound, "set_destination_enabled", Severity::Medium)
                .with_destination(name.to_string())
        })?;
        dest.set_enabled(enabled);
        Ok(())
    }

    pub fn list_destinations(&self) -> Vec<DestinationInfo> {
        self.destinations
            .read()
            .iter()
            .map(|d| DestinationInfo {
                name: d.name.clone(),
                enabled: d.is_enabled(),
                size: d.size(),
            })
            .collect()
    }

    fn ensure_retention_sweeper(&self) {
        let mut sweeper = self.retention_sweeper.lock();
        if sweeper.is_none() {
            *sweeper = Some(RetentionSweeper::start(
                self.destinations.clone(),
                self.effective_error_handler.clone(),
            ));
        }
    }

    fn ensure_batch_ticker(&self) {
        let mut ticker = self.batch_ticker.lock();
        if ticker.is_none() {
            *ticker = Some(BatchTicker::start(
                self.destinations.clone(),
                self.effective_error_handler.clone(),
            ));
        }
    }

    // ---- flush / sync / shutdown -----------------------------------------

    pub fn sync(&self) -> Result<(), Error> {
        let sender = self.sender.read();
        match sender.as_ref() {
            Some(s) => s.sync(),
            None => Err(Error::new(ErrorKind::ChannelClosed, "sync", Severity::Low)),
        }
    }

    pub fn sync_timeout(&self, timeout: Duration) -> Result<(), Error> {
        let sender = self.sender.read();
        match sender.as_ref() {
            Some(s) => s.sync_timeout(timeout),
            None => Err(Error::new(ErrorKind::ChannelClosed, "sync", Severity::Low)),
        }
    }

    /// Blocks until every record submitted so far has reached the
    /// dispatcher, then flushes every destination's writer (and any pending
    /// batch buffer).
    pub fn flush(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::new(ErrorKind::AlreadyClosed, "flush", Severity::Low));
        }
        self.sync()?;
        self.flush_destinations()
    }

    pub fn flush_with_timeout(&self, timeout: Duration) -> Result<(), Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::new(ErrorKind::AlreadyClosed, "flush", Severity::Low));
        }
        self.sync_timeout(timeout)?;
        self.flush_destinations()
    }

    fn flush_destinations(&self) -> Result<(), Error> {
        let destinations = self.destinations.read();
        let mut first_err = None;
        for dest in destinations.iter() {
            if let Err(err) = dest.flush() {
                (self.effective_error_handler)(&err);
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Tears down the dispatcher, background threads, and every destination.
    /// Idempotent: a second call returns `AlreadyClosed` instead of
    /// panicking or double-joining threads.
    pub fn close(&self) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(Error::new(ErrorKind::AlreadyClosed, "close", Severity::Low));
        }
        self.teardown();
        Ok(())
    }

    fn teardown(&self) {
        *self.sender.write() = None;
        if let Some(dispatcher) = self.dispatcher.lock().take() {
            dispatcher.join();
        }
        if let Some(ticker) = self.batch_ticker.lock().take() {
            ticker.shutdown();
        }
        if let Some(sweeper) = self.retention_sweeper.lock().take() {
            sweeper.shutdown();
        }
        for dest in self.destinations.read().iter() {
            if let Err(err) = dest.close() {
                (self.effective_error_handler)(&err);
            }
        }
        for (_, runtime) in self.runtimes.lock().drain() {
            if let Some(pool) = runtime.compression_pool {
                pool.shutdown();
            }
        }
    }

    /// Bounded-time shutdown: teardown continues in the background
    /// past the deadline rather than abandoning destinations half-closed.
    pub fn close_with_timeout(&self, timeout: Duration) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(Error::new(ErrorKind::AlreadyClosed, "close", Severity::Low));
        }
        *self.sender.write() = None;
        let dispatcher = self.dispatcher.lock().take();
        let batch_ticker = self.batch_ticker.lock().take();
        let retention_sweeper = self.retention_sweeper.lock().take();
        let destinations = self.destinations.clone();
        let runtimes = std::mem::take(&mut *self.runtimes.lock());
        let error_handler = self.effective_error_handler.clone();

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            if let Some(dispatcher) = dispatcher {
                dispatcher.join();
            }
            if let Some(ticker) = batch_ticker {
                ticker.shutdown();
            }
            if let Some(sweeper) = retention_sweeper {
                sweeper.shutdown();
            }
            for dest in destinations.read().iter() {
                if let Err(err) = dest.close() {
                    error_handler(&err);
                }
            }
            for (_, runtime) in runtimes {
                if let Some(pool) = runtime.compression_pool {
                    pool.shutdown();
                }
            }
            let _ = done_tx.send(());
        });

        match done_rx.recv_timeout(timeout) {
            Ok(()) => Ok(()),
            Err(_) => Err(Error::new(ErrorKind::ShutdownTimeout, "close_with_timeout", Severity::Medium)
                .with_cause("teardown exceeded the requested deadline; continuing in background")),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    // ---- reconfiguration --------------------------------------------------

    pub fn set_level(&self, level: Level) {
        self.gate.set_min_level(level);
        self.config.write().min_level = level;
    }

    pub fn level(&self) -> Level {
        self.gate.min_level()
    }

    pub fn is_level_enabled(&self, level: Level) -> bool {
        level >= self.gate.min_level()
    }

    pub fn format(&self) -> Format {
        self.config.read().format
    }

    pub fn set_format(&self, format: Format) {
        let (text_options, json_options) = {
            let mut cfg = self.config.write();
            cfg.format = format;
            (cfg.text_options.clone(), cfg.json_options.clone())
        };
        self.rebuild_formatters(format, &text_options, &json_options);
    }

    pub fn set_text_format_options(&self, options: TextFormatOptions) {
        let (format, json_options) = {
            let mut cfg = self.config.write();
            cfg.text_options = options.clone();
            (cfg.format, cfg.json_options.clone())
        };
        self.rebuild_formatters(format, &options, &json_options);
    }

    pub fn set_json_format_options(&self, options: JsonFormatOptions) {
        let (format, text_options) = {
            let mut cfg = self.config.write();
            cfg.json_options = options.clone();
            (cfg.format, cfg.text_options.clone())
        };
        self.rebuild_formatters(format, &text_options, &options);
    }

    fn rebuild_formatters(&self, format: Format, text_options: &TextFormatOptions, json_options: &JsonFormatOptions) {
        for dest in self.destinations.read().iter() {
            dest.set_formatter(build_formatter(format, text_options.clone(), json_options.clone()));
        }
    }

    fn update_rotation(&self, f: impl Fn(&mut RotationPolicy)) {
        let snapshot: Vec<(String, RotationPolicy)> = {
            let mut cfg = self.config.write();
            for dest_cfg in cfg.destinations.iter_mut() {
                f(&mut dest_cfg.rotation);
                dest_cfg.rotation.normalize();
            }
            cfg.destinations.iter().map(|d| (d.name.clone(), d.rotation.clone())).collect()
        };
        let destinations = self.destinations.read();
        for (name, policy) in snapshot {
            if let Some(dest) = destinations.iter().find(|d| d.name == name) {
                dest.set_rotation_policy(policy);
            }
        }
    }

    pub fn set_max_size(&self, max_size: u64) {
        self.update_rotation(|p| p.max_size = max_size);
    }

    pub fn set_max_files(&self, max_files: u32) {
        self.update_rotation(|p| p.max_files = max_files);
    }

    pub fn set_max_age(&self, max_age: Option<Duration>) {
        self.update_rotation(|p| p.max_age = max_age);
        if max_age.is_some() {
            self.ensure_retention_sweeper();
        }
    }

    pub fn set_cleanup_interval(&self, interval: Duration) {
        self.update_rotation(|p| p.cleanup_interval = interval);
    }

    fn update_compression(&self, f: impl Fn(&mut CompressionPolicy)) {
        let snapshot: Vec<(String, CompressionPolicy)> = {
            let mut cfg = self.config.write();
            for dest_cfg in cfg.destinations.iter_mut() {
                f(&mut dest_cfg.compression);
                if dest_cfg.compression.workers == 0 {
                    dest_cfg.compression.workers = 1;
                }
            }
            cfg.destinations.iter().map(|d| (d.name.clone(), d.compression.clone())).collect()
        };
        let destinations = self.destinations.read();
        for (name, policy) in snapshot {
            let Some(dest) = destinations.iter().find(|d| d.name == name) else {
                continue;
            };
            let old_pool = {
                let mut runtimes = self.runtimes.lock();
                let entry = runtimes.entry(name.clone()).or_default();
                entry.compression_pool.take()
            };
            if let Some(pool) = old_pool {
                pool.shutdown();
            }
            if policy.kind == CompressionType::None {
                dest.set_compression(CompressionHandle::disabled());
                continue;
            }
            let pool = CompressionPool::start(policy.workers, self.metrics.clone(), self.effective_error_handler.clone());
            dest.set_compression(pool.handle());
            dest.set_compression_min_age(policy.min_age);
            self.runtimes.lock().insert(name, DestinationRuntime { compression_pool: Some(pool) });
        }
    }

    pub fn set_compression(&self, kind: CompressionType) {
        self.update_compression(|c| c.kind = kind);
    }

    pub fn set_compress_min_age(&self, min_age: u32) {
        self.update_compression(|c| c.min_age = min_age.max(1));
    }

    pub fn set_compress_workers(&self, workers: usize) {
        self.update_compression(|c| c.workers = workers.max(1));
    }

    pub fn set_sampling(&self, sampler: SamplerConfig) {
        self.gate.set_sampler(&(&sampler).into());
        self.config.write().sampler = sampler;
    }

    pub fn add_filter(&self, filter: Box<dyn Filter>) {
        self.gate.with_filters_mut(|chain| chain.push(filter));
    }

    pub fn clear_filters(&self) {
        self.gate.with_filters_mut(|chain| chain.clear());
    }

    pub fn set_field_filter(&self, key: impl Into<String>, value: impl Into<String>) {
        self.add_filter(Box::new(FieldFilter::new(key, value)));
    }

    pub fn set_regex_filter(&self, pattern: &str) -> Result<(), Error> {
        let filter = IncludeRegexFilter::new(pattern)
            .map_err(|e| Error::new(ErrorKind::InvalidConfig, "set_regex_filter", Severity::Medium).with_cause(e))?;
        self.add_filter(Box::new(filter));
        Ok(())
    }

    pub fn set_exclude_regex_filter(&self, pattern: &str) -> Result<(), Error> {
        let filter = ExcludeRegexFilter::new(pattern).map_err(|e| {
            Error::new(ErrorKind::InvalidConfig, "set_exclude_regex_filter", Severity::Medium).with_cause(e)
        })?;
        self.add_filter(Box::new(filter));
        Ok(())
    }

    pub fn set_redaction(&self, enabled: bool) -> Result<(), Error> {
        let mut cfg = self.config.write();
        cfg.redaction.enabled = enabled;
        let redactor = Redactor::new(&cfg.redaction)
            .map_err(|e| Error::new(ErrorKind::InvalidConfig, "set_redaction", Severity::Medium).with_cause(e))?;
        self.redactor.store(Arc::new(redactor));
        Ok(())
    }

    pub fn set_redaction_config(&self, config: RedactionConfig) -> Result<(), Error> {
        let redactor = Redactor::new(&config).map_err(|e| {
            Error::new(ErrorKind::InvalidConfig, "set_redaction_config", Severity::Medium).with_cause(e)
        })?;
        self.redactor.store(Arc::new(redactor));
        self.config.write().redaction = config;
        Ok(())
    }

    pub fn add_field_path_rule(&self, path: impl Into<String>, replacement: impl Into<String>) -> Result<(), Error> {
        let mut cfg = self.config.write();
        cfg.redaction.path_rules.push(FieldPathRule {
            path: path.into(),
            replacement: replacement.into(),
        });
        let redactor = Redactor::new(&cfg.redaction).map_err(|e| {
            Error::new(ErrorKind::InvalidConfig, "add_field_path_rule", Severity::Medium).with_cause(e)
        })?;
        self.redactor.store(Arc::new(redactor));
        Ok(())
    }

    pub fn enable_stack_traces(&self, enabled: bool) {
        self.config.write().enable_stack_traces = enabled;
    }

    pub fn set_stack_size(&self, size: usize) {
        self.config.write().stack_size = size.max(1);
    }

    pub fn set_capture_all_stacks(&self, enabled: bool) {
        self.config.write().capture_all_stacks = enabled;
    }

    pub fn set_error_handler(&self, handler: ErrorHandler) {
        *self.user_error_handler.write() = handler;
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    /// Runs `f` on a fresh thread, logging an Error-level structured record
    /// with `{panic: true, stack_trace, message}` if it unwinds instead of
    /// letting the panic take the thread down silently.
    pub fn safe_go(self: &Arc<Self>, f: impl FnOnce() + std::panic::UnwindSafe + Send + 'static) {
        let logger = self.clone();
        std::thread::spawn(move || {
            if let Err(payload) = std::panic::catch_unwind(f) {
                let message = panic_message(&payload);
                logger.structured_log(
                    Level::Error,
                    "panic recovered",
                    vec![
                        ("panic".to_string(), Value::Bool(true)),
                        (
                            "stack_trace".to_string(),
                            Value::Str(format!("{:#?}", std::backtrace::Backtrace::force_capture())),
                        ),
                        ("message".to_string(), Value::Str(message)),
                    ],
                );
            }
        });
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.teardown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, DestinationConfig};
    use crate::error::silent_error_handler;

    fn test_config(dir: &std::path::Path) -> Config {
        let mut cfg = Config {
            min_level: Level::Trace,
            channel_size: 64,
            ..Config::default()
        };
        cfg.destinations.push(DestinationConfig {
            name: "primary".into(),
            backend: BackendConfig::File {
                path: dir.join("app.log").display().to_string(),
            },
            rotation: RotationPolicy::default(),
            compression: CompressionPolicy::default(),
            batch: crate::config::BatchConfig::default(),
            enabled: true,
        });
        cfg
    }

    #[test]
    fn logs_reach_the_file_and_metrics_update() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::new(test_config(dir.path())).unwrap();
        logger.set_error_handler(silent_error_handler());
        logger.info("hello");
        logger.flush().unwrap();
        let contents = std::fs::read_to_string(dir.path().join("app.log")).unwrap();
        assert!(contents.contains("hello"));
        assert_eq!(logger.metrics().messages_logged.info, 1);
    }

    #[test]
    fn level_gate_rejects_below_minimum() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = test_config(dir.path());
        cfg.min_level = Level::Warn;
        let logger = Logger::new(cfg).unwrap();
        logger.set_error_handler(silent_error_handler());
        logger.debug("should not appear");
        logger.flush().unwrap();
        let contents = std::fs::read_to_string(dir.path().join("app.log")).unwrap();
        assert!(!contents.contains("should not appear"));
    }

    #[test]
    fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::new(test_config(dir.path())).unwrap();
        logger.set_error_handler(silent_error_handler());
        logger.close().unwrap();
        let err = logger.close().unwrap_err();
        assert_eq!(err.kind, ErrorKind::AlreadyClosed);
    }

    #[test]
    fn closed_logger_drops_new_submissions_silently() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::new(test_config(dir.path())).unwrap();
        logger.set_error_handler(silent_error_handler());
        logger.close().unwrap();
        logger.info("after close");
    }

    #[test]
    fn add_and_remove_destination() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::new(test_config(dir.path())).unwrap();
        logger.set_error_handler(silent_error_handler());
        logger
            .add_destination(DestinationConfig {
                name: "secondary".into(),
                backend: BackendConfig::File {
                    path: dir.path().join("secondary.log").display().to_string(),
                },
                rotation: RotationPolicy::default(),
                compression: CompressionPolicy::default(),
                batch: crate::config::BatchConfig::default(),
                enabled: true,
            })
            .unwrap();
        assert_eq!(logger.list_destinations().len(), 2);
        logger.remove_destination("secondary").unwrap();
        assert_eq!(logger.list_destinations().len(), 1);
    }

    #[test]
    fn duplicate_destination_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::new(test_config(dir.path())).unwrap();
        logger.set_error_handler(silent_error_handler());
        let err = logger
            .add_destination(DestinationConfig {
                name: "primary".into(),
                backend: BackendConfig::File {
                    path: dir.path().join("dup.log").display().to_string(),
                },
                rotation: RotationPolicy::default(),
                compression: CompressionPolicy::default(),
                batch: crate::config::BatchConfig::default(),
                enabled: true,
            })
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidConfig);
    }

    #[test]
    fn disabled_destination_receives_no_writes() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::new(test_config(dir.path())).unwrap();
        logger.set_error_handler(silent_error_handler());
        logger.disable_destination("primary").unwrap();
        logger.info("should be dropped");
        logger.flush().unwrap();
        let contents = std::fs::read_to_string(dir.path().join("app.log")).unwrap();
        assert!(!contents.contains("should be dropped"));
    }

    #[test]
    fn remove_destination_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::new(test_config(dir.path())).unwrap();
        logger.set_error_handler(silent_error_handler());
        let err = logger.remove_destination("missing").unwrap_err();
        assert_eq!(err.kind, ErrorKind::DestinationNotFound);
    }

    #[test]
    fn safe_go_recovers_from_panics() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::new(test_config(dir.path())).unwrap();
        logger.set_error_handler(silent_error_handler());
        logger.safe_go(|| panic!("boom"));
        std::thread::sleep(Duration::from_millis(200));
        logger.flush().unwrap();
        let contents = std::fs::read_to_string(dir.path().join("app.log")).unwrap();
        assert!(contents.contains("panic recovered"));
    }
}
