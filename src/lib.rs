//! # omni-log
//!
//! Embeddable, process-safe, non-blocking, multi-destination structured
//! logging engine.
//!
//! A caller builds a [`Config`], passes it to [`Logger::new`], and holds the
//! resulting `Arc<Logger>` from as many threads as it likes. Every `log`/
//! `structured_log` call runs a synchronous gate (level, then filter chain,
//! then sampler) on the caller's own thread and, if admitted, hands the
//! record to a bounded channel; a single dispatcher thread drains that
//! channel and fans each record out to every enabled destination (local
//! files with rotation/compression/retention, or syslog over UNIX/UDP/TCP).
//! No producer thread ever blocks on destination I/O.
//!
//! ## Module map
//!
//! - [`record`]: the in-memory log event (`Level`, `Value`, `Record`).
//! - [`gate`] / [`filter`] / [`sampler`]: admission control run before a
//!   record reaches the channel.
//! - [`channel`]: the bounded MPSC ingestion queue and its sync barrier.
//! - [`dispatcher`]: the single consumer thread that redacts, formats, and
//!   fans records out.
//! - [`destination`]: per-sink state machines (`FileDestination`,
//!   `SyslogDestination`) plus the optional batch buffer.
//! - [`compression`] / [`retention`] / [`batch`]: background maintenance
//!   threads a destination's configuration may activate.
//! - [`redact`]: regex and field-path/keyword redaction.
//! - [`format`]: text and JSON rendering.
//! - [`config`]: validated configuration accepted by [`Logger::new`].
//! - [`error`] / [`metrics`]: classified error reporting and process-wide
//!   counters.
//! - [`logger`]: [`Logger`] itself, the construction/reconfiguration/
//!   shutdown facade tying every other module together.

pub mod batch;
pub mod channel;
pub mod compression;
pub mod config;
pub mod destination;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod format;
pub mod gate;
pub mod logger;
pub mod metrics;
pub mod process_info;
pub mod record;
pub mod redact;
pub mod retention;
pub mod sampler;

#[cfg(test)]
mod tests;

pub use config::{
    BackendConfig, BatchConfig, CompressionPolicy, CompressionType, Config, DestinationConfig,
    FieldPathRule, Format, JsonFormatOptions, LevelRender, RedactionConfig, RotationPolicy,
    SamplerConfig, TextFormatOptions,
};
pub use destination::DestinationUri;
pub use error::{Error, ErrorHandler, ErrorKind, Result, Severity};
pub use filter::{ExcludeRegexFilter, FieldFilter, Filter, IncludeRegexFilter};
pub use logger::{DestinationInfo, Logger};
pub use metrics::MetricsSnapshot;
pub use record::{Fields, Level, Value};
pub use sampler::SamplerStrategy;
