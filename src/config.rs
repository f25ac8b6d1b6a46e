//! # Configuration
//!
//! Validated configuration accepted by [`crate::logger::Logger::new`] and by
//! the runtime setters. Validation clamps out-of-range values to documented
//! defaults and rejects irrecoverable fields by returning an [`Error`]
//! rather than silently applying them.

use std::time::Duration;

use crate::error::{Error, ErrorKind, Severity};
use crate::record::Level;

pub const DEFAULT_CHANNEL_SIZE: usize = 100;
pub const DEFAULT_MAX_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_FILES: u32 = 5;
pub const MIN_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
pub const COMPRESSION_QUEUE_CAPACITY: usize = 100;

/// Text or JSON rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

/// Level rendering mode for the text formatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelRender {
    Name,
    LowercaseName,
    Symbol,
}

/// Text-format rendering knobs: level style, timestamp pattern, field
/// separator, and the nil-value sentinel.
#[derive(Debug, Clone)]
pub struct TextFormatOptions {
    pub level_render: LevelRender,
    pub timestamp_pattern: String,
    pub field_separator: String,
    pub nil_render: String,
}

impl Default for TextFormatOptions {
    fn default() -> Self {
        TextFormatOptions {
            level_render: LevelRender::Name,
            timestamp_pattern: "%Y-%m-%dT%H:%M:%S%.3f".to_string(),
            field_separator: " ".to_string(),
            nil_render: "<nil>".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct JsonFormatOptions {
    pub indent: bool,
}

/// Compression strategy selected for a destination's rotated files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    None,
    Gzip,
}

#[derive(Debug, Clone)]
pub struct CompressionPolicy {
    pub kind: CompressionType,
    pub min_age: u32,
    pub workers: usize,
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        CompressionPolicy {
            kind: CompressionType::None,
            min_age: 1,
            workers: 1,
        }
    }
}

/// Rotation and retention bounds for a file destination.
#[derive(Debug, Clone)]
pub struct RotationPolicy {
    pub max_size: u64,
    pub max_files: u32,
    pub max_age: Option<Duration>,
    pub cleanup_interval: Duration,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        RotationPolicy {
            max_size: DEFAULT_MAX_SIZE,
            max_files: DEFAULT_MAX_FILES,
            max_age: None,
            cleanup_interval: MIN_CLEANUP_INTERVAL,
        }
    }
}

impl RotationPolicy {
    /// Clamps `cleanup_interval` up to the documented one-minute floor.
    pub fn normalize(&mut self) {
        if self.cleanup_interval < MIN_CLEANUP_INTERVAL {
            self.cleanup_interval = MIN_CLEANUP_INTERVAL;
        }
        if self.max_files == 0 {
            self.max_files = 1;
        }
    }
}

/// Sampler selection, mirrors [`crate::sampler::SamplerStrategy`] but kept
/// as a separate, `Clone`-friendly config type so reconfiguration can diff
/// against the previous value without touching the trait object.
#[derive(Debug, Clone)]
pub enum SamplerConfig {
    None,
    Random(f64),
    Consistent(f64),
    Interval(u64),
}

impl From<&SamplerConfig> for crate::sampler::SamplerStrategy {
    fn from(cfg: &SamplerConfig) -> Self {
        match cfg {
            SamplerConfig::None => crate::sampler::SamplerStrategy::None,
            SamplerConfig::Random(p) => crate::sampler::SamplerStrategy::Random(*p),
            SamplerConfig::Consistent(p) => crate::sampler::SamplerStrategy::Consistent(*p),
            SamplerConfig::Interval(n) => crate::sampler::SamplerStrategy::Interval(*n),
        }
    }
}

/// A single field-path redaction override, e.g. `users[*].email`.
#[derive(Debug, Clone)]
pub struct FieldPathRule {
    pub path: String,
    pub replacement: String,
}

#[derive(Debug, Clone)]
pub struct RedactionConfig {
    pub enabled: bool,
    pub regex_patterns: Vec<(String, String)>,
    pub path_rules: Vec<FieldPathRule>,
    pub disabled_levels: Vec<Level>,
    pub cache_capacity: usize,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        RedactionConfig {
            enabled: false,
            regex_patterns: Vec::new(),
            path_rules: Vec::new(),
            disabled_levels: Vec::new(),
            cache_capacity: 1000,
        }
    }
}

/// Per-destination backend selection, parsed from a [`crate::destination::DestinationUri`].
#[derive(Debug, Clone)]
pub enum BackendConfig {
    File {
        path: String,
    },
    SyslogUnix {
        socket_path: String,
        facility: u8,
        tag: String,
    },
    SyslogUdp {
        address: String,
        facility: u8,
        tag: String,
    },
    SyslogTcp {
        address: String,
        facility: u8,
        tag: String,
    },
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub enabled: bool,
    pub max_bytes: usize,
    pub max_count: usize,
    pub flush_interval: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            enabled: false,
            max_bytes: 64 * 1024,
            max_count: 256,
            flush_interval: Duration::from_secs(1),
        }
    }
}

/// Per-destination configuration, supplied to `add_destination`.
#[derive(Debug, Clone)]
pub struct DestinationConfig {
    pub name: String,
    pub backend: BackendConfig,
    pub rotation: RotationPolicy,
    pub compression: CompressionPolicy,
    pub batch: BatchConfig,
    pub enabled: bool,
}

/// Top-level engine configuration, passed to `Logger::new`.
#[derive(Debug, Clone)]
pub struct Config {
    pub min_level: Level,
    pub format: Format,
    pub text_options: TextFormatOptions,
    pub json_options: JsonFormatOptions,
    pub channel_size: usize,
    pub submit_timeout: Duration,
    pub sampler: SamplerConfig,
    pub redaction: RedactionConfig,
    pub enable_stack_traces: bool,
    pub capture_all_stacks: bool,
    pub stack_size: usize,
    pub destinations: Vec<DestinationConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            min_level: Level::Info,
            format: Format::Text,
            text_options: TextFormatOptions::default(),
            json_options: JsonFormatOptions::default(),
            channel_size: channel_size_from_env(),
            submit_timeout: Duration::from_millis(10),
            sampler: SamplerConfig::None,
            redaction: RedactionConfig::default(),
            enable_stack_traces: false,
            capture_all_stacks: false,
            stack_size: 4096,
            destinations: Vec::new(),
        }
    }
}

/// Reads `OMNI_CHANNEL_SIZE`: a positive integer overrides the
/// default; non-numeric, zero, or negative values are ignored.
fn channel_size_from_env() -> usize {
    std::env::var("OMNI_CHANNEL_SIZE")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|n| *n > 0)
        .map(|n| n as usize)
        .unwrap_or(DEFAULT_CHANNEL_SIZE)
}

impl Config {
    /// Validates the configuration, clamping recoverable fields and
    /// returning an `InvalidConfig` error for fields that cannot be
    /// fixed up silently (an empty primary destination path).
    pub fn validate(&mut self) -> Result<(), Error> {
        if self.channel_size == 0 {
            self.channel_size = DEFAULT_CHANNEL_SIZE;
        }
        for dest in &mut self.destinations {
            dest.rotation.normalize();
            if dest.compression.workers == 0 {
                dest.compression.workers = 1;
            }
            if let BackendConfig::File { path } = &dest.backend {
                if path.trim().is_empty() {
                    return Err(Error::new(
                        ErrorKind::InvalidConfig,
                        "validate",
                        Severity::Critical,
                    )
                    .with_destination(dest.name.clone())
                    .with_cause("file destination path is empty"));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_empty_file_path() {
        let mut cfg = Config::default();
        cfg.destinations.push(DestinationConfig {
            name: "primary".into(),
            backend: BackendConfig::File { path: "  ".into() },
            rotation: RotationPolicy::default(),
            compression: CompressionPolicy::default(),
            batch: BatchConfig::default(),
            enabled: true,
        });
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidConfig);
    }

    #[test]
    fn validate_clamps_cleanup_interval() {
        let mut cfg = Config::default();
        cfg.destinations.push(DestinationConfig {
            name: "primary".into(),
            backend: BackendConfig::File {
                path: "app.log".into(),
            },
            rotation: RotationPolicy {
                cleanup_interval: Duration::from_secs(5),
                ..RotationPolicy::default()
            },
            compression: CompressionPolicy::default(),
            batch: BatchConfig::default(),
            enabled: true,
        });
        cfg.validate().unwrap();
        assert_eq!(
            cfg.destinations[0].rotation.cleanup_interval,
            MIN_CLEANUP_INTERVAL
        );
    }

    #[test]
    fn zero_channel_size_falls_back_to_default() {
        let mut cfg = Config {
            channel_size: 0,
            ..Config::default()
        };
        cfg.validate().unwrap();
        assert_eq!(cfg.channel_size, DEFAULT_CHANNEL_SIZE);
    }
}
