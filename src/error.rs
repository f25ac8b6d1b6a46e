//! # Error Handling
//!
//! Classified error reporting for the engine. Every operational failure is
//! wrapped in an [`Error`] carrying a [`ErrorKind`], the destination and
//! operation it occurred in, and a [`Severity`] used by the default handler to
//! decide whether to surface it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Classification of an engine error, each with its own propagation policy:
/// transient kinds are reported and absorbed, destination-local kinds are
/// reported without aborting delivery elsewhere, and a handful are returned
/// directly from setters or the constructor instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    FileOpen,
    FileClose,
    FileWrite,
    FileFlush,
    FileRotate,
    FileLock,
    FileUnlock,
    FileStat,
    DestinationNotFound,
    DestinationDisabled,
    DestinationNil,
    ChannelFull,
    ChannelClosed,
    InvalidConfig,
    InvalidLevel,
    InvalidFormat,
    CompressionFailed,
    CompressionQueueFull,
    SyslogConnection,
    SyslogWrite,
    ShutdownTimeout,
    AlreadyClosed,
    Unknown,
}

/// Severity assigned to a reported error, used by the default handler and by
/// embedders wiring their own handler to decide what deserves attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// A classified engine error, reported to the configured [`ErrorHandler`]
/// rather than returned up the producer call stack (except where the error
/// kind calls for a hard return, e.g. from setters and the constructor).
#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub operation: &'static str,
    pub destination: Option<String>,
    pub path: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub cause: Option<Arc<str>>,
    pub context: HashMap<String, String>,
}

impl Error {
    pub fn new(kind: ErrorKind, operation: &'static str, severity: Severity) -> Self {
        Error {
            kind,
            operation,
            destination: None,
            path: None,
            timestamp: Utc::now(),
            severity,
            cause: None,
            context: HashMap::new(),
        }
    }

    pub fn with_destination(mut self, name: impl Into<String>) -> Self {
        self.destination = Some(name.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(Arc::from(cause.to_string()));
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "omni-log {:?} during {}",
            self.kind,
            self.operation
        )?;
        if let Some(dest) = &self.destination {
            write!(f, " (destination={dest})")?;
        }
        if let Some(cause) = &self.cause {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

/// Result alias used by setters and the constructor, which return
/// configuration errors directly instead of routing them through the error
/// handler.
pub type Result<T> = std::result::Result<T, Error>;

/// Callback invoked for every reported [`Error`]. Registered on the logger and
/// swappable at runtime; the default implementation writes to stderr.
pub type ErrorHandler = Arc<dyn Fn(&Error) + Send + Sync>;

/// Default error handler: writes
/// `omni error: <operation> <destination>: <kind>: <cause>` to stderr.
pub fn default_error_handler() -> ErrorHandler {
    Arc::new(|err: &Error| {
        let dest = err.destination.as_deref().unwrap_or("-");
        match &err.cause {
            Some(cause) => eprintln!(
                "omni error: {} {}: {:?}: {}",
                err.operation, dest, err.kind, cause
            ),
            None => eprintln!("omni error: {} {}: {:?}", err.operation, dest, err.kind),
        }
    })
}

/// A silent handler used by tests to keep test output clean.
pub fn silent_error_handler() -> ErrorHandler {
    Arc::new(|_err: &Error| {})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_operation_and_cause() {
        let err = Error::new(ErrorKind::FileWrite, "write", Severity::High)
            .with_destination("app.log")
            .with_cause("disk full");
        let msg = err.to_string();
        assert!(msg.contains("FileWrite"));
        assert!(msg.contains("write"));
        assert!(msg.contains("app.log"));
        assert!(msg.contains("disk full"));
    }
}
