//! # Filter Chain
//!
//! Filters are pure, non-blocking predicates evaluated on the producer thread
//! before a record is submitted to the channel, so that rejected work never
//! pays the cost of formatting or redaction.
//!
//! Registration consolidates on a single trait-object form rather than
//! maintaining two overlapping filter-registration APIs; a plain closure is
//! still accepted via the blanket impl below, so callers lose no ergonomics.

use crate::record::{Fields, Level};

/// A predicate over `(level, message, fields)`. Implementations must be
/// side-effect-free and must not block — a misbehaving filter only affects
/// the producer thread that invoked it, never the dispatcher.
pub trait Filter: Send + Sync {
    fn should_log(&self, level: Level, message: &str, fields: &Fields) -> bool;

    /// Human-readable identity, used for `remove_filter`-by-name style APIs
    /// and in diagnostic logging.
    fn name(&self) -> &str {
        "filter"
    }
}

/// Blanket impl so a plain closure can be registered with `add_filter`
/// without the caller implementing the trait by hand.
impl<F> Filter for F
where
    F: Fn(Level, &str, &Fields) -> bool + Send + Sync,
{
    fn should_log(&self, level: Level, message: &str, fields: &Fields) -> bool {
        self(level, message, fields)
    }
}

/// Filter that rejects records whose message matches a compiled regex.
pub struct ExcludeRegexFilter {
    pattern: regex::Regex,
}

impl ExcludeRegexFilter {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(ExcludeRegexFilter {
            pattern: regex::Regex::new(pattern)?,
        })
    }
}

impl Filter for ExcludeRegexFilter {
    fn should_log(&self, _level: Level, message: &str, _fields: &Fields) -> bool {
        !self.pattern.is_match(message)
    }

    fn name(&self) -> &str {
        "exclude_regex"
    }
}

/// Filter that only admits records whose message matches a compiled regex.
pub struct IncludeRegexFilter {
    pattern: regex::Regex,
}

impl IncludeRegexFilter {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(IncludeRegexFilter {
            pattern: regex::Regex::new(pattern)?,
        })
    }
}

impl Filter for IncludeRegexFilter {
    fn should_log(&self, _level: Level, message: &str, _fields: &Fields) -> bool {
        self.pattern.is_match(message)
    }

    fn name(&self) -> &str {
        "include_regex"
    }
}

/// Filter that only admits records carrying a specific `(key, value)` field.
pub struct FieldFilter {
    key: String,
    value: String,
}

impl FieldFilter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        FieldFilter {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl Filter for FieldFilter {
    fn should_log(&self, _level: Level, _message: &str, fields: &Fields) -> bool {
        fields
            .iter()
            .any(|(k, v)| k == &self.key && v.as_str_leaf() == Some(self.value.as_str()))
    }

    fn name(&self) -> &str {
        "field"
    }
}

/// The ordered, conjunctive chain evaluated by the [`crate::gate::Gate`].
/// Semantics are conjunctive: all registered filters must pass.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterChain {
    pub fn push(&mut self, filter: Box<dyn Filter>) {
        self.filters.push(filter);
    }

    pub fn clear(&mut self) {
        self.filters.clear();
    }

    pub fn evaluate(&self, level: Level, message: &str, fields: &Fields) -> bool {
        self.filters
            .iter()
            .all(|f| f.should_log(level, message, fields))
    }
}
