//! # Formatter
//!
//! Renders a [`crate::record::Record`] into bytes for a destination, in
//! text or JSON depending on configuration. Raw pre-serialised blobs
//! bypass rendering entirely via [`PassthroughFormatter`].

mod json;
mod text;

pub use json::JsonFormatter;
pub use text::TextFormatter;

use crate::config::{Format, JsonFormatOptions, TextFormatOptions};
use crate::record::{Record, RecordBody};

pub trait Formatter: Send + Sync {
    fn format(&self, record: &Record) -> Vec<u8>;
}

pub fn build_formatter(
    format: Format,
    text_options: TextFormatOptions,
    json_options: JsonFormatOptions,
) -> Box<dyn Formatter> {
    let inner: Box<dyn Formatter> = match format {
        Format::Text => Box::new(TextFormatter::new(text_options)),
        Format::Json => Box::new(JsonFormatter::new(json_options)),
    };
    Box::new(PassthroughFormatter::new(inner))
}

/// Dispatches raw blobs straight through; everything else goes to `inner`.
pub struct PassthroughFormatter {
    inner: Box<dyn Formatter>,
}

impl PassthroughFormatter {
    pub fn new(inner: Box<dyn Formatter>) -> Self {
        PassthroughFormatter { inner }
    }
}

impl Formatter for PassthroughFormatter {
    fn format(&self, record: &Record) -> Vec<u8> {
        match &record.body {
            RecordBody::Raw(bytes) => bytes.to_vec(),
            _ => self.inner.format(record),
        }
    }
}
