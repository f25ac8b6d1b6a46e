//! Text formatter: `[<timestamp>] [<level>] <message><sep><k>=<v>…\n`.

use crate::config::{LevelRender, TextFormatOptions};
use crate::record::{Record, RecordBody, Value};

use super::Formatter;

pub struct TextFormatter {
    options: TextFormatOptions,
}

impl TextFormatter {
    pub fn new(options: TextFormatOptions) -> Self {
        TextFormatter { options }
    }

    fn render_level(&self, record: &Record) -> String {
        match self.options.level_render {
            LevelRender::Name => record.level.as_str().to_string(),
            LevelRender::LowercaseName => record.level.as_str().to_lowercase(),
            LevelRender::Symbol => record.level.as_symbol().to_string(),
        }
    }

    fn render_value(&self, value: &Value) -> String {
        match value {
            Value::Nil => self.options.nil_render.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => s.clone(),
            Value::List(items) => {
                let rendered: Vec<String> = items.iter().map(|v| self.render_value(v)).collect();
                format!("[{}]", rendered.join(","))
            }
            Value::Map(map) => {
                let rendered: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{k}:{}", self.render_value(v)))
                    .collect();
                format!("{{{}}}", rendered.join(","))
            }
        }
    }
}

impl Formatter for TextFormatter {
    fn format(&self, record: &Record) -> Vec<u8> {
        let timestamp = match &record.body {
            RecordBody::Structured(entry) => entry.timestamp.clone(),
            _ => record
                .timestamp
                .format(&self.options.timestamp_pattern)
                .to_string(),
        };
        let level = self.render_level(record);
        let message = record.message();

        let mut line = format!("[{timestamp}] [{level}] {message}");

        let fields = match &record.body {
            RecordBody::Structured(entry) => &entry.fields,
            _ => &record.fields,
        };
        for (k, v) in fields {
            line.push_str(&self.options.field_separator);
            line.push_str(k);
            line.push('=');
            line.push_str(&self.render_value(v));
        }
        if let RecordBody::Structured(entry) = &record.body {
            if let Some(file) = &entry.file {
                line.push_str(&self.options.field_separator);
                let line_no = entry.line.map(|l| l.to_string()).unwrap_or_default();
                line.push_str(&format!("at={file}:{line_no}"));
            }
            if let Some(stack) = &entry.stack_trace {
                line.push('\n');
                line.push_str(stack);
            }
        }
        line.push('\n');
        line.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Level;

    #[test]
    fn renders_message_and_fields() {
        let formatter = TextFormatter::new(TextFormatOptions::default());
        let record = Record::new_text(
            Level::Info,
            "user login",
            vec![("user".into(), Value::from("alice"))],
        );
        let bytes = formatter.format(&record);
        let line = String::from_utf8(bytes).unwrap();
        assert!(line.contains("[INFO]"));
        assert!(line.contains("user login"));
        assert!(line.contains("user=alice"));
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn nil_field_renders_configured_sentinel() {
        let formatter = TextFormatter::new(TextFormatOptions::default());
        let record = Record::new_text(Level::Info, "m", vec![("x".into(), Value::Nil)]);
        let line = String::from_utf8(formatter.format(&record)).unwrap();
        assert!(line.contains("x=<nil>"));
    }

    #[test]
    fn symbol_level_render() {
        let mut opts = TextFormatOptions::default();
        opts.level_render = LevelRender::Symbol;
        let formatter = TextFormatter::new(opts);
        let record = Record::new_text(Level::Warn, "m", vec![]);
        let line = String::from_utf8(formatter.format(&record)).unwrap();
        assert!(line.contains("[W]"));
    }
}
