//! JSON formatter: canonical object `{timestamp, level, message, fields?,
//! stack_trace?, file?, line?}`

use serde_json::{json, Map, Value as JsonValue};

use crate::config::JsonFormatOptions;
use crate::record::{Record, RecordBody, Value};

use super::Formatter;

pub struct JsonFormatter {
    options: JsonFormatOptions,
}

impl JsonFormatter {
    pub fn new(options: JsonFormatOptions) -> Self {
        JsonFormatter { options }
    }
}

fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Nil => JsonValue::Null,
        Value::Bool(b) => json!(b),
        Value::Int(n) => json!(n),
        Value::Float(f) => json!(f),
        Value::Str(s) => json!(s),
        Value::List(items) => JsonValue::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => {
            let mut obj = Map::new();
            for (k, v) in map {
                obj.insert(k.clone(), value_to_json(v));
            }
            JsonValue::Object(obj)
        }
    }
}

impl Formatter for JsonFormatter {
    fn format(&self, record: &Record) -> Vec<u8> {
        let mut obj = Map::new();
        let timestamp = match &record.body {
            RecordBody::Structured(entry) => entry.timestamp.clone(),
            _ => record.timestamp.to_rfc3339(),
        };
        obj.insert("timestamp".to_string(), json!(timestamp));
        obj.insert("level".to_string(), json!(record.level.as_str()));
        obj.insert("message".to_string(), json!(record.message()));

        let fields = match &record.body {
            RecordBody::Structured(entry) => &entry.fields,
            _ => &record.fields,
        };
        if !fields.is_empty() {
            let mut fields_obj = Map::new();
            for (k, v) in fields {
                fields_obj.insert(k.clone(), value_to_json(v));
            }
            obj.insert("fields".to_string(), JsonValue::Object(fields_obj));
        }

        if let RecordBody::Structured(entry) = &record.body {
            if let Some(stack) = &entry.stack_trace {
                obj.insert("stack_trace".to_string(), json!(stack));
            }
            if let Some(file) = &entry.file {
                obj.insert("file".to_string(), json!(file));
            }
            if let Some(line) = entry.line {
                obj.insert("line".to_string(), json!(line));
            }
        }

        let value = JsonValue::Object(obj);
        let mut rendered = if self.options.indent {
            serde_json::to_string_pretty(&value)
        } else {
            serde_json::to_string(&value)
        }
        .unwrap_or_default();
        rendered.push('\n');
        rendered.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Level, StructuredEntry};
    use ahash::AHashMap;

    #[test]
    fn renders_canonical_object() {
        let formatter = JsonFormatter::new(JsonFormatOptions::default());
        let record = Record::new_text(Level::Info, "hello", vec![]);
        let bytes = formatter.format(&record);
        let parsed: JsonValue = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["level"], "INFO");
        assert_eq!(parsed["message"], "hello");
    }

    #[test]
    fn nested_map_fields_render_as_json_objects() {
        let mut nested = AHashMap::default();
        nested.insert("api_key".to_string(), Value::from("K1"));
        let entry = StructuredEntry {
            level_name: "INFO".into(),
            message: "req".into(),
            fields: vec![
                ("user".into(), Value::from("alice")),
                ("nested".into(), Value::Map(nested)),
            ],
            stack_trace: None,
            file: None,
            line: None,
            timestamp: "2026-01-01T00:00:00Z".into(),
        };
        let record = Record::new_structured(Level::Info, entry);
        let formatter = JsonFormatter::new(JsonFormatOptions::default());
        let parsed: JsonValue = serde_json::from_slice(&formatter.format(&record)).unwrap();
        assert_eq!(parsed["fields"]["user"], "alice");
        assert_eq!(parsed["fields"]["nested"]["api_key"], "K1");
    }
}
