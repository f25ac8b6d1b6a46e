//! JSON field redaction and the regex-redaction idempotence property.

use std::fs;

use tempfile::TempDir;

use ahash::AHashMap;

use crate::config::{
    BackendConfig, Config, DestinationConfig, FieldPathRule, Format, RedactionConfig,
    RotationPolicy,
};
use crate::logger::Logger;
use crate::record::{Level, Value};
use crate::redact::Redactor;

fn json_logger(dir: &TempDir, redaction: RedactionConfig) -> (std::sync::Arc<Logger>, std::path::PathBuf) {
    let path = dir.path().join("app.log");
    let mut config = Config::default();
    config.format = Format::Json;
    config.redaction = redaction;
    config.destinations.push(DestinationConfig {
        name: "primary".to_string(),
        backend: BackendConfig::File {
            path: path.to_string_lossy().into_owned(),
        },
        rotation: RotationPolicy::default(),
        compression: Default::default(),
        batch: Default::default(),
        enabled: true,
    });
    (Logger::new(config).unwrap(), path)
}

#[test]
fn json_structured_log_redacts_sensitive_keys_including_nested() {
    let dir = TempDir::new().unwrap();
    let (logger, path) = json_logger(
        &dir,
        RedactionConfig {
            enabled: true,
            ..RedactionConfig::default()
        },
    );

    let mut nested_map = AHashMap::default();
    nested_map.insert("api_key".to_string(), Value::Str("K1".to_string()));
    let nested = Value::Map(nested_map);
    logger.structured_log(
        Level::Info,
        "req",
        vec![
            ("user".to_string(), Value::Str("alice".to_string())),
            ("password".to_string(), Value::Str("s3cret".to_string())),
            ("nested".to_string(), nested),
        ],
    );
    logger.flush().unwrap();

    let contents = fs::read_to_string(&path).unwrap();
    let line = contents.lines().next().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(line).unwrap();

    assert_eq!(parsed["fields"]["user"], "alice");
    assert_eq!(parsed["fields"]["password"], "[REDACTED]");
    assert_eq!(parsed["fields"]["nested"]["api_key"], "[REDACTED]");

    logger.close().unwrap();
}

#[test]
fn field_path_rule_overrides_keyword_redaction() {
    let dir = TempDir::new().unwrap();
    let (logger, path) = json_logger(
        &dir,
        RedactionConfig {
            enabled: true,
            path_rules: vec![FieldPathRule {
                path: "contact.email".to_string(),
                replacement: "<hidden-email>".to_string(),
            }],
            ..RedactionConfig::default()
        },
    );

    let mut contact_map = AHashMap::default();
    contact_map.insert(
        "email".to_string(),
        Value::Str("alice@example.com".to_string()),
    );
    let contact = Value::Map(contact_map);
    logger.structured_log(
        Level::Info,
        "signup",
        vec![("contact".to_string(), contact)],
    );
    logger.flush().unwrap();

    let contents = fs::read_to_string(&path).unwrap();
    let line = contents.lines().next().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(parsed["fields"]["contact"]["email"], "<hidden-email>");

    logger.close().unwrap();
}

#[test]
fn regex_redaction_is_idempotent() {
    let config = RedactionConfig {
        enabled: true,
        regex_patterns: vec![(r"\d{3}-\d{2}-\d{4}".to_string(), "[SSN]".to_string())],
        ..RedactionConfig::default()
    };
    let redactor = Redactor::new(&config).unwrap();

    let input = "ssn is 123-45-6789";
    let once = redactor.redact_text(Level::Info, input);
    let twice = redactor.redact_text(Level::Info, &once);
    assert_eq!(once, twice);
    assert_eq!(once, "ssn is [SSN]");
}

#[test]
fn redaction_can_be_disabled_for_a_specific_level() {
    let config = RedactionConfig {
        enabled: true,
        regex_patterns: vec![(r"secret".to_string(), "[X]".to_string())],
        disabled_levels: vec![Level::Debug],
        ..RedactionConfig::default()
    };
    let redactor = Redactor::new(&config).unwrap();

    assert_eq!(redactor.redact_text(Level::Debug, "has secret"), "has secret");
    assert_eq!(redactor.redact_text(Level::Info, "has secret"), "has [X]");
}
