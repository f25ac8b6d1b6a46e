//! # Redactor
//!
//! Applies regex and field-path/keyword redaction. Runs on the
//! dispatcher thread after formatting for text records, and as a structural
//! walk over the fields of a structured/JSON record before formatting.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;
use regex::Regex;

use crate::config::{FieldPathRule, RedactionConfig};
use crate::record::{Fields, Level, Value};

const MAX_DEPTH: usize = 10;
const CIRCULAR_SENTINEL: &str = "[circular reference]";
const REDACTED: &str = "[REDACTED]";

/// Case-insensitive substring list matched against field names.
const SENSITIVE_KEYWORDS: &[&str] = &[
    "password",
    "token",
    "secret",
    "api_key",
    "apikey",
    "ssn",
    "email",
    "phone",
    "credit_card",
    "creditcard",
    "authorization",
];

struct CompiledRule {
    path: String,
    replacement: String,
}

pub struct Redactor {
    regex_patterns: Vec<(Regex, String)>,
    path_rules: Vec<CompiledRule>,
    disabled_levels: Vec<Level>,
    cache: Mutex<AHashMap<Arc<str>, Arc<str>>>,
    cache_capacity: usize,
    enabled: bool,
}

impl Redactor {
    pub fn new(config: &RedactionConfig) -> Result<Self, regex::Error> {
        let mut regex_patterns = Vec::with_capacity(config.regex_patterns.len());
        for (pattern, replacement) in &config.regex_patterns {
            regex_patterns.push((Regex::new(pattern)?, replacement.clone()));
        }
        let path_rules = config
            .path_rules
            .iter()
            .map(|r: &FieldPathRule| CompiledRule {
                path: r.path.clone(),
                replacement: r.replacement.clone(),
            })
            .collect();
        Ok(Redactor {
            regex_patterns,
            path_rules,
            disabled_levels: config.disabled_levels.clone(),
            cache: Mutex::new(AHashMap::default()),
            cache_capacity: config.cache_capacity,
            enabled: config.enabled,
        })
    }

    fn is_disabled_for(&self, level: Level) -> bool {
        !self.enabled || self.disabled_levels.contains(&level)
    }

    /// Applies the regex pattern list to a rendered text line. Cached by
    /// input string up to `cache_capacity` entries, cleared whenever the
    /// redactor is rebuilt (i.e. on pattern reconfiguration).
    pub fn redact_text(&self, level: Level, input: &str) -> String {
        if self.is_disabled_for(level) || self.regex_patterns.is_empty() {
            return input.to_string();
        }
        if let Some(hit) = self.cache.lock().get(input) {
            return hit.to_string();
        }
        let mut out = input.to_string();
        for (pattern, replacement) in &self.regex_patterns {
            out = pattern.replace_all(&out, replacement.as_str()).into_owned();
        }
        let mut cache = self.cache.lock();
        if cache.len() >= self.cache_capacity {
            cache.clear();
        }
        cache.insert(Arc::from(input), Arc::from(out.as_str()));
        out
    }

    /// Structural walk over a structured record's fields: path rule, then
    /// sensitive-keyword match, then leaf regex, depth- and cycle-bounded.
    pub fn redact_fields(&self, level: Level, fields: Fields) -> Fields {
        if self.is_disabled_for(level) {
            return fields;
        }
        let mut visited = Vec::new();
        fields
            .into_iter()
            .map(|(k, v)| {
                let path = k.clone();
                let redacted = self.redact_value(&path, &k, v, 0, &mut visited);
                (k, redacted)
            })
            .collect()
    }

    fn path_rule_for(&self, path: &str) -> Option<&str> {
        self.path_rules
            .iter()
            .find(|r| path_matches(&r.path, path))
            .map(|r| r.replacement.as_str())
    }

    fn is_sensitive_key(key: &str) -> bool {
        let lower = key.to_ascii_lowercase();
        SENSITIVE_KEYWORDS.iter().any(|kw| lower.contains(kw))
    }

    fn redact_value(
        &self,
        path: &str,
        key: &str,
        value: Value,
        depth: usize,
        visited: &mut Vec<usize>,
    ) -> Value {
        if let Some(replacement) = self.path_rule_for(path) {
            return Value::Str(replacement.to_string());
        }
        if Self::is_sensitive_key(key) {
            return Value::Str(REDACTED.to_string());
        }
        if depth >= MAX_DEPTH {
            return value;
        }
        match value {
            Value::Str(s) => Value::Str(self.apply_regex_to_leaf(&s)),
            Value::List(items) => {
                let addr = &items as *const _ as usize;
                if visited.contains(&addr) {
                    return Value::Str(CIRCULAR_SENTINEL.to_string());
                }
                visited.push(addr);
                let redacted = items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| {
                        let child_path = format!("{path}[{i}]");
                        self.redact_value(&child_path, key, v, depth + 1, visited)
                    })
                    .collect();
                visited.pop();
                Value::List(redacted)
            }
            Value::Map(map) => {
                let addr = &map as *const _ as usize;
                if visited.contains(&addr) {
                    return Value::Str(CIRCULAR_SENTINEL.to_string());
                }
                visited.push(addr);
                let redacted = map
                    .into_iter()
                    .map(|(k, v)| {
                        let child_path = format!("{path}.{k}");
                        let redacted_v = self.redact_value(&child_path, &k, v, depth + 1, visited);
                        (k, redacted_v)
                    })
                    .collect();
                visited.pop();
                Value::Map(redacted)
            }
            other => other,
        }
    }

    fn apply_regex_to_leaf(&self, s: &str) -> String {
        let mut out = s.to_string();
        for (pattern, replacement) in &self.regex_patterns {
            out = pattern.replace_all(&out, replacement.as_str()).into_owned();
        }
        out
    }
}

/// Matches a concrete field path against a rule path that may contain a
/// `[*]` wildcard segment, e.g. rule `users[*].email` against `users[3].email`.
fn path_matches(rule: &str, path: &str) -> bool {
    if rule == path {
        return true;
    }
    let rule_segments: Vec<&str> = rule.split('.').collect();
    let path_segments: Vec<&str> = path.split('.').collect();
    if rule_segments.len() != path_segments.len() {
        return false;
    }
    rule_segments.iter().zip(path_segments.iter()).all(|(r, p)| {
        if let Some(base) = r.strip_suffix("[*]") {
            p.starts_with(base) && p.ends_with(']') && p.contains('[')
        } else {
            r == p
        }
    })
}
