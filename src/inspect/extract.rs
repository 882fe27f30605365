//! Signal extraction.
//!
//! Flattens a normalized request into the sequence of candidate strings
//! the scorer evaluates. Body traversal visits every leaf string value
//! of the JSON tree, bounded by a depth guard so adversarial deeply
//! nested bodies cannot exhaust the stack.

use crate::inspect::whitelist::FieldContext;
use crate::request::RequestView;
use serde_json::Value;

/// Headers whose values are pure protocol negotiation, never user input.
const SKIPPED_HEADERS: &[&str] = &[
    "host",
    "connection",
    "content-length",
    "accept",
    "accept-encoding",
    "accept-language",
    "cache-control",
    "pragma",
];

/// One candidate string to score.
#[derive(Debug, Clone)]
pub struct Signal {
    /// Dotted field path, e.g. `query.q` or `body.user.note`.
    pub field: String,
    pub value: String,
    pub context: Option<FieldContext>,
}

/// Flattens a request into scoring candidates.
#[must_use]
pub fn extract_signals(request: &RequestView, max_depth: usize) -> Vec<Signal> {
    let mut signals = Vec::new();

    signals.push(Signal {
        field: "path".to_string(),
        value: request.path.clone(),
        context: None,
    });

    for (key, value) in &request.query {
        push_key_signal(&mut signals, "query", key);
        signals.push(Signal {
            field: format!("query.{key}"),
            value: value.clone(),
            context: FieldContext::infer(key),
        });
    }

    if let Some(body) = &request.body {
        walk_value(&mut signals, "body", body, 0, max_depth);
    }

    for (name, value) in &request.headers {
        if SKIPPED_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            continue;
        }
        signals.push(Signal {
            field: format!("header.{name}"),
            value: value.clone(),
            context: None,
        });
    }

    signals
}

fn walk_value(signals: &mut Vec<Signal>, path: &str, value: &Value, depth: usize, max_depth: usize) {
    if depth > max_depth {
        tracing::debug!(path = %path, depth, "Flatten depth guard hit, subtree skipped");
        return;
    }

    match value {
        Value::String(s) => {
            let key = path.rsplit('.').next().unwrap_or(path);
            signals.push(Signal {
                field: path.to_string(),
                value: s.clone(),
                context: FieldContext::infer(key),
            });
        }
        Value::Object(map) => {
            for (key, child) in map {
                push_key_signal(signals, path, key);
                walk_value(signals, &format!("{path}.{key}"), child, depth + 1, max_depth);
            }
        }
        Value::Array(items) => {
            for (idx, child) in items.iter().enumerate() {
                walk_value(signals, &format!("{path}[{idx}]"), child, depth + 1, max_depth);
            }
        }
        // Numbers, booleans, and nulls carry no injectable text.
        _ => {}
    }
}

/// Map keys are strings too; NoSQL operators arrive as keys, not values.
/// Plain identifier keys are skipped to keep the candidate list small.
fn push_key_signal(signals: &mut Vec<Signal>, path: &str, key: &str) {
    if key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return;
    }
    signals.push(Signal {
        field: format!("{path}.{key}(key)"),
        value: key.to_string(),
        context: None,
    });
}
