//! Pull `{ids, answer, reason}` out of whatever the remote model said.
//!
//! Models are asked for bare JSON but routinely wrap it in prose or code
//! fences, or ignore the format entirely and just cite `[3]`. Each
//! strategy below either produces a selection or passes to the next one.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::VaultError;

/// Parsed remote reply. Lives for one `ask` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteSelection {
    pub ids: Vec<i64>,
    pub answer: Option<String>,
    pub reason: Option<String>,
}

type Strategy = fn(&str) -> Option<RemoteSelection>;

const STRATEGIES: [(&str, Strategy); 3] = [
    ("whole", decode_whole),
    ("embedded", decode_embedded),
    ("cited_ids", cited_ids),
];

fn object_span() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"))
}

fn bracket_id() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(\d+)\]").expect("valid regex"))
}

fn bare_id() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{1,4})\b").expect("valid regex"))
}

/// Parse a raw remote reply. Fails only when no strategy finds anything.
pub fn parse(raw: &str) -> Result<RemoteSelection, VaultError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(VaultError::Parse("empty response".into()));
    }
    for (name, strategy) in STRATEGIES {
        if let Some(sel) = strategy(text) {
            debug!(strategy = name, ids = ?sel.ids, "parsed remote reply");
            return Ok(sel);
        }
    }
    Err(VaultError::Parse("no JSON object or note ids in response".into()))
}

fn decode_whole(text: &str) -> Option<RemoteSelection> {
    decode_object(text)
}

/// First `{` through last `}`, across newlines.
fn decode_embedded(text: &str) -> Option<RemoteSelection> {
    let span = object_span().find(text)?;
    decode_object(span.as_str())
}

fn decode_object(text: &str) -> Option<RemoteSelection> {
    match serde_json::from_str::<Value>(text).ok()? {
        Value::Object(obj) => Some(selection_from_object(&obj)),
        _ => None,
    }
}

fn selection_from_object(obj: &Map<String, Value>) -> RemoteSelection {
    let ids = obj
        .get("ids")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(coerce_id).collect())
        .unwrap_or_default();
    RemoteSelection {
        ids,
        answer: obj.get("answer").and_then(Value::as_str).map(str::to_string),
        reason: obj.get("reason").and_then(Value::as_str).map(str::to_string),
    }
}

/// Best-effort integer from a JSON value: 3, 3.0, "3". Anything else is
/// dropped.
pub fn coerce_id(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// No JSON at all: take `[n]` citations, or failing that any short
/// standalone number, and keep the whole reply as the answer.
fn cited_ids(text: &str) -> Option<RemoteSelection> {
    let mut ids: Vec<i64> = bracket_id()
        .captures_iter(text)
        .filter_map(|c| c[1].parse().ok())
        .collect();
    if ids.is_empty() {
        ids = bare_id()
            .captures_iter(text)
            .filter_map(|c| c[1].parse().ok())
            .collect();
    }
    if ids.is_empty() {
        return None;
    }
    Some(RemoteSelection {
        ids,
        answer: Some(text.to_string()),
        reason: None,
    })
}
