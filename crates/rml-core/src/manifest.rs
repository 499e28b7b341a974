//! Manifest decoding: reconstructs rich values from their tagged JSON-safe
//! encoding anywhere inside a plain data tree.
//!
//! A tagged node is an object `{_t, _v, _f?}` where `_t` is `"f"` (function:
//! `_v = [params, body, explicitReturn]`), `"r"` (regex: `_v` pattern, `_f`
//! flags), or `"d"` (date: `_v` RFC 3339 text or epoch milliseconds). The
//! walk replaces each tagged node with the reconstructed value, recurses into
//! plain containers, and leaves everything else alone. Already-decoded trees
//! pass through unchanged, so decoding is idempotent.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::script::{self, ScriptError, ScriptRegex, Value};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("manifest is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported manifest tag '{tag}'")]
    UnsupportedTag { tag: String },

    #[error("malformed '{tag}' payload: {detail}")]
    Malformed { tag: String, detail: String },

    #[error("cannot compile manifest function: {0}")]
    Function(#[from] ScriptError),

    #[error("cannot compile manifest regex: {0}")]
    Regex(#[from] regex::Error),

    #[error("cannot parse manifest date from {value}")]
    Date { value: String },
}

/// Parses manifest JSON text and decodes its tagged values.
pub fn parse_manifest(text: &str) -> Result<Value, DecodeError> {
    let json: serde_json::Value = serde_json::from_str(text)?;
    decode_manifest(script::json::from_json(&json))
}

/// Decodes tagged values in place and returns the tree. Containers are
/// visited once, so cyclic inputs terminate. The payload of a tagged node is
/// constructor input and is not itself walked.
pub fn decode_manifest(tree: Value) -> Result<Value, DecodeError> {
    let mut visited = Vec::new();
    walk(tree, &mut visited)
}

fn walk(node: Value, visited: &mut Vec<usize>) -> Result<Value, DecodeError> {
    let id = match node.ptr_id() {
        Some(id) => id,
        // Scalars and already-reconstructed values pass through.
        None => return Ok(node),
    };
    if visited.contains(&id) {
        return Ok(node);
    }
    if let Some((tag, payload)) = tagged_parts(&node) {
        return decode_tagged(&node, &tag, &payload);
    }
    visited.push(id);
    match &node {
        Value::Array(items) => {
            let len = items.read().unwrap().len();
            for i in 0..len {
                let child = items.read().unwrap().get(i).cloned().unwrap_or(Value::Null);
                let decoded = walk(child, visited)?;
                items.write().unwrap()[i] = decoded;
            }
        }
        Value::Object(map) => {
            let keys: Vec<String> = map.read().unwrap().keys();
            for key in keys {
                let child = map.read().unwrap().get(&key).cloned();
                if let Some(child) = child {
                    let decoded = walk(child, visited)?;
                    map.write().unwrap().set(&key, decoded);
                }
            }
        }
        _ => {}
    }
    Ok(node)
}

/// The tagged shape: a plain object with a string `_t` and a present,
/// non-null `_v`. Anything else is ordinary data.
fn tagged_parts(node: &Value) -> Option<(String, Value)> {
    let tag = node.get("_t")?.as_str()?.to_string();
    let payload = node.get("_v")?;
    if payload.is_null() {
        return None;
    }
    Some((tag, payload))
}

fn decode_tagged(node: &Value, tag: &str, payload: &Value) -> Result<Value, DecodeError> {
    match tag {
        "f" => decode_function(payload),
        "r" => {
            let pattern = payload.as_str().ok_or_else(|| DecodeError::Malformed {
                tag: "r".to_string(),
                detail: "pattern must be a string".to_string(),
            })?;
            let flags = node
                .get("_f")
                .and_then(|f| f.as_str().map(str::to_string))
                .unwrap_or_default();
            let regex = ScriptRegex::new(pattern, &flags)?;
            Ok(Value::Regex(Arc::new(regex)))
        }
        "d" => decode_date(payload),
        other => Err(DecodeError::UnsupportedTag {
            tag: other.to_string(),
        }),
    }
}

fn decode_function(payload: &Value) -> Result<Value, DecodeError> {
    let malformed = |detail: &str| DecodeError::Malformed {
        tag: "f".to_string(),
        detail: detail.to_string(),
    };
    let parts = match payload {
        Value::Array(parts) => parts.read().unwrap().clone(),
        _ => return Err(malformed("expected [params, body, explicitReturn]")),
    };
    let params: Vec<String> = match parts.first() {
        Some(Value::Array(params)) => params
            .read()
            .unwrap()
            .iter()
            .map(|p| p.as_str().map(str::to_string))
            .collect::<Option<Vec<String>>>()
            .ok_or_else(|| malformed("parameter names must be strings"))?,
        _ => return Err(malformed("missing parameter list")),
    };
    let body = parts
        .get(1)
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing body text"))?;
    let explicit_return = parts.get(2).map(Value::truthy).unwrap_or(false);
    Ok(script::compile_function(&params, body, explicit_return)?)
}

fn decode_date(payload: &Value) -> Result<Value, DecodeError> {
    let bad = || DecodeError::Date {
        value: format!("{:?}", payload),
    };
    match payload {
        Value::Number(ms) if ms.is_finite() => DateTime::from_timestamp_millis(*ms as i64)
            .map(Value::Date)
            .ok_or_else(bad),
        Value::Str(text) => DateTime::parse_from_rfc3339(text)
            .map(|d| Value::Date(d.with_timezone(&Utc)))
            .map_err(|_| bad()),
        _ => Err(bad()),
    }
}
