//! Conversions between [`Value`] and `serde_json::Value`.
//!
//! The strict direction ([`value_to_json`]) refuses anything JSON cannot carry
//! (functions, regexes, non-finite numbers, cyclic graphs). The lossy
//! direction ([`value_to_json_lossy`]) renders those as strings or null so a
//! decoded manifest can always be printed.

use serde_json::{Map, Number};

use super::error::ScriptError;
use super::value::Value;

/// Builds a value graph from parsed JSON. Numbers widen to f64; objects keep
/// the order serde_json yields.
pub fn from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::string(s.clone()),
        serde_json::Value::Array(items) => Value::array(items.iter().map(from_json).collect()),
        serde_json::Value::Object(map) => Value::object_from(
            map.iter().map(|(k, v)| (k.clone(), from_json(v))).collect(),
        ),
    }
}

/// Strict conversion to JSON. Integral numbers become JSON integers, dates
/// become RFC 3339 strings; functions, regexes, non-finite numbers, and
/// cycles are errors.
pub fn value_to_json(value: &Value) -> Result<serde_json::Value, ScriptError> {
    let mut seen = Vec::new();
    to_json(value, &mut seen)
}

fn to_json(value: &Value, seen: &mut Vec<usize>) -> Result<serde_json::Value, ScriptError> {
    match value {
        Value::Null => Ok(serde_json::Value::Null),
        Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
        Value::Number(n) => number_to_json(*n),
        Value::Str(s) => Ok(serde_json::Value::String(s.to_string())),
        Value::Date(d) => Ok(serde_json::Value::String(
            d.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        )),
        Value::Array(items) => {
            enter(value, seen)?;
            let items = items.read().unwrap().clone();
            let mut out = Vec::with_capacity(items.len());
            for item in &items {
                out.push(to_json(item, seen)?);
            }
            seen.pop();
            Ok(serde_json::Value::Array(out))
        }
        Value::Object(map) => {
            enter(value, seen)?;
            let entries: Vec<(String, Value)> = map
                .read()
                .unwrap()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let mut out = Map::new();
            for (k, v) in &entries {
                out.insert(k.clone(), to_json(v, seen)?);
            }
            seen.pop();
            Ok(serde_json::Value::Object(out))
        }
        other => Err(ScriptError::eval(format!(
            "cannot serialize a {} to JSON",
            other.type_name()
        ))),
    }
}

fn enter(value: &Value, seen: &mut Vec<usize>) -> Result<(), ScriptError> {
    let id = match value.ptr_id() {
        Some(id) => id,
        None => return Ok(()),
    };
    if seen.contains(&id) {
        return Err(ScriptError::eval("cannot serialize a circular structure"));
    }
    seen.push(id);
    Ok(())
}

fn number_to_json(n: f64) -> Result<serde_json::Value, ScriptError> {
    if !n.is_finite() {
        return Err(ScriptError::eval("cannot serialize a non-finite number"));
    }
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        return Ok(serde_json::Value::Number(Number::from(n as i64)));
    }
    match Number::from_f64(n) {
        Some(num) => Ok(serde_json::Value::Number(num)),
        None => Err(ScriptError::eval("cannot serialize a non-finite number")),
    }
}

/// Lossy conversion for display. Functions and regexes render as their
/// display strings; non-finite numbers and cycle back-references become null.
pub fn value_to_json_lossy(value: &Value) -> serde_json::Value {
    let mut seen = Vec::new();
    to_json_lossy(value, &mut seen)
}

fn to_json_lossy(value: &Value, seen: &mut Vec<usize>) -> serde_json::Value {
    if let Some(id) = value.ptr_id() {
        if seen.contains(&id) {
            return serde_json::Value::Null;
        }
        seen.push(id);
    }
    let json = match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => number_to_json(*n).unwrap_or(serde_json::Value::Null),
        Value::Str(s) => serde_json::Value::String(s.to_string()),
        Value::Date(d) => serde_json::Value::String(
            d.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        ),
        Value::Array(items) => {
            let items = items.read().unwrap().clone();
            serde_json::Value::Array(items.iter().map(|v| to_json_lossy(v, seen)).collect())
        }
        Value::Object(map) => {
            let entries: Vec<(String, Value)> = map
                .read()
                .unwrap()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let mut out = Map::new();
            for (k, v) in &entries {
                out.insert(k.clone(), to_json_lossy(v, seen));
            }
            serde_json::Value::Object(out)
        }
        other @ (Value::Function(_) | Value::Native(_) | Value::Regex(_)) => {
            serde_json::Value::String(format!("{}", other))
        }
    };
    if value.ptr_id().is_some() {
        seen.pop();
    }
    json
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plain_data() {
        let source: serde_json::Value =
            serde_json::from_str(r#"{"a": 1, "b": [true, null, "x"], "c": {"d": 2.5}}"#).unwrap();
        let value = from_json(&source);
        assert_eq!(value.get("a"), Some(Value::Number(1.0)));
        let back = value_to_json(&value).unwrap();
        assert_eq!(back, source);
    }

    #[test]
    fn integral_numbers_stay_integers() {
        let json = value_to_json(&Value::Number(3.0)).unwrap();
        assert_eq!(serde_json::to_string(&json).unwrap(), "3");
        let json = value_to_json(&Value::Number(3.5)).unwrap();
        assert_eq!(serde_json::to_string(&json).unwrap(), "3.5");
    }

    #[test]
    fn strict_rejects_functions_and_cycles() {
        let f = Value::native("f", |_| Ok(Value::Null));
        assert!(value_to_json(&f).is_err());

        let obj = Value::object();
        obj.set("self", obj.clone());
        let err = value_to_json(&obj).unwrap_err();
        assert!(err.to_string().contains("circular"));
    }

    #[test]
    fn strict_rejects_nan() {
        assert!(value_to_json(&Value::Number(f64::NAN)).is_err());
    }

    #[test]
    fn lossy_renders_everything() {
        let obj = Value::object();
        obj.set("f", Value::native("probe", |_| Ok(Value::Null)));
        obj.set("n", Value::Number(f64::NAN));
        obj.set("self", obj.clone());
        let json = value_to_json_lossy(&obj);
        assert_eq!(json["f"], serde_json::json!("[native probe]"));
        assert_eq!(json["n"], serde_json::Value::Null);
        assert_eq!(json["self"], serde_json::Value::Null);
    }

    #[test]
    fn dates_serialize_as_rfc3339() {
        let date = chrono::DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let json = value_to_json(&Value::Date(date)).unwrap();
        assert_eq!(json, serde_json::json!("2023-11-14T22:13:20.000Z"));
    }
}
