//! Builtin globals and the method surface on values.
//!
//! Globals are a curated subset of what remote module source expects to find:
//! `console` (wired to `tracing`), `JSON`, `Math`, `Object.keys`,
//! `Array.isArray`, `Date.now`, the `String`/`Number`/`Boolean` casts,
//! `parseInt`/`parseFloat`, and `isNaN`. Methods (`"a,b".split(",")`,
//! `list.push(x)`, `re.test(s)`) are dispatched by receiver type in
//! [`call_method`].

use chrono::Utc;

use super::env::Env;
use super::error::ScriptError;
use super::eval::{to_display, to_number};
use super::json;
use super::value::Value;

/// Installs the builtin globals into `env`. Each call gets fresh container
/// objects so one module cannot poison another's globals.
pub fn install(env: &Env) {
    env.define("console", console_object());
    env.define("JSON", json_object());
    env.define("Math", math_object());
    env.define(
        "Object",
        Value::object_from(vec![(
            "keys".to_string(),
            Value::native("Object.keys", |args| {
                let target = args.first().cloned().unwrap_or(Value::Null);
                Ok(Value::array(
                    target.keys().into_iter().map(Value::string).collect(),
                ))
            }),
        )]),
    );
    env.define(
        "Array",
        Value::object_from(vec![(
            "isArray".to_string(),
            Value::native("Array.isArray", |args| {
                Ok(Value::Bool(
                    args.first().map(Value::is_array).unwrap_or(false),
                ))
            }),
        )]),
    );
    env.define(
        "Date",
        Value::object_from(vec![(
            "now".to_string(),
            Value::native("Date.now", |_| {
                Ok(Value::Number(Utc::now().timestamp_millis() as f64))
            }),
        )]),
    );
    env.define(
        "String",
        Value::native("String", |args| {
            Ok(Value::string(
                args.first().map(to_display).unwrap_or_default(),
            ))
        }),
    );
    env.define(
        "Number",
        Value::native("Number", |args| {
            Ok(Value::Number(args.first().map(to_number).unwrap_or(0.0)))
        }),
    );
    env.define(
        "Boolean",
        Value::native("Boolean", |args| {
            Ok(Value::Bool(args.first().map(Value::truthy).unwrap_or(false)))
        }),
    );
    env.define("parseInt", Value::native("parseInt", parse_int));
    env.define(
        "parseFloat",
        Value::native("parseFloat", |args| {
            let text = arg_str(args, 0, "parseFloat")?;
            let trimmed = text.trim();
            // Longest leading prefix that parses as a float.
            let mut end = 0;
            for i in (1..=trimmed.len()).rev() {
                if trimmed.is_char_boundary(i) && trimmed[..i].parse::<f64>().is_ok() {
                    end = i;
                    break;
                }
            }
            if end == 0 {
                return Ok(Value::Number(f64::NAN));
            }
            Ok(Value::Number(trimmed[..end].parse().unwrap_or(f64::NAN)))
        }),
    );
    env.define(
        "isNaN",
        Value::native("isNaN", |args| {
            Ok(Value::Bool(
                args.first().map(to_number).unwrap_or(f64::NAN).is_nan(),
            ))
        }),
    );
    env.define("NaN", Value::Number(f64::NAN));
    env.define("Infinity", Value::Number(f64::INFINITY));
}

fn console_object() -> Value {
    fn line(args: &[Value]) -> String {
        args.iter().map(to_display).collect::<Vec<_>>().join(" ")
    }
    Value::object_from(vec![
        (
            "log".to_string(),
            Value::native("console.log", |args| {
                tracing::info!(target: "rml::module", "{}", line(args));
                Ok(Value::Null)
            }),
        ),
        (
            "warn".to_string(),
            Value::native("console.warn", |args| {
                tracing::warn!(target: "rml::module", "{}", line(args));
                Ok(Value::Null)
            }),
        ),
        (
            "error".to_string(),
            Value::native("console.error", |args| {
                tracing::error!(target: "rml::module", "{}", line(args));
                Ok(Value::Null)
            }),
        ),
    ])
}

fn json_object() -> Value {
    Value::object_from(vec![
        (
            "parse".to_string(),
            Value::native("JSON.parse", |args| {
                let text = arg_str(args, 0, "JSON.parse")?;
                let parsed: serde_json::Value = serde_json::from_str(&text)
                    .map_err(|e| ScriptError::eval(format!("JSON.parse: {}", e)))?;
                Ok(json::from_json(&parsed))
            }),
        ),
        (
            "stringify".to_string(),
            Value::native("JSON.stringify", |args| {
                let value = args.first().cloned().unwrap_or(Value::Null);
                let json = json::value_to_json(&value)?;
                serde_json::to_string(&json)
                    .map(Value::string)
                    .map_err(|e| ScriptError::eval(format!("JSON.stringify: {}", e)))
            }),
        ),
    ])
}

fn math_object() -> Value {
    fn unary(name: &'static str, f: fn(f64) -> f64) -> (String, Value) {
        (
            name.rsplit('.').next().unwrap_or(name).to_string(),
            Value::native(name, move |args| {
                Ok(Value::Number(f(args.first().map(to_number).unwrap_or(
                    f64::NAN,
                ))))
            }),
        )
    }
    Value::object_from(vec![
        unary("Math.floor", f64::floor),
        unary("Math.ceil", f64::ceil),
        unary("Math.round", f64::round),
        unary("Math.abs", f64::abs),
        unary("Math.sqrt", f64::sqrt),
        (
            "pow".to_string(),
            Value::native("Math.pow", |args| {
                let base = args.first().map(to_number).unwrap_or(f64::NAN);
                let exp = args.get(1).map(to_number).unwrap_or(f64::NAN);
                Ok(Value::Number(base.powf(exp)))
            }),
        ),
        (
            "min".to_string(),
            Value::native("Math.min", |args| {
                Ok(Value::Number(
                    args.iter().map(to_number).fold(f64::INFINITY, f64::min),
                ))
            }),
        ),
        (
            "max".to_string(),
            Value::native("Math.max", |args| {
                Ok(Value::Number(
                    args.iter()
                        .map(to_number)
                        .fold(f64::NEG_INFINITY, f64::max),
                ))
            }),
        ),
    ])
}

fn parse_int(args: &[Value]) -> Result<Value, ScriptError> {
    let text = arg_str(args, 0, "parseInt")?;
    let radix = match args.get(1) {
        Some(v) if !v.is_null() => {
            let r = to_number(v);
            if !(2.0..=36.0).contains(&r) {
                return Ok(Value::Number(f64::NAN));
            }
            r as u32
        }
        _ => 10,
    };
    let trimmed = text.trim();
    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let digits = if radix == 16 {
        digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(digits)
    } else {
        digits
    };
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_digit(radix))
        .map(|(i, _)| i)
        .unwrap_or(digits.len());
    if end == 0 {
        return Ok(Value::Number(f64::NAN));
    }
    match i64::from_str_radix(&digits[..end], radix) {
        Ok(n) => Ok(Value::Number(sign * n as f64)),
        Err(_) => Ok(Value::Number(f64::NAN)),
    }
}

/// Builtin method dispatch for `target.name(args)` when the receiver has no
/// own callable property of that name.
pub fn call_method(target: &Value, name: &str, args: &[Value]) -> Result<Value, ScriptError> {
    match target {
        Value::Array(_) => array_method(target, name, args),
        Value::Str(s) => string_method(s, name, args),
        Value::Regex(r) => match name {
            "test" => {
                let text = arg_str(args, 0, "test")?;
                Ok(Value::Bool(r.is_match(&text)))
            }
            _ => Err(no_method("regexp", name)),
        },
        Value::Date(d) => match name {
            "getTime" => Ok(Value::Number(d.timestamp_millis() as f64)),
            "toISOString" => Ok(Value::string(
                d.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            )),
            _ => Err(no_method("date", name)),
        },
        Value::Function(_) | Value::Native(_) => match name {
            // No `this`: the first argument is accepted and dropped.
            "call" => target.call(args.get(1..).unwrap_or(&[])),
            _ => Err(no_method("function", name)),
        },
        other => Err(no_method(other.type_name(), name)),
    }
}

fn array_method(target: &Value, name: &str, args: &[Value]) -> Result<Value, ScriptError> {
    let Value::Array(items) = target else {
        return Err(no_method(target.type_name(), name));
    };
    match name {
        "push" => {
            let mut items = items.write().unwrap();
            items.extend(args.iter().cloned());
            Ok(Value::Number(items.len() as f64))
        }
        "indexOf" => {
            let needle = args.first().cloned().unwrap_or(Value::Null);
            let index = items
                .read()
                .unwrap()
                .iter()
                .position(|item| *item == needle);
            Ok(Value::Number(index.map(|i| i as f64).unwrap_or(-1.0)))
        }
        "join" => {
            let sep = match args.first() {
                Some(Value::Str(s)) => s.to_string(),
                Some(v) if !v.is_null() => to_display(v),
                _ => ",".to_string(),
            };
            let parts: Vec<String> = items
                .read()
                .unwrap()
                .iter()
                .map(|v| if v.is_null() { String::new() } else { to_display(v) })
                .collect();
            Ok(Value::string(parts.join(&sep)))
        }
        "slice" => {
            let snapshot = items.read().unwrap().clone();
            let (start, end) = slice_bounds(snapshot.len(), args);
            Ok(Value::array(snapshot[start..end].to_vec()))
        }
        "concat" => {
            let mut combined = items.read().unwrap().clone();
            for arg in args {
                match arg {
                    Value::Array(more) => combined.extend(more.read().unwrap().iter().cloned()),
                    other => combined.push(other.clone()),
                }
            }
            Ok(Value::array(combined))
        }
        "map" => {
            let callback = arg_callable(args, 0, "map")?;
            let snapshot = items.read().unwrap().clone();
            let mut mapped = Vec::with_capacity(snapshot.len());
            for (i, item) in snapshot.into_iter().enumerate() {
                mapped.push(callback.call(&[item, Value::Number(i as f64)])?);
            }
            Ok(Value::array(mapped))
        }
        "filter" => {
            let callback = arg_callable(args, 0, "filter")?;
            let snapshot = items.read().unwrap().clone();
            let mut kept = Vec::new();
            for (i, item) in snapshot.into_iter().enumerate() {
                if callback
                    .call(&[item.clone(), Value::Number(i as f64)])?
                    .truthy()
                {
                    kept.push(item);
                }
            }
            Ok(Value::array(kept))
        }
        _ => Err(no_method("array", name)),
    }
}

fn string_method(s: &str, name: &str, args: &[Value]) -> Result<Value, ScriptError> {
    let chars: Vec<char> = s.chars().collect();
    match name {
        "indexOf" => {
            let needle = arg_str(args, 0, "indexOf")?;
            // Index in characters, matching .length and slice().
            let index = s
                .find(&*needle)
                .map(|byte_index| s[..byte_index].chars().count() as f64);
            Ok(Value::Number(index.unwrap_or(-1.0)))
        }
        "slice" => {
            let (start, end) = slice_bounds(chars.len(), args);
            Ok(Value::string(chars[start..end].iter().collect::<String>()))
        }
        "split" => {
            let sep = arg_str(args, 0, "split")?;
            let parts: Vec<Value> = if sep.is_empty() {
                chars.iter().map(|c| Value::string(c.to_string())).collect()
            } else {
                s.split(&*sep).map(Value::string).collect()
            };
            Ok(Value::array(parts))
        }
        "trim" => Ok(Value::string(s.trim())),
        "toUpperCase" => Ok(Value::string(s.to_uppercase())),
        "toLowerCase" => Ok(Value::string(s.to_lowercase())),
        "startsWith" => {
            let prefix = arg_str(args, 0, "startsWith")?;
            Ok(Value::Bool(s.starts_with(&*prefix)))
        }
        "endsWith" => {
            let suffix = arg_str(args, 0, "endsWith")?;
            Ok(Value::Bool(s.ends_with(&*suffix)))
        }
        "replace" => match args.first() {
            Some(Value::Regex(re)) => {
                let replacement = arg_str(args, 1, "replace")?;
                Ok(Value::string(re.replace(s, &replacement)))
            }
            _ => {
                let pattern = arg_str(args, 0, "replace")?;
                let replacement = arg_str(args, 1, "replace")?;
                Ok(Value::string(s.replacen(&*pattern, &replacement, 1)))
            }
        },
        "charAt" => {
            let index = args.first().map(to_number).unwrap_or(0.0);
            let c = if index.fract() == 0.0 && index >= 0.0 {
                chars.get(index as usize).copied()
            } else {
                None
            };
            Ok(Value::string(c.map(String::from).unwrap_or_default()))
        }
        _ => Err(no_method("string", name)),
    }
}

/// JS-style slice bounds: negative offsets count from the end, everything is
/// clamped, and a crossed range is empty.
fn slice_bounds(len: usize, args: &[Value]) -> (usize, usize) {
    fn resolve(raw: f64, len: usize) -> usize {
        if raw.is_nan() {
            return 0;
        }
        if raw < 0.0 {
            let from_end = len as f64 + raw;
            if from_end < 0.0 {
                0
            } else {
                from_end as usize
            }
        } else {
            (raw as usize).min(len)
        }
    }
    let start = resolve(args.first().map(to_number).unwrap_or(0.0), len);
    let end = match args.get(1) {
        Some(v) if !v.is_null() => resolve(to_number(v), len),
        _ => len,
    };
    (start, end.max(start))
}

fn arg_str(
    args: &[Value],
    index: usize,
    method: &str,
) -> Result<std::sync::Arc<str>, ScriptError> {
    match args.get(index) {
        Some(Value::Str(s)) => Ok(s.clone()),
        Some(other) => Ok(std::sync::Arc::from(to_display(other))),
        None => Err(ScriptError::eval(format!(
            "{} requires argument {}",
            method,
            index + 1
        ))),
    }
}

fn arg_callable<'a>(
    args: &'a [Value],
    index: usize,
    method: &str,
) -> Result<&'a Value, ScriptError> {
    match args.get(index) {
        Some(v) if v.is_callable() => Ok(v),
        Some(other) => Err(ScriptError::type_error("function", other.type_name())),
        None => Err(ScriptError::eval(format!("{} requires a callback", method))),
    }
}

fn no_method(type_name: &str, method: &str) -> ScriptError {
    ScriptError::eval(format!("{}.{} is not a function", type_name, method))
}
