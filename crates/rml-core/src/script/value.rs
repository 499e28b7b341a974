//! Runtime values: the graph that decoded manifests and module exports live in.
//!
//! Arrays and objects are shared references (`Arc<RwLock<…>>`), so assignment
//! aliases like it does in the source language and identity (`same_ref`) is
//! meaningful. Cycles are representable; everything that walks a value guards
//! against them.

use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use regex::RegexBuilder;

use super::ast::Stmt;
use super::env::Env;
use super::error::ScriptError;
use super::eval;

/// Insertion-ordered string-keyed map backing `Value::Object`.
#[derive(Debug, Default)]
pub struct ObjectMap {
    entries: Vec<(String, Value)>,
}

impl ObjectMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Inserts or replaces, preserving first-insertion order.
    pub fn set(&mut self, key: &str, value: Value) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Value)> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut (String, Value)> {
        self.entries.iter_mut()
    }
}

/// A compiled script function: parameter names, body, and the environment it
/// closed over. Callable from Rust via [`Value::call`].
pub struct ScriptFunction {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub env: Env,
}

impl fmt::Debug for ScriptFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptFunction")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// A compiled regular-expression value: the original pattern/flag text plus
/// the compiled matcher.
#[derive(Debug)]
pub struct ScriptRegex {
    pub source: String,
    pub flags: String,
    regex: regex::Regex,
}

impl ScriptRegex {
    /// Compiles `pattern` with source-language flag letters. `i`, `m`, `s`,
    /// and `x` map onto the regex builder; `g`, `y`, and `u` affect match
    /// iteration, not the pattern, and are only recorded.
    pub fn new(pattern: &str, flags: &str) -> Result<Self, regex::Error> {
        let mut builder = RegexBuilder::new(pattern);
        builder
            .case_insensitive(flags.contains('i'))
            .multi_line(flags.contains('m'))
            .dot_matches_new_line(flags.contains('s'))
            .ignore_whitespace(flags.contains('x'));
        Ok(Self {
            source: pattern.to_string(),
            flags: flags.to_string(),
            regex: builder.build()?,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Replaces matches in `text`: every match when the `g` flag was given,
    /// otherwise only the first. `$1`-style group references work.
    pub fn replace(&self, text: &str, replacement: &str) -> String {
        if self.flags.contains('g') {
            self.regex.replace_all(text, replacement).into_owned()
        } else {
            self.regex.replace(text, replacement).into_owned()
        }
    }
}

/// A builtin function implemented in Rust.
pub struct NativeFn {
    pub name: &'static str,
    func: Box<dyn Fn(&[Value]) -> Result<Value, ScriptError> + Send + Sync>,
}

impl NativeFn {
    pub fn new(
        name: &'static str,
        f: impl Fn(&[Value]) -> Result<Value, ScriptError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            func: Box::new(f),
        }
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value, ScriptError> {
        (self.func)(args)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFn({})", self.name)
    }
}

#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Str(Arc<str>),
    Array(Arc<RwLock<Vec<Value>>>),
    Object(Arc<RwLock<ObjectMap>>),
    Function(Arc<ScriptFunction>),
    Native(Arc<NativeFn>),
    Regex(Arc<ScriptRegex>),
    Date(DateTime<Utc>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Value {
        Value::Str(Arc::from(s.into()))
    }

    pub fn number(n: f64) -> Value {
        Value::Number(n)
    }

    /// Fresh empty object.
    pub fn object() -> Value {
        Value::Object(Arc::new(RwLock::new(ObjectMap::new())))
    }

    pub fn object_from(entries: Vec<(String, Value)>) -> Value {
        let mut map = ObjectMap::new();
        for (k, v) in entries {
            map.set(&k, v);
        }
        Value::Object(Arc::new(RwLock::new(map)))
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Arc::new(RwLock::new(items)))
    }

    pub fn native(
        name: &'static str,
        f: impl Fn(&[Value]) -> Result<Value, ScriptError> + Send + Sync + 'static,
    ) -> Value {
        Value::Native(Arc::new(NativeFn::new(name, f)))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True only for plain objects; arrays, functions, regexes, and dates are
    /// not plain (the merge/decode walks treat them as leaves).
    pub fn is_plain_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Native(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Property read; `None` when the receiver is not an object or the key is
    /// absent.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Value::Object(map) => map.read().unwrap().get(key).cloned(),
            _ => None,
        }
    }

    /// Property write; returns false when the receiver is not an object.
    pub fn set(&self, key: &str, value: Value) -> bool {
        match self {
            Value::Object(map) => {
                map.write().unwrap().set(key, value);
                true
            }
            _ => false,
        }
    }

    pub fn keys(&self) -> Vec<String> {
        match self {
            Value::Object(map) => map.read().unwrap().keys(),
            _ => Vec::new(),
        }
    }

    /// Identity of the backing allocation for objects and arrays; `None` for
    /// everything else. Used by the cycle guards.
    pub fn ptr_id(&self) -> Option<usize> {
        match self {
            Value::Array(a) => Some(Arc::as_ptr(a) as usize),
            Value::Object(o) => Some(Arc::as_ptr(o) as usize),
            _ => None,
        }
    }

    /// True when `a` and `b` are the same object/array allocation.
    pub fn same_ref(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Array(x), Value::Array(y)) => Arc::ptr_eq(x, y),
            (Value::Object(x), Value::Object(y)) => Arc::ptr_eq(x, y),
            _ => false,
        }
    }

    /// Source-language truthiness: null, false, 0, NaN, and "" are falsy.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) | Value::Native(_) => "function",
            Value::Regex(_) => "regexp",
            Value::Date(_) => "date",
        }
    }

    /// What the script-level `typeof` operator reports. The single `Null`
    /// value stands in for both null and undefined, and reports "undefined".
    pub fn typeof_name(&self) -> &'static str {
        match self {
            Value::Null => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Function(_) | Value::Native(_) => "function",
            _ => "object",
        }
    }

    /// Invokes a function or native value.
    pub fn call(&self, args: &[Value]) -> Result<Value, ScriptError> {
        match self {
            Value::Function(f) => eval::call_function(f, args),
            Value::Native(f) => f.invoke(args),
            other => Err(ScriptError::eval(format!(
                "{} is not callable",
                other.type_name()
            ))),
        }
    }
}

/// Equality: scalars by value, dates by instant, containers and functions by
/// identity (aliasing semantics).
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Arc::ptr_eq(a, b),
            (Value::Regex(a), Value::Regex(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Renders a number the way the source language prints it: integral values
/// without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn write_value(
    f: &mut fmt::Formatter<'_>,
    value: &Value,
    quote_strings: bool,
    seen: &mut Vec<usize>,
) -> fmt::Result {
    match value {
        Value::Null => write!(f, "null"),
        Value::Bool(b) => write!(f, "{}", b),
        Value::Number(n) => write!(f, "{}", format_number(*n)),
        Value::Str(s) => {
            if quote_strings {
                write!(f, "\"{}\"", s.escape_default())
            } else {
                write!(f, "{}", s)
            }
        }
        Value::Array(items) => {
            let id = Arc::as_ptr(items) as usize;
            if seen.contains(&id) {
                return write!(f, "[circular]");
            }
            seen.push(id);
            write!(f, "[")?;
            for (i, item) in items.read().unwrap().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_value(f, item, true, seen)?;
            }
            seen.pop();
            write!(f, "]")
        }
        Value::Object(map) => {
            let id = Arc::as_ptr(map) as usize;
            if seen.contains(&id) {
                return write!(f, "[circular]");
            }
            seen.push(id);
            write!(f, "{{")?;
            for (i, (k, v)) in map.read().unwrap().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "\"{}\": ", k.escape_default())?;
                write_value(f, v, true, seen)?;
            }
            seen.pop();
            write!(f, "}}")
        }
        Value::Function(func) => match &func.name {
            Some(name) => write!(f, "[function {}({})]", name, func.params.join(", ")),
            None => write!(f, "[function ({})]", func.params.join(", ")),
        },
        Value::Native(n) => write!(f, "[native {}]", n.name),
        Value::Regex(r) => write!(f, "/{}/{}", r.source, r.flags),
        Value::Date(d) => write!(f, "{}", d.to_rfc3339()),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut seen = Vec::new();
        write_value(f, self, false, &mut seen)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut seen = Vec::new();
        write_value(f, self, true, &mut seen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_map_preserves_insertion_order() {
        let mut map = ObjectMap::new();
        map.set("b", Value::Number(1.0));
        map.set("a", Value::Number(2.0));
        map.set("b", Value::Number(3.0));
        assert_eq!(map.keys(), vec!["b", "a"]);
        assert_eq!(map.get("b"), Some(&Value::Number(3.0)));
    }

    #[test]
    fn clone_aliases_objects() {
        let obj = Value::object();
        let alias = obj.clone();
        alias.set("x", Value::Number(5.0));
        assert_eq!(obj.get("x"), Some(Value::Number(5.0)));
        assert!(Value::same_ref(&obj, &alias));
    }

    #[test]
    fn equality_is_identity_for_containers() {
        let a = Value::array(vec![Value::Number(1.0)]);
        let b = Value::array(vec![Value::Number(1.0)]);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(10.0), "10");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(f64::NAN), "NaN");
    }

    #[test]
    fn display_guards_cycles() {
        let obj = Value::object();
        obj.set("self", obj.clone());
        let rendered = format!("{}", obj);
        assert!(rendered.contains("[circular]"));
    }

    #[test]
    fn regex_flags() {
        let re = ScriptRegex::new("^a+$", "i").unwrap();
        assert!(re.is_match("AAA"));
        assert!(!re.is_match("b"));
        let plain = ScriptRegex::new("^a+$", "").unwrap();
        assert!(!plain.is_match("AAA"));
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.truthy());
        assert!(!Value::Number(0.0).truthy());
        assert!(!Value::string("").truthy());
        assert!(Value::string("x").truthy());
        assert!(Value::object().truthy());
    }
}
