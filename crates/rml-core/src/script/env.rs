//! Lexical environments. Each scope is a map of variables with an optional
//! parent; a scope may also carry a context object whose properties resolve
//! and assign like variables, which is how the executor exposes the remote
//! module's host-provided context to module source.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use super::value::Value;

#[derive(Clone)]
pub struct Env {
    inner: Arc<RwLock<EnvInner>>,
}

struct EnvInner {
    vars: HashMap<String, Value>,
    context: Option<Value>,
    parent: Option<Env>,
}

impl Env {
    pub fn new() -> Env {
        Env {
            inner: Arc::new(RwLock::new(EnvInner {
                vars: HashMap::new(),
                context: None,
                parent: None,
            })),
        }
    }

    /// New scope whose lookups fall through to `self`.
    pub fn child(&self) -> Env {
        Env {
            inner: Arc::new(RwLock::new(EnvInner {
                vars: HashMap::new(),
                context: None,
                parent: Some(self.clone()),
            })),
        }
    }

    /// New scope that resolves names against `context`'s properties before
    /// falling through to `self`.
    pub fn with_context(&self, context: Value) -> Env {
        Env {
            inner: Arc::new(RwLock::new(EnvInner {
                vars: HashMap::new(),
                context: Some(context),
                parent: Some(self.clone()),
            })),
        }
    }

    /// Declares `name` in this scope, shadowing outer bindings.
    pub fn define(&self, name: &str, value: Value) {
        self.inner
            .write()
            .unwrap()
            .vars
            .insert(name.to_string(), value);
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        let (context, parent) = {
            let inner = self.inner.read().unwrap();
            if let Some(v) = inner.vars.get(name) {
                return Some(v.clone());
            }
            (inner.context.clone(), inner.parent.clone())
        };
        if let Some(ctx) = context {
            if let Some(v) = ctx.get(name) {
                return Some(v);
            }
        }
        parent.and_then(|p| p.lookup(name))
    }

    /// Assigns to the nearest binding of `name`, a context property counting
    /// as a binding. Returns false when no scope declares it.
    pub fn assign(&self, name: &str, value: Value) -> bool {
        {
            let mut inner = self.inner.write().unwrap();
            if inner.vars.contains_key(name) {
                inner.vars.insert(name.to_string(), value);
                return true;
            }
        }
        let (context, parent) = {
            let inner = self.inner.read().unwrap();
            (inner.context.clone(), inner.parent.clone())
        };
        if let Some(ctx) = context {
            if ctx.get(name).is_some() {
                ctx.set(name, value);
                return true;
            }
        }
        match parent {
            Some(p) => p.assign(name, value),
            None => false,
        }
    }
}

impl Default for Env {
    fn default() -> Self {
        Env::new()
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read().unwrap();
        write!(
            f,
            "Env({} vars{})",
            inner.vars.len(),
            if inner.parent.is_some() { ", chained" } else { "" }
        )
    }
}
