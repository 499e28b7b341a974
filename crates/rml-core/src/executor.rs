//! Executes fetched module source.
//!
//! Each execution gets a fresh `module` object (`inRemoteModule: true`, an
//! empty `exports`, plus caller-supplied properties) and runs with exactly
//! three host bindings: `module`, `exports`, and `__context__`. When a
//! context object is supplied, free identifiers in the source resolve
//! against its properties before the builtin globals, so the caller decides
//! what ambient surface the module sees. Whatever `module.exports` holds
//! after the run is the result, so modules may reassign it wholesale.

use crate::script::{self, ScriptError, Value};

#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Object whose properties shadow globals inside the module.
    pub context: Option<Value>,
    /// Extra properties set on the fresh `module` object before execution.
    pub module_props: Vec<(String, Value)>,
}

/// Compiles and runs `source` as a remote module, returning its exports.
/// Script failures are logged and handed back to the caller.
pub fn execute(source: &str, options: &ExecuteOptions) -> Result<Value, ScriptError> {
    let stmts = script::compile_module(source)?;

    let module = Value::object_from(vec![
        ("inRemoteModule".to_string(), Value::Bool(true)),
        ("exports".to_string(), Value::object()),
    ]);
    for (key, value) in &options.module_props {
        module.set(key, value.clone());
    }
    let exports = module.get("exports").unwrap_or(Value::Null);

    let scope = match &options.context {
        Some(ctx) => script::base_env().with_context(ctx.clone()),
        None => script::base_env().child(),
    };
    scope.define("module", module.clone());
    scope.define("exports", exports);
    scope.define(
        "__context__",
        options.context.clone().unwrap_or(Value::Null),
    );

    if let Err(err) = script::run_module(&stmts, &scope) {
        tracing::error!("remote module execution failed: {}", err);
        return Err(err);
    }
    Ok(module.get("exports").unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn populates_exports() {
        let exports = execute(
            "exports.greet = function (name) { return 'hi ' + name }",
            &ExecuteOptions::default(),
        )
        .unwrap();
        let greet = exports.get("greet").unwrap();
        assert_eq!(
            greet.call(&[Value::string("dev")]).unwrap(),
            Value::string("hi dev")
        );
    }

    #[test]
    fn honors_module_exports_reassignment() {
        let exports = execute(
            "module.exports = { value: 42 }",
            &ExecuteOptions::default(),
        )
        .unwrap();
        assert_eq!(exports.get("value"), Some(Value::Number(42.0)));
    }

    #[test]
    fn module_flags_and_props_are_visible() {
        let options = ExecuteOptions {
            module_props: vec![("version".to_string(), Value::string("1.2.3"))],
            ..ExecuteOptions::default()
        };
        let exports = execute(
            "exports.remote = module.inRemoteModule; exports.v = module.version",
            &options,
        )
        .unwrap();
        assert_eq!(exports.get("remote"), Some(Value::Bool(true)));
        assert_eq!(exports.get("v"), Some(Value::string("1.2.3")));
    }

    #[test]
    fn context_properties_shadow_globals_and_accept_writes() {
        let ctx = Value::object_from(vec![
            ("limit".to_string(), Value::Number(10.0)),
            ("seen".to_string(), Value::Bool(false)),
        ]);
        let options = ExecuteOptions {
            context: Some(ctx.clone()),
            ..ExecuteOptions::default()
        };
        let exports = execute("exports.r = limit * 2; seen = true", &options).unwrap();
        assert_eq!(exports.get("r"), Some(Value::Number(20.0)));
        assert_eq!(ctx.get("seen"), Some(Value::Bool(true)));
    }

    #[test]
    fn context_object_itself_is_reachable() {
        let ctx = Value::object_from(vec![("k".to_string(), Value::Number(7.0))]);
        let options = ExecuteOptions {
            context: Some(ctx),
            ..ExecuteOptions::default()
        };
        let exports = execute("exports.k = __context__.k", &options).unwrap();
        assert_eq!(exports.get("k"), Some(Value::Number(7.0)));
    }

    #[test]
    fn runtime_failures_propagate() {
        let err = execute("exports.x = definitelyMissing()", &ExecuteOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("definitelyMissing"));
    }

    #[test]
    fn compile_failures_propagate() {
        assert!(execute("var = ", &ExecuteOptions::default()).is_err());
    }

    #[test]
    fn each_execution_is_isolated() {
        execute("leak = 1", &ExecuteOptions::default()).unwrap();
        let err = execute("exports.x = leak", &ExecuteOptions::default()).unwrap_err();
        assert!(err.to_string().contains("leak"));
    }

    #[test]
    fn assigning_a_name_the_context_lacks_stays_module_local() {
        let ctx = Value::object_from(vec![("present".to_string(), Value::Number(1.0))]);
        let options = ExecuteOptions {
            context: Some(ctx.clone()),
            ..ExecuteOptions::default()
        };
        let exports = execute("fresh = 5; exports.saw = fresh", &options).unwrap();
        assert_eq!(exports.get("saw"), Some(Value::Number(5.0)));
        assert_eq!(ctx.get("fresh"), None);
    }
}
