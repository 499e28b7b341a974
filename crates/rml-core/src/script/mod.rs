//! Interpreter for the scripting subset remote modules are written in.
//!
//! Module source arrives over HTTP as text and runs here; nothing else in the
//! process executes dynamic code. The language is a small JS-flavored subset:
//! `var`/`let`/`const` (all function-scoped), `if`/`while`/`for`, functions
//! and closures, object and array literals, member/index access, the usual
//! operators, and a curated set of globals (`console`, `JSON`, `Math`, and
//! friends; see [`builtins`]).
//!
//! Known divergences from the source language, chosen to keep the evaluator
//! small: null and undefined are one value, `==` is strict like `===`, and
//! there is no prototype chain; methods on strings, arrays, regexes, and
//! dates are builtin.

pub mod ast;
pub mod builtins;
pub mod env;
pub mod error;
pub mod eval;
pub mod json;
pub mod lexer;
pub mod parser;
pub mod value;

use std::sync::Arc;

pub use env::Env;
pub use error::ScriptError;
pub use value::{ObjectMap, ScriptFunction, ScriptRegex, Value};

/// Parses module source into a runnable program.
pub fn compile_module(source: &str) -> Result<Vec<ast::Stmt>, ScriptError> {
    parser::parse_program(source)
}

/// Runs a compiled program in `env`. A top-level `return` yields its value.
pub fn run_module(stmts: &[ast::Stmt], env: &Env) -> Result<Value, ScriptError> {
    eval::run_block(stmts, env)
}

/// Fresh top-level scope with the builtin globals installed.
pub fn base_env() -> Env {
    let env = Env::new();
    builtins::install(&env);
    env
}

/// Compiles a function from its parameter names and body text, the shape
/// function values take in encoded manifests. When `explicit_return` is
/// false the body is a single expression and gets wrapped in `return (…)`.
/// The function closes over a fresh base scope, not the caller's.
pub fn compile_function(
    params: &[String],
    body: &str,
    explicit_return: bool,
) -> Result<Value, ScriptError> {
    let source = if explicit_return {
        body.to_string()
    } else {
        format!("return (\n{}\n)", body)
    };
    let stmts = parser::parse_program(&source)?;
    Ok(Value::Function(Arc::new(ScriptFunction {
        name: None,
        params: params.to_vec(),
        body: stmts,
        env: base_env(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_source_runs_with_globals() {
        let stmts = compile_module("return Math.floor(2.7) + JSON.parse('{\"n\": 39}').n").unwrap();
        let result = run_module(&stmts, &base_env()).unwrap();
        assert_eq!(result, Value::Number(41.0));
    }

    #[test]
    fn compile_function_wraps_expression_bodies() {
        let f = compile_function(&["x".to_string()], "x * 2", false).unwrap();
        assert_eq!(f.call(&[Value::Number(5.0)]).unwrap(), Value::Number(10.0));
    }

    #[test]
    fn compile_function_keeps_statement_bodies() {
        let body = "var total = a + b; return total";
        let f = compile_function(&["a".to_string(), "b".to_string()], body, true).unwrap();
        assert_eq!(
            f.call(&[Value::Number(1.0), Value::Number(2.0)]).unwrap(),
            Value::Number(3.0)
        );
    }

    #[test]
    fn compiled_functions_see_globals_not_caller_scope() {
        let f = compile_function(&[], "typeof JSON", false).unwrap();
        assert_eq!(f.call(&[]).unwrap(), Value::string("object"));
        let f = compile_function(&[], "typeof somethingLocal", false).unwrap();
        assert_eq!(f.call(&[]).unwrap(), Value::string("undefined"));
    }

    #[test]
    fn expression_body_may_be_an_object_literal() {
        let f = compile_function(&[], "{ a: 1, b: 2 }", false).unwrap();
        let obj = f.call(&[]).unwrap();
        assert_eq!(obj.get("a"), Some(Value::Number(1.0)));
        assert_eq!(obj.get("b"), Some(Value::Number(2.0)));
    }
}
