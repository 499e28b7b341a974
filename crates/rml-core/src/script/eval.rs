//! Tree-walking evaluator.
//!
//! Function declarations hoist to the top of their block. `||` and `&&`
//! short-circuit and yield the deciding operand. Equality is strict for both
//! `==` and `===` (the lexer folds them together). A call-depth cap turns
//! runaway recursion in module source into an error instead of a stack
//! overflow.

use std::cell::Cell;
use std::sync::Arc;

use super::ast::{BinOp, Expr, Stmt, UnaryOp};
use super::builtins;
use super::env::Env;
use super::error::ScriptError;
use super::value::{ScriptFunction, Value};

const MAX_CALL_DEPTH: usize = 256;

thread_local! {
    static CALL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> Result<DepthGuard, ScriptError> {
        CALL_DEPTH.with(|depth| {
            if depth.get() >= MAX_CALL_DEPTH {
                Err(ScriptError::eval("call stack exceeded"))
            } else {
                depth.set(depth.get() + 1);
                Ok(DepthGuard)
            }
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        CALL_DEPTH.with(|depth| depth.set(depth.get() - 1));
    }
}

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// Runs statements in `env`. A top-level `return` stops execution and yields
/// its value; otherwise the result is null.
pub fn run_block(stmts: &[Stmt], env: &Env) -> Result<Value, ScriptError> {
    match exec_stmts(stmts, env)? {
        Flow::Return(value) => Ok(value),
        _ => Ok(Value::Null),
    }
}

/// Invokes a script function with positional arguments. Missing arguments
/// bind to null; extras are reachable through `arguments`.
pub fn call_function(func: &ScriptFunction, args: &[Value]) -> Result<Value, ScriptError> {
    let _guard = DepthGuard::enter()?;
    let scope = func.env.child();
    for (i, param) in func.params.iter().enumerate() {
        scope.define(param, args.get(i).cloned().unwrap_or(Value::Null));
    }
    scope.define("arguments", Value::array(args.to_vec()));
    match exec_stmts(&func.body, &scope)? {
        Flow::Return(value) => Ok(value),
        _ => Ok(Value::Null),
    }
}

fn exec_stmts(stmts: &[Stmt], env: &Env) -> Result<Flow, ScriptError> {
    for stmt in stmts {
        if let Stmt::FunctionDecl { name, params, body } = stmt {
            env.define(name, make_function(Some(name.clone()), params, body, env));
        }
    }
    for stmt in stmts {
        match exec_stmt(stmt, env)? {
            Flow::Normal => {}
            other => return Ok(other),
        }
    }
    Ok(Flow::Normal)
}

fn exec_stmt(stmt: &Stmt, env: &Env) -> Result<Flow, ScriptError> {
    match stmt {
        Stmt::Expr(expr) => {
            eval_expr(expr, env)?;
            Ok(Flow::Normal)
        }
        Stmt::Var(name, init) => {
            let value = match init {
                Some(expr) => eval_expr(expr, env)?,
                None => Value::Null,
            };
            env.define(name, value);
            Ok(Flow::Normal)
        }
        Stmt::Return(expr) => {
            let value = match expr {
                Some(expr) => eval_expr(expr, env)?,
                None => Value::Null,
            };
            Ok(Flow::Return(value))
        }
        Stmt::If {
            cond,
            then_branch,
            else_branch,
        } => {
            if eval_expr(cond, env)?.truthy() {
                exec_stmts(then_branch, env)
            } else if let Some(else_branch) = else_branch {
                exec_stmts(else_branch, env)
            } else {
                Ok(Flow::Normal)
            }
        }
        Stmt::While { cond, body, step } => {
            while eval_expr(cond, env)?.truthy() {
                match exec_stmts(body, env)? {
                    Flow::Normal | Flow::Continue => {}
                    Flow::Break => break,
                    flow @ Flow::Return(_) => return Ok(flow),
                }
                if let Some(step) = step {
                    eval_expr(step, env)?;
                }
            }
            Ok(Flow::Normal)
        }
        Stmt::Break => Ok(Flow::Break),
        Stmt::Continue => Ok(Flow::Continue),
        // Hoisting already bound the name.
        Stmt::FunctionDecl { .. } => Ok(Flow::Normal),
        Stmt::Block(body) => exec_stmts(body, env),
    }
}

fn make_function(name: Option<String>, params: &[String], body: &[Stmt], env: &Env) -> Value {
    Value::Function(Arc::new(ScriptFunction {
        name,
        params: params.to_vec(),
        body: body.to_vec(),
        env: env.clone(),
    }))
}

pub fn eval_expr(expr: &Expr, env: &Env) -> Result<Value, ScriptError> {
    match expr {
        Expr::Null => Ok(Value::Null),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Str(s) => Ok(Value::string(s.clone())),
        Expr::Ident(name) => env
            .lookup(name)
            .ok_or_else(|| ScriptError::eval(format!("{} is not defined", name))),
        Expr::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval_expr(item, env)?);
            }
            Ok(Value::array(values))
        }
        Expr::Object(props) => {
            let object = Value::object();
            for prop in props {
                object.set(&prop.key, eval_expr(&prop.value, env)?);
            }
            Ok(object)
        }
        Expr::Member(target, name) => {
            let target = eval_expr(target, env)?;
            member_get(&target, name)
        }
        Expr::Index(target, index) => {
            let target = eval_expr(target, env)?;
            let index = eval_expr(index, env)?;
            index_get(&target, &index)
        }
        Expr::Call(callee, args) => {
            let mut arg_values = Vec::with_capacity(args.len());
            for arg in args {
                arg_values.push(eval_expr(arg, env)?);
            }
            if let Expr::Member(target, name) = &**callee {
                let target = eval_expr(target, env)?;
                return call_member(&target, name, &arg_values);
            }
            let callee = eval_expr(callee, env)?;
            callee.call(&arg_values)
        }
        // typeof tolerates undeclared names.
        Expr::Unary(UnaryOp::TypeOf, operand) => {
            if let Expr::Ident(name) = &**operand {
                return Ok(Value::string(match env.lookup(name) {
                    Some(v) => v.typeof_name(),
                    None => "undefined",
                }));
            }
            let value = eval_expr(operand, env)?;
            Ok(Value::string(value.typeof_name()))
        }
        Expr::Unary(op, operand) => {
            let value = eval_expr(operand, env)?;
            Ok(match op {
                UnaryOp::Not => Value::Bool(!value.truthy()),
                UnaryOp::Neg => Value::Number(-to_number(&value)),
                UnaryOp::Plus => Value::Number(to_number(&value)),
                UnaryOp::TypeOf => unreachable!(),
            })
        }
        Expr::Binary(BinOp::Or, left, right) => {
            let left = eval_expr(left, env)?;
            if left.truthy() {
                Ok(left)
            } else {
                eval_expr(right, env)
            }
        }
        Expr::Binary(BinOp::And, left, right) => {
            let left = eval_expr(left, env)?;
            if left.truthy() {
                eval_expr(right, env)
            } else {
                Ok(left)
            }
        }
        Expr::Binary(op, left, right) => {
            let left = eval_expr(left, env)?;
            let right = eval_expr(right, env)?;
            binary_op(*op, &left, &right)
        }
        Expr::Ternary(cond, then_expr, else_expr) => {
            if eval_expr(cond, env)?.truthy() {
                eval_expr(then_expr, env)
            } else {
                eval_expr(else_expr, env)
            }
        }
        Expr::Function { name, params, body } => {
            Ok(make_function(name.clone(), params, body, env))
        }
        Expr::Assign(target, value) => {
            let value = eval_expr(value, env)?;
            assign(target, value.clone(), env)?;
            Ok(value)
        }
    }
}

fn assign(target: &Expr, value: Value, env: &Env) -> Result<(), ScriptError> {
    match target {
        Expr::Ident(name) => {
            // Undeclared assignment declares in the current scope.
            if !env.assign(name, value.clone()) {
                env.define(name, value);
            }
            Ok(())
        }
        Expr::Member(object, name) => {
            let object = eval_expr(object, env)?;
            if object.set(name, value) {
                Ok(())
            } else {
                Err(ScriptError::eval(format!(
                    "cannot set property '{}' of {}",
                    name,
                    object.type_name()
                )))
            }
        }
        Expr::Index(object, index) => {
            let object = eval_expr(object, env)?;
            let index = eval_expr(index, env)?;
            index_set(&object, &index, value)
        }
        _ => Err(ScriptError::eval("invalid assignment target")),
    }
}

fn member_get(target: &Value, name: &str) -> Result<Value, ScriptError> {
    match target {
        Value::Null => Err(ScriptError::eval(format!(
            "cannot read property '{}' of null",
            name
        ))),
        Value::Object(map) => Ok(map.read().unwrap().get(name).cloned().unwrap_or(Value::Null)),
        Value::Array(items) => match name {
            "length" => Ok(Value::Number(items.read().unwrap().len() as f64)),
            _ => Ok(Value::Null),
        },
        Value::Str(s) => match name {
            "length" => Ok(Value::Number(s.chars().count() as f64)),
            _ => Ok(Value::Null),
        },
        Value::Regex(r) => match name {
            "source" => Ok(Value::string(r.source.clone())),
            "flags" => Ok(Value::string(r.flags.clone())),
            _ => Ok(Value::Null),
        },
        Value::Function(f) => match name {
            "name" => Ok(Value::string(f.name.clone().unwrap_or_default())),
            "length" => Ok(Value::Number(f.params.len() as f64)),
            _ => Ok(Value::Null),
        },
        _ => Ok(Value::Null),
    }
}

fn index_get(target: &Value, index: &Value) -> Result<Value, ScriptError> {
    match target {
        Value::Array(items) => {
            let i = to_number(index);
            if i.fract() != 0.0 || i < 0.0 {
                return Ok(Value::Null);
            }
            Ok(items
                .read()
                .unwrap()
                .get(i as usize)
                .cloned()
                .unwrap_or(Value::Null))
        }
        Value::Str(s) => {
            if let Value::Number(n) = index {
                if n.fract() == 0.0 && *n >= 0.0 {
                    return Ok(s
                        .chars()
                        .nth(*n as usize)
                        .map(|c| Value::string(c.to_string()))
                        .unwrap_or(Value::Null));
                }
            }
            member_get(target, &to_display(index))
        }
        _ => member_get(target, &to_display(index)),
    }
}

fn index_set(target: &Value, index: &Value, value: Value) -> Result<(), ScriptError> {
    match target {
        Value::Array(items) => {
            let i = to_number(index);
            if i.fract() != 0.0 || i < 0.0 {
                return Err(ScriptError::eval(format!("bad array index: {}", i)));
            }
            let i = i as usize;
            let mut items = items.write().unwrap();
            if i >= items.len() {
                items.resize(i + 1, Value::Null);
            }
            items[i] = value;
            Ok(())
        }
        Value::Object(_) => {
            target.set(&to_display(index), value);
            Ok(())
        }
        other => Err(ScriptError::eval(format!(
            "cannot index into {}",
            other.type_name()
        ))),
    }
}

/// A method call `target.name(args)`: an own callable property wins, then the
/// builtin methods for the receiver's type.
fn call_member(target: &Value, name: &str, args: &[Value]) -> Result<Value, ScriptError> {
    if let Some(prop) = target.get(name) {
        if prop.is_callable() {
            return prop.call(args);
        }
        if !prop.is_null() {
            return Err(ScriptError::eval(format!("{} is not a function", name)));
        }
    }
    builtins::call_method(target, name, args)
}

fn binary_op(op: BinOp, left: &Value, right: &Value) -> Result<Value, ScriptError> {
    let value = match op {
        BinOp::Eq => Value::Bool(left == right),
        BinOp::Ne => Value::Bool(left != right),
        BinOp::Add => match (left, right) {
            (Value::Str(_), _) | (_, Value::Str(_)) => {
                Value::string(format!("{}{}", to_display(left), to_display(right)))
            }
            _ => Value::Number(to_number(left) + to_number(right)),
        },
        BinOp::Sub => Value::Number(to_number(left) - to_number(right)),
        BinOp::Mul => Value::Number(to_number(left) * to_number(right)),
        BinOp::Div => Value::Number(to_number(left) / to_number(right)),
        BinOp::Rem => Value::Number(to_number(left) % to_number(right)),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ordering = match (left, right) {
                (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
                _ => to_number(left).partial_cmp(&to_number(right)),
            };
            let ok = match (op, ordering) {
                (_, None) => false,
                (BinOp::Lt, Some(o)) => o.is_lt(),
                (BinOp::Le, Some(o)) => o.is_le(),
                (BinOp::Gt, Some(o)) => o.is_gt(),
                (BinOp::Ge, Some(o)) => o.is_ge(),
                _ => unreachable!(),
            };
            Value::Bool(ok)
        }
        BinOp::Or | BinOp::And => unreachable!(),
    };
    Ok(value)
}

/// Numeric coercion. Null coerces to NaN, matching the undefined flavor of
/// the merged null/undefined value.
pub(crate) fn to_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => *n,
        Value::Bool(true) => 1.0,
        Value::Bool(false) => 0.0,
        Value::Str(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse::<f64>().unwrap_or(f64::NAN)
            }
        }
        Value::Date(d) => d.timestamp_millis() as f64,
        _ => f64::NAN,
    }
}

pub(crate) fn to_display(value: &Value) -> String {
    format!("{}", value)
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse_program;
    use super::*;

    fn run(src: &str) -> Value {
        let stmts = parse_program(src).unwrap();
        run_block(&stmts, &Env::new()).unwrap()
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(run("return 1 + 2 * 3"), Value::Number(7.0));
        assert_eq!(run("return (1 + 2) * 3"), Value::Number(9.0));
        assert_eq!(run("return 7 % 3"), Value::Number(1.0));
    }

    #[test]
    fn string_concat() {
        assert_eq!(run("return 'a' + 1"), Value::string("a1"));
        assert_eq!(run("return 1 + '2'"), Value::string("12"));
    }

    #[test]
    fn short_circuit_yields_operand() {
        assert_eq!(run("return null || 'fallback'"), Value::string("fallback"));
        assert_eq!(run("return 'left' || 'right'"), Value::string("left"));
        assert_eq!(run("return 0 && f()"), Value::Number(0.0));
    }

    #[test]
    fn closures_capture_environment() {
        let src = "
            function adder(n) {
                return function (x) { return x + n }
            }
            var add2 = adder(2)
            return add2(40)
        ";
        assert_eq!(run(src), Value::Number(42.0));
    }

    #[test]
    fn function_declarations_hoist() {
        assert_eq!(run("return double(4); function double(x) { return x * 2 }"),
            Value::Number(8.0));
    }

    #[test]
    fn while_with_break_and_continue() {
        let src = "
            var total = 0
            var i = 0
            while (true) {
                i = i + 1
                if (i > 10) { break }
                if (i % 2) { continue }
                total = total + i
            }
            return total
        ";
        assert_eq!(run(src), Value::Number(30.0));
    }

    #[test]
    fn for_loop() {
        assert_eq!(
            run("var s = 0; for (var i = 1; i <= 4; i = i + 1) { s = s + i } return s"),
            Value::Number(10.0)
        );
    }

    #[test]
    fn continue_in_for_still_steps() {
        let src = "
            var s = 0
            for (var i = 0; i < 5; i = i + 1) {
                if (i == 2) { continue }
                s = s + i
            }
            return s
        ";
        assert_eq!(run(src), Value::Number(8.0));
    }

    #[test]
    fn object_and_array_access() {
        assert_eq!(run("var o = { a: [10, 20] }; return o.a[1]"), Value::Number(20.0));
        assert_eq!(run("var o = {}; o.x = 3; o['y'] = 4; return o.x + o.y"),
            Value::Number(7.0));
        assert_eq!(run("var a = []; a[2] = 9; return a.length"), Value::Number(3.0));
    }

    #[test]
    fn missing_property_is_null() {
        assert_eq!(run("var o = {}; return o.missing"), Value::Null);
    }

    #[test]
    fn reading_property_of_null_fails() {
        let stmts = parse_program("var o = null; return o.x").unwrap();
        let err = run_block(&stmts, &Env::new()).unwrap_err();
        assert!(err.to_string().contains("of null"));
    }

    #[test]
    fn typeof_reports() {
        assert_eq!(run("return typeof 'x'"), Value::string("string"));
        assert_eq!(run("return typeof 1"), Value::string("number"));
        assert_eq!(run("return typeof {}"), Value::string("object"));
        assert_eq!(run("return typeof undeclared"), Value::string("undefined"));
        assert_eq!(
            run("return typeof function () {}"),
            Value::string("function")
        );
    }

    #[test]
    fn strict_equality() {
        assert_eq!(run("return 1 == '1'"), Value::Bool(false));
        assert_eq!(run("return 1 == 1"), Value::Bool(true));
        assert_eq!(run("var a = {}; var b = a; return a == b"), Value::Bool(true));
        assert_eq!(run("return {} == {}"), Value::Bool(false));
    }

    #[test]
    fn ternary() {
        assert_eq!(run("return 1 < 2 ? 'yes' : 'no'"), Value::string("yes"));
    }

    #[test]
    fn recursion_depth_is_capped() {
        let stmts = parse_program("function f() { return f() } return f()").unwrap();
        let err = run_block(&stmts, &Env::new()).unwrap_err();
        assert!(err.to_string().contains("call stack"));
    }

    #[test]
    fn arguments_binding() {
        assert_eq!(
            run("function f() { return arguments.length } return f(1, 2, 3)"),
            Value::Number(3.0)
        );
    }
}
