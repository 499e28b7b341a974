//! Error type shared by the lexer, parser, and evaluator.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    #[error("syntax error at {line}:{col}: {message}")]
    Lex {
        line: usize,
        col: usize,
        message: String,
    },

    #[error("parse error at {line}:{col}: {message}")]
    Parse {
        line: usize,
        col: usize,
        message: String,
    },

    #[error("{0}")]
    Eval(String),
}

impl ScriptError {
    pub fn eval(message: impl Into<String>) -> Self {
        ScriptError::Eval(message.into())
    }

    /// Type mismatch helper, e.g. `type_error("number", "string")`.
    pub fn type_error(expected: &str, got: &str) -> Self {
        ScriptError::Eval(format!("expected {}, got {}", expected, got))
    }
}
