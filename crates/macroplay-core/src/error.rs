//! Error types shared by the parser, evaluator and runner.
//!
//! [`MacroError`] is the error surfaced to hosts. It distinguishes parse
//! failures (the run never starts), recoverable runtime failures (caught by
//! `TRY` or logged and skipped) and the two fatal safeguards (call depth and
//! iteration limit) that abort the whole run.
//!
//! [`EvalError`] is produced by the expression evaluator without line
//! information; the runner attaches the line when it converts it.

use thiserror::Error;

use crate::backend::BackendError;

/// Errors raised while parsing or executing a macro script.
#[derive(Error, Debug)]
pub enum MacroError {
    /// Malformed tokens, unterminated quotes, unknown commands or
    /// mismatched block keywords.
    #[error("{file}:{line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },

    /// Expression evaluation failed (division by zero, bad operands, ...).
    #[error("line {line}: {source}")]
    Expression {
        line: usize,
        #[source]
        source: EvalError,
    },

    /// A command could not be executed: bad arguments, a backend failure or
    /// a missing CALL target.
    #[error("line {line}: {message}")]
    Command { line: usize, message: String },

    /// A CALL would push more frames than allowed.
    #[error("line {line}: CALL depth limit of {limit} exceeded")]
    CallDepth { line: usize, limit: usize },

    /// A loop ran more iterations than allowed.
    #[error("line {line}: loop exceeded {limit} iterations")]
    IterationLimit { line: usize, limit: u64 },

    /// Reading a script file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MacroError {
    pub fn parse(file: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        MacroError::Parse {
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    pub fn command(line: usize, message: impl Into<String>) -> Self {
        MacroError::Command {
            line,
            message: message.into(),
        }
    }

    pub fn expression(line: usize, source: EvalError) -> Self {
        MacroError::Expression { line, source }
    }

    /// Line the error refers to, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            MacroError::Parse { line, .. }
            | MacroError::Expression { line, .. }
            | MacroError::Command { line, .. }
            | MacroError::CallDepth { line, .. }
            | MacroError::IterationLimit { line, .. } => Some(*line),
            MacroError::Io(_) => None,
        }
    }

    /// The message without its location prefix.
    pub fn detail(&self) -> String {
        match self {
            MacroError::Parse { message, .. } | MacroError::Command { message, .. } => {
                message.clone()
            }
            MacroError::Expression { source, .. } => source.to_string(),
            MacroError::CallDepth { limit, .. } => {
                format!("CALL depth limit of {} exceeded", limit)
            }
            MacroError::IterationLimit { limit, .. } => {
                format!("loop exceeded {} iterations", limit)
            }
            MacroError::Io(e) => format!("IO error: {}", e),
        }
    }

    /// Fatal errors abort the run and cannot be caught by `TRY`.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MacroError::CallDepth { .. } | MacroError::IterationLimit { .. }
        )
    }

    /// Process exit code used by the command-line runner.
    pub fn exit_code(&self) -> i32 {
        match self {
            MacroError::Parse { .. } => 2,
            MacroError::Expression { .. }
            | MacroError::Command { .. }
            | MacroError::CallDepth { .. }
            | MacroError::IterationLimit { .. } => 3,
            MacroError::Io(_) => 4,
        }
    }
}

/// Errors produced while evaluating an expression or a builtin.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("division by zero in `{0}`")]
    DivisionByZero(String),

    #[error("malformed numeric literal `{0}`")]
    MalformedNumber(String),

    #[error("unsupported operand types for {op}: `{left}` and `{right}`")]
    TypeMismatch {
        op: &'static str,
        left: String,
        right: String,
    },

    #[error("integer overflow in `{0}`")]
    Overflow(String),

    #[error("undefined variable {0}")]
    UndefinedVariable(String),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("{name}: {message}")]
    Builtin { name: &'static str, message: String },

    #[error("{0}")]
    Backend(String),
}

impl From<BackendError> for EvalError {
    fn from(e: BackendError) -> Self {
        EvalError::Backend(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_kind() {
        assert_eq!(MacroError::parse("a.macro", 1, "x").exit_code(), 2);
        assert_eq!(MacroError::command(1, "x").exit_code(), 3);
        assert_eq!(MacroError::CallDepth { line: 1, limit: 16 }.exit_code(), 3);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(MacroError::from(io).exit_code(), 4);
    }

    #[test]
    fn only_safeguards_are_fatal() {
        assert!(MacroError::CallDepth { line: 3, limit: 16 }.is_fatal());
        assert!(MacroError::IterationLimit { line: 3, limit: 10 }.is_fatal());
        assert!(!MacroError::command(3, "window not found").is_fatal());
        assert!(!MacroError::expression(3, EvalError::DivisionByZero("1 / 0".into())).is_fatal());
    }

    #[test]
    fn parse_error_display_names_file_and_line() {
        let err = MacroError::parse("main.macro", 7, "BREAK outside loop");
        assert_eq!(err.to_string(), "main.macro:7: BREAK outside loop");
        assert_eq!(err.line(), Some(7));
    }

    #[test]
    fn expression_error_display_includes_cause() {
        let err = MacroError::expression(4, EvalError::DivisionByZero("$a / 0".into()));
        assert_eq!(err.to_string(), "line 4: division by zero in `$a / 0`");
        assert_eq!(err.detail(), "division by zero in `$a / 0`");
    }
}
