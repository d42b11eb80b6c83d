//! Dynamically typed scalar values.
//!
//! Every variable and every expression result is a [`Value`]. Coercion
//! between the four kinds is explicit:
//!
//! - text that parses fully as an integer becomes [`Value::Int`], else text
//!   that parses as a float becomes [`Value::Float`], else it stays text
//! - booleans count as `0`/`1` in arithmetic, the empty string counts as `0`
//! - numbers are truthy when nonzero; strings when non-empty and not `FALSE`
//! - comparisons are numeric when both sides coerce to numbers, otherwise
//!   they compare display strings

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EvalError;

/// A scalar macro value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// A value after numeric coercion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Number::Int(i) => Value::Int(i),
            Number::Float(f) => Value::Float(f),
        }
    }
}

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
        }
    }
}

/// Parses text as a number: integer first, then float.
///
/// `inf`, `nan` and similar words are not numbers here.
pub fn parse_number(text: &str) -> Option<Number> {
    let t = text.trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(i) = t.parse::<i64>() {
        return Some(Number::Int(i));
    }
    if !t.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    match t.parse::<f64>() {
        Ok(f) if f.is_finite() => Some(Number::Float(f)),
        _ => None,
    }
}

/// Formats a float the way Python's `str(float)` does for common values.
fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(true) => write!(f, "TRUE"),
            Value::Bool(false) => write!(f, "FALSE"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

impl Value {
    /// The value of an undefined variable.
    pub fn undefined() -> Self {
        Value::Str(String::new())
    }

    /// Interprets literal text: integer, then float, else string.
    pub fn from_text(text: &str) -> Self {
        match parse_number(text) {
            Some(n) => n.into_value(),
            None => Value::Str(text.to_string()),
        }
    }

    pub fn as_string(&self) -> String {
        self.to_string()
    }

    /// Numeric view of the value, if it has one.
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Bool(b) => Some(Number::Int(i64::from(*b))),
            Value::Int(i) => Some(Number::Int(*i)),
            Value::Float(f) => Some(Number::Float(*f)),
            Value::Str(s) if s.is_empty() => Some(Number::Int(0)),
            Value::Str(s) => parse_number(s),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty() && !s.eq_ignore_ascii_case("FALSE"),
        }
    }

    /// Short type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
        }
    }

    /// Compares two values, numerically when both sides are numbers.
    ///
    /// Returns `None` when the comparison is undefined (NaN).
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self.as_number(), other.as_number()) {
            (Some(Number::Int(a)), Some(Number::Int(b))) => Some(a.cmp(&b)),
            (Some(a), Some(b)) => a.as_f64().partial_cmp(&b.as_f64()),
            _ => Some(self.to_string().cmp(&other.to_string())),
        }
    }

    pub fn loose_eq(&self, other: &Value) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    /// Applies a binary arithmetic operator.
    ///
    /// `text` is the source text of the whole sub-expression, used in
    /// error messages.
    pub fn arith(&self, op: ArithOp, other: &Value, text: &str) -> Result<Value, EvalError> {
        let (a, b) = match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => (a, b),
            _ if op == ArithOp::Add => {
                return Ok(Value::Str(format!("{}{}", self, other)));
            }
            _ => {
                return Err(EvalError::TypeMismatch {
                    op: op.symbol(),
                    left: self.to_string(),
                    right: other.to_string(),
                })
            }
        };
        match (a, b) {
            (Number::Int(a), Number::Int(b)) => int_arith(op, a, b, text).map(Value::Int),
            (a, b) => float_arith(op, a.as_f64(), b.as_f64(), text).map(Value::Float),
        }
    }

    /// Arithmetic negation.
    pub fn negate(&self, text: &str) -> Result<Value, EvalError> {
        match self.as_number() {
            Some(Number::Int(i)) => i
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| EvalError::Overflow(text.to_string())),
            Some(Number::Float(f)) => Ok(Value::Float(-f)),
            None => Err(EvalError::TypeMismatch {
                op: "unary -",
                left: self.to_string(),
                right: String::new(),
            }),
        }
    }
}

/// Integer arithmetic with floor division and floor modulo.
fn int_arith(op: ArithOp, a: i64, b: i64, text: &str) -> Result<i64, EvalError> {
    let overflow = || EvalError::Overflow(text.to_string());
    match op {
        ArithOp::Add => a.checked_add(b).ok_or_else(overflow),
        ArithOp::Sub => a.checked_sub(b).ok_or_else(overflow),
        ArithOp::Mul => a.checked_mul(b).ok_or_else(overflow),
        ArithOp::Div => {
            if b == 0 {
                return Err(EvalError::DivisionByZero(text.to_string()));
            }
            let q = a.checked_div(b).ok_or_else(overflow)?;
            if a % b != 0 && ((a < 0) != (b < 0)) {
                Ok(q - 1)
            } else {
                Ok(q)
            }
        }
        ArithOp::Mod => {
            if b == 0 {
                return Err(EvalError::DivisionByZero(text.to_string()));
            }
            let r = a.checked_rem(b).ok_or_else(overflow)?;
            if r != 0 && ((r < 0) != (b < 0)) {
                Ok(r + b)
            } else {
                Ok(r)
            }
        }
    }
}

fn float_arith(op: ArithOp, a: f64, b: f64, text: &str) -> Result<f64, EvalError> {
    match op {
        ArithOp::Add => Ok(a + b),
        ArithOp::Sub => Ok(a - b),
        ArithOp::Mul => Ok(a * b),
        ArithOp::Div => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero(text.to_string()));
            }
            Ok(a / b)
        }
        ArithOp::Mod => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero(text.to_string()));
            }
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                Ok(r + b)
            } else {
                Ok(r)
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.loose_eq(other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_text_prefers_integer_then_float() {
        assert!(matches!(Value::from_text("42"), Value::Int(42)));
        assert!(matches!(Value::from_text("-7"), Value::Int(-7)));
        assert!(matches!(Value::from_text("3.5"), Value::Float(f) if f == 3.5));
        assert!(matches!(Value::from_text("1e3"), Value::Float(f) if f == 1000.0));
        assert!(matches!(Value::from_text("hello"), Value::Str(ref s) if s == "hello"));
        assert!(matches!(Value::from_text("inf"), Value::Str(_)));
        assert!(matches!(Value::from_text("nan"), Value::Str(_)));
    }

    #[test]
    fn display_forms() {
        assert_eq!(Value::Bool(true).to_string(), "TRUE");
        assert_eq!(Value::Int(12).to_string(), "12");
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Float(2.25).to_string(), "2.25");
        assert_eq!(Value::Str("a b".into()).to_string(), "a b");
    }

    #[test]
    fn truthiness() {
        assert!(Value::Int(1).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(Value::Str("yes".into()).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(!Value::Str("false".into()).is_truthy());
        assert!(!Value::Str("FALSE".into()).is_truthy());
        assert!(Value::Str("0".into()).is_truthy());
    }

    #[test]
    fn booleans_and_empty_coerce_in_arithmetic() {
        let v = Value::Bool(true).arith(ArithOp::Add, &Value::Int(1), "").unwrap();
        assert!(matches!(v, Value::Int(2)));
        let v = Value::undefined().arith(ArithOp::Add, &Value::Int(1), "").unwrap();
        assert!(matches!(v, Value::Int(1)));
    }

    #[test]
    fn add_concatenates_non_numeric() {
        let v = Value::from("abc").arith(ArithOp::Add, &Value::Int(1), "").unwrap();
        assert_eq!(v.to_string(), "abc1");
        let err = Value::from("abc").arith(ArithOp::Mul, &Value::Int(2), "").unwrap_err();
        assert!(matches!(err, EvalError::TypeMismatch { op: "*", .. }));
    }

    #[test]
    fn modulo_matches_operand_types() {
        assert!(matches!(Value::Int(7).arith(ArithOp::Mod, &Value::Int(2), "").unwrap(), Value::Int(1)));
        let v = Value::Float(7.0).arith(ArithOp::Mod, &Value::Int(2), "").unwrap();
        assert!(matches!(v, Value::Float(f) if f == 1.0));
        assert_eq!(v.to_string(), "1.0");
        assert!(matches!(Value::Int(-7).arith(ArithOp::Mod, &Value::Int(2), "").unwrap(), Value::Int(1)));
        assert!(matches!(Value::Int(7).arith(ArithOp::Mod, &Value::Int(-2), "").unwrap(), Value::Int(-1)));
    }

    #[test]
    fn integer_division_floors() {
        assert!(matches!(Value::Int(7).arith(ArithOp::Div, &Value::Int(2), "").unwrap(), Value::Int(3)));
        assert!(matches!(Value::Int(-7).arith(ArithOp::Div, &Value::Int(2), "").unwrap(), Value::Int(-4)));
        let v = Value::Float(7.0).arith(ArithOp::Div, &Value::Int(2), "").unwrap();
        assert!(matches!(v, Value::Float(f) if f == 3.5));
    }

    #[test]
    fn division_by_zero_names_expression() {
        let err = Value::Int(1).arith(ArithOp::Div, &Value::Int(0), "$a / 0").unwrap_err();
        assert_eq!(err, EvalError::DivisionByZero("$a / 0".into()));
        let err = Value::Float(1.0).arith(ArithOp::Mod, &Value::Float(0.0), "x").unwrap_err();
        assert!(matches!(err, EvalError::DivisionByZero(_)));
    }

    #[test]
    fn overflow_is_an_error() {
        let err = Value::Int(i64::MAX).arith(ArithOp::Add, &Value::Int(1), "big").unwrap_err();
        assert_eq!(err, EvalError::Overflow("big".into()));
        assert!(Value::Int(i64::MIN).arith(ArithOp::Div, &Value::Int(-1), "").is_err());
    }

    #[test]
    fn comparison_is_numeric_when_possible() {
        assert_eq!(Value::from("10").compare(&Value::Int(9)), Some(Ordering::Greater));
        assert_eq!(Value::from("10").compare(&Value::from("9")), Some(Ordering::Greater));
        assert_eq!(Value::from("abc").compare(&Value::from("abd")), Some(Ordering::Less));
        assert!(Value::Int(3).loose_eq(&Value::Float(3.0)));
        assert!(Value::Bool(true).loose_eq(&Value::Int(1)));
        assert!(Value::Bool(true).loose_eq(&Value::from("TRUE")));
    }

    #[test]
    fn serializes_untagged() {
        let json = serde_json::to_string(&vec![
            Value::Int(1),
            Value::Float(2.5),
            Value::Bool(false),
            Value::from("x"),
        ])
        .unwrap();
        assert_eq!(json, r#"[1,2.5,false,"x"]"#);
    }
}
