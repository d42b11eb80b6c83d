//! Expression parsing and evaluation.
//!
//! Expressions appear on the right of `$name = ...` and after `IF`,
//! `ELSEIF`, `WHILE` and `UNTIL`. Operators, from highest precedence to
//! lowest:
//!
//! | level | operators |
//! |-------|-----------|
//! | unary | `NOT`, `-` |
//! | multiplicative | `*` `/` `%` |
//! | additive | `+` `-` |
//! | relational | `==` `!=` `<` `<=` `>` `>=` (chainable: `1 < $x < 5`) |
//! | conjunction | `AND` |
//! | disjunction | `OR` |
//!
//! `AND` and `OR` short-circuit and yield the deciding operand. Keywords and
//! builtin names are case-insensitive. Bare words are strings; a word that
//! starts with a digit must be a valid number.
//!
//! Builtins are atoms. Fixed-arity builtins (`RANDOM a b`) take that many
//! unary operands. Variadic builtins (`FILE_EXISTS C:/data/in.txt`) take
//! whitespace-separated words up to `AND`, `OR`, a comparison operator, a
//! closing parenthesis or the end of the expression; `$name` inside such
//! words is substituted.
//!
//! # Example
//!
//! ```
//! use macroplay_core::expression::{evaluate, Scope};
//! use macroplay_core::value::Value;
//! use macroplay_core::variables::{UndefinedPolicy, VariableStore};
//!
//! let mut vars = VariableStore::new();
//! vars.set("$x", Value::Int(7));
//! let scope = Scope::new(&vars, UndefinedPolicy::Empty);
//! assert_eq!(evaluate("$x % 2", &scope).unwrap().to_string(), "1");
//! ```

use std::cmp::Ordering;

use crate::builtins::{Builtin, BuiltinEvaluator};
use crate::error::EvalError;
use crate::value::{parse_number, ArithOp, Value};
use crate::variables::{identifier_len, UndefinedPolicy, VariableStore};

/// Variable lookup and builtin dispatch for the evaluator.
pub trait EvalContext {
    fn variable(&self, name: &str) -> Result<Value, EvalError>;

    fn call_builtin(&self, builtin: Builtin, args: &[String]) -> Result<Value, EvalError>;
}

/// Relational operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn holds(self, ord: Option<Ordering>) -> bool {
        match (self, ord) {
            (CmpOp::Ne, None) => true,
            (_, None) => false,
            (CmpOp::Eq, Some(o)) => o == Ordering::Equal,
            (CmpOp::Ne, Some(o)) => o != Ordering::Equal,
            (CmpOp::Lt, Some(o)) => o == Ordering::Less,
            (CmpOp::Le, Some(o)) => o != Ordering::Greater,
            (CmpOp::Gt, Some(o)) => o == Ordering::Greater,
            (CmpOp::Ge, Some(o)) => o != Ordering::Less,
        }
    }
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A number, string, bare word or boolean, with its source text.
    Literal { value: Value, raw: String },
    Var(String),
    Not(Box<Expr>),
    Neg { operand: Box<Expr>, text: String },
    Arith {
        op: ArithOp,
        left: Box<Expr>,
        right: Box<Expr>,
        text: String,
    },
    /// `first op1 e1 op2 e2 ...`, true when every adjacent pair holds.
    Compare {
        first: Box<Expr>,
        rest: Vec<(CmpOp, Expr)>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Call { builtin: Builtin, args: Vec<Arg> },
}

/// A builtin argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// A word or quoted string; `$name` inside it is substituted.
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone)]
enum Tok {
    End,
    Literal(Value, String),
    Var(String),
    And,
    Or,
    Not,
    Builtin(Builtin),
    Arith(ArithOp),
    Cmp(CmpOp),
    LParen,
    RParen,
}

struct Lexed {
    tok: Tok,
    start: usize,
    end: usize,
}

fn is_operator_char(c: char) -> bool {
    matches!(
        c,
        '+' | '-' | '*' | '/' | '%' | '=' | '!' | '<' | '>' | '(' | ')' | '"'
    )
}

fn classify_word(word: &str) -> Result<Tok, EvalError> {
    let upper = word.to_ascii_uppercase();
    let tok = match upper.as_str() {
        "AND" => Tok::And,
        "OR" => Tok::Or,
        "NOT" => Tok::Not,
        "TRUE" => Tok::Literal(Value::Bool(true), word.to_string()),
        "FALSE" => Tok::Literal(Value::Bool(false), word.to_string()),
        _ => {
            if let Some(builtin) = Builtin::from_name(&upper) {
                return Ok(Tok::Builtin(builtin));
            }
            let mut chars = word.chars();
            let numeric = match (chars.next(), chars.next()) {
                (Some(c), _) if c.is_ascii_digit() => true,
                (Some('.'), Some(d)) => d.is_ascii_digit(),
                _ => false,
            };
            if numeric {
                let n = parse_number(word)
                    .ok_or_else(|| EvalError::MalformedNumber(word.to_string()))?;
                Tok::Literal(n.into_value(), word.to_string())
            } else {
                Tok::Literal(Value::Str(word.to_string()), word.to_string())
            }
        }
    };
    Ok(tok)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn skip_ws(&self, from: usize) -> usize {
        self.src[from..]
            .char_indices()
            .find(|(_, c)| !c.is_whitespace())
            .map_or(self.src.len(), |(i, _)| from + i)
    }

    fn char_at(&self, at: usize) -> Option<char> {
        self.src[at..].chars().next()
    }

    /// Reads a quoted string whose opening quote is at `start`.
    fn quoted(&self, start: usize) -> Result<(String, usize), EvalError> {
        let body = start + 1;
        match self.src[body..].find('"') {
            Some(len) => Ok((self.src[body..body + len].to_string(), body + len + 1)),
            None => Err(EvalError::Syntax("unterminated string".to_string())),
        }
    }

    /// Reads a `$name` at `start`.
    fn variable(&self, start: usize) -> Result<(String, usize), EvalError> {
        let len = identifier_len(&self.src[start + 1..]);
        if len == 0 {
            return Err(EvalError::Syntax(
                "`$` must be followed by a variable name".to_string(),
            ));
        }
        let end = start + 1 + len;
        Ok((self.src[start..end].to_string(), end))
    }

    fn word_end(&self, start: usize) -> usize {
        let numeric = self
            .char_at(start)
            .map_or(false, |c| c.is_ascii_digit() || c == '.');
        let mut prev = '\0';
        let mut iter = self.src[start..].char_indices().peekable();
        while let Some((i, c)) = iter.next() {
            let exponent_sign = numeric
                && (c == '+' || c == '-')
                && (prev == 'e' || prev == 'E')
                && iter.peek().map_or(false, |(_, n)| n.is_ascii_digit());
            if c.is_whitespace() || (is_operator_char(c) && !exponent_sign) || c == '$' {
                return start + i;
            }
            prev = c;
        }
        self.src.len()
    }

    fn lex_at(&self, at: usize) -> Result<Lexed, EvalError> {
        let start = self.skip_ws(at);
        let Some(c) = self.char_at(start) else {
            return Ok(Lexed {
                tok: Tok::End,
                start,
                end: start,
            });
        };
        let next = self.char_at(start + c.len_utf8());
        let single = |tok: Tok| -> Result<Lexed, EvalError> {
            Ok(Lexed { tok, start, end: start + 1 })
        };
        let double = |tok: Tok| -> Result<Lexed, EvalError> {
            Ok(Lexed { tok, start, end: start + 2 })
        };
        match c {
            '(' => single(Tok::LParen),
            ')' => single(Tok::RParen),
            '+' => single(Tok::Arith(ArithOp::Add)),
            '-' => single(Tok::Arith(ArithOp::Sub)),
            '*' => single(Tok::Arith(ArithOp::Mul)),
            '/' => single(Tok::Arith(ArithOp::Div)),
            '%' => single(Tok::Arith(ArithOp::Mod)),
            '=' if next == Some('=') => double(Tok::Cmp(CmpOp::Eq)),
            '=' => Err(EvalError::Syntax(
                "single `=` is not an operator, use `==` to compare".to_string(),
            )),
            '!' if next == Some('=') => double(Tok::Cmp(CmpOp::Ne)),
            '!' => Err(EvalError::Syntax("unexpected `!`, use NOT".to_string())),
            '<' if next == Some('=') => double(Tok::Cmp(CmpOp::Le)),
            '<' => single(Tok::Cmp(CmpOp::Lt)),
            '>' if next == Some('=') => double(Tok::Cmp(CmpOp::Ge)),
            '>' => single(Tok::Cmp(CmpOp::Gt)),
            '"' => {
                let (text, end) = self.quoted(start)?;
                Ok(Lexed {
                    tok: Tok::Literal(Value::from_text(&text), text),
                    start,
                    end,
                })
            }
            '$' => {
                let (name, end) = self.variable(start)?;
                Ok(Lexed {
                    tok: Tok::Var(name),
                    start,
                    end,
                })
            }
            _ => {
                let end = self.word_end(start);
                Ok(Lexed {
                    tok: classify_word(&self.src[start..end])?,
                    start,
                    end,
                })
            }
        }
    }

    fn peek(&self) -> Result<Lexed, EvalError> {
        self.lex_at(self.pos)
    }

    fn text(&self, start: usize) -> String {
        self.src[start..self.pos].trim().to_string()
    }

    fn unexpected(&self, lexed: &Lexed) -> EvalError {
        if lexed.start >= self.src.len() {
            EvalError::Syntax("unexpected end of expression".to_string())
        } else {
            EvalError::Syntax(format!(
                "unexpected `{}`",
                &self.src[lexed.start..lexed.end]
            ))
        }
    }

    fn parse_or(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_and()?;
        loop {
            let lexed = self.peek()?;
            if !matches!(lexed.tok, Tok::Or) {
                return Ok(left);
            }
            self.pos = lexed.end;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
    }

    fn parse_and(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_comparison()?;
        loop {
            let lexed = self.peek()?;
            if !matches!(lexed.tok, Tok::And) {
                return Ok(left);
            }
            self.pos = lexed.end;
            let right = self.parse_comparison()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, EvalError> {
        let first = self.parse_additive()?;
        let mut rest = Vec::new();
        loop {
            let lexed = self.peek()?;
            let Tok::Cmp(op) = lexed.tok else { break };
            self.pos = lexed.end;
            rest.push((op, self.parse_additive()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, EvalError> {
        let start = self.skip_ws(self.pos);
        let mut left = self.parse_multiplicative()?;
        loop {
            let lexed = self.peek()?;
            let op = match lexed.tok {
                Tok::Arith(op @ (ArithOp::Add | ArithOp::Sub)) => op,
                _ => return Ok(left),
            };
            self.pos = lexed.end;
            let right = self.parse_multiplicative()?;
            left = Expr::Arith {
                op,
                left: Box::new(left),
                right: Box::new(right),
                text: self.text(start),
            };
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, EvalError> {
        let start = self.skip_ws(self.pos);
        let mut left = self.parse_unary()?;
        loop {
            let lexed = self.peek()?;
            let op = match lexed.tok {
                Tok::Arith(op @ (ArithOp::Mul | ArithOp::Div | ArithOp::Mod)) => op,
                _ => return Ok(left),
            };
            self.pos = lexed.end;
            let right = self.parse_unary()?;
            left = Expr::Arith {
                op,
                left: Box::new(left),
                right: Box::new(right),
                text: self.text(start),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        let lexed = self.peek()?;
        match lexed.tok {
            Tok::Not => {
                self.pos = lexed.end;
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            Tok::Arith(ArithOp::Sub) => {
                self.pos = lexed.end;
                let operand = self.parse_unary()?;
                Ok(Expr::Neg {
                    operand: Box::new(operand),
                    text: self.text(lexed.start),
                })
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        let lexed = self.peek()?;
        match lexed.tok {
            Tok::Literal(value, raw) => {
                self.pos = lexed.end;
                Ok(Expr::Literal { value, raw })
            }
            Tok::Var(name) => {
                self.pos = lexed.end;
                Ok(Expr::Var(name))
            }
            Tok::LParen => {
                self.pos = lexed.end;
                let inner = self.parse_or()?;
                self.expect_close()?;
                Ok(inner)
            }
            Tok::Builtin(builtin) => {
                self.pos = lexed.end;
                self.parse_call(builtin)
            }
            _ => Err(self.unexpected(&lexed)),
        }
    }

    fn expect_close(&mut self) -> Result<(), EvalError> {
        let lexed = self.peek()?;
        match lexed.tok {
            Tok::RParen => {
                self.pos = lexed.end;
                Ok(())
            }
            _ => Err(EvalError::Syntax("missing `)`".to_string())),
        }
    }

    fn parse_call(&mut self, builtin: Builtin) -> Result<Expr, EvalError> {
        let mut args = Vec::new();
        match builtin.arity() {
            Some(arity) => {
                for given in 0..arity {
                    let lexed = self.peek()?;
                    let missing = matches!(
                        lexed.tok,
                        Tok::End | Tok::RParen | Tok::And | Tok::Or | Tok::Cmp(_)
                    ) || matches!(lexed.tok, Tok::Arith(op) if op != ArithOp::Sub);
                    if missing {
                        return Err(EvalError::Builtin {
                            name: builtin.name(),
                            message: format!("expected {} arguments, got {}", arity, given),
                        });
                    }
                    args.push(Arg::Expr(self.parse_unary()?));
                }
            }
            None => {
                while let Some(arg) = self.word_arg()? {
                    args.push(arg);
                }
            }
        }
        Ok(Expr::Call { builtin, args })
    }

    /// Reads one argument of a variadic builtin, or `None` at a boundary.
    fn word_arg(&mut self) -> Result<Option<Arg>, EvalError> {
        let start = self.skip_ws(self.pos);
        let Some(c) = self.char_at(start) else {
            return Ok(None);
        };
        match c {
            ')' => Ok(None),
            '(' => {
                self.pos = start + 1;
                let inner = self.parse_or()?;
                self.expect_close()?;
                Ok(Some(Arg::Expr(inner)))
            }
            '"' => {
                let (text, end) = self.quoted(start)?;
                self.pos = end;
                Ok(Some(Arg::Text(text)))
            }
            _ => {
                let end = self.src[start..]
                    .char_indices()
                    .find(|(_, c)| c.is_whitespace() || *c == ')')
                    .map_or(self.src.len(), |(i, _)| start + i);
                let word = &self.src[start..end];
                let upper = word.to_ascii_uppercase();
                if matches!(upper.as_str(), "AND" | "OR")
                    || matches!(word, "==" | "!=" | "<" | "<=" | ">" | ">=")
                {
                    return Ok(None);
                }
                self.pos = end;
                Ok(Some(Arg::Text(word.to_string())))
            }
        }
    }
}

/// Parses expression text.
pub fn parse_expression(src: &str) -> Result<Expr, EvalError> {
    let mut parser = Parser { src, pos: 0 };
    let expr = parser.parse_or()?;
    let rest = parser.peek()?;
    if !matches!(rest.tok, Tok::End) {
        return Err(parser.unexpected(&rest));
    }
    Ok(expr)
}

/// Substitutes `$name` references inside a builtin word argument.
fn expand(text: &str, ctx: &dyn EvalContext) -> Result<String, EvalError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let len = identifier_len(&rest[pos + 1..]);
        if len == 0 {
            out.push('$');
            rest = &rest[pos + 1..];
            continue;
        }
        out.push_str(&ctx.variable(&rest[pos..pos + 1 + len])?.to_string());
        rest = &rest[pos + 1 + len..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Evaluates a parsed expression.
pub fn eval(expr: &Expr, ctx: &dyn EvalContext) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal { value, .. } => Ok(value.clone()),
        Expr::Var(name) => ctx.variable(name),
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, ctx)?.is_truthy())),
        Expr::Neg { operand, text } => eval(operand, ctx)?.negate(text),
        Expr::Arith { op, left, right, text } => {
            let l = eval(left, ctx)?;
            let r = eval(right, ctx)?;
            l.arith(*op, &r, text)
        }
        Expr::Compare { first, rest } => {
            let mut left = eval(first, ctx)?;
            for (op, next) in rest {
                let right = eval(next, ctx)?;
                if !op.holds(left.compare(&right)) {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        }
        Expr::And(left, right) => {
            let l = eval(left, ctx)?;
            if !l.is_truthy() {
                return Ok(l);
            }
            eval(right, ctx)
        }
        Expr::Or(left, right) => {
            let l = eval(left, ctx)?;
            if l.is_truthy() {
                return Ok(l);
            }
            eval(right, ctx)
        }
        Expr::Call { builtin, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                let text = match arg {
                    Arg::Text(text) => expand(text, ctx)?,
                    Arg::Expr(Expr::Literal { raw, .. }) => raw.clone(),
                    Arg::Expr(e) => eval(e, ctx)?.to_string(),
                };
                values.push(text);
            }
            ctx.call_builtin(*builtin, &values)
        }
    }
}

/// Parses and evaluates expression text.
pub fn evaluate(src: &str, ctx: &dyn EvalContext) -> Result<Value, EvalError> {
    eval(&parse_expression(src)?, ctx)
}

/// Evaluates a condition to its truthiness.
pub fn evaluate_condition(src: &str, ctx: &dyn EvalContext) -> Result<bool, EvalError> {
    Ok(evaluate(src, ctx)?.is_truthy())
}

/// Variables plus optional builtins: the context the runner evaluates in.
pub struct Scope<'a> {
    vars: &'a VariableStore,
    builtins: Option<&'a BuiltinEvaluator>,
    policy: UndefinedPolicy,
}

impl<'a> Scope<'a> {
    pub fn new(vars: &'a VariableStore, policy: UndefinedPolicy) -> Self {
        Self {
            vars,
            builtins: None,
            policy,
        }
    }

    pub fn with_builtins(mut self, builtins: &'a BuiltinEvaluator) -> Self {
        self.builtins = Some(builtins);
        self
    }
}

impl EvalContext for Scope<'_> {
    fn variable(&self, name: &str) -> Result<Value, EvalError> {
        match (self.vars.get(name), self.policy) {
            (Some(value), _) => Ok(value.clone()),
            (None, UndefinedPolicy::Empty) => Ok(Value::undefined()),
            (None, UndefinedPolicy::Error) => Err(EvalError::UndefinedVariable(name.to_string())),
        }
    }

    fn call_builtin(&self, builtin: Builtin, args: &[String]) -> Result<Value, EvalError> {
        match self.builtins {
            Some(evaluator) => evaluator.call(builtin, args),
            None => Err(EvalError::Builtin {
                name: builtin.name(),
                message: "no command backend available".to_string(),
            }),
        }
    }
}
