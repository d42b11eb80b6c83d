//! The variable store shared by every frame of a run.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::EvalError;
use crate::value::Value;

/// What reading an undefined variable does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedPolicy {
    /// Yield the empty string, which counts as `0` in arithmetic.
    #[default]
    Empty,
    /// Fail with an undefined-variable error.
    Error,
}

/// Maps `$name` to its current [`Value`].
///
/// Names include the leading `$` and are case-sensitive. One store lives for
/// a whole run and is shared by CALLed files, so there is no shadowing.
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    vars: HashMap<String, Value>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Stores a value, replacing any previous value of any type.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn clear(&mut self) {
        self.vars.clear();
    }

    /// A sorted copy for display in a variable watch.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Returns true if `name` is a valid variable name (`$` + identifier).
pub fn is_variable_name(name: &str) -> bool {
    let Some(rest) = name.strip_prefix('$') else {
        return false;
    };
    let mut chars = rest.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Length in bytes of the identifier following a `$` at the start of `text`.
pub(crate) fn identifier_len(text: &str) -> usize {
    let mut len = 0;
    for (i, c) in text.char_indices() {
        let ok = if i == 0 {
            c.is_ascii_alphabetic() || c == '_'
        } else {
            c.is_ascii_alphanumeric() || c == '_'
        };
        if !ok {
            break;
        }
        len = i + c.len_utf8();
    }
    len
}

/// Replaces every `$name` in `text` with the display form of its value.
///
/// Undefined variables become the empty string, or an error under
/// [`UndefinedPolicy::Error`]. A `$` not followed by an identifier is kept
/// literally.
pub fn interpolate(
    text: &str,
    vars: &VariableStore,
    policy: UndefinedPolicy,
) -> Result<String, EvalError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let len = identifier_len(after);
        if len == 0 {
            out.push('$');
            rest = after;
            continue;
        }
        let name = &rest[pos..pos + 1 + len];
        match (vars.get(name), policy) {
            (Some(value), _) => out.push_str(&value.to_string()),
            (None, UndefinedPolicy::Empty) => {}
            (None, UndefinedPolicy::Error) => {
                return Err(EvalError::UndefinedVariable(name.to_string()))
            }
        }
        rest = &after[len..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_overwrites_any_type() {
        let mut vars = VariableStore::new();
        vars.set("$x", Value::Int(1));
        vars.set("$x", Value::from("text"));
        assert_eq!(vars.get("$x").map(|v| v.to_string()), Some("text".to_string()));
        assert_eq!(vars.len(), 1);
    }

    #[test]
    fn names_are_case_sensitive() {
        let mut vars = VariableStore::new();
        vars.set("$a", Value::Int(1));
        assert!(vars.contains("$a"));
        assert!(!vars.contains("$A"));
    }

    #[test]
    fn variable_name_validation() {
        assert!(is_variable_name("$x"));
        assert!(is_variable_name("$_count2"));
        assert!(!is_variable_name("$"));
        assert!(!is_variable_name("$2x"));
        assert!(!is_variable_name("x"));
        assert!(!is_variable_name("$a-b"));
    }

    #[test]
    fn interpolation_replaces_known_and_blanks_unknown() {
        let mut vars = VariableStore::new();
        vars.set("$name", Value::from("World"));
        vars.set("$n", Value::Int(3));
        let empty = UndefinedPolicy::Empty;
        assert_eq!(interpolate("Hello $name!", &vars, empty).unwrap(), "Hello World!");
        assert_eq!(interpolate("$n items", &vars, empty).unwrap(), "3 items");
        assert_eq!(interpolate("cost: $ 5", &vars, empty).unwrap(), "cost: $ 5");
        assert_eq!(interpolate("[$missing]", &vars, empty).unwrap(), "[]");
    }

    #[test]
    fn strict_interpolation_rejects_unknown() {
        let vars = VariableStore::new();
        assert_eq!(
            interpolate("[$missing]", &vars, UndefinedPolicy::Error),
            Err(EvalError::UndefinedVariable("$missing".into()))
        );
        assert_eq!(interpolate("plain", &vars, UndefinedPolicy::Error).unwrap(), "plain");
    }

    #[test]
    fn snapshot_is_sorted() {
        let mut vars = VariableStore::new();
        vars.set("$b", Value::Int(2));
        vars.set("$a", Value::Int(1));
        let keys: Vec<_> = vars.snapshot().into_keys().collect();
        assert_eq!(keys, vec!["$a".to_string(), "$b".to_string()]);
    }
}
