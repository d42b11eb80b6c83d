//! Line tokenizer for macro scripts.
//!
//! Each physical line becomes at most one [`Statement`]:
//!
//! - an unescaped `#` outside double quotes starts a comment that runs to
//!   the end of the line (`\#` is a literal `#`)
//! - arguments are split on whitespace; a double-quoted section is part of
//!   one argument with the quotes removed, so `"hello world"` is a single
//!   argument and `""` is an empty one
//! - the command name is upper-cased and passed through the [`AliasTable`]
//!
//! Blank and comment-only lines produce nothing, but line numbers always
//! refer to the true source line.

use std::collections::HashMap;

use crate::command::is_known_command;
use crate::error::MacroError;

/// One tokenized source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// 1-based source line.
    pub line: usize,
    /// The line with its comment and trailing whitespace removed.
    pub raw: String,
    /// Upper-cased, alias-resolved command name. Variable names used as
    /// assignment targets keep their case.
    pub command: String,
    pub args: Vec<String>,
    /// Byte offset of each argument within `raw`.
    offsets: Vec<usize>,
}

impl Statement {
    /// The raw source text starting at argument `index`, quotes included.
    ///
    /// Used to re-read expressions verbatim. Returns an empty string when
    /// there is no such argument.
    pub fn source_from(&self, index: usize) -> &str {
        match self.offsets.get(index) {
            Some(&offset) => self.raw[offset..].trim(),
            None => "",
        }
    }
}

/// Maps alias command names to canonical command names.
///
/// Aliases resolve at most one hop. An alias whose target is not a known
/// command is ignored, so the literal name is kept.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    aliases: HashMap<String, String>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from `alias -> canonical` pairs, upper-casing both.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let aliases = pairs
            .into_iter()
            .map(|(k, v)| {
                (
                    k.as_ref().trim().to_ascii_uppercase(),
                    v.as_ref().trim().to_ascii_uppercase(),
                )
            })
            .collect();
        Self { aliases }
    }

    pub fn insert(&mut self, alias: &str, canonical: &str) {
        self.aliases
            .insert(alias.to_ascii_uppercase(), canonical.to_ascii_uppercase());
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Resolves an upper-case command name.
    pub fn resolve(&self, name: &str) -> String {
        match self.aliases.get(name) {
            Some(canonical) if is_known_command(canonical) => canonical.clone(),
            _ => name.to_string(),
        }
    }
}

struct Token {
    text: String,
    offset: usize,
}

/// Splits one line into tokens, stopping at a comment.
///
/// Returns the comment-free text and its tokens.
fn split_line(line: &str) -> Result<(&str, Vec<Token>), String> {
    let mut tokens = Vec::new();
    let mut current: Option<Token> = None;
    let mut in_quote = false;
    let mut quote_start = 0;
    let mut end = line.len();
    let mut chars = line.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if in_quote {
            if c == '"' {
                in_quote = false;
            } else if let Some(tok) = current.as_mut() {
                tok.text.push(c);
            }
            continue;
        }
        match c {
            '#' => {
                end = i;
                break;
            }
            '"' => {
                in_quote = true;
                quote_start = i;
                current.get_or_insert(Token {
                    text: String::new(),
                    offset: i,
                });
            }
            '\\' if matches!(chars.peek(), Some((_, '#'))) => {
                chars.next();
                current
                    .get_or_insert(Token {
                        text: String::new(),
                        offset: i,
                    })
                    .text
                    .push('#');
            }
            c if c.is_whitespace() => {
                if let Some(tok) = current.take() {
                    tokens.push(tok);
                }
            }
            c => {
                current
                    .get_or_insert(Token {
                        text: String::new(),
                        offset: i,
                    })
                    .text
                    .push(c);
            }
        }
    }

    if in_quote {
        return Err(format!(
            "unterminated quote starting at column {}",
            line[..quote_start].chars().count() + 1
        ));
    }
    if let Some(tok) = current.take() {
        tokens.push(tok);
    }
    Ok((line[..end].trim_end(), tokens))
}

/// Tokenizes a whole script.
///
/// `file` names the source in error messages.
pub fn tokenize(source: &str, file: &str, aliases: &AliasTable) -> Result<Vec<Statement>, MacroError> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    let mut statements = Vec::new();

    for (index, line) in source.lines().enumerate() {
        let line_no = index + 1;
        let (raw, tokens) =
            split_line(line).map_err(|message| MacroError::parse(file, line_no, message))?;
        let mut tokens = tokens.into_iter();
        let Some(first) = tokens.next() else {
            continue;
        };

        let command = if first.text.starts_with('$') {
            first.text
        } else {
            aliases.resolve(&first.text.to_ascii_uppercase())
        };
        let (args, offsets) = tokens.map(|t| (t.text, t.offset)).unzip();

        statements.push(Statement {
            line: line_no,
            raw: raw.to_string(),
            command,
            args,
            offsets,
        });
    }

    Ok(statements)
}
