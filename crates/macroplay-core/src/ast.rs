//! Syntax tree for macro scripts.
//!
//! Trees are built once per file by the [`builder`](crate::builder) and are
//! immutable afterwards. Arguments and expressions are kept as raw source
//! text; they are evaluated each time the node executes.

use std::fmt::Write as _;

/// A parsed script file.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    /// Name used in diagnostics, usually the file path.
    pub file: String,
    pub body: Block,
}

/// An ordered sequence of nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub nodes: Vec<Node>,
}

/// A node together with the source line it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub line: usize,
    pub kind: NodeKind,
}

/// One `IF` or `ELSEIF` arm.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub line: usize,
    pub condition: String,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// A leaf command with raw arguments.
    Simple { command: String, args: Vec<String> },
    /// `$name = expr`
    Assignment { name: String, expr: String },
    /// `IF` arm first, then `ELSEIF` arms in order.
    If {
        branches: Vec<Branch>,
        else_body: Option<Block>,
    },
    Loop { count: String, body: Block },
    While { condition: String, body: Block },
    RepeatUntil {
        body: Block,
        condition: String,
        until_line: usize,
    },
    TryCatch { body: Block, catch: Option<Block> },
    Call { path: String },
    Return,
    Exit,
    Break,
    Continue,
}

impl Block {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    fn count_leaves(&self) -> usize {
        self.nodes.iter().map(Node::count_leaves).sum()
    }

    fn structurally_eq(&self, other: &Block) -> bool {
        self.nodes.len() == other.nodes.len()
            && self
                .nodes
                .iter()
                .zip(&other.nodes)
                .all(|(a, b)| a.structurally_eq(b))
    }
}

fn opt_block_eq(a: &Option<Block>, b: &Option<Block>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.structurally_eq(b),
        (None, None) => true,
        _ => false,
    }
}

impl Node {
    pub fn new(line: usize, kind: NodeKind) -> Self {
        Self { line, kind }
    }

    fn count_leaves(&self) -> usize {
        match &self.kind {
            NodeKind::Simple { .. } | NodeKind::Assignment { .. } | NodeKind::Call { .. } => 1,
            NodeKind::If { branches, else_body } => {
                branches.iter().map(|b| b.body.count_leaves()).sum::<usize>()
                    + else_body.as_ref().map_or(0, Block::count_leaves)
            }
            NodeKind::Loop { body, .. }
            | NodeKind::While { body, .. }
            | NodeKind::RepeatUntil { body, .. } => body.count_leaves(),
            NodeKind::TryCatch { body, catch } => {
                body.count_leaves() + catch.as_ref().map_or(0, Block::count_leaves)
            }
            NodeKind::Return | NodeKind::Exit | NodeKind::Break | NodeKind::Continue => 0,
        }
    }

    /// Compares two nodes ignoring line numbers.
    pub fn structurally_eq(&self, other: &Node) -> bool {
        use NodeKind::*;
        match (&self.kind, &other.kind) {
            (Simple { command: c1, args: a1 }, Simple { command: c2, args: a2 }) => c1 == c2 && a1 == a2,
            (Assignment { name: n1, expr: e1 }, Assignment { name: n2, expr: e2 }) => n1 == n2 && e1 == e2,
            (If { branches: b1, else_body: e1 }, If { branches: b2, else_body: e2 }) => {
                b1.len() == b2.len()
                    && b1.iter().zip(b2).all(|(x, y)| {
                        x.condition == y.condition && x.body.structurally_eq(&y.body)
                    })
                    && opt_block_eq(e1, e2)
            }
            (Loop { count: c1, body: b1 }, Loop { count: c2, body: b2 }) => c1 == c2 && b1.structurally_eq(b2),
            (While { condition: c1, body: b1 }, While { condition: c2, body: b2 }) => {
                c1 == c2 && b1.structurally_eq(b2)
            }
            (
                RepeatUntil { body: b1, condition: c1, .. },
                RepeatUntil { body: b2, condition: c2, .. },
            ) => c1 == c2 && b1.structurally_eq(b2),
            (TryCatch { body: b1, catch: c1 }, TryCatch { body: b2, catch: c2 }) => {
                b1.structurally_eq(b2) && opt_block_eq(c1, c2)
            }
            (Call { path: p1 }, Call { path: p2 }) => p1 == p2,
            (Return, Return) | (Exit, Exit) | (Break, Break) | (Continue, Continue) => true,
            _ => false,
        }
    }
}

impl Script {
    /// Number of executable leaves (commands, assignments and calls).
    pub fn count_leaf_commands(&self) -> usize {
        self.body.count_leaves()
    }

    /// Compares two scripts ignoring file names and line numbers.
    pub fn structurally_eq(&self, other: &Script) -> bool {
        self.body.structurally_eq(&other.body)
    }

    /// Renders the script in canonical form: upper-case keywords, four-space
    /// indentation and quotes only where an argument needs them.
    ///
    /// Parsing the output yields a structurally equal script.
    pub fn to_source(&self) -> String {
        let mut out = String::new();
        write_block(&mut out, &self.body, 0);
        out
    }
}

/// Quotes an argument when it would not survive tokenizing as-is.
fn quote_arg(arg: &str) -> String {
    let needs_quotes = arg.is_empty()
        || arg.chars().any(|c| c.is_whitespace() || c == '#')
        || arg.contains("\\#");
    if needs_quotes {
        format!("\"{}\"", arg)
    } else {
        arg.to_string()
    }
}

fn write_line(out: &mut String, depth: usize, text: &str) {
    for _ in 0..depth {
        out.push_str("    ");
    }
    out.push_str(text);
    out.push('\n');
}

fn write_block(out: &mut String, block: &Block, depth: usize) {
    for node in &block.nodes {
        write_node(out, node, depth);
    }
}

fn write_node(out: &mut String, node: &Node, depth: usize) {
    match &node.kind {
        NodeKind::Simple { command, args } => {
            let mut line = command.clone();
            for arg in args {
                let _ = write!(line, " {}", quote_arg(arg));
            }
            write_line(out, depth, &line);
        }
        NodeKind::Assignment { name, expr } => {
            write_line(out, depth, &format!("{} = {}", name, expr));
        }
        NodeKind::If { branches, else_body } => {
            for (i, branch) in branches.iter().enumerate() {
                let keyword = if i == 0 { "IF" } else { "ELSEIF" };
                write_line(out, depth, &format!("{} {}", keyword, branch.condition));
                write_block(out, &branch.body, depth + 1);
            }
            if let Some(body) = else_body {
                write_line(out, depth, "ELSE");
                write_block(out, body, depth + 1);
            }
            write_line(out, depth, "ENDIF");
        }
        NodeKind::Loop { count, body } => {
            write_line(out, depth, &format!("LOOP {}", count));
            write_block(out, body, depth + 1);
            write_line(out, depth, "ENDLOOP");
        }
        NodeKind::While { condition, body } => {
            write_line(out, depth, &format!("WHILE {}", condition));
            write_block(out, body, depth + 1);
            write_line(out, depth, "ENDWHILE");
        }
        NodeKind::RepeatUntil { body, condition, .. } => {
            write_line(out, depth, "REPEAT");
            write_block(out, body, depth + 1);
            write_line(out, depth, &format!("UNTIL {}", condition));
        }
        NodeKind::TryCatch { body, catch } => {
            write_line(out, depth, "TRY");
            write_block(out, body, depth + 1);
            if let Some(catch) = catch {
                write_line(out, depth, "CATCH");
                write_block(out, catch, depth + 1);
            }
            write_line(out, depth, "ENDTRY");
        }
        NodeKind::Call { path } => write_line(out, depth, &format!("CALL {}", quote_arg(path))),
        NodeKind::Return => write_line(out, depth, "RETURN"),
        NodeKind::Exit => write_line(out, depth, "EXIT"),
        NodeKind::Break => write_line(out, depth, "BREAK"),
        NodeKind::Continue => write_line(out, depth, "CONTINUE"),
    }
}
