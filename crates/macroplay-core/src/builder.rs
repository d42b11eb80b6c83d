//! Builds a block-structured [`Script`] from tokenized statements.
//!
//! The builder scans statements in order and keeps an explicit stack of
//! open blocks. Structural mistakes are reported as
//! [`MacroError::Parse`] naming the offending line and what was expected;
//! a script that fails here never starts running.

use tracing::debug;

use crate::ast::{Block, Branch, Node, NodeKind, Script};
use crate::command::LEAF_COMMANDS;
use crate::error::MacroError;
use crate::parser::{tokenize, AliasTable, Statement};
use crate::variables::is_variable_name;

/// Deepest allowed block nesting.
pub const MAX_NESTING: usize = 256;

enum FrameKind {
    If {
        branches: Vec<Branch>,
        /// Line and condition of the arm being collected; `None` inside ELSE.
        pending: Option<(usize, String)>,
        else_line: Option<usize>,
    },
    Loop {
        count: String,
    },
    While {
        condition: String,
    },
    Repeat,
    Try {
        body: Option<Block>,
        catch_line: Option<usize>,
    },
}

struct Frame {
    line: usize,
    kind: FrameKind,
    nodes: Vec<Node>,
}

impl Frame {
    fn opener(&self) -> &'static str {
        match self.kind {
            FrameKind::If { .. } => "IF",
            FrameKind::Loop { .. } => "LOOP",
            FrameKind::While { .. } => "WHILE",
            FrameKind::Repeat => "REPEAT",
            FrameKind::Try { .. } => "TRY",
        }
    }

    fn closer(&self) -> &'static str {
        match self.kind {
            FrameKind::If { .. } => "ENDIF",
            FrameKind::Loop { .. } => "ENDLOOP",
            FrameKind::While { .. } => "ENDWHILE",
            FrameKind::Repeat => "UNTIL",
            FrameKind::Try { .. } => "ENDTRY",
        }
    }

    fn is_loop(&self) -> bool {
        matches!(
            self.kind,
            FrameKind::Loop { .. } | FrameKind::While { .. } | FrameKind::Repeat
        )
    }
}

/// The opener a closing or middle keyword belongs to.
fn opener_of(keyword: &str) -> &'static str {
    match keyword {
        "ELSEIF" | "ELSE" | "ENDIF" => "IF",
        "ENDLOOP" => "LOOP",
        "ENDWHILE" => "WHILE",
        "UNTIL" => "REPEAT",
        _ => "TRY",
    }
}

struct Builder<'a> {
    file: &'a str,
    root: Vec<Node>,
    stack: Vec<Frame>,
}

impl<'a> Builder<'a> {
    fn error(&self, line: usize, message: impl Into<String>) -> MacroError {
        MacroError::parse(self.file, line, message)
    }

    fn push_node(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some(frame) => frame.nodes.push(node),
            None => self.root.push(node),
        }
    }

    fn open(&mut self, stmt: &Statement, kind: FrameKind) -> Result<(), MacroError> {
        if self.stack.len() >= MAX_NESTING {
            return Err(self.error(
                stmt.line,
                format!("blocks nested deeper than {} levels", MAX_NESTING),
            ));
        }
        self.stack.push(Frame {
            line: stmt.line,
            kind,
            nodes: Vec::new(),
        });
        Ok(())
    }

    /// Checks that the innermost frame is the one `keyword` belongs to.
    fn expect_top(&self, stmt: &Statement) -> Result<(), MacroError> {
        let keyword = stmt.command.as_str();
        let wanted = opener_of(keyword);
        match self.stack.last() {
            None => Err(self.error(
                stmt.line,
                format!("{} without matching {}", keyword, wanted),
            )),
            Some(frame) if frame.opener() != wanted => Err(self.error(
                stmt.line,
                format!(
                    "{} does not match {} opened at line {} (expected {})",
                    keyword,
                    frame.opener(),
                    frame.line,
                    frame.closer()
                ),
            )),
            Some(_) => Ok(()),
        }
    }

    fn condition(&self, stmt: &Statement) -> Result<String, MacroError> {
        let text = stmt.source_from(0);
        if text.is_empty() {
            return Err(self.error(
                stmt.line,
                format!("{} requires a condition", stmt.command),
            ));
        }
        Ok(text.to_string())
    }

    /// The innermost frame, which must belong to `stmt`'s keyword.
    fn top(&mut self, stmt: &Statement) -> Result<&mut Frame, MacroError> {
        self.expect_top(stmt)?;
        let file = self.file;
        self.stack
            .last_mut()
            .ok_or_else(|| MacroError::parse(file, stmt.line, "no open block"))
    }

    /// Pops the innermost frame, which must belong to `stmt`'s keyword.
    fn close(&mut self, stmt: &Statement) -> Result<Frame, MacroError> {
        self.expect_top(stmt)?;
        let file = self.file;
        self.stack
            .pop()
            .ok_or_else(|| MacroError::parse(file, stmt.line, "no open block"))
    }

    fn statement(&mut self, stmt: &Statement) -> Result<(), MacroError> {
        let line = stmt.line;
        match stmt.command.as_str() {
            name if name.starts_with('$') => {
                let node = self.assignment(stmt)?;
                self.push_node(node);
            }
            "IF" => {
                let condition = self.condition(stmt)?;
                self.open(
                    stmt,
                    FrameKind::If {
                        branches: Vec::new(),
                        pending: Some((line, condition)),
                        else_line: None,
                    },
                )?;
            }
            "ELSEIF" => {
                self.expect_top(stmt)?;
                let condition = self.condition(stmt)?;
                let file = self.file;
                let frame = self.top(stmt)?;
                if let FrameKind::If { branches, pending, else_line } = &mut frame.kind {
                    if let Some(else_at) = else_line {
                        return Err(MacroError::parse(
                            file,
                            line,
                            format!("ELSEIF after ELSE at line {}", else_at),
                        ));
                    }
                    if let Some((at, cond)) = pending.take() {
                        branches.push(Branch {
                            line: at,
                            condition: cond,
                            body: Block::new(std::mem::take(&mut frame.nodes)),
                        });
                    }
                    *pending = Some((line, condition));
                }
            }
            "ELSE" => {
                let file = self.file;
                let frame = self.top(stmt)?;
                if let FrameKind::If { branches, pending, else_line } = &mut frame.kind {
                    if let Some(else_at) = else_line {
                        return Err(MacroError::parse(
                            file,
                            line,
                            format!("duplicate ELSE (first ELSE at line {})", else_at),
                        ));
                    }
                    if let Some((at, cond)) = pending.take() {
                        branches.push(Branch {
                            line: at,
                            condition: cond,
                            body: Block::new(std::mem::take(&mut frame.nodes)),
                        });
                    }
                    *else_line = Some(line);
                }
            }
            "ENDIF" => {
                let frame = self.close(stmt)?;
                if let FrameKind::If { mut branches, pending, .. } = frame.kind {
                    let mut else_body = None;
                    match pending {
                        Some((at, condition)) => branches.push(Branch {
                            line: at,
                            condition,
                            body: Block::new(frame.nodes),
                        }),
                        None => else_body = Some(Block::new(frame.nodes)),
                    }
                    self.push_node(Node::new(frame.line, NodeKind::If { branches, else_body }));
                }
            }
            "LOOP" => {
                let count = match stmt.source_from(0) {
                    "" => "1".to_string(),
                    text => text.to_string(),
                };
                self.open(stmt, FrameKind::Loop { count })?;
            }
            "ENDLOOP" => {
                let frame = self.close(stmt)?;
                if let FrameKind::Loop { count } = frame.kind {
                    let body = Block::new(frame.nodes);
                    self.push_node(Node::new(frame.line, NodeKind::Loop { count, body }));
                }
            }
            "WHILE" => {
                let condition = self.condition(stmt)?;
                self.open(stmt, FrameKind::While { condition })?;
            }
            "ENDWHILE" => {
                let frame = self.close(stmt)?;
                if let FrameKind::While { condition } = frame.kind {
                    let body = Block::new(frame.nodes);
                    self.push_node(Node::new(frame.line, NodeKind::While { condition, body }));
                }
            }
            "REPEAT" => self.open(stmt, FrameKind::Repeat)?,
            "UNTIL" => {
                self.expect_top(stmt)?;
                let condition = self.condition(stmt)?;
                let frame = self.close(stmt)?;
                let body = Block::new(frame.nodes);
                self.push_node(Node::new(
                    frame.line,
                    NodeKind::RepeatUntil {
                        body,
                        condition,
                        until_line: line,
                    },
                ));
            }
            "TRY" => self.open(
                stmt,
                FrameKind::Try {
                    body: None,
                    catch_line: None,
                },
            )?,
            "CATCH" => {
                let file = self.file;
                let frame = self.top(stmt)?;
                if let FrameKind::Try { body, catch_line } = &mut frame.kind {
                    if let Some(first) = catch_line {
                        return Err(MacroError::parse(
                            file,
                            line,
                            format!("duplicate CATCH (first CATCH at line {})", first),
                        ));
                    }
                    *body = Some(Block::new(std::mem::take(&mut frame.nodes)));
                    *catch_line = Some(line);
                }
            }
            "ENDTRY" => {
                let frame = self.close(stmt)?;
                if let FrameKind::Try { body, .. } = frame.kind {
                    let nodes = Block::new(frame.nodes);
                    let (body, catch) = match body {
                        Some(body) => (body, Some(nodes)),
                        None => (nodes, None),
                    };
                    self.push_node(Node::new(frame.line, NodeKind::TryCatch { body, catch }));
                }
            }
            "CALL" => {
                if stmt.args.is_empty() {
                    return Err(self.error(line, "CALL requires a file path"));
                }
                let path = stmt.args.join(" ");
                self.push_node(Node::new(line, NodeKind::Call { path }));
            }
            "RETURN" => self.push_node(Node::new(line, NodeKind::Return)),
            "EXIT" => self.push_node(Node::new(line, NodeKind::Exit)),
            "BREAK" | "CONTINUE" => {
                if !self.stack.iter().any(Frame::is_loop) {
                    return Err(self.error(line, format!("{} outside loop", stmt.command)));
                }
                let kind = if stmt.command == "BREAK" {
                    NodeKind::Break
                } else {
                    NodeKind::Continue
                };
                self.push_node(Node::new(line, kind));
            }
            name if LEAF_COMMANDS.contains(&name) => {
                self.push_node(Node::new(
                    line,
                    NodeKind::Simple {
                        command: stmt.command.clone(),
                        args: stmt.args.clone(),
                    },
                ));
            }
            other => return Err(self.error(line, format!("unknown command {}", other))),
        }
        Ok(())
    }

    fn assignment(&self, stmt: &Statement) -> Result<Node, MacroError> {
        let name = &stmt.command;
        if stmt.args.first().map(String::as_str) != Some("=") {
            return Err(self.error(
                stmt.line,
                format!("expected `=` after {}", name),
            ));
        }
        if !is_variable_name(name) {
            return Err(self.error(stmt.line, format!("invalid variable name {}", name)));
        }
        let expr = stmt.source_from(1);
        if expr.is_empty() {
            return Err(self.error(
                stmt.line,
                format!("missing expression after `{} =`", name),
            ));
        }
        Ok(Node::new(
            stmt.line,
            NodeKind::Assignment {
                name: name.clone(),
                expr: expr.to_string(),
            },
        ))
    }

    fn finish(mut self) -> Result<Block, MacroError> {
        if let Some(frame) = self.stack.pop() {
            return Err(self.error(
                frame.line,
                format!(
                    "{} opened at line {} is never closed (expected {})",
                    frame.opener(),
                    frame.line,
                    frame.closer()
                ),
            ));
        }
        Ok(Block::new(self.root))
    }
}

/// Nests a flat statement list into a [`Script`].
pub fn build(statements: &[Statement], file: &str) -> Result<Script, MacroError> {
    let mut builder = Builder {
        file,
        root: Vec::new(),
        stack: Vec::new(),
    };
    for stmt in statements {
        builder.statement(stmt)?;
    }
    let body = builder.finish()?;
    debug!(file, nodes = body.len(), "built script");
    Ok(Script {
        file: file.to_string(),
        body,
    })
}

/// Tokenizes and builds a script in one step.
pub fn parse_script(source: &str, file: &str, aliases: &AliasTable) -> Result<Script, MacroError> {
    let statements = tokenize(source, file, aliases)?;
    build(&statements, file)
}
