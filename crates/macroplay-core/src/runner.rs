//! Script execution engine.
//!
//! The [`Runner`] walks a [`Script`] tree on the calling thread. Every node
//! yields a [`Signal`]; conditions that must never be caught (cancellation,
//! the call-depth and iteration safeguards) travel on the separate [`Halt`]
//! error channel instead, so a `TRY` cannot swallow them.
//!
//! Errors raised outside any `TRY` are logged at ERROR level and execution
//! resumes at the next statement. Inside a `TRY` they unwind to it; the
//! `CATCH` body then runs at the outer `TRY` depth. The `TRY` depth is
//! dynamic, so an error in a CALLed file reaches a `TRY` around the `CALL`.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use macroplay_core::backend::SimulatedBackend;
//! use macroplay_core::config::MacroConfig;
//! use macroplay_core::control::RunControl;
//! use macroplay_core::runner::{RunOutcome, Runner};
//! use macroplay_core::session::{LogLevel, RunSession};
//!
//! let session = RunSession::new("doc", None);
//! let mut runner = Runner::new(
//!     MacroConfig::default(),
//!     Arc::new(SimulatedBackend::new()),
//!     session.clone(),
//!     RunControl::default(),
//! );
//! let outcome = runner.run_source("$x = 7 % 2\nPRINT $x", "doc.macro").unwrap();
//! assert!(matches!(outcome, RunOutcome::Completed));
//! assert_eq!(session.messages(LogLevel::Info), vec!["1"]);
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, debug_span, info, info_span, warn};

use crate::ast::{Block, Node, NodeKind, Script};
use crate::backend::CommandBackend;
use crate::builder::parse_script;
use crate::builtins::BuiltinEvaluator;
use crate::command::{Command, CommandLog, CommandResult};
use crate::config::MacroConfig;
use crate::control::RunControl;
use crate::error::MacroError;
use crate::executor::CommandExecutor;
use crate::expression::{evaluate, Scope};
use crate::parser::AliasTable;
use crate::session::{LogLevel, RunSession, RunState};
use crate::value::{Number, Value};
use crate::variables::{interpolate, is_variable_name, VariableStore};

/// Control-flow outcome of executing a node.
#[derive(Debug)]
pub enum Signal {
    None,
    Break,
    Continue,
    Return,
    Exit,
    /// A recoverable error unwinding to the nearest `TRY`.
    Error(MacroError),
}

/// Unwinding that no `TRY` may intercept.
#[derive(Debug)]
pub enum Halt {
    Cancelled,
    Fatal(MacroError),
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    Completed,
    /// Cancelled by the host.
    Stopped,
    Failed(MacroError),
}

impl RunOutcome {
    pub fn state(&self) -> RunState {
        match self {
            RunOutcome::Completed => RunState::Completed,
            RunOutcome::Stopped => RunState::Stopped,
            RunOutcome::Failed(_) => RunState::Failed,
        }
    }

    /// Process exit code used by the command-line runner.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Completed => 0,
            RunOutcome::Stopped => 1,
            RunOutcome::Failed(e) => e.exit_code(),
        }
    }
}

type Exec = Result<Signal, Halt>;

/// One level of the call stack.
#[derive(Debug)]
struct CallFrame {
    file: String,
    dir: PathBuf,
    script: Arc<Script>,
    current_line: usize,
}

fn parent_dir(file: &str) -> PathBuf {
    match Path::new(file).parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Executes scripts against a backend, reporting to a [`RunSession`].
pub struct Runner {
    config: MacroConfig,
    aliases: AliasTable,
    backend: Arc<dyn CommandBackend>,
    executor: CommandExecutor,
    builtins: BuiltinEvaluator,
    session: Arc<RunSession>,
    control: RunControl,
    vars: VariableStore,
    frames: Vec<CallFrame>,
    cache: HashMap<PathBuf, Arc<Script>>,
    try_depth: usize,
    /// File an unwinding error was raised in.
    error_file: Option<String>,
}

impl Runner {
    pub fn new(
        config: MacroConfig,
        backend: Arc<dyn CommandBackend>,
        session: Arc<RunSession>,
        control: RunControl,
    ) -> Self {
        let executor = CommandExecutor::new(backend.clone(), control.clone())
            .with_hold_times(config.mousewait_ms, config.keywait_ms);
        let builtins = BuiltinEvaluator::new(backend.clone(), config.template_root(Path::new(".")));
        Self {
            aliases: config.alias_table(),
            config,
            backend,
            executor,
            builtins,
            session,
            control,
            vars: VariableStore::new(),
            frames: Vec::new(),
            cache: HashMap::new(),
            try_depth: 0,
            error_file: None,
        }
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    pub fn variables(&self) -> &VariableStore {
        &self.vars
    }

    pub fn session(&self) -> &Arc<RunSession> {
        &self.session
    }

    /// Parses and runs script text. `file` names the script and locates
    /// relative CALL targets.
    pub fn run_source(&mut self, source: &str, file: &str) -> Result<RunOutcome, MacroError> {
        let script = parse_script(source, file, &self.aliases)?;
        Ok(self.run(Arc::new(script)))
    }

    /// Runs an already-parsed script with a fresh variable store.
    pub fn run(&mut self, script: Arc<Script>) -> RunOutcome {
        let span = info_span!("run_script", file = %script.file);
        let _enter = span.enter();

        let dir = parent_dir(&script.file);
        self.vars.clear();
        self.frames.clear();
        self.cache.clear();
        self.try_depth = 0;
        self.error_file = None;
        self.builtins = BuiltinEvaluator::new(self.backend.clone(), self.config.template_root(&dir));
        self.session.set_variables(self.vars.snapshot());
        self.session.set_state(RunState::Running);
        info!(statements = script.count_leaf_commands(), "run started");

        self.frames.push(CallFrame {
            file: script.file.clone(),
            dir,
            script: script.clone(),
            current_line: 0,
        });
        let result = self.exec_block(&script.body);
        self.frames.clear();

        let outcome = match result {
            Ok(Signal::Error(e)) => {
                self.report(LogLevel::Error, &e);
                RunOutcome::Completed
            }
            Ok(_) => RunOutcome::Completed,
            Err(Halt::Cancelled) => {
                info!("run stopped");
                RunOutcome::Stopped
            }
            Err(Halt::Fatal(e)) => {
                self.report(LogLevel::Error, &e);
                RunOutcome::Failed(e)
            }
        };
        self.session.set_state(outcome.state());
        info!(state = ?outcome.state(), "run finished");
        outcome
    }

    fn current_file(&self) -> &str {
        self.frames.last().map_or("", |f| f.file.as_str())
    }

    fn report(&self, level: LogLevel, error: &MacroError) {
        self.session
            .log(level, Some(self.current_file()), error.line(), error.detail());
    }

    fn enter_line(&mut self, line: usize) {
        if let Some(frame) = self.frames.last_mut() {
            frame.current_line = line;
        }
        self.session.line_started(self.current_file(), line);
    }

    fn eval(&self, text: &str, line: usize) -> Result<Value, MacroError> {
        let scope = Scope::new(&self.vars, self.config.undefined_variables).with_builtins(&self.builtins);
        evaluate(text, &scope).map_err(|e| MacroError::expression(line, e))
    }

    fn condition(&self, text: &str, line: usize) -> Result<bool, MacroError> {
        self.eval(text, line).map(|v| v.is_truthy())
    }

    fn exec_block(&mut self, block: &Block) -> Exec {
        for node in &block.nodes {
            if self.control.is_cancelled() {
                return Err(Halt::Cancelled);
            }
            self.enter_line(node.line);
            let signal = match self.exec_node(node)? {
                Signal::Error(e) => self.handle_error(e)?,
                other => other,
            };
            if !matches!(signal, Signal::None) {
                return Ok(signal);
            }
        }
        Ok(Signal::None)
    }

    /// Unwinds to a `TRY` when inside one; otherwise logs and continues.
    fn handle_error(&mut self, error: MacroError) -> Exec {
        if error.is_fatal() {
            return Err(Halt::Fatal(error));
        }
        if self.try_depth > 0 {
            if self.error_file.is_none() {
                self.error_file = Some(self.current_file().to_string());
            }
            return Ok(Signal::Error(error));
        }
        self.report(LogLevel::Error, &error);
        Ok(Signal::None)
    }

    fn exec_node(&mut self, node: &Node) -> Exec {
        let line = node.line;
        match &node.kind {
            NodeKind::Simple { command, args } => self.exec_simple(line, command, args),
            NodeKind::Assignment { name, expr } => match self.eval(expr, line) {
                Ok(value) => {
                    debug!(%name, %value, "assign");
                    self.vars.set(name.as_str(), value);
                    self.session.set_variables(self.vars.snapshot());
                    Ok(Signal::None)
                }
                Err(e) => Ok(Signal::Error(e)),
            },
            NodeKind::If { branches, else_body } => {
                for branch in branches {
                    match self.condition(&branch.condition, branch.line) {
                        Ok(true) => return self.exec_block(&branch.body),
                        Ok(false) => {}
                        Err(e) => return Ok(Signal::Error(e)),
                    }
                }
                match else_body {
                    Some(body) => self.exec_block(body),
                    None => Ok(Signal::None),
                }
            }
            NodeKind::Loop { count, body } => {
                let n = match self.loop_count(count, line) {
                    Ok(n) => n,
                    Err(e) => return Ok(Signal::Error(e)),
                };
                for _ in 0..n {
                    if self.control.is_cancelled() {
                        return Err(Halt::Cancelled);
                    }
                    match self.exec_block(body)? {
                        Signal::Break => break,
                        Signal::None | Signal::Continue => {}
                        other => return Ok(other),
                    }
                }
                Ok(Signal::None)
            }
            NodeKind::While { condition, body } => {
                let mut iterations = 0;
                loop {
                    match self.condition(condition, line) {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => return Ok(Signal::Error(e)),
                    }
                    self.tick(&mut iterations, line)?;
                    match self.exec_block(body)? {
                        Signal::Break => break,
                        Signal::None | Signal::Continue => {}
                        other => return Ok(other),
                    }
                }
                Ok(Signal::None)
            }
            NodeKind::RepeatUntil {
                body,
                condition,
                until_line,
            } => {
                let mut iterations = 0;
                loop {
                    self.tick(&mut iterations, line)?;
                    match self.exec_block(body)? {
                        Signal::Break => break,
                        Signal::None | Signal::Continue => {}
                        other => return Ok(other),
                    }
                    match self.condition(condition, *until_line) {
                        Ok(true) => break,
                        Ok(false) => {}
                        Err(e) => return Ok(Signal::Error(e)),
                    }
                }
                Ok(Signal::None)
            }
            NodeKind::TryCatch { body, catch } => {
                self.try_depth += 1;
                let result = self.exec_block(body);
                self.try_depth -= 1;
                match result? {
                    Signal::Error(e) => {
                        let file = self
                            .error_file
                            .take()
                            .unwrap_or_else(|| self.current_file().to_string());
                        warn!(error = %e, %file, "caught by TRY");
                        self.session
                            .log(LogLevel::Warning, Some(&file), e.line(), e.detail());
                        match catch {
                            Some(body) => self.exec_block(body),
                            None => Ok(Signal::None),
                        }
                    }
                    other => Ok(other),
                }
            }
            NodeKind::Call { path } => self.exec_call(line, path),
            NodeKind::Return => Ok(Signal::Return),
            NodeKind::Exit => Ok(Signal::Exit),
            NodeKind::Break => Ok(Signal::Break),
            NodeKind::Continue => Ok(Signal::Continue),
        }
    }

    /// Counts one WHILE or REPEAT iteration against the safeguard. LOOP is
    /// bounded by its count and only checks for cancellation.
    fn tick(&self, iterations: &mut u64, line: usize) -> Result<(), Halt> {
        if self.control.is_cancelled() {
            return Err(Halt::Cancelled);
        }
        *iterations += 1;
        if *iterations > self.config.max_iterations {
            return Err(Halt::Fatal(MacroError::IterationLimit {
                line,
                limit: self.config.max_iterations,
            }));
        }
        Ok(())
    }

    fn loop_count(&self, text: &str, line: usize) -> Result<u64, MacroError> {
        let value = self.eval(text, line)?;
        match value.as_number() {
            Some(Number::Int(n)) => Ok(n.max(0) as u64),
            Some(Number::Float(f)) if f.is_finite() => Ok(f.trunc().max(0.0) as u64),
            _ => Err(MacroError::command(
                line,
                format!("LOOP count must be a number, got `{}`", value),
            )),
        }
    }

    fn exec_simple(&mut self, line: usize, command: &str, args: &[String]) -> Exec {
        let policy = self.config.undefined_variables;
        let args = if command == "MOUSE_GET_POS" {
            if let Some(bad) = args.iter().find(|a| !is_variable_name(a)) {
                return Ok(Signal::Error(MacroError::command(
                    line,
                    format!("MOUSE_GET_POS: invalid variable name `{}`", bad),
                )));
            }
            args.to_vec()
        } else {
            let substituted: Result<Vec<String>, _> =
                args.iter().map(|a| interpolate(a, &self.vars, policy)).collect();
            match substituted {
                Ok(args) => args,
                Err(e) => return Ok(Signal::Error(MacroError::expression(line, e))),
            }
        };

        let cmd = match Command::parse(command, &args) {
            Ok(cmd) => cmd,
            Err(message) => return Ok(Signal::Error(MacroError::command(line, message))),
        };

        let waiting = matches!(cmd, Command::Wait { .. });
        if waiting {
            self.session.set_state(RunState::Suspended);
        }
        let start = Instant::now();
        let result = self.executor.execute(&cmd);
        if waiting {
            self.session.set_state(RunState::Running);
        }
        let result = result.map_err(|_| Halt::Cancelled)?;
        let elapsed = start.elapsed().as_millis() as u64;

        let status = if result.success {
            CommandResult::Success
        } else {
            CommandResult::Failure(result.message.clone())
        };
        self.session.log_command(CommandLog::new(
            self.current_file(),
            line,
            cmd.clone(),
            status,
            Some(elapsed),
        ));
        if !result.success {
            return Ok(Signal::Error(MacroError::command(line, result.message)));
        }

        match cmd {
            Command::Print { .. } => {
                self.session
                    .log(LogLevel::Info, Some(self.current_file()), Some(line), result.message);
            }
            Command::MouseGetPos { x_var, y_var } => {
                if let Some((x, y)) = result.position {
                    if let Some(name) = x_var {
                        self.vars.set(name, Value::Int(i64::from(x)));
                    }
                    if let Some(name) = y_var {
                        self.vars.set(name, Value::Int(i64::from(y)));
                    }
                    self.session.set_variables(self.vars.snapshot());
                }
            }
            other => debug!(command = other.name(), line, "executed"),
        }
        Ok(Signal::None)
    }

    /// Resolves a CALL path: absolute paths stay, relative ones join the
    /// macro root (`macros_dir`, else the entry script's directory).
    fn resolve_call_path(&self, text: &str) -> PathBuf {
        let path = Path::new(text);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        let root = match &self.config.macros_dir {
            Some(dir) => dir.clone(),
            None => self
                .frames
                .first()
                .map_or_else(|| PathBuf::from("."), |f| f.dir.clone()),
        };
        root.join(path)
    }

    /// Loads a CALL target, parsing each file at most once per run.
    fn load(&mut self, path: &Path) -> Result<Arc<Script>, String> {
        let canonical = path
            .canonicalize()
            .map_err(|_| format!("CALL target not found: {}", path.display()))?;
        if let Some(script) = self.cache.get(&canonical) {
            return Ok(script.clone());
        }
        let source = std::fs::read_to_string(&canonical)
            .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        let file = path.display().to_string();
        let script = parse_script(&source, &file, &self.aliases)
            .map_err(|e| format!("cannot parse CALL target: {}", e))?;
        let script = Arc::new(script);
        self.cache.insert(canonical, script.clone());
        Ok(script)
    }

    fn exec_call(&mut self, line: usize, raw_path: &str) -> Exec {
        let text = match interpolate(raw_path, &self.vars, self.config.undefined_variables) {
            Ok(text) => text,
            Err(e) => return Ok(Signal::Error(MacroError::expression(line, e))),
        };
        // The entry frame is not a CALL, so it does not count against the limit.
        if self.frames.len() > self.config.max_call_depth {
            return Err(Halt::Fatal(MacroError::CallDepth {
                line,
                limit: self.config.max_call_depth,
            }));
        }
        let path = self.resolve_call_path(&text);
        let script = match self.load(&path) {
            Ok(script) => script,
            Err(message) => return Ok(Signal::Error(MacroError::command(line, message))),
        };

        let span = debug_span!("call", file = %script.file, depth = self.frames.len());
        let _enter = span.enter();
        debug!("enter");
        self.frames.push(CallFrame {
            file: script.file.clone(),
            dir: parent_dir(&script.file),
            script: script.clone(),
            current_line: 0,
        });
        let result = self.exec_block(&script.body);
        self.frames.pop();
        debug!("leave");

        match result? {
            Signal::Return => Ok(Signal::None),
            other => Ok(other),
        }
    }

    /// Number of CALL frames above the entry script.
    pub fn call_depth(&self) -> usize {
        self.frames.len().saturating_sub(1)
    }

    /// File and line of every active frame, innermost last.
    pub fn call_stack(&self) -> Vec<(String, usize)> {
        self.frames
            .iter()
            .map(|f| (f.file.clone(), f.current_line))
            .collect()
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("config", &self.config)
            .field("variables", &self.vars.len())
            .field("frames", &self.frames.len())
            .field("cached_scripts", &self.cache.len())
            .field("try_depth", &self.try_depth)
            .finish_non_exhaustive()
    }
}
