//! Run session: the host-facing view of a playback.
//!
//! This module provides the [`RunSession`] type, which collects everything a
//! host needs to display while a script runs: log entries, executed commands,
//! the line about to execute, the variable watch and the run state.
//!
//! # Architecture
//!
//! The runner writes to the session from its worker thread; hosts read from it
//! or subscribe to its broadcast channel:
//!
//! - `PRINT` output and error reports become [`LogEntry`] values
//! - every executed leaf command becomes a [`CommandLog`]
//! - both logs are ring buffers of [`MAX_LOG_SIZE`] entries
//! - log entries are mirrored to `tracing` at the matching level
//! - with a log directory, entries and commands are appended to a JSON Lines
//!   file named `{name}_{timestamp}.jsonl`
//!
//! Sending events never blocks; subscribers that lag lose the oldest events.
//!
//! # Example
//!
//! ```
//! use macroplay_core::session::{LogLevel, RunSession, RunEvent};
//!
//! let session = RunSession::new("demo", None);
//! let mut rx = session.subscribe();
//! session.log(LogLevel::Info, Some("main.macro"), Some(3), "hello");
//!
//! match rx.try_recv().unwrap() {
//!     RunEvent::Log(entry) => assert_eq!(entry.message, "hello"),
//!     other => panic!("unexpected event {:?}", other),
//! }
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::command::CommandLog;
use crate::value::Value;

/// Maximum number of entries kept in each ring buffer.
pub const MAX_LOG_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Info => "INFO",
            LogLevel::Success => "SUCCESS",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// One message in the run log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => {
                write!(f, "[{}] {}:{}: {}", self.level, file, line, self.message)
            }
            (None, Some(line)) => write!(f, "[{}] line {}: {}", self.level, line, self.message),
            _ => write!(f, "[{}] {}", self.level, self.message),
        }
    }
}

/// Lifecycle of a playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Created but not yet started.
    Idle,
    Running,
    /// Sleeping inside `WAIT`.
    Suspended,
    /// Cancelled by the host.
    Stopped,
    Completed,
    /// Aborted by a fatal error.
    Failed,
}

impl RunState {
    pub fn is_finished(self) -> bool {
        matches!(self, RunState::Stopped | RunState::Completed | RunState::Failed)
    }
}

/// Events broadcast to subscribers while a script runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RunEvent {
    /// Sent before each statement executes.
    LineStarted { file: String, line: usize },

    Log(LogEntry),

    CommandExecuted(CommandLog),

    /// Sorted snapshot of every variable after an assignment.
    VariablesChanged(BTreeMap<String, Value>),

    StateChanged(RunState),
}

/// Shared state of one playback.
///
/// Created via [`RunSession::new`], which returns an `Arc<RunSession>` for
/// sharing between the worker and the host.
pub struct RunSession {
    pub id: Uuid,

    pub created_at: DateTime<Utc>,

    /// Name used for the persistent log file.
    pub name: String,

    log: RwLock<VecDeque<LogEntry>>,

    commands: RwLock<VecDeque<CommandLog>>,

    variables: RwLock<BTreeMap<String, Value>>,

    state: RwLock<RunState>,

    current_line: RwLock<Option<(String, usize)>>,

    event_tx: broadcast::Sender<RunEvent>,

    log_writer: Mutex<Option<BufWriter<std::fs::File>>>,
}

fn push_bounded<T>(buffer: &RwLock<VecDeque<T>>, item: T) {
    if let Ok(mut buffer) = buffer.write() {
        if buffer.len() >= MAX_LOG_SIZE {
            buffer.pop_front();
        }
        buffer.push_back(item);
    }
}

impl RunSession {
    /// Creates a session.
    ///
    /// With `log_dir`, events are also persisted to
    /// `{log_dir}/{name}_{timestamp}.jsonl`. A log file that cannot be
    /// created is skipped with a warning.
    pub fn new(name: &str, log_dir: Option<&Path>) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(256);
        let created_at = Utc::now();

        let log_writer = log_dir.and_then(|dir| {
            let timestamp = created_at.format("%Y%m%d_%H%M%S");
            let path = dir.join(format!("{}_{}.jsonl", name, timestamp));
            let file = std::fs::create_dir_all(dir).and_then(|_| std::fs::File::create(&path));
            match file {
                Ok(file) => Some(BufWriter::new(file)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot create run log");
                    None
                }
            }
        });

        Arc::new(Self {
            id: Uuid::new_v4(),
            created_at,
            name: name.to_string(),
            log: RwLock::new(VecDeque::with_capacity(64)),
            commands: RwLock::new(VecDeque::with_capacity(64)),
            variables: RwLock::new(BTreeMap::new()),
            state: RwLock::new(RunState::Idle),
            current_line: RwLock::new(None),
            event_tx,
            log_writer: Mutex::new(log_writer),
        })
    }

    /// Subscribes to [`RunEvent`]s.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.event_tx.subscribe()
    }

    fn persist(&self, event: &RunEvent) {
        let Ok(mut guard) = self.log_writer.lock() else {
            return;
        };
        if let Some(writer) = guard.as_mut() {
            if let Ok(json) = serde_json::to_string(event) {
                let _ = writeln!(writer, "{}", json);
                let _ = writer.flush();
            }
        }
    }

    fn send(&self, event: RunEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    /// Adds a log entry, mirrors it to `tracing` and broadcasts it.
    pub fn log(
        &self,
        level: LogLevel,
        file: Option<&str>,
        line: Option<usize>,
        message: impl Into<String>,
    ) -> LogEntry {
        let entry = LogEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            level,
            file: file.map(str::to_string),
            line,
            message: message.into(),
        };

        match level {
            LogLevel::Info | LogLevel::Success => {
                info!(file = ?entry.file, line = ?entry.line, "{}", entry.message)
            }
            LogLevel::Warning => warn!(file = ?entry.file, line = ?entry.line, "{}", entry.message),
            LogLevel::Error => error!(file = ?entry.file, line = ?entry.line, "{}", entry.message),
        }

        push_bounded(&self.log, entry.clone());
        let event = RunEvent::Log(entry.clone());
        self.persist(&event);
        self.send(event);
        entry
    }

    /// Records an executed command.
    pub fn log_command(&self, log: CommandLog) {
        push_bounded(&self.commands, log.clone());
        let event = RunEvent::CommandExecuted(log);
        self.persist(&event);
        self.send(event);
    }

    /// Marks the statement about to execute.
    pub fn line_started(&self, file: &str, line: usize) {
        if let Ok(mut current) = self.current_line.write() {
            *current = Some((file.to_string(), line));
        }
        self.send(RunEvent::LineStarted {
            file: file.to_string(),
            line,
        });
    }

    /// Replaces the variable watch snapshot.
    pub fn set_variables(&self, snapshot: BTreeMap<String, Value>) {
        if let Ok(mut vars) = self.variables.write() {
            *vars = snapshot.clone();
        }
        self.send(RunEvent::VariablesChanged(snapshot));
    }

    /// Sets the run state, broadcasting only actual transitions.
    pub fn set_state(&self, state: RunState) {
        let changed = match self.state.write() {
            Ok(mut current) if *current != state => {
                *current = state;
                true
            }
            _ => false,
        };
        if changed {
            let event = RunEvent::StateChanged(state);
            self.persist(&event);
            self.send(event);
        }
    }

    pub fn state(&self) -> RunState {
        self.state.read().map(|s| *s).unwrap_or(RunState::Failed)
    }

    /// All retained log entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.log
            .read()
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All retained command logs, oldest first.
    pub fn commands(&self) -> Vec<CommandLog> {
        self.commands
            .read()
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn variables(&self) -> BTreeMap<String, Value> {
        self.variables
            .read()
            .map(|vars| vars.clone())
            .unwrap_or_default()
    }

    /// File and line of the statement executing now, if any.
    pub fn current_line(&self) -> Option<(String, usize)> {
        self.current_line.read().ok().and_then(|c| c.clone())
    }

    /// Messages of retained entries at `level`, oldest first.
    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e.level == level)
            .map(|e| e.message)
            .collect()
    }
}

impl fmt::Debug for RunSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunSession")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("log", &"<RwLock<VecDeque<LogEntry>>>")
            .field("commands", &"<RwLock<VecDeque<CommandLog>>>")
            .field("event_tx", &"<broadcast::Sender>")
            .field("log_writer", &"<Mutex<Option<BufWriter<File>>>>")
            .finish()
    }
}
