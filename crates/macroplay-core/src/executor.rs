//! Command execution against a [`CommandBackend`].
//!
//! The [`CommandExecutor`] turns one validated [`Command`] into backend
//! primitives: clicks become move, press, hold and release; key combos are
//! pressed in order and released in reverse; `WAIT` is a chunked,
//! cancellable sleep. Backend failures come back as a failed
//! [`ExecutionResult`]; only cancellation interrupts execution.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use macroplay_core::backend::SimulatedBackend;
//! use macroplay_core::command::Command;
//! use macroplay_core::control::RunControl;
//! use macroplay_core::executor::CommandExecutor;
//!
//! let backend = Arc::new(SimulatedBackend::new());
//! let executor = CommandExecutor::new(backend.clone(), RunControl::default());
//! let result = executor.execute(&Command::Type { text: "hi".into() }).unwrap();
//! assert!(result.success);
//! assert_eq!(backend.typed_text(), "hi");
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use tracing::{debug, debug_span};

use crate::backend::{BackendError, CommandBackend};
use crate::command::{Command, Point};
use crate::control::{Cancelled, RunControl};
use crate::keys::Key;

/// Result of executing a command.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    /// Human-readable description of the result. For `PRINT`, the message.
    pub message: String,
    /// Cursor position read by `MOUSE_GET_POS`.
    pub position: Option<(i32, i32)>,
}

impl ExecutionResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            position: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            position: None,
        }
    }

    pub fn with_position(mut self, x: i32, y: i32) -> Self {
        self.position = Some((x, y));
        self
    }
}

/// Why a command stopped early.
enum Interrupt {
    Backend(BackendError),
    Cancelled,
}

impl From<BackendError> for Interrupt {
    fn from(e: BackendError) -> Self {
        Interrupt::Backend(e)
    }
}

impl From<Cancelled> for Interrupt {
    fn from(_: Cancelled) -> Self {
        Interrupt::Cancelled
    }
}

/// Executes leaf commands.
pub struct CommandExecutor {
    backend: Arc<dyn CommandBackend>,
    control: RunControl,
    mousewait_ms: u64,
    keywait_ms: u64,
    screenshot_dir: PathBuf,
}

impl CommandExecutor {
    pub fn new(backend: Arc<dyn CommandBackend>, control: RunControl) -> Self {
        Self {
            backend,
            control,
            mousewait_ms: 50,
            keywait_ms: 30,
            screenshot_dir: PathBuf::from("screenshots"),
        }
    }

    /// Sets the press-to-release hold times.
    pub fn with_hold_times(mut self, mousewait_ms: u64, keywait_ms: u64) -> Self {
        self.mousewait_ms = mousewait_ms;
        self.keywait_ms = keywait_ms;
        self
    }

    /// Directory for `SCREENSHOT` without a path.
    pub fn with_screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = dir.into();
        self
    }

    pub fn control(&self) -> &RunControl {
        &self.control
    }

    /// Executes a command.
    ///
    /// Returns `Err(Cancelled)` only when the run was cancelled mid-command.
    /// Anything held down is released first.
    pub fn execute(&self, command: &Command) -> Result<ExecutionResult, Cancelled> {
        let span = debug_span!("command", name = command.name());
        let _enter = span.enter();
        match self.dispatch(command) {
            Ok(result) => Ok(result),
            Err(Interrupt::Cancelled) => Err(Cancelled),
            Err(Interrupt::Backend(e)) => {
                debug!(error = %e, "command failed");
                Ok(ExecutionResult::failure(format!("{}: {}", command.name(), e)))
            }
        }
    }

    fn dispatch(&self, command: &Command) -> Result<ExecutionResult, Interrupt> {
        let name = command.name();
        match command {
            Command::MouseMove { to } => {
                self.backend.mouse_move(to.x, to.y)?;
            }
            Command::MouseClick { button, at } => {
                self.move_to(*at)?;
                self.backend.mouse_down(*button)?;
                self.hold_then(self.mousewait_ms, || self.backend.mouse_up(*button))?;
            }
            Command::MouseDown { button, at } => {
                self.move_to(*at)?;
                self.backend.mouse_down(*button)?;
            }
            Command::MouseUp { button, at } => {
                self.move_to(*at)?;
                self.backend.mouse_up(*button)?;
            }
            Command::Wheel { at, amount } => {
                self.move_to(*at)?;
                self.backend.wheel(*amount)?;
            }
            Command::MouseGetPos { .. } => {
                let (x, y) = self.backend.mouse_position()?;
                return Ok(ExecutionResult::success(format!("cursor at ({}, {})", x, y))
                    .with_position(x, y));
            }
            Command::KeyPress { key } => {
                self.backend.key_down(*key)?;
                self.hold_then(self.keywait_ms, || self.backend.key_up(*key))?;
            }
            Command::KeyDown { key } => self.backend.key_down(*key)?,
            Command::KeyUp { key } => self.backend.key_up(*key)?,
            Command::KeysPress { keys } => {
                self.press_all(keys)?;
                self.hold_then(self.keywait_ms, || self.release_all(keys))?;
            }
            Command::KeysDown { keys } => self.press_all(keys)?,
            Command::KeysUp { keys } => self.release_all(keys)?,
            Command::Type { text } => self.backend.type_text(text)?,
            Command::Wait { ms } => self.control.sleep_ms(*ms)?,
            Command::Print { message } => return Ok(ExecutionResult::success(message.clone())),
            Command::ClipboardSet { text } => self.backend.clipboard_set(text)?,
            Command::Screenshot { path } => {
                let path = match path {
                    Some(p) => PathBuf::from(p),
                    None => self
                        .screenshot_dir
                        .join(Local::now().format("%Y%m%d_%H%M%S.png").to_string()),
                };
                self.backend.screenshot(&path)?;
                return Ok(ExecutionResult::success(format!("saved {}", path.display())));
            }
            Command::WindowFocus { title } => self.backend.window_focus(title)?,
            Command::WindowMove { title, x, y } => self.backend.window_move(title, *x, *y)?,
            Command::WindowResize {
                title,
                width,
                height,
            } => self.backend.window_resize(title, *width, *height)?,
            Command::WindowClose { title } => self.backend.window_close(title)?,
        }
        Ok(ExecutionResult::success(name))
    }

    fn move_to(&self, at: Option<Point>) -> Result<(), BackendError> {
        match at {
            Some(p) => self.backend.mouse_move(p.x, p.y),
            None => Ok(()),
        }
    }

    /// Holds for `ms`, then runs `release` even if the hold was cancelled.
    fn hold_then(
        &self,
        ms: u64,
        release: impl FnOnce() -> Result<(), BackendError>,
    ) -> Result<(), Interrupt> {
        let held = self.control.sleep_ms(ms as f64);
        release()?;
        held?;
        Ok(())
    }

    fn press_all(&self, keys: &[Key]) -> Result<(), BackendError> {
        keys.iter().try_for_each(|k| self.backend.key_down(*k))
    }

    fn release_all(&self, keys: &[Key]) -> Result<(), BackendError> {
        keys.iter().rev().try_for_each(|k| self.backend.key_up(*k))
    }
}

impl std::fmt::Debug for CommandExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandExecutor")
            .field("mousewait_ms", &self.mousewait_ms)
            .field("keywait_ms", &self.keywait_ms)
            .field("screenshot_dir", &self.screenshot_dir)
            .finish_non_exhaustive()
    }
}
