//! Shared test helpers for macroplay-core integration tests.
//!
//! This module provides a programmable backend that records every primitive
//! it receives, temporary script directories, and a one-call runner.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use macroplay_core::backend::{BackendError, CommandBackend, Region, Rgb};
use macroplay_core::config::MacroConfig;
use macroplay_core::control::RunControl;
use macroplay_core::keys::{Key, MouseButton};
use macroplay_core::runner::{RunOutcome, Runner};
use macroplay_core::session::RunSession;

// ---------------------------------------------------------------------------
// Unique names
// ---------------------------------------------------------------------------

/// Generate a unique name for test isolation.
///
/// Uses a UUID prefix to avoid collisions between concurrent test runs.
pub fn unique_name() -> String {
    format!(
        "test_{}",
        uuid::Uuid::new_v4().to_string().replace('-', "")[..8].to_string()
    )
}

// ---------------------------------------------------------------------------
// Temporary script directories
// ---------------------------------------------------------------------------

/// A temporary directory of script files, removed on drop.
pub struct ScriptDir {
    pub path: PathBuf,
}

impl ScriptDir {
    pub fn new() -> Self {
        let path = std::env::temp_dir().join(format!("macroplay_{}", unique_name()));
        std::fs::create_dir_all(&path).unwrap();
        Self { path }
    }

    /// Writes `contents` to `name` (subdirectories allowed) and returns the
    /// full path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let file = self.path.join(name);
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&file, contents).unwrap();
        file
    }
}

impl Drop for ScriptDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

// ---------------------------------------------------------------------------
// Programmable mock backend
// ---------------------------------------------------------------------------

/// How the mock answers one kind of primitive.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Fail with `BackendError::NotFound`.
    NotFound(String),
    /// Fail with `BackendError::Failed`.
    Fail(String),
    /// Fail with `BackendError::Unsupported`.
    Unsupported,
}

impl MockBehavior {
    fn into_error(self, op: &str) -> BackendError {
        match self {
            MockBehavior::NotFound(what) => BackendError::NotFound(what),
            MockBehavior::Fail(message) => BackendError::Failed(message),
            MockBehavior::Unsupported => BackendError::Unsupported(op.to_string()),
        }
    }
}

#[derive(Default)]
struct MockState {
    calls: Vec<String>,
    behaviors: HashMap<String, MockBehavior>,
    cursor: (i32, i32),
    windows: HashSet<String>,
    pixels: HashMap<(i32, i32), Rgb>,
    match_scores: HashMap<PathBuf, f64>,
    clipboard: String,
}

/// A backend whose answers are scripted per operation and whose calls are
/// recorded as readable strings such as `"mouse_down LEFT"`.
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call of `op` (e.g. `"window_focus"`) fail as described.
    pub fn with_behavior(self, op: &str, behavior: MockBehavior) -> Self {
        self.state
            .lock()
            .unwrap()
            .behaviors
            .insert(op.to_string(), behavior);
        self
    }

    pub fn with_window(self, title: &str) -> Self {
        self.state.lock().unwrap().windows.insert(title.to_string());
        self
    }

    pub fn with_pixel(self, x: i32, y: i32, color: Rgb) -> Self {
        self.state.lock().unwrap().pixels.insert((x, y), color);
        self
    }

    pub fn with_match_score(self, template: impl Into<PathBuf>, score: f64) -> Self {
        self.state
            .lock()
            .unwrap()
            .match_scores
            .insert(template.into(), score);
        self
    }

    /// Every recorded call, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Recorded calls starting with `prefix`.
    pub fn calls_matching(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    fn record<T>(
        &self,
        op: &str,
        detail: String,
        f: impl FnOnce(&mut MockState) -> T,
    ) -> Result<T, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(if detail.is_empty() {
            op.to_string()
        } else {
            format!("{} {}", op, detail)
        });
        if let Some(behavior) = state.behaviors.get(op).cloned() {
            return Err(behavior.into_error(op));
        }
        Ok(f(&mut state))
    }
}

fn key_name(key: Key) -> String {
    key.to_string().to_lowercase()
}

impl CommandBackend for MockBackend {
    fn mouse_move(&self, x: i32, y: i32) -> Result<(), BackendError> {
        self.record("mouse_move", format!("{} {}", x, y), |s| s.cursor = (x, y))
    }

    fn mouse_position(&self) -> Result<(i32, i32), BackendError> {
        self.record("mouse_position", String::new(), |s| s.cursor)
    }

    fn mouse_down(&self, button: MouseButton) -> Result<(), BackendError> {
        self.record("mouse_down", button.name().to_string(), |_| ())
    }

    fn mouse_up(&self, button: MouseButton) -> Result<(), BackendError> {
        self.record("mouse_up", button.name().to_string(), |_| ())
    }

    fn wheel(&self, amount: i32) -> Result<(), BackendError> {
        self.record("wheel", amount.to_string(), |_| ())
    }

    fn key_down(&self, key: Key) -> Result<(), BackendError> {
        self.record("key_down", key_name(key), |_| ())
    }

    fn key_up(&self, key: Key) -> Result<(), BackendError> {
        self.record("key_up", key_name(key), |_| ())
    }

    fn type_text(&self, text: &str) -> Result<(), BackendError> {
        self.record("type_text", text.to_string(), |_| ())
    }

    fn window_focus(&self, title: &str) -> Result<(), BackendError> {
        self.record("window_focus", title.to_string(), |s| s.windows.contains(title))
            .and_then(|found| {
                found
                    .then_some(())
                    .ok_or_else(|| BackendError::NotFound(format!("window {:?}", title)))
            })
    }

    fn window_move(&self, title: &str, x: i32, y: i32) -> Result<(), BackendError> {
        self.record("window_move", format!("{} {} {}", title, x, y), |_| ())
    }

    fn window_resize(&self, title: &str, width: i32, height: i32) -> Result<(), BackendError> {
        self.record("window_resize", format!("{} {} {}", title, width, height), |_| ())
    }

    fn window_close(&self, title: &str) -> Result<(), BackendError> {
        self.record("window_close", title.to_string(), |s| {
            s.windows.remove(title);
        })
    }

    fn window_exists(&self, title: &str) -> Result<bool, BackendError> {
        self.record("window_exists", title.to_string(), |s| s.windows.contains(title))
    }

    fn pixel_color(&self, x: i32, y: i32) -> Result<Rgb, BackendError> {
        self.record("pixel_color", format!("{} {}", x, y), |s| {
            s.pixels.get(&(x, y)).copied().unwrap_or_default()
        })
    }

    fn image_match(&self, template: &Path, region: Option<Region>) -> Result<f64, BackendError> {
        let detail = match region {
            Some(r) => format!("{} {} {} {} {}", template.display(), r.x, r.y, r.width, r.height),
            None => template.display().to_string(),
        };
        self.record("image_match", detail, |s| {
            s.match_scores.get(template).copied().unwrap_or(0.0)
        })
    }

    fn clipboard_get(&self) -> Result<String, BackendError> {
        self.record("clipboard_get", String::new(), |s| s.clipboard.clone())
    }

    fn clipboard_set(&self, text: &str) -> Result<(), BackendError> {
        self.record("clipboard_set", text.to_string(), |s| s.clipboard = text.to_string())
    }

    fn screenshot(&self, path: &Path) -> Result<(), BackendError> {
        self.record("screenshot", path.display().to_string(), |_| ())
    }
}

// ---------------------------------------------------------------------------
// Running scripts
// ---------------------------------------------------------------------------

/// Config with zero hold times so tests do not sleep on clicks and keys.
pub fn fast_config() -> MacroConfig {
    MacroConfig {
        mousewait_ms: 0,
        keywait_ms: 0,
        ..MacroConfig::default()
    }
}

/// Reads, parses and runs a script file to completion.
pub fn run_file(
    path: &Path,
    config: MacroConfig,
    backend: Arc<dyn CommandBackend>,
) -> (RunOutcome, Arc<RunSession>) {
    let session = RunSession::new(&unique_name(), None);
    let mut runner = Runner::new(config, backend, session.clone(), RunControl::default());
    let source = std::fs::read_to_string(path).unwrap();
    let outcome = runner
        .run_source(&source, &path.display().to_string())
        .unwrap();
    (outcome, session)
}
