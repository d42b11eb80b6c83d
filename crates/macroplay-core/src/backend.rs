//! Command backend trait for OS-level automation primitives.
//!
//! The engine never touches the mouse, keyboard, screen or window manager
//! itself. Every side effect goes through a [`CommandBackend`], which lets a
//! host plug in a real desktop integration while tests and dry runs use the
//! in-memory [`SimulatedBackend`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use macroplay_core::backend::{CommandBackend, SimulatedBackend};
//!
//! let backend = Arc::new(SimulatedBackend::new().with_window("Notepad"));
//! backend.window_focus("Notepad").unwrap();
//! assert!(backend.window_focus("Calculator").is_err());
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::keys::{Key, MouseButton};

/// Errors reported by a [`CommandBackend`].
#[derive(Error, Debug)]
pub enum BackendError {
    /// A window, template or other resource does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The backend cannot perform this operation on this platform.
    #[error("{0} is not supported by this backend")]
    Unsupported(String),

    /// The operation was attempted and failed.
    #[error("{0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An RGB pixel color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// True if every channel differs from `other` by at most `tolerance`.
    pub fn within(&self, other: Rgb, tolerance: u32) -> bool {
        let diff = |a: u8, b: u8| u32::from(a.abs_diff(b));
        diff(self.r, other.r) <= tolerance
            && diff(self.g, other.g) <= tolerance
            && diff(self.b, other.b) <= tolerance
    }
}

/// A screen rectangle used to restrict image matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Capability interface for OS-level automation.
///
/// All methods are synchronous: the runner calls them from its dedicated
/// worker thread and blocks until they return. Implementations must be
/// `Send + Sync` so they can be shared as `Arc<dyn CommandBackend>`.
pub trait CommandBackend: Send + Sync {
    fn mouse_move(&self, x: i32, y: i32) -> Result<(), BackendError>;

    fn mouse_position(&self) -> Result<(i32, i32), BackendError>;

    fn mouse_down(&self, button: MouseButton) -> Result<(), BackendError>;

    fn mouse_up(&self, button: MouseButton) -> Result<(), BackendError>;

    /// Scroll vertically by `amount` notches; positive scrolls up.
    fn wheel(&self, amount: i32) -> Result<(), BackendError>;

    fn key_down(&self, key: Key) -> Result<(), BackendError>;

    fn key_up(&self, key: Key) -> Result<(), BackendError>;

    fn type_text(&self, text: &str) -> Result<(), BackendError>;

    /// Bring the window with exactly this title to the foreground.
    fn window_focus(&self, title: &str) -> Result<(), BackendError>;

    fn window_move(&self, title: &str, x: i32, y: i32) -> Result<(), BackendError>;

    fn window_resize(&self, title: &str, width: i32, height: i32) -> Result<(), BackendError>;

    fn window_close(&self, title: &str) -> Result<(), BackendError>;

    fn window_exists(&self, title: &str) -> Result<bool, BackendError>;

    fn pixel_color(&self, x: i32, y: i32) -> Result<Rgb, BackendError>;

    /// Best match confidence (`0.0..=1.0`) of `template` on screen.
    fn image_match(&self, template: &Path, region: Option<Region>) -> Result<f64, BackendError>;

    fn clipboard_get(&self) -> Result<String, BackendError>;

    fn clipboard_set(&self, text: &str) -> Result<(), BackendError>;

    fn screenshot(&self, path: &Path) -> Result<(), BackendError>;

    fn file_exists(&self, path: &Path) -> Result<bool, BackendError> {
        Ok(path.exists())
    }
}

/// Geometry of a simulated window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowGeometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Default)]
struct SimState {
    cursor: (i32, i32),
    buttons: BTreeSet<&'static str>,
    keys: Vec<Key>,
    typed: String,
    clipboard: String,
    windows: BTreeMap<String, WindowGeometry>,
    focused: Option<String>,
    pixels: HashMap<(i32, i32), Rgb>,
    templates: HashMap<PathBuf, f64>,
    screenshots: Vec<PathBuf>,
}

/// An in-memory backend that simulates a desktop.
///
/// It tracks a virtual cursor, pressed buttons and keys, a clipboard, a set
/// of named windows, pixel colors and template match scores. Nothing is
/// sent to the real OS; every primitive is traced at debug level. Screenshot
/// paths are recorded but no file is written. `file_exists` checks the real
/// filesystem.
#[derive(Debug, Default)]
pub struct SimulatedBackend {
    state: Mutex<SimState>,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a window with the given title.
    pub fn with_window(self, title: &str) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.windows.insert(title.to_string(), WindowGeometry::default());
        }
        self
    }

    /// Sets the color of one pixel. Unset pixels are black.
    pub fn with_pixel(self, x: i32, y: i32, color: Rgb) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.pixels.insert((x, y), color);
        }
        self
    }

    /// Makes `template` match with the given confidence.
    pub fn with_template(self, template: impl Into<PathBuf>, confidence: f64) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.templates.insert(template.into(), confidence);
        }
        self
    }

    pub fn with_clipboard(self, text: &str) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.clipboard = text.to_string();
        }
        self
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut SimState) -> Result<T, BackendError>) -> Result<T, BackendError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| BackendError::Failed("simulated backend state poisoned".to_string()))?;
        f(&mut state)
    }

    pub fn cursor(&self) -> (i32, i32) {
        self.with_state(|s| Ok(s.cursor)).unwrap_or_default()
    }

    /// All text typed so far.
    pub fn typed_text(&self) -> String {
        self.with_state(|s| Ok(s.typed.clone())).unwrap_or_default()
    }

    /// Keys currently held down, in press order.
    pub fn held_keys(&self) -> Vec<Key> {
        self.with_state(|s| Ok(s.keys.clone())).unwrap_or_default()
    }

    pub fn focused_window(&self) -> Option<String> {
        self.with_state(|s| Ok(s.focused.clone())).ok().flatten()
    }

    pub fn window_geometry(&self, title: &str) -> Option<WindowGeometry> {
        self.with_state(|s| Ok(s.windows.get(title).copied())).ok().flatten()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.with_state(|s| Ok(s.screenshots.clone())).unwrap_or_default()
    }
}

fn window<'a>(
    state: &'a mut SimState,
    title: &str,
) -> Result<&'a mut WindowGeometry, BackendError> {
    state
        .windows
        .get_mut(title)
        .ok_or_else(|| BackendError::NotFound(format!("window {:?}", title)))
}

impl CommandBackend for SimulatedBackend {
    fn mouse_move(&self, x: i32, y: i32) -> Result<(), BackendError> {
        debug!(x, y, "mouse move");
        self.with_state(|s| {
            s.cursor = (x, y);
            Ok(())
        })
    }

    fn mouse_position(&self) -> Result<(i32, i32), BackendError> {
        self.with_state(|s| Ok(s.cursor))
    }

    fn mouse_down(&self, button: MouseButton) -> Result<(), BackendError> {
        debug!(button = button.name(), "mouse down");
        self.with_state(|s| {
            s.buttons.insert(button.name());
            Ok(())
        })
    }

    fn mouse_up(&self, button: MouseButton) -> Result<(), BackendError> {
        debug!(button = button.name(), "mouse up");
        self.with_state(|s| {
            s.buttons.remove(button.name());
            Ok(())
        })
    }

    fn wheel(&self, amount: i32) -> Result<(), BackendError> {
        debug!(amount, "wheel");
        Ok(())
    }

    fn key_down(&self, key: Key) -> Result<(), BackendError> {
        debug!(%key, "key down");
        self.with_state(|s| {
            if !s.keys.contains(&key) {
                s.keys.push(key);
            }
            Ok(())
        })
    }

    fn key_up(&self, key: Key) -> Result<(), BackendError> {
        debug!(%key, "key up");
        self.with_state(|s| {
            s.keys.retain(|k| *k != key);
            Ok(())
        })
    }

    fn type_text(&self, text: &str) -> Result<(), BackendError> {
        debug!(text, "type");
        self.with_state(|s| {
            s.typed.push_str(text);
            Ok(())
        })
    }

    fn window_focus(&self, title: &str) -> Result<(), BackendError> {
        debug!(title, "window focus");
        self.with_state(|s| {
            window(s, title)?;
            s.focused = Some(title.to_string());
            Ok(())
        })
    }

    fn window_move(&self, title: &str, x: i32, y: i32) -> Result<(), BackendError> {
        debug!(title, x, y, "window move");
        self.with_state(|s| {
            let w = window(s, title)?;
            w.x = x;
            w.y = y;
            Ok(())
        })
    }

    fn window_resize(&self, title: &str, width: i32, height: i32) -> Result<(), BackendError> {
        debug!(title, width, height, "window resize");
        if width <= 0 || height <= 0 {
            return Err(BackendError::Failed(format!(
                "invalid window size {}x{}",
                width, height
            )));
        }
        self.with_state(|s| {
            let w = window(s, title)?;
            w.width = width;
            w.height = height;
            Ok(())
        })
    }

    fn window_close(&self, title: &str) -> Result<(), BackendError> {
        debug!(title, "window close");
        self.with_state(|s| {
            s.windows
                .remove(title)
                .ok_or_else(|| BackendError::NotFound(format!("window {:?}", title)))?;
            if s.focused.as_deref() == Some(title) {
                s.focused = None;
            }
            Ok(())
        })
    }

    fn window_exists(&self, title: &str) -> Result<bool, BackendError> {
        self.with_state(|s| Ok(s.windows.contains_key(title)))
    }

    fn pixel_color(&self, x: i32, y: i32) -> Result<Rgb, BackendError> {
        self.with_state(|s| Ok(s.pixels.get(&(x, y)).copied().unwrap_or_default()))
    }

    fn image_match(&self, template: &Path, region: Option<Region>) -> Result<f64, BackendError> {
        debug!(template = %template.display(), ?region, "image match");
        self.with_state(|s| {
            if let Some(score) = s.templates.get(template) {
                return Ok(*score);
            }
            if template.exists() {
                Ok(0.0)
            } else {
                Err(BackendError::NotFound(format!(
                    "template {}",
                    template.display()
                )))
            }
        })
    }

    fn clipboard_get(&self) -> Result<String, BackendError> {
        self.with_state(|s| Ok(s.clipboard.clone()))
    }

    fn clipboard_set(&self, text: &str) -> Result<(), BackendError> {
        debug!(text, "clipboard set");
        self.with_state(|s| {
            s.clipboard = text.to_string();
            Ok(())
        })
    }

    fn screenshot(&self, path: &Path) -> Result<(), BackendError> {
        debug!(path = %path.display(), "screenshot");
        self.with_state(|s| {
            s.screenshots.push(path.to_path_buf());
            Ok(())
        })
    }
}
