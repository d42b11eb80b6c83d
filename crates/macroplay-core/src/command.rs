//! Leaf commands and their execution log.
//!
//! A [`Command`] is a leaf statement after variable substitution and argument
//! validation. Control keywords (`IF`, `LOOP`, `CALL`, ...) never become
//! commands; they are structural nodes in the [`ast`](crate::ast).
//!
//! # Command table
//!
//! - **Mouse**: `MOUSE_POS`, `MOUSE_{LEFT,RIGHT,MIDDLE}_{CLICK,DOWN,UP}`,
//!   `WHEEL`, `MOUSE_GET_POS`
//! - **Keyboard**: `KEY`, `KEY_DOWN`, `KEY_UP`, `KEYS`, `KEYS_DOWN`,
//!   `KEYS_UP`, `TYPE`
//! - **Timing and output**: `WAIT`, `PRINT`
//! - **Desktop**: `CLIPBOARD_SET`, `SCREENSHOT`, `WINDOW_FOCUS`,
//!   `WINDOW_MOVE`, `WINDOW_RESIZE`, `WINDOW_CLOSE`
//!
//! # Example
//!
//! ```
//! use macroplay_core::command::Command;
//!
//! let cmd = Command::parse("MOUSE_LEFT_CLICK", &["100".into(), "200".into()]).unwrap();
//! assert_eq!(cmd.name(), "MOUSE_LEFT_CLICK");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::keys::{parse_combo, Key, MouseButton};
use crate::value::parse_number;

/// Structural keywords handled by the AST builder.
pub const CONTROL_KEYWORDS: &[&str] = &[
    "IF", "ELSEIF", "ELSE", "ENDIF", "LOOP", "ENDLOOP", "WHILE", "ENDWHILE", "REPEAT", "UNTIL",
    "TRY", "CATCH", "ENDTRY", "CALL", "RETURN", "EXIT", "BREAK", "CONTINUE",
];

/// Leaf command names.
pub const LEAF_COMMANDS: &[&str] = &[
    "MOUSE_POS",
    "MOUSE_LEFT_CLICK",
    "MOUSE_RIGHT_CLICK",
    "MOUSE_MIDDLE_CLICK",
    "MOUSE_LEFT_DOWN",
    "MOUSE_RIGHT_DOWN",
    "MOUSE_MIDDLE_DOWN",
    "MOUSE_LEFT_UP",
    "MOUSE_RIGHT_UP",
    "MOUSE_MIDDLE_UP",
    "WHEEL",
    "MOUSE_GET_POS",
    "KEY",
    "KEY_DOWN",
    "KEY_UP",
    "KEYS",
    "KEYS_DOWN",
    "KEYS_UP",
    "TYPE",
    "WAIT",
    "PRINT",
    "CLIPBOARD_SET",
    "SCREENSHOT",
    "WINDOW_FOCUS",
    "WINDOW_MOVE",
    "WINDOW_RESIZE",
    "WINDOW_CLOSE",
];

/// Returns true for any name the language understands, structural or leaf.
pub fn is_known_command(name: &str) -> bool {
    CONTROL_KEYWORDS.contains(&name) || LEAF_COMMANDS.contains(&name)
}

/// A screen coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// A validated leaf command ready for execution.
///
/// Commands are serialized with a `type` tag so they can be written to the
/// JSON Lines run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    /// Move the cursor.
    MouseMove { to: Point },

    /// Press and release a button, optionally moving first.
    MouseClick {
        button: MouseButton,
        at: Option<Point>,
    },

    MouseDown {
        button: MouseButton,
        at: Option<Point>,
    },

    MouseUp {
        button: MouseButton,
        at: Option<Point>,
    },

    /// Scroll the wheel by `amount` notches, optionally moving first.
    Wheel { at: Option<Point>, amount: i32 },

    /// Store the cursor position into variables.
    MouseGetPos {
        x_var: Option<String>,
        y_var: Option<String>,
    },

    /// Press and release a single key.
    KeyPress { key: Key },

    KeyDown { key: Key },

    KeyUp { key: Key },

    /// Press every key of a combo, then release them in reverse order.
    KeysPress { keys: Vec<Key> },

    KeysDown { keys: Vec<Key> },

    /// Release every key of a combo in reverse order.
    KeysUp { keys: Vec<Key> },

    /// Type literal text.
    Type { text: String },

    /// Sleep, scaled by playback speed.
    Wait { ms: f64 },

    /// Write a message to the run log.
    Print { message: String },

    ClipboardSet { text: String },

    /// Capture the screen. Without a path a timestamped file under
    /// `screenshots/` is used.
    Screenshot { path: Option<String> },

    WindowFocus { title: String },

    WindowMove { title: String, x: i32, y: i32 },

    WindowResize {
        title: String,
        width: i32,
        height: i32,
    },

    WindowClose { title: String },
}

fn int_arg(name: &str, what: &str, raw: &str) -> Result<i32, String> {
    let n = parse_number(raw)
        .ok_or_else(|| format!("{}: {} must be a number, got `{}`", name, what, raw))?;
    let f = n.as_f64();
    if f < i32::MIN as f64 || f > i32::MAX as f64 {
        return Err(format!("{}: {} out of range: {}", name, what, raw));
    }
    Ok(f as i32)
}

fn point_args(name: &str, x: &str, y: &str) -> Result<Point, String> {
    Ok(Point {
        x: int_arg(name, "x", x)?,
        y: int_arg(name, "y", y)?,
    })
}

fn optional_point(name: &str, args: &[String]) -> Result<Option<Point>, String> {
    match args {
        [] => Ok(None),
        [x, y] => point_args(name, x, y).map(Some),
        _ => Err(format!("{}: expected no arguments or `x y`", name)),
    }
}

fn single_key(name: &str, args: &[String]) -> Result<Key, String> {
    let raw = args
        .first()
        .ok_or_else(|| format!("{}: missing key name", name))?;
    Key::parse(raw).ok_or_else(|| format!("{}: unknown key `{}`", name, raw))
}

fn combo(name: &str, args: &[String]) -> Result<Vec<Key>, String> {
    let raw = args
        .first()
        .ok_or_else(|| format!("{}: missing key combo", name))?;
    parse_combo(raw).map_err(|bad| format!("{}: unknown key `{}` in `{}`", name, bad, raw))
}

fn joined(name: &str, args: &[String], what: &str) -> Result<String, String> {
    if args.is_empty() {
        return Err(format!("{}: missing {}", name, what));
    }
    Ok(args.join(" "))
}

fn button_of(name: &str) -> Option<MouseButton> {
    let rest = name.strip_prefix("MOUSE_")?;
    let (button, _) = rest.split_once('_')?;
    MouseButton::parse(button)
}

impl Command {
    /// Builds a command from its upper-case name and substituted arguments.
    ///
    /// Returns a human-readable message when the arguments are malformed or
    /// the name is not a leaf command.
    pub fn parse(name: &str, args: &[String]) -> Result<Command, String> {
        let cmd = match name {
            "MOUSE_POS" => match args {
                [x, y] => Command::MouseMove {
                    to: point_args(name, x, y)?,
                },
                _ => return Err("MOUSE_POS: expected `x y`".to_string()),
            },
            "MOUSE_LEFT_CLICK" | "MOUSE_RIGHT_CLICK" | "MOUSE_MIDDLE_CLICK" => Command::MouseClick {
                button: button_of(name).ok_or_else(|| format!("unknown command {}", name))?,
                at: optional_point(name, args)?,
            },
            "MOUSE_LEFT_DOWN" | "MOUSE_RIGHT_DOWN" | "MOUSE_MIDDLE_DOWN" => Command::MouseDown {
                button: button_of(name).ok_or_else(|| format!("unknown command {}", name))?,
                at: optional_point(name, args)?,
            },
            "MOUSE_LEFT_UP" | "MOUSE_RIGHT_UP" | "MOUSE_MIDDLE_UP" => Command::MouseUp {
                button: button_of(name).ok_or_else(|| format!("unknown command {}", name))?,
                at: optional_point(name, args)?,
            },
            "WHEEL" => match args {
                [amount] => Command::Wheel {
                    at: None,
                    amount: int_arg(name, "amount", amount)?,
                },
                [x, y, amount] => Command::Wheel {
                    at: Some(point_args(name, x, y)?),
                    amount: int_arg(name, "amount", amount)?,
                },
                _ => return Err("WHEEL: expected `amount` or `x y amount`".to_string()),
            },
            "MOUSE_GET_POS" => Command::MouseGetPos {
                x_var: args.first().cloned(),
                y_var: args.get(1).cloned(),
            },
            "KEY" => Command::KeyPress {
                key: single_key(name, args)?,
            },
            "KEY_DOWN" => Command::KeyDown {
                key: single_key(name, args)?,
            },
            "KEY_UP" => Command::KeyUp {
                key: single_key(name, args)?,
            },
            "KEYS" => Command::KeysPress {
                keys: combo(name, args)?,
            },
            "KEYS_DOWN" => Command::KeysDown {
                keys: combo(name, args)?,
            },
            "KEYS_UP" => Command::KeysUp {
                keys: combo(name, args)?,
            },
            "TYPE" => Command::Type {
                text: args.join(" "),
            },
            "WAIT" => {
                let raw = args.first().ok_or("WAIT: missing duration in ms")?;
                let ms = parse_number(raw)
                    .map(|n| n.as_f64())
                    .ok_or_else(|| format!("WAIT: duration must be a number, got `{}`", raw))?;
                if ms < 0.0 {
                    return Err(format!("WAIT: duration must not be negative, got `{}`", raw));
                }
                Command::Wait { ms }
            }
            "PRINT" => Command::Print {
                message: args.join(" "),
            },
            "CLIPBOARD_SET" => Command::ClipboardSet {
                text: args.join(" "),
            },
            "SCREENSHOT" => Command::Screenshot {
                path: (!args.is_empty()).then(|| args.join(" ")),
            },
            "WINDOW_FOCUS" => Command::WindowFocus {
                title: joined(name, args, "window title")?,
            },
            "WINDOW_CLOSE" => Command::WindowClose {
                title: joined(name, args, "window title")?,
            },
            "WINDOW_MOVE" => match args {
                [title, x, y] => Command::WindowMove {
                    title: title.clone(),
                    x: int_arg(name, "x", x)?,
                    y: int_arg(name, "y", y)?,
                },
                _ => return Err("WINDOW_MOVE: expected `title x y`".to_string()),
            },
            "WINDOW_RESIZE" => match args {
                [title, w, h] => Command::WindowResize {
                    title: title.clone(),
                    width: int_arg(name, "width", w)?,
                    height: int_arg(name, "height", h)?,
                },
                _ => return Err("WINDOW_RESIZE: expected `title width height`".to_string()),
            },
            other => return Err(format!("unknown command {}", other)),
        };
        Ok(cmd)
    }

    /// The script-level name of this command.
    pub fn name(&self) -> &'static str {
        match self {
            Command::MouseMove { .. } => "MOUSE_POS",
            Command::MouseClick { button, .. } => match button {
                MouseButton::Left => "MOUSE_LEFT_CLICK",
                MouseButton::Right => "MOUSE_RIGHT_CLICK",
                MouseButton::Middle => "MOUSE_MIDDLE_CLICK",
            },
            Command::MouseDown { button, .. } => match button {
                MouseButton::Left => "MOUSE_LEFT_DOWN",
                MouseButton::Right => "MOUSE_RIGHT_DOWN",
                MouseButton::Middle => "MOUSE_MIDDLE_DOWN",
            },
            Command::MouseUp { button, .. } => match button {
                MouseButton::Left => "MOUSE_LEFT_UP",
                MouseButton::Right => "MOUSE_RIGHT_UP",
                MouseButton::Middle => "MOUSE_MIDDLE_UP",
            },
            Command::Wheel { .. } => "WHEEL",
            Command::MouseGetPos { .. } => "MOUSE_GET_POS",
            Command::KeyPress { .. } => "KEY",
            Command::KeyDown { .. } => "KEY_DOWN",
            Command::KeyUp { .. } => "KEY_UP",
            Command::KeysPress { .. } => "KEYS",
            Command::KeysDown { .. } => "KEYS_DOWN",
            Command::KeysUp { .. } => "KEYS_UP",
            Command::Type { .. } => "TYPE",
            Command::Wait { .. } => "WAIT",
            Command::Print { .. } => "PRINT",
            Command::ClipboardSet { .. } => "CLIPBOARD_SET",
            Command::Screenshot { .. } => "SCREENSHOT",
            Command::WindowFocus { .. } => "WINDOW_FOCUS",
            Command::WindowMove { .. } => "WINDOW_MOVE",
            Command::WindowResize { .. } => "WINDOW_RESIZE",
            Command::WindowClose { .. } => "WINDOW_CLOSE",
        }
    }
}

/// The result of executing a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandResult {
    Success,
    Failure(String),
}

/// A log entry recording one executed command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandLog {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Script file the command came from.
    pub file: String,
    pub line: usize,
    pub command: Command,
    pub result: CommandResult,
    /// Wall-clock time spent executing the command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl CommandLog {
    pub fn new(
        file: impl Into<String>,
        line: usize,
        command: Command,
        result: CommandResult,
        duration_ms: Option<u64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            file: file.into(),
            line,
            command,
            result,
            duration_ms,
        }
    }
}
