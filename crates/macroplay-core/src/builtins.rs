//! Builtin functions available inside expressions.
//!
//! | builtin | arguments | result |
//! |---------|-----------|--------|
//! | `IMAGE_MATCH` | `template [threshold t] [region x y w h]` | bool |
//! | `PIXEL_COLOR` | `x y r g b [tolerance]` | bool |
//! | `WINDOW_EXISTS` | `title...` | bool |
//! | `FILE_EXISTS` | `path...` | bool |
//! | `GET_PIXEL_COLOR` | `x y` | `"r g b"` |
//! | `CLIPBOARD_GET` | none | string |
//! | `RANDOM` | `min max` | int in `min..=max` |
//! | `GET_TIME` | none | seconds since the Unix epoch |

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{CommandBackend, Region, Rgb};
use crate::error::EvalError;
use crate::value::{parse_number, Number, Value};

/// Default confidence an `IMAGE_MATCH` needs to succeed.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.80;

/// Default per-channel tolerance for `PIXEL_COLOR`.
pub const DEFAULT_COLOR_TOLERANCE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Builtin {
    ImageMatch,
    PixelColor,
    WindowExists,
    FileExists,
    GetPixelColor,
    ClipboardGet,
    Random,
    GetTime,
}

impl Builtin {
    pub const ALL: [Builtin; 8] = [
        Builtin::ImageMatch,
        Builtin::PixelColor,
        Builtin::WindowExists,
        Builtin::FileExists,
        Builtin::GetPixelColor,
        Builtin::ClipboardGet,
        Builtin::Random,
        Builtin::GetTime,
    ];

    /// Looks up an upper-case builtin name.
    pub fn from_name(name: &str) -> Option<Builtin> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::ImageMatch => "IMAGE_MATCH",
            Builtin::PixelColor => "PIXEL_COLOR",
            Builtin::WindowExists => "WINDOW_EXISTS",
            Builtin::FileExists => "FILE_EXISTS",
            Builtin::GetPixelColor => "GET_PIXEL_COLOR",
            Builtin::ClipboardGet => "CLIPBOARD_GET",
            Builtin::Random => "RANDOM",
            Builtin::GetTime => "GET_TIME",
        }
    }

    /// Fixed argument count, or `None` for builtins that take words.
    pub fn arity(self) -> Option<usize> {
        match self {
            Builtin::GetTime | Builtin::ClipboardGet => Some(0),
            Builtin::Random | Builtin::GetPixelColor => Some(2),
            Builtin::ImageMatch
            | Builtin::PixelColor
            | Builtin::WindowExists
            | Builtin::FileExists => None,
        }
    }
}

/// Evaluates builtins against a [`CommandBackend`].
#[derive(Clone)]
pub struct BuiltinEvaluator {
    backend: Arc<dyn CommandBackend>,
    templates_dir: PathBuf,
}

impl std::fmt::Debug for BuiltinEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinEvaluator")
            .field("templates_dir", &self.templates_dir)
            .finish_non_exhaustive()
    }
}

fn fail(builtin: Builtin, message: impl Into<String>) -> EvalError {
    EvalError::Builtin {
        name: builtin.name(),
        message: message.into(),
    }
}

fn int(builtin: Builtin, what: &str, raw: &str) -> Result<i64, EvalError> {
    match parse_number(raw) {
        Some(Number::Int(i)) => Ok(i),
        Some(Number::Float(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
        _ => Err(fail(builtin, format!("{} must be an integer, got `{}`", what, raw))),
    }
}

fn coordinate(builtin: Builtin, what: &str, raw: &str) -> Result<i32, EvalError> {
    let n = int(builtin, what, raw)?;
    i32::try_from(n).map_err(|_| fail(builtin, format!("{} out of range: {}", what, raw)))
}

fn channel(builtin: Builtin, what: &str, raw: &str) -> Result<u8, EvalError> {
    let n = int(builtin, what, raw)?;
    u8::try_from(n).map_err(|_| fail(builtin, format!("{} must be 0-255, got {}", what, raw)))
}

impl BuiltinEvaluator {
    /// `templates_dir` resolves relative `IMAGE_MATCH` template paths.
    pub fn new(backend: Arc<dyn CommandBackend>, templates_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            templates_dir: templates_dir.into(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn CommandBackend> {
        &self.backend
    }

    /// Calls `builtin` with already-substituted argument text.
    pub fn call(&self, builtin: Builtin, args: &[String]) -> Result<Value, EvalError> {
        debug!(builtin = builtin.name(), ?args, "builtin");
        if let Some(arity) = builtin.arity() {
            if args.len() != arity {
                return Err(fail(
                    builtin,
                    format!("expected {} arguments, got {}", arity, args.len()),
                ));
            }
        }
        match builtin {
            Builtin::GetTime => {
                let micros = Utc::now().timestamp_micros();
                Ok(Value::Float(micros as f64 / 1_000_000.0))
            }
            Builtin::Random => {
                let low = int(builtin, "min", &args[0])?;
                let high = int(builtin, "max", &args[1])?;
                if low > high {
                    return Err(fail(builtin, format!("empty range {}..={}", low, high)));
                }
                Ok(Value::Int(rand::thread_rng().gen_range(low..=high)))
            }
            Builtin::ClipboardGet => Ok(Value::Str(self.backend.clipboard_get()?)),
            Builtin::GetPixelColor => {
                let x = coordinate(builtin, "x", &args[0])?;
                let y = coordinate(builtin, "y", &args[1])?;
                let c = self.backend.pixel_color(x, y)?;
                Ok(Value::Str(format!("{} {} {}", c.r, c.g, c.b)))
            }
            Builtin::PixelColor => self.pixel_color(args).map(Value::Bool),
            Builtin::ImageMatch => self.image_match(args).map(Value::Bool),
            Builtin::WindowExists => {
                if args.is_empty() {
                    return Err(fail(builtin, "missing window title"));
                }
                Ok(Value::Bool(self.backend.window_exists(&args.join(" "))?))
            }
            Builtin::FileExists => {
                if args.is_empty() {
                    return Err(fail(builtin, "missing path"));
                }
                let path = args.join(" ");
                Ok(Value::Bool(self.backend.file_exists(Path::new(&path))?))
            }
        }
    }

    fn pixel_color(&self, args: &[String]) -> Result<bool, EvalError> {
        let b = Builtin::PixelColor;
        if !(5..=6).contains(&args.len()) {
            return Err(fail(b, "expected `x y r g b [tolerance]`"));
        }
        let x = coordinate(b, "x", &args[0])?;
        let y = coordinate(b, "y", &args[1])?;
        let expected = Rgb::new(
            channel(b, "r", &args[2])?,
            channel(b, "g", &args[3])?,
            channel(b, "b", &args[4])?,
        );
        let tolerance = match args.get(5) {
            Some(raw) => {
                let t = int(b, "tolerance", raw)?;
                u32::try_from(t).map_err(|_| fail(b, format!("tolerance must not be negative, got {}", raw)))?
            }
            None => DEFAULT_COLOR_TOLERANCE,
        };
        let actual = self.backend.pixel_color(x, y)?;
        Ok(actual.within(expected, tolerance))
    }

    fn image_match(&self, args: &[String]) -> Result<bool, EvalError> {
        let b = Builtin::ImageMatch;
        let (template, options) = args
            .split_first()
            .ok_or_else(|| fail(b, "missing template path"))?;

        let mut threshold = DEFAULT_MATCH_THRESHOLD;
        let mut region = None;
        let mut rest = options;
        while let Some((option, tail)) = rest.split_first() {
            match option.to_ascii_lowercase().as_str() {
                "threshold" => {
                    let raw = tail
                        .first()
                        .ok_or_else(|| fail(b, "threshold needs a value"))?;
                    threshold = parse_number(raw)
                        .map(Number::as_f64)
                        .filter(|t| (0.0..=1.0).contains(t))
                        .ok_or_else(|| {
                            fail(b, format!("threshold must be between 0 and 1, got `{}`", raw))
                        })?;
                    rest = &tail[1..];
                }
                "region" => {
                    if tail.len() < 4 {
                        return Err(fail(b, "region needs `x y width height`"));
                    }
                    let width = int(b, "width", &tail[2])?;
                    let height = int(b, "height", &tail[3])?;
                    if width <= 0 || height <= 0 {
                        return Err(fail(b, format!("region size must be positive, got {}x{}", width, height)));
                    }
                    region = Some(Region {
                        x: coordinate(b, "x", &tail[0])?,
                        y: coordinate(b, "y", &tail[1])?,
                        width: u32::try_from(width).map_err(|_| fail(b, "region width out of range"))?,
                        height: u32::try_from(height).map_err(|_| fail(b, "region height out of range"))?,
                    });
                    rest = &tail[4..];
                }
                other => return Err(fail(b, format!("unknown option `{}`", other))),
            }
        }

        let path = self.resolve_template(template);
        let score = self.backend.image_match(&path, region)?;
        debug!(template = %path.display(), score, threshold, "image match score");
        Ok(score >= threshold)
    }

    fn resolve_template(&self, template: &str) -> PathBuf {
        let path = Path::new(template);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.templates_dir.join(path)
        }
    }
}
