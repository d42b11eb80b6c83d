use std::fmt;

use macroplay_core::error::MacroError;
use macroplay_core::player::PlayError;

#[derive(Debug)]
pub enum CliError {
    Macro(MacroError),
    AlreadyRunning,
    /// `fmt --check` found files that are not canonically formatted.
    Unformatted(Vec<String>),
    Io(std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Macro(e) => e.exit_code(),
            CliError::AlreadyRunning => 3,
            CliError::Unformatted(_) => 1,
            CliError::Io(_) => 4,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Macro(MacroError::Parse {
                file,
                line,
                message,
            }) => write!(f, "Parse error at {}:{}: {}", file, line, message),
            CliError::Macro(e) => write!(f, "Runtime error at {}", e),
            CliError::AlreadyRunning => write!(f, "a script is already running"),
            CliError::Unformatted(files) => {
                write!(f, "would reformat: {}", files.join(", "))
            }
            CliError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

impl From<MacroError> for CliError {
    fn from(e: MacroError) -> Self {
        match e {
            MacroError::Io(io) => CliError::Io(io),
            other => CliError::Macro(other),
        }
    }
}

impl From<PlayError> for CliError {
    fn from(e: PlayError) -> Self {
        match e {
            PlayError::AlreadyRunning => CliError::AlreadyRunning,
            PlayError::Macro(e) => e.into(),
        }
    }
}
