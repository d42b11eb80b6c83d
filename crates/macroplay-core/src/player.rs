//! Background playback of macro scripts.
//!
//! A [`Player`] parses a script up front (a parse error means the run never
//! starts), then executes it on a dedicated blocking worker so the host stays
//! responsive. Only one script plays at a time per player.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use macroplay_core::backend::SimulatedBackend;
//! use macroplay_core::config::MacroConfig;
//! use macroplay_core::player::Player;
//!
//! #[tokio::main]
//! async fn main() {
//!     let player = Player::new(MacroConfig::load(), Arc::new(SimulatedBackend::new()));
//!     let handle = player.play_file("demo.macro".as_ref()).expect("script failed to parse");
//!
//!     // Play faster, then stop early
//!     handle.set_speed(2.0);
//!     let outcome = handle.stop().await;
//!     println!("{:?}", outcome);
//! }
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::ast::Script;
use crate::backend::CommandBackend;
use crate::builder::parse_script;
use crate::config::MacroConfig;
use crate::control::RunControl;
use crate::error::MacroError;
use crate::runner::{RunOutcome, Runner};
use crate::session::RunSession;

/// Errors that prevent a playback from starting.
#[derive(Error, Debug)]
pub enum PlayError {
    /// Another script is still playing.
    #[error("a script is already running")]
    AlreadyRunning,

    /// The script could not be read or parsed.
    #[error(transparent)]
    Macro(#[from] MacroError),
}

/// Handle for controlling a running playback.
pub struct PlaybackHandle {
    control: RunControl,
    session: Arc<RunSession>,
    join_handle: JoinHandle<RunOutcome>,
}

impl PlaybackHandle {
    /// Cancels the playback and waits for it to finish.
    pub async fn stop(self) -> RunOutcome {
        self.control.cancel();
        self.wait().await
    }

    /// Cancels the playback without waiting.
    pub fn cancel(&self) {
        self.control.cancel();
    }

    /// Waits for the playback to finish.
    pub async fn wait(self) -> RunOutcome {
        match self.join_handle.await {
            Ok(outcome) => outcome,
            Err(e) => RunOutcome::Failed(MacroError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("playback worker failed: {}", e),
            ))),
        }
    }

    /// Returns whether the playback is still running.
    pub fn is_running(&self) -> bool {
        !self.join_handle.is_finished()
    }

    /// Changes the playback speed; applies within one sleep chunk.
    pub fn set_speed(&self, speed: f64) {
        self.control.set_speed(speed);
    }

    pub fn speed(&self) -> f64 {
        self.control.speed()
    }

    pub fn session(&self) -> &Arc<RunSession> {
        &self.session
    }

    pub fn control(&self) -> &RunControl {
        &self.control
    }
}

impl std::fmt::Debug for PlaybackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackHandle")
            .field("session", &self.session.id)
            .field("speed", &self.speed())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Clears the active flag when the worker finishes, even by panic.
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Starts playbacks, one at a time.
pub struct Player {
    config: MacroConfig,
    backend: Arc<dyn CommandBackend>,
    active: Arc<AtomicBool>,
}

impl Player {
    pub fn new(config: MacroConfig, backend: Arc<dyn CommandBackend>) -> Self {
        Self {
            config,
            backend,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &MacroConfig {
        &self.config
    }

    /// Returns whether a playback started by this player is still running.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Reads, parses and plays a script file.
    pub fn play_file(&self, path: &Path) -> Result<PlaybackHandle, PlayError> {
        let source = std::fs::read_to_string(path).map_err(MacroError::from)?;
        self.play_source(&source, &path.display().to_string())
    }

    /// Parses and plays script text.
    pub fn play_source(&self, source: &str, file: &str) -> Result<PlaybackHandle, PlayError> {
        let script = parse_script(source, file, &self.config.alias_table())?;
        self.play(script)
    }

    /// Plays a parsed script on a blocking worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn play(&self, script: Script) -> Result<PlaybackHandle, PlayError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PlayError::AlreadyRunning);
        }
        let guard = ActiveGuard(self.active.clone());

        let name = Path::new(&script.file)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("macro")
            .to_string();
        let session = RunSession::new(&name, self.config.log_dir.as_deref());
        let control = RunControl::new(self.config.playback_speed);
        let mut runner = Runner::new(
            self.config.clone(),
            self.backend.clone(),
            session.clone(),
            control.clone(),
        );
        info!(file = %script.file, speed = control.speed(), "starting playback");

        let script = Arc::new(script);
        let join_handle = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let outcome = runner.run(script);
            debug!(?outcome, "playback worker finished");
            outcome
        });

        Ok(PlaybackHandle {
            control,
            session,
            join_handle,
        })
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("config", &self.config)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimulatedBackend;
    use crate::session::{LogLevel, RunState};
    use std::time::{Duration, Instant};

    fn player() -> Player {
        Player::new(MacroConfig::default(), Arc::new(SimulatedBackend::new()))
    }

    #[tokio::test]
    async fn plays_to_completion() {
        let player = player();
        let handle = player.play_source("PRINT hello\nWAIT 1", "hello.macro").unwrap();
        let session = handle.session().clone();
        let outcome = handle.wait().await;
        assert!(matches!(outcome, RunOutcome::Completed));
        assert_eq!(session.messages(LogLevel::Info), vec!["hello"]);
        assert_eq!(session.name, "hello");
        assert!(!player.is_active());
    }

    #[tokio::test]
    async fn parse_error_never_starts() {
        let player = player();
        let err = player.play_source("LOOP 2\nPRINT x", "bad.macro").unwrap_err();
        assert!(matches!(err, PlayError::Macro(MacroError::Parse { line: 1, .. })));
        assert!(!player.is_active());
    }

    #[tokio::test]
    async fn refuses_concurrent_runs() {
        let player = player();
        let first = player.play_source("WAIT 10000", "long.macro").unwrap();
        assert!(matches!(
            player.play_source("PRINT x", "other.macro"),
            Err(PlayError::AlreadyRunning)
        ));
        assert!(matches!(first.stop().await, RunOutcome::Stopped));
        assert!(!player.is_active());
        let second = player.play_source("PRINT x", "other.macro").unwrap();
        assert!(matches!(second.wait().await, RunOutcome::Completed));
    }

    #[tokio::test]
    async fn stop_during_wait_returns_quickly() {
        let player = player();
        let handle = player.play_source("WAIT 10000\nPRINT never", "wait.macro").unwrap();
        let session = handle.session().clone();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(session.state(), RunState::Suspended);

        let start = Instant::now();
        let outcome = handle.stop().await;
        assert!(start.elapsed() < Duration::from_millis(500));
        assert!(matches!(outcome, RunOutcome::Stopped));
        assert_eq!(session.state(), RunState::Stopped);
        assert!(session.messages(LogLevel::Info).is_empty());
    }

    #[tokio::test]
    async fn speed_change_applies_mid_wait() {
        let player = player();
        let handle = player.play_source("WAIT 5000", "fast.macro").unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        let start = Instant::now();
        handle.set_speed(1000.0);
        assert!(matches!(handle.wait().await, RunOutcome::Completed));
        assert!(start.elapsed() < Duration::from_millis(1000));
    }
}
