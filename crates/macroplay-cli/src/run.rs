//! `run`: plays a script against the simulated backend and streams the run
//! log to the terminal.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use macroplay_core::backend::SimulatedBackend;
use macroplay_core::config::MacroConfig;
use macroplay_core::player::Player;
use macroplay_core::runner::RunOutcome;
use macroplay_core::session::{LogEntry, LogLevel, RunEvent, RunSession};
use tracing::{debug, info};

use crate::error::CliError;

/// Prints run-log entries once each, in the order they were logged.
///
/// Events can be missed before the subscription exists or when the
/// receiver lags; the session's own log fills those gaps.
struct LogPrinter {
    session: Arc<RunSession>,
    printed: HashSet<String>,
}

impl LogPrinter {
    fn new(session: Arc<RunSession>) -> Self {
        Self {
            session,
            printed: HashSet::new(),
        }
    }

    /// Prints every unprinted entry up to and including `upto`.
    fn print_through(&mut self, upto: Option<&LogEntry>) {
        for entry in self.session.entries() {
            let id = entry.id.to_string();
            let reached = upto.is_some_and(|u| u.id == entry.id);
            if self.printed.insert(id) {
                print_entry(&entry);
            }
            if reached {
                break;
            }
        }
    }
}

fn print_entry(entry: &LogEntry) {
    match entry.level {
        LogLevel::Info | LogLevel::Success => println!("{}", entry.message),
        LogLevel::Warning | LogLevel::Error => eprintln!("{}", entry),
    }
}

/// Plays `script` to the end, or until Ctrl+C.
pub async fn run(
    script: &Path,
    config: MacroConfig,
    windows: &[String],
) -> Result<RunOutcome, CliError> {
    let backend = windows
        .iter()
        .fold(SimulatedBackend::new(), |b, title| b.with_window(title));
    let player = Player::new(config, Arc::new(backend));
    let handle = player.play_file(script)?;
    let session = handle.session().clone();
    let mut events = session.subscribe();

    let control = handle.control().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, stopping playback");
            control.cancel();
        }
    });

    let mut printer = LogPrinter::new(session.clone());
    let wait = handle.wait();
    tokio::pin!(wait);
    let outcome = loop {
        tokio::select! {
            outcome = &mut wait => break outcome,
            event = events.recv() => match event {
                Ok(RunEvent::Log(entry)) => printer.print_through(Some(&entry)),
                Ok(RunEvent::LineStarted { file, line }) => debug!(%file, line, "line"),
                Ok(_) => {}
                Err(e) => debug!(error = %e, "event stream interrupted"),
            },
        }
    };
    printer.print_through(None);

    match &outcome {
        RunOutcome::Completed => info!("completed"),
        RunOutcome::Stopped => eprintln!("Stopped."),
        RunOutcome::Failed(e) => debug!(error = %e, "run failed"),
    }
    Ok(outcome)
}
