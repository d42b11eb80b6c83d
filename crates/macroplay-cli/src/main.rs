mod error;
mod format;
mod run;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use macroplay_core::config::{macroplay_dir, MacroConfig};
use macroplay_core::variables::UndefinedPolicy;

#[derive(Parser)]
#[command(name = "macroplay", version, about = "Desktop-automation macro runner")]
struct Cli {
    /// Config file (defaults to ~/.macroplay/config.json)
    #[arg(long, global = true, env = "MACROPLAY_CONFIG")]
    config: Option<PathBuf>,

    /// Also write diagnostics to ~/.macroplay/logs/macroplay.log
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Play a macro script against the simulated desktop
    Run {
        /// Path to the script file
        script: PathBuf,
        /// Playback speed multiplier (2.0 plays twice as fast)
        #[arg(long)]
        speed: Option<f64>,
        /// Root directory for relative CALL paths
        #[arg(long)]
        macros_dir: Option<PathBuf>,
        /// Root directory for relative IMAGE_MATCH templates
        #[arg(long)]
        templates_dir: Option<PathBuf>,
        /// Treat undefined variables as errors
        #[arg(long)]
        strict_vars: bool,
        /// Register a simulated window with this title (repeatable)
        #[arg(long = "window", value_name = "TITLE")]
        windows: Vec<String>,
        /// Directory for the JSON Lines run log
        #[arg(long)]
        run_log_dir: Option<PathBuf>,
    },
    /// Parse scripts and report errors without running them
    Check {
        #[arg(required = true)]
        scripts: Vec<PathBuf>,
    },
    /// Print scripts in canonical form
    Fmt {
        #[arg(required = true)]
        scripts: Vec<PathBuf>,
        /// Exit with status 1 if any script would change
        #[arg(long, conflicts_with = "write")]
        check: bool,
        /// Rewrite the files in place
        #[arg(long)]
        write: bool,
    },
}

fn logs_dir() -> PathBuf {
    let dir = macroplay_dir().join("logs");
    std::fs::create_dir_all(&dir).ok();
    dir
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Installs the tracing subscriber. The returned guard must live until exit
/// so buffered file output is flushed.
fn init_tracing(log_file: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    if log_file {
        let file_appender = tracing_appender::rolling::never(logs_dir(), "macroplay.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(non_blocking)
            .with_ansi(false)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .init();
        None
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let guard = init_tracing(cli.log_file);

    let config = match &cli.config {
        Some(path) => MacroConfig::load_from(path),
        None => MacroConfig::load(),
    };

    let result = match cli.command {
        Command::Run {
            script,
            speed,
            macros_dir,
            templates_dir,
            strict_vars,
            windows,
            run_log_dir,
        } => {
            let mut config = config;
            if let Some(speed) = speed {
                config.playback_speed = speed;
            }
            if macros_dir.is_some() {
                config.macros_dir = macros_dir;
            }
            if templates_dir.is_some() {
                config.templates_dir = templates_dir;
            }
            if strict_vars {
                config.undefined_variables = UndefinedPolicy::Error;
            }
            if run_log_dir.is_some() {
                config.log_dir = run_log_dir;
            }
            run::run(&script, config, &windows)
                .await
                .map(|outcome| outcome.exit_code())
        }
        Command::Check { scripts } => format::check(&scripts, &config).map(|_| 0),
        Command::Fmt {
            scripts,
            check,
            write,
        } => format::format(&scripts, &config, check, write).map(|_| 0),
    };

    let code = match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    drop(guard);
    if code != 0 {
        process::exit(code);
    }
}
