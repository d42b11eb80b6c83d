//! `check` and `fmt`: parse-only commands that never touch a backend.

use std::path::{Path, PathBuf};

use macroplay_core::ast::Script;
use macroplay_core::builder::parse_script;
use macroplay_core::config::MacroConfig;
use tracing::debug;

use crate::error::CliError;

fn load(path: &Path, config: &MacroConfig) -> Result<(String, Script), CliError> {
    let source = std::fs::read_to_string(path)?;
    let script = parse_script(&source, &path.display().to_string(), &config.alias_table())?;
    debug!(file = %path.display(), statements = script.count_leaf_commands(), "parsed");
    Ok((source, script))
}

/// Parses every script and reports its command count.
pub fn check(scripts: &[PathBuf], config: &MacroConfig) -> Result<(), CliError> {
    for path in scripts {
        let (_, script) = load(path, config)?;
        println!(
            "{}: ok ({} commands)",
            path.display(),
            script.count_leaf_commands()
        );
    }
    Ok(())
}

/// Prints the canonical form of a script, rewrites it in place, or with
/// `check_only` fails when any script is not already canonical.
pub fn format(
    scripts: &[PathBuf],
    config: &MacroConfig,
    check_only: bool,
    write: bool,
) -> Result<(), CliError> {
    let mut unformatted = Vec::new();
    for path in scripts {
        let (source, script) = load(path, config)?;
        let canonical = script.to_source();
        if check_only {
            if source != canonical {
                unformatted.push(path.display().to_string());
            }
        } else if write {
            if source != canonical {
                std::fs::write(path, &canonical)?;
                eprintln!("Formatted {}", path.display());
            }
        } else {
            print!("{}", canonical);
        }
    }
    if unformatted.is_empty() {
        Ok(())
    } else {
        Err(CliError::Unformatted(unformatted))
    }
}
