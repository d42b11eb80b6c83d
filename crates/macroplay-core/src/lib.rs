//! # macroplay-core
//!
//! Core library for parsing and playing desktop-automation macro scripts.
//!
//! A script is plain text, one statement per line: leaf commands that drive
//! the mouse, keyboard and windows, `$variable` assignments with a small
//! expression language, and block keywords (`IF`, `LOOP`, `WHILE`,
//! `REPEAT`/`UNTIL`, `TRY`/`CATCH`, `CALL`) that give it structure.
//!
//! ## Modules
//!
//! - [`parser`] - Line tokenizer with comment stripping, quoting and aliases
//! - [`builder`] - Turns statements into a validated [`ast::Script`]
//! - [`expression`] and [`builtins`] - Expression evaluation over [`value::Value`]s
//! - [`runner`] - Executes scripts with control signals, CALL frames and safeguards
//! - [`executor`] and [`backend`] - Leaf command execution against a [`backend::CommandBackend`]
//! - [`session`] - Run log, highlight events, variable watch and run state
//! - [`player`] - Background playback with cancellation and speed control
//! - [`config`] - Persistent settings in `~/.macroplay/config.json`
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use macroplay_core::backend::SimulatedBackend;
//! use macroplay_core::config::MacroConfig;
//! use macroplay_core::control::RunControl;
//! use macroplay_core::runner::Runner;
//! use macroplay_core::session::{LogLevel, RunSession};
//!
//! let script = r#"
//! $total = 0
//! LOOP 4
//!     $total = $total + 2
//! ENDLOOP
//! PRINT "total: $total"
//! "#;
//!
//! let session = RunSession::new("example", None);
//! let mut runner = Runner::new(
//!     MacroConfig::default(),
//!     Arc::new(SimulatedBackend::new()),
//!     session.clone(),
//!     RunControl::default(),
//! );
//! runner.run_source(script, "example.macro").unwrap();
//! assert_eq!(session.messages(LogLevel::Info), vec!["total: 8"]);
//! ```

pub mod ast;
pub mod backend;
pub mod builder;
pub mod builtins;
pub mod command;
pub mod config;
pub mod control;
pub mod error;
pub mod executor;
pub mod expression;
pub mod keys;
pub mod parser;
pub mod player;
pub mod runner;
pub mod session;
pub mod value;
pub mod variables;
