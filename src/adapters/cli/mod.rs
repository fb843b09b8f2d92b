//! CLI Adapter
//!
//! Command-line interface for the sniper, built on clap derive macros.

mod commands;

pub use commands::{parse_log_file, CliApp, Command, DecodeCmd, OutputFormat, RunCmd, StatusCmd};
