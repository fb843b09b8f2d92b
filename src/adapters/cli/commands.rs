//! CLI Commands
//!
//! Argument definitions for the sniper binary. Handlers live in `main.rs`.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Raydium new-pool sniper for Solana
#[derive(Parser, Debug)]
#[command(
    name = "raydium-sniper",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Detects new Raydium pools from the log stream and trades them behind a risk gate",
    long_about = "raydium-sniper subscribes to Raydium program logs, decodes pool-creation \
                  transactions, scores each new token against multi-source market data and \
                  on-chain authority state, and manages bought positions with take-profit, \
                  stop-loss, trailing-stop and max-hold exits."
)]
pub struct CliApp {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream logs and snipe new pools
    Run(RunCmd),

    /// Print the effective configuration and wallet balance
    Status(StatusCmd),

    /// Classify and decode a saved transaction log offline
    Decode(DecodeCmd),
}

#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    pub config: PathBuf,

    /// Force paper trading (no transactions are sent)
    #[arg(short, long)]
    pub paper: bool,

    /// Buy approved pools instead of only logging them
    #[arg(long)]
    pub auto_buy: bool,

    /// Acknowledge risk of financial loss (required for live auto-buy)
    #[arg(long)]
    pub i_accept_losses: bool,

    /// Override RPC URL
    #[arg(long, value_name = "URL")]
    pub rpc_url: Option<String>,

    /// Override keypair path
    #[arg(long, value_name = "FILE")]
    pub keypair: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
pub struct StatusCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    pub config: PathBuf,

    /// Skip the RPC balance lookup
    #[arg(long)]
    pub offline: bool,

    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct DecodeCmd {
    /// Log file: a JSON array of lines, or one log line per text line
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Signature recorded on the decoded pool
    #[arg(short, long, default_value = "offline")]
    pub signature: String,

    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// Parse a saved log file
pub fn parse_log_file(content: &str) -> Vec<String> {
    if let Ok(lines) = serde_json::from_str::<Vec<String>>(content) {
        return lines;
    }
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_defaults() {
        let app = CliApp::try_parse_from(["raydium-sniper", "run"]).unwrap();

        match app.command {
            Command::Run(cmd) => {
                assert_eq!(cmd.config, PathBuf::from("config.toml"));
                assert!(!cmd.paper);
                assert!(!cmd.auto_buy);
                assert!(!cmd.i_accept_losses);
                assert!(cmd.rpc_url.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_parse_run_flags() {
        let args = [
            "raydium-sniper", "run", "-c", "live.toml", "--paper", "--auto-buy",
            "--rpc-url", "https://rpc.example.com",
        ];
        let app = CliApp::try_parse_from(args).unwrap();

        match app.command {
            Command::Run(cmd) => {
                assert_eq!(cmd.config, PathBuf::from("live.toml"));
                assert!(cmd.paper);
                assert!(cmd.auto_buy);
                assert_eq!(cmd.rpc_url.as_deref(), Some("https://rpc.example.com"));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_parse_status_json() {
        let app = CliApp::try_parse_from(["raydium-sniper", "status", "--offline", "-f", "json"]).unwrap();

        match app.command {
            Command::Status(cmd) => {
                assert!(cmd.offline);
                assert_eq!(cmd.format, OutputFormat::Json);
            }
            _ => panic!("Expected Status command"),
        }
    }

    #[test]
    fn test_parse_decode() {
        let app = CliApp::try_parse_from(["raydium-sniper", "decode", "tx.log"]).unwrap();

        match app.command {
            Command::Decode(cmd) => {
                assert_eq!(cmd.file, PathBuf::from("tx.log"));
                assert_eq!(cmd.signature, "offline");
                assert_eq!(cmd.format, OutputFormat::Text);
            }
            _ => panic!("Expected Decode command"),
        }
    }

    #[test]
    fn test_decode_requires_file() {
        assert!(CliApp::try_parse_from(["raydium-sniper", "decode"]).is_err());
    }

    #[test]
    fn test_global_flags() {
        let app = CliApp::try_parse_from(["raydium-sniper", "-v", "--debug", "status"]).unwrap();
        assert!(app.verbose);
        assert!(app.debug);
    }

    #[test]
    fn test_parse_log_file_json_array() {
        let lines = parse_log_file(r#"["Program A invoke [1]", "Program A success"]"#);
        assert_eq!(lines, vec!["Program A invoke [1]", "Program A success"]);
    }

    #[test]
    fn test_parse_log_file_plain_lines() {
        let lines = parse_log_file("Program A invoke [1]\n\n  Program log: hi  \nProgram A success\n");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "Program log: hi");
    }
}
