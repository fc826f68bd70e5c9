//! CLI argument parsing for Deadair.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::LazyLock;

/// Generate the after-help text with daemon status.
fn generate_after_help() -> String {
    let mut lines = Vec::new();

    let (icon, status) = check_daemon_status();
    lines.push(format!("\x1b[1mDaemon:\x1b[0m\n  {} {}", icon, status));

    lines.push(String::new());
    lines.push("Logs are written to: ~/.local/share/deadair/logs/deadair.log".to_string());

    lines.join("\n")
}

/// Check if daemon is running and return (icon, status_text).
fn check_daemon_status() -> (&'static str, &'static str) {
    let socket_path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("deadair")
        .join("deadair.sock");

    if socket_path.exists() {
        // Try to connect briefly
        if std::os::unix::net::UnixStream::connect(&socket_path).is_ok() {
            ("✅", "on air")
        } else {
            ("❌", "stale socket")
        }
    } else {
        ("❌", "off air")
    }
}

static AFTER_HELP: LazyLock<String> = LazyLock::new(generate_after_help);

#[derive(Parser)]
#[command(
    name = "deadair",
    about = "Always-on satirical news studio daemon",
    version,
    after_help = AFTER_HELP.as_str()
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Put the studio on air
    Daemon {
        /// Run in foreground (don't daemonize)
        #[arg(short, long)]
        foreground: bool,
    },

    /// Show current studio status
    Status,

    /// Forecast the next breakdown
    Predict,

    /// Show recent breakdowns
    History {
        /// Maximum number of records to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Submit a viewer comment
    Comment {
        /// The comment text
        text: String,
    },

    /// Force a breakdown right now
    Force,

    /// Stream live studio events
    Watch,

    /// Take the studio off air
    Stop,

    /// Check whether the daemon responds
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_daemon_default() {
        let cli = Cli::parse_from(["deadair", "daemon"]);
        assert!(matches!(cli.command, Some(Command::Daemon { foreground: false })));
    }

    #[test]
    fn test_daemon_foreground() {
        let cli = Cli::parse_from(["deadair", "daemon", "-f"]);
        assert!(matches!(cli.command, Some(Command::Daemon { foreground: true })));
    }

    #[test]
    fn test_history_default_limit() {
        let cli = Cli::parse_from(["deadair", "history"]);
        assert!(matches!(cli.command, Some(Command::History { limit: 10 })));
    }

    #[test]
    fn test_history_custom_limit() {
        let cli = Cli::parse_from(["deadair", "history", "--limit", "3"]);
        assert!(matches!(cli.command, Some(Command::History { limit: 3 })));
    }

    #[test]
    fn test_comment_text() {
        let cli = Cli::parse_from(["deadair", "comment", "are you real?"]);
        match cli.command {
            Some(Command::Comment { text }) => assert_eq!(text, "are you real?"),
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_no_command() {
        let cli = Cli::parse_from(["deadair"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_config_flag() {
        let cli = Cli::parse_from(["deadair", "--config", "/tmp/deadair.yml", "status"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/deadair.yml")));
        assert!(matches!(cli.command, Some(Command::Status)));
    }
}
