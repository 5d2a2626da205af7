//! CLI interface for OnGoal
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// OnGoal goal-tracking chat server
///
/// Tracks the questions, requests, offers and suggestions a user raises in a
/// chat with an assistant, and whether the assistant's replies address them.
#[derive(Parser, Debug)]
#[command(name = "ongoal")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP and WebSocket server
    Serve {
        /// Interface to bind (overrides server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides server.port)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Chat in the terminal, running the goal pipeline on every turn
    Chat {
        /// Conversation id
        #[arg(long, default_value = "default")]
        conversation: String,

        /// Use the built-in echo oracle instead of a real provider
        #[arg(long)]
        offline: bool,
    },

    /// Show provider availability and pipeline defaults
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["ongoal", "status"]);
        assert!(matches!(cli.command, Command::Status));
        assert!(!cli.json);
        assert!(cli.log.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["ongoal", "--json", "--log", "debug", "status"]);
        assert!(cli.json);
        assert_eq!(cli.log, Some("debug".to_string()));

        // Global flags also work after the subcommand
        let cli = Cli::parse_from(["ongoal", "status", "--config", "/tmp/ongoal.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/ongoal.toml")));
    }

    #[test]
    fn test_serve_overrides() {
        let cli = Cli::parse_from(["ongoal", "serve", "--port", "9000"]);
        if let Command::Serve { host, port } = cli.command {
            assert_eq!(host, None);
            assert_eq!(port, Some(9000));
        } else {
            panic!("Expected Serve command");
        }
    }

    #[test]
    fn test_chat_defaults() {
        let cli = Cli::parse_from(["ongoal", "chat"]);
        if let Command::Chat {
            conversation,
            offline,
        } = cli.command
        {
            assert_eq!(conversation, "default");
            assert!(!offline);
        } else {
            panic!("Expected Chat command");
        }
    }

    #[test]
    fn test_chat_offline() {
        let cli = Cli::parse_from(["ongoal", "chat", "--conversation", "story", "--offline"]);
        if let Command::Chat {
            conversation,
            offline,
        } = cli.command
        {
            assert_eq!(conversation, "story");
            assert!(offline);
        } else {
            panic!("Expected Chat command");
        }
    }
}
