//! CLI argument definitions for the alchemy console.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// alc - command-line client for the alchemy administration console.
///
/// Log in with `alc login`, then pass the printed token to the other commands
/// with `--token` or `ALC_TOKEN`.
#[derive(Parser, Debug)]
#[command(name = "alc")]
#[command(author, version, about = "Command-line client for the alchemy administration console", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Backend base URL (overrides ALC_API_URL and config.kdl)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Path to config.kdl
    #[arg(long = "config", global = true, env = "ALC_CONFIG")]
    pub config_path: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in and print the session token and profile
    Login {
        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,
    },

    /// Create an account
    Register {
        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,

        /// alchemist or supervisor
        #[arg(long, default_value = "alchemist")]
        role: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        specialty: Option<String>,
    },

    /// Fetch and print one resource collection
    List {
        /// alchemists, missions, materials, transmutations or audits
        resource: String,

        /// Bearer token from `alc login`
        #[arg(long, env = "ALC_TOKEN", hide_env_values = true)]
        token: String,
    },

    /// Mission commands
    Mission {
        #[command(subcommand)]
        command: MissionCommands,
    },

    /// Follow live changes and print the dashboard on every update
    ///
    /// Mounts the dashboard, opens the event channel, and keeps running until
    /// Ctrl+C or until the channel closes for good.
    Watch {
        #[arg(long, env = "ALC_TOKEN", hide_env_values = true)]
        token: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Mission subcommands
#[derive(Subcommand, Debug)]
pub enum MissionCommands {
    /// Change a mission's status
    Status {
        /// Mission id
        id: u64,

        /// PENDING, IN_PROGRESS, COMPLETED or ARCHIVED
        status: String,

        #[arg(long, env = "ALC_TOKEN", hide_env_values = true)]
        token: String,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the resolved configuration and where each value came from
    Show,
}
