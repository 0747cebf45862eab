//! Command-line interface for grid_arena.

use clap::{Parser, Subcommand};

/// Grid Arena - staked two-player grid game server
#[derive(Parser, Debug)]
#[command(name = "grid_arena")]
#[command(about = "Authoritative server for staked gomoku and tic-tac-toe", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the game server
    Serve {
        /// Path to the TOML config file (defaults apply if it doesn't exist)
        #[arg(short, long, default_value = "grid_arena.toml")]
        config: std::path::PathBuf,

        /// Host to bind to, overriding the config
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to, overriding the config
        #[arg(short, long)]
        port: Option<u16>,

        /// Database file, overriding the config
        #[arg(long)]
        db_path: Option<String>,
    },

    /// Apply pending database migrations and exit
    Migrate {
        /// Path to the database file (created if it doesn't exist)
        #[arg(long, default_value = "grid_arena.db")]
        db_path: String,
    },
}
