//! Command-line interface for arena_server.

use clap::Parser;
use std::path::PathBuf;

/// Arena Server - two-player tic-tac-toe over TCP
#[derive(Parser, Debug)]
#[command(name = "arena_server")]
#[command(about = "Two-player tic-tac-toe game server", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to the TOML config file (defaults are used if it does not exist)
    #[arg(short, long, default_value = "arena.toml")]
    pub config: PathBuf,

    /// Host to bind to, overriding the config file
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to, overriding the config file
    #[arg(short, long)]
    pub port: Option<u16>,
}
