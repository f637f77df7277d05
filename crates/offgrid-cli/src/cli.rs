//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List nearby peripherals
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value_t = 10)]
        timeout: u64,
        /// Show every peripheral, not just likely OffGridChat boards
        #[arg(short, long)]
        all: bool,
    },
    /// Connect to the board and chat interactively
    Chat {
        /// Connect to this address instead of scanning
        #[arg(short, long)]
        address: Option<String>,
        /// Directory for received photos and voice messages
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Send a single message or attachment and exit
    Send {
        /// Connect to this address instead of scanning
        #[arg(short, long)]
        address: Option<String>,
        /// Send this file as a photo
        #[arg(long, conflicts_with_all = ["audio", "message"])]
        photo: Option<PathBuf>,
        /// Send this file as a voice message
        #[arg(long, conflicts_with_all = ["photo", "message"])]
        audio: Option<PathBuf>,
        /// Message text
        #[arg(required_unless_present_any = ["photo", "audio"])]
        message: Option<String>,
    },
}
