use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "stickerbook",
    version,
    about = "Matrix sticker collection and pack curation bot"
)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config directory (default: ~/.stickerbook)
    #[arg(long, global = true, env = "STICKERBOOK_CONFIG_DIR", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the bot and sync until interrupted
    Run,
    /// Verify configuration and connectivity, then exit
    Check,
}
