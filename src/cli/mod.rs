//! Command-line entry points: argument parsing, logging setup, and wiring
//! the configured pieces into the bot.

mod args;

pub use args::{Cli, Command};

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

use crate::bot::Bot;
use crate::config::{self, Config};
use crate::matrix::MatrixClient;
use crate::vision::AnthropicVision;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let dir = config::config_dir(cli.config_dir.as_deref())?;
    let cfg = Config::load(&dir)
        .with_context(|| format!("loading config from {}", dir.display()))?;

    match cli.command {
        Command::Run => run_bot(cfg, dir).await,
        Command::Check => check(cfg, dir).await,
    }
}

fn init_logging(verbose: bool) {
    let default_level: LevelFilter = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_bot(cfg: Config, dir: std::path::PathBuf) -> anyhow::Result<()> {
    cfg.validate_for_run().with_context(|| {
        format!(
            "edit {} or set the named environment variables",
            dir.join(config::CONFIG_FILE).display()
        )
    })?;

    let client = MatrixClient::new(
        &cfg.matrix.homeserver,
        &cfg.matrix.user_id,
        &cfg.matrix.access_token,
    );
    let user_id = client.whoami().await.context("verifying Matrix credentials")?;
    tracing::info!(user = %user_id, homeserver = %cfg.matrix.homeserver, "Authenticated");

    let captioner = AnthropicVision::new(
        &cfg.anthropic.api_key,
        &cfg.anthropic.model,
        cfg.anthropic.max_tokens,
    );

    let mut bot = Bot::new(Arc::new(client), Arc::new(captioner), cfg, dir);
    bot.run().await?;
    Ok(())
}

/// Verify each configured piece in turn and print a short report. Exits
/// non-zero when anything is broken.
async fn check(cfg: Config, dir: std::path::PathBuf) -> anyhow::Result<()> {
    println!("Config directory: {}", dir.display());
    println!("Data directory:   {}", cfg.data_dir(&dir).display());

    let mut ok = true;

    match cfg.validate_for_run() {
        Ok(()) => println!("Config:  ok"),
        Err(err) => {
            println!("Config:  {err}");
            ok = false;
        }
    }

    if cfg.matrix.homeserver.is_empty() || cfg.matrix.access_token.is_empty() {
        println!("Matrix:  skipped (no credentials)");
        ok = false;
    } else {
        let client = MatrixClient::new(
            &cfg.matrix.homeserver,
            &cfg.matrix.user_id,
            &cfg.matrix.access_token,
        );
        match client.whoami().await {
            Ok(user_id) => println!("Matrix:  ok ({user_id})"),
            Err(err) => {
                println!("Matrix:  {err}");
                ok = false;
            }
        }
    }

    if cfg.anthropic.api_key.is_empty() {
        println!("Vision:  no API key configured");
        ok = false;
    } else {
        println!("Vision:  configured (model {})", cfg.anthropic.model);
    }

    if ok {
        Ok(())
    } else {
        anyhow::bail!("check failed")
    }
}
