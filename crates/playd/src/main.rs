//! playd: a small music player daemon.
//!
//! A decoder thread turns songs (local files or HTTP streams) into PCM using the
//! first matching decoder plugin; a player thread feeds that PCM into a sound device
//! or a pipe command.
//!
//! ## Modes
//! - `play`: play the given songs in order, then exit.
//! - `run`: read control lines from stdin.
//! - `plugins` / `devices`: list what is available.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use playd::cli::{Args, Command};
use playd::config::{PlaydConfig, Settings};
use playd::runtime;

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,playd=info")),
        )
        .init();

    let cfg = match &args.config {
        Some(path) => PlaydConfig::load(path)?,
        None => PlaydConfig::default(),
    };
    let settings = Settings::resolve(cfg, &args)?;

    match &args.cmd {
        Command::Play { songs } => runtime::run_play(&settings, songs, true),
        Command::Run => runtime::run_stdin(&settings, true),
        Command::Plugins => runtime::list_plugins(&settings),
        Command::Devices => runtime::list_devices(),
    }
}
