//! Slot daemon entry point.
//!
//! ## Modes
//! - `listen` (default): serve the slot control API over HTTP.
//! - `play`: play one local file through the `cli` slot and exit when it ends.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use slotd::cli::{Args, Command};
use slotd::config::{FileConfig, SlotdConfig};
use slotd::runtime;

const DEFAULT_LOG_FILTER: &str = "info,slotd=info,slot_pool=info,audio_player=info";

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let file = match args.config.as_deref() {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let config = SlotdConfig::resolve(&args, file)?;

    match args.cmd.clone().unwrap_or(Command::Listen) {
        Command::Listen => runtime::run_listen(config, true),
        Command::Play {
            path,
            looping,
            volume,
        } => runtime::run_play(config, &path, looping, volume),
    }
}
