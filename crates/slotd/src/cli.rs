use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("SLOTD_GIT_SHA"),
    ", ",
    env!("SLOTD_BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "slotd", version = VERSION)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// HTTP API bind address, e.g. 127.0.0.1:5580
    #[arg(long)]
    pub http_bind: Option<SocketAddr>,

    /// Directory relative sources resolve against
    #[arg(long)]
    pub media_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Serve the slot control API (default)
    Listen,

    /// Play one local file and exit when it ends
    Play {
        /// Path to audio file
        path: PathBuf,

        /// Loop until interrupted with Ctrl-C
        #[arg(long = "loop")]
        looping: bool,

        /// Playback volume, 0.0 to 1.0
        #[arg(long, default_value_t = 1.0)]
        volume: f32,
    },
}
