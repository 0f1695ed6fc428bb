//! Configuration loading and resolution.
//!
//! An optional TOML file supplies defaults; command-line flags override it.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

pub use audio_player::config::PlaybackConfig;

use crate::cli::Args;

pub const DEFAULT_HTTP_BIND: &str = "127.0.0.1:5580";
const DEFAULT_HEARTBEAT_SECS: u64 = 30;
const DEFAULT_IDLE_CHECK_SECS: u64 = 5;
const DEFAULT_ROUTE_POLL_MS: u64 = 1000;

/// Config file schema.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// HTTP API bind address (host:port).
    pub bind: Option<String>,
    /// Root for relative sources.
    pub media_dir: Option<PathBuf>,
    /// Output device substring.
    pub device: Option<String>,
    pub engine: EngineSection,
    pub keep_alive: KeepAliveSection,
    pub interruption: InterruptionSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSection {
    pub chunk_frames: Option<usize>,
    pub buffer_frames: Option<u32>,
    pub max_clip_seconds: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeepAliveSection {
    pub heartbeat_secs: Option<u64>,
    /// `0` disables the idle sweep.
    pub idle_check_secs: Option<u64>,
    /// Program and arguments that hold a suspend inhibitor while running.
    /// An empty list disables the inhibitor.
    pub inhibit_command: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InterruptionSection {
    /// `0` disables the output-route watcher.
    pub route_poll_ms: Option<u64>,
}

impl FileConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str::<FileConfig>(raw)?)
    }
}

#[derive(Clone, Debug)]
pub struct KeepAliveConfig {
    pub heartbeat: Duration,
    pub idle_check: Option<Duration>,
    pub inhibit_command: Vec<String>,
}

/// Fully resolved daemon settings.
#[derive(Clone, Debug)]
pub struct SlotdConfig {
    pub http_bind: SocketAddr,
    pub media_dir: Option<PathBuf>,
    pub playback: PlaybackConfig,
    pub keep_alive: KeepAliveConfig,
    pub route_poll: Option<Duration>,
}

impl SlotdConfig {
    pub fn resolve(args: &Args, file: FileConfig) -> Result<Self> {
        let http_bind = match args.http_bind {
            Some(addr) => addr,
            None => {
                let bind = file.bind.as_deref().unwrap_or(DEFAULT_HTTP_BIND);
                bind.parse().with_context(|| format!("parse bind {bind}"))?
            }
        };

        let defaults = PlaybackConfig::default();
        let playback = PlaybackConfig {
            device: normalize_device_name(args.device.clone().or(file.device)),
            chunk_frames: file.engine.chunk_frames.unwrap_or(defaults.chunk_frames).max(1),
            buffer_frames: file.engine.buffer_frames.filter(|f| *f > 0),
            max_clip_seconds: file
                .engine
                .max_clip_seconds
                .unwrap_or(defaults.max_clip_seconds),
        };

        let keep_alive = KeepAliveConfig {
            heartbeat: Duration::from_secs(
                file.keep_alive
                    .heartbeat_secs
                    .unwrap_or(DEFAULT_HEARTBEAT_SECS)
                    .max(1),
            ),
            idle_check: nonzero(
                file.keep_alive
                    .idle_check_secs
                    .unwrap_or(DEFAULT_IDLE_CHECK_SECS),
                Duration::from_secs,
            ),
            inhibit_command: file
                .keep_alive
                .inhibit_command
                .unwrap_or_else(default_inhibit_command),
        };

        Ok(Self {
            http_bind,
            media_dir: args.media_dir.clone().or(file.media_dir),
            playback,
            keep_alive,
            route_poll: nonzero(
                file.interruption
                    .route_poll_ms
                    .unwrap_or(DEFAULT_ROUTE_POLL_MS),
                Duration::from_millis,
            ),
        })
    }
}

fn nonzero(value: u64, to: fn(u64) -> Duration) -> Option<Duration> {
    (value > 0).then(|| to(value))
}

pub(crate) fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Platform inhibitor that blocks idle sleep until killed.
pub fn default_inhibit_command() -> Vec<String> {
    let parts: &[&str] = if cfg!(target_os = "linux") {
        &[
            "systemd-inhibit",
            "--what=sleep:idle",
            "--who=slotd",
            "--why=audio playback",
            "--mode=block",
            "sleep",
            "infinity",
        ]
    } else if cfg!(target_os = "macos") {
        &["caffeinate", "-i"]
    } else {
        &[]
    };
    parts.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn args(argv: &[&str]) -> Args {
        let mut full = vec!["slotd"];
        full.extend_from_slice(argv);
        Args::try_parse_from(full).unwrap()
    }

    #[test]
    fn defaults_without_file() {
        let cfg = SlotdConfig::resolve(&args(&[]), FileConfig::default()).unwrap();
        assert_eq!(cfg.http_bind, DEFAULT_HTTP_BIND.parse().unwrap());
        assert_eq!(cfg.playback.chunk_frames, 1024);
        assert_eq!(cfg.playback.buffer_frames, None);
        assert_eq!(cfg.keep_alive.heartbeat, Duration::from_secs(30));
        assert_eq!(cfg.keep_alive.idle_check, Some(Duration::from_secs(5)));
        assert_eq!(cfg.keep_alive.inhibit_command, default_inhibit_command());
        assert_eq!(cfg.route_poll, Some(Duration::from_millis(1000)));
    }

    #[test]
    fn file_values_apply_and_flags_override() {
        let file = FileConfig::parse(
            r#"
            bind = "0.0.0.0:6000"
            media_dir = "/srv/audio"
            device = "Speakers"

            [engine]
            chunk_frames = 512
            buffer_frames = 2048
            max_clip_seconds = 60

            [keep_alive]
            idle_check_secs = 0
            inhibit_command = []

            [interruption]
            route_poll_ms = 250
            "#,
        )
        .unwrap();
        let cfg = SlotdConfig::resolve(&args(&["--device", " USB "]), file).unwrap();
        assert_eq!(cfg.http_bind.port(), 6000);
        assert_eq!(cfg.media_dir, Some(PathBuf::from("/srv/audio")));
        assert_eq!(cfg.playback.device.as_deref(), Some("USB"));
        assert_eq!(cfg.playback.chunk_frames, 512);
        assert_eq!(cfg.playback.buffer_frames, Some(2048));
        assert_eq!(cfg.playback.max_clip_seconds, 60);
        assert_eq!(cfg.keep_alive.idle_check, None);
        assert!(cfg.keep_alive.inhibit_command.is_empty());
        assert_eq!(cfg.route_poll, Some(Duration::from_millis(250)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(FileConfig::parse("bnid = \"x\"").is_err());
    }

    #[test]
    fn bad_bind_in_file_is_an_error() {
        let file = FileConfig::parse("bind = \"not-an-addr\"").unwrap();
        assert!(SlotdConfig::resolve(&args(&[]), file).is_err());
    }

    #[test]
    fn load_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[interruption]\nroute_poll_ms = 0").unwrap();
        let loaded = FileConfig::load(file.path()).unwrap();
        let cfg = SlotdConfig::resolve(&args(&[]), loaded).unwrap();
        assert_eq!(cfg.route_poll, None);
    }

    #[test]
    fn normalize_device_name_trims_and_drops_empty() {
        assert_eq!(normalize_device_name(None), None);
        assert_eq!(normalize_device_name(Some("  ".to_string())), None);
        assert_eq!(
            normalize_device_name(Some("  USB  DAC ".to_string())),
            Some("USB  DAC".to_string())
        );
    }
}
