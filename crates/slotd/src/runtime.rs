//! Daemon runtime helpers.
//!
//! Provides device enumeration, one-shot playback, and HTTP listener startup.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use anyhow::{Context, Result};
use audio_player::{CpalEngineFactory, device};
use slot_pool::{FileSourceResolver, LifecycleController, SlotPool, SlotService};

use crate::config::SlotdConfig;
use crate::http_api;
use crate::keep_alive::SystemKeepAlive;
use crate::route_watch::spawn_route_watcher;

/// Slot used by `slotd play`.
const CLI_SLOT: &str = "cli";
const PLAY_POLL: Duration = Duration::from_millis(200);

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)
}

/// Wire the pool, the CPAL engine and the system keep-alive together.
pub fn build_service(config: &SlotdConfig) -> Arc<SlotService> {
    let resolver = match &config.media_dir {
        Some(dir) => FileSourceResolver::with_root(dir),
        None => FileSourceResolver::new(),
    };
    let pool = SlotPool::new(resolver, CpalEngineFactory::new(config.playback.clone()));
    let keep_alive = LifecycleController::new(SystemKeepAlive::new(
        config.keep_alive.heartbeat,
        config.keep_alive.inhibit_command.clone(),
    ));
    Arc::new(SlotService::new(pool, keep_alive))
}

/// Serve the HTTP API until the process is interrupted.
pub fn run_listen(config: SlotdConfig, install_ctrlc: bool) -> Result<()> {
    let service = build_service(&config);
    if install_ctrlc {
        install_shutdown_handler(service.clone())?;
    }
    if let Some(every) = config.keep_alive.idle_check {
        spawn_idle_sweep(service.clone(), every).context("spawn idle sweep")?;
    }
    if let Some(poll) = config.route_poll {
        spawn_route_watcher(service.clone(), poll).context("spawn route watcher")?;
    }

    let bind = config.http_bind;
    tracing::info!(
        bind = %bind,
        device = ?config.playback.device,
        media_dir = ?config.media_dir,
        "http api listening"
    );
    let data = web::Data::from(service);
    actix_web::rt::System::new()
        .block_on(async move {
            HttpServer::new(move || {
                App::new()
                    .app_data(data.clone())
                    .wrap(Logger::default().exclude("/health"))
                    .configure(http_api::configure)
            })
            .bind(bind)?
            .run()
            .await
        })
        .with_context(|| format!("http api on {bind}"))
}

/// Play one file in the `cli` slot and return once it stops.
pub fn run_play(config: SlotdConfig, path: &Path, looping: bool, volume: f32) -> Result<()> {
    let service = build_service(&config);
    install_shutdown_handler(service.clone())?;

    let path = std::path::absolute(path).with_context(|| format!("resolve {}", path.display()))?;
    let source = path.to_string_lossy();
    service.load(CLI_SLOT, &source, looping)?;
    service.set_volume(CLI_SLOT, volume);
    service.play(CLI_SLOT)?;

    let status = service.status(CLI_SLOT);
    tracing::info!(
        path = %path.display(),
        duration_ms = status.duration_ms,
        volume = status.volume,
        looping,
        "playing"
    );
    while service.status(CLI_SLOT).is_playing {
        std::thread::sleep(PLAY_POLL);
    }

    service.shutdown();
    Ok(())
}

fn install_shutdown_handler(service: Arc<SlotService>) -> Result<()> {
    ctrlc::set_handler(move || {
        tracing::info!("interrupted; releasing slots");
        service.shutdown();
        // Engine releases may still be queued on their home threads. Exit
        // reclaims those streams with the process.
        std::process::exit(130);
    })
    .context("install Ctrl-C handler")
}

/// Clips that end on their own never pass through the service, so keep-alive
/// is re-checked on a timer.
fn spawn_idle_sweep(
    service: Arc<SlotService>,
    every: Duration,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("idle-sweep".to_string())
        .spawn(move || {
            loop {
                std::thread::sleep(every);
                service.sync_keep_alive();
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    use crate::cli::Args;
    use crate::config::FileConfig;

    #[test]
    fn build_service_starts_empty_and_stopped() {
        let args = Args::try_parse_from(["slotd"]).unwrap();
        let mut config = SlotdConfig::resolve(&args, FileConfig::default()).unwrap();
        config.keep_alive.inhibit_command.clear();

        let service = build_service(&config);
        assert!(service.pool().is_empty());
        assert_eq!(service.keep_alive_state(), slot_pool::KeepAliveState::Stopped);
        assert!(service.load("a", "/definitely/missing.wav", false).is_err());
    }

    #[test]
    fn default_http_bind_uses_expected_port() {
        let addr: std::net::SocketAddr = crate::config::DEFAULT_HTTP_BIND.parse().unwrap();
        assert_eq!(addr.port(), 5580);
    }
}
