//! Output-route watcher.
//!
//! CPAL has no portable device-change notification, so the default output
//! device name is polled. Losing or switching the device interrupts playback,
//! the same way unplugging headphones would.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use audio_player::device::default_device_name;
use slot_pool::SlotService;

pub fn spawn_route_watcher(
    service: Arc<SlotService>,
    poll: Duration,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("route-watch".to_string())
        .spawn(move || {
            let host = cpal::default_host();
            let mut last = default_device_name(&host);
            tracing::info!(device = ?last, poll_ms = poll.as_millis() as u64, "watching output route");
            loop {
                std::thread::sleep(poll);
                let current = default_device_name(&host);
                if route_changed(last.as_deref(), current.as_deref()) {
                    tracing::info!(from = ?last, to = ?current, "output route changed");
                    service.interrupt();
                }
                last = current;
            }
        })
}

/// `true` when a previously known output device is no longer the default.
fn route_changed(previous: Option<&str>, current: Option<&str>) -> bool {
    match previous {
        Some(prev) => current != Some(prev),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switching_devices_is_a_change() {
        assert!(route_changed(Some("Speakers"), Some("Headphones")));
    }

    #[test]
    fn losing_the_device_is_a_change() {
        assert!(route_changed(Some("Headphones"), None));
    }

    #[test]
    fn first_device_appearing_is_not_a_change() {
        assert!(!route_changed(None, Some("Speakers")));
        assert!(!route_changed(None, None));
    }

    #[test]
    fn same_device_is_not_a_change() {
        assert!(!route_changed(Some("Speakers"), Some("Speakers")));
    }
}
