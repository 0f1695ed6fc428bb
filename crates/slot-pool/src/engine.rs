//! Playback engine capability consumed by the pool.

use std::sync::Arc;

use anyhow::Result;

use crate::home::{HomeContext, HomeControl};
use crate::source::ResolvedSource;

/// One decode/render pipeline bound to a single source.
///
/// Engines have a home execution context. Their native resources must be torn
/// down there, so the pool never calls [`PlaybackEngine::release`] directly; it
/// posts the call to [`PlaybackEngine::home`] via [`dispatch_release`].
pub trait PlaybackEngine: Send {
    /// Make duration and metadata available.
    ///
    /// Called exactly once, synchronously, before the engine is installed in a slot.
    fn prime(&mut self) -> Result<()>;

    fn set_looping(&mut self, looping: bool);

    /// Request playback start without waiting for audio to begin.
    fn play(&mut self);

    fn pause(&mut self);

    fn seek(&mut self, position_ms: u64);

    /// Apply a volume already clamped to `0.0..=1.0`.
    fn set_volume(&mut self, volume: f32);

    fn is_playing(&self) -> bool;

    fn position_ms(&self) -> u64;

    /// Clip duration, when the source reports one.
    fn duration_ms(&self) -> Option<u64>;

    fn volume(&self) -> f32;

    /// Context on which this engine must be released.
    fn home(&self) -> &HomeContext;

    /// Free native resources. Runs on the home context.
    ///
    /// Return [`HomeControl::Shutdown`] when the home context exists only for this engine.
    fn release(self: Box<Self>) -> HomeControl;
}

/// Builds engines for resolved sources.
pub trait EngineFactory: Send + Sync {
    /// Construct an unprimed engine bound to `source`.
    fn create(&self, source: &ResolvedSource) -> Result<Box<dyn PlaybackEngine>>;
}

impl<F: EngineFactory + ?Sized> EngineFactory for Arc<F> {
    fn create(&self, source: &ResolvedSource) -> Result<Box<dyn PlaybackEngine>> {
        (**self).create(source)
    }
}

/// Post `engine`'s release onto its home context without waiting for it to run.
///
/// Best-effort: if the home context has already exited, the engine handle is
/// dropped on the calling thread and the failure is only logged.
pub fn dispatch_release(slot_id: &str, engine: Box<dyn PlaybackEngine>) {
    let home = engine.home().clone();
    match home.post(move || engine.release()) {
        Ok(()) => tracing::debug!(slot = %slot_id, home = %home.name(), "engine release dispatched"),
        Err(err) => tracing::warn!(slot = %slot_id, error = %err, "engine release dropped"),
    }
}
