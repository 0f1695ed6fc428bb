//! Slot pool: bounded mapping from slot id to a primed playback engine.
//!
//! Every operation runs under one pool-wide lock so that replacement and the
//! capacity check see a consistent mapping, and so a status query never
//! observes a half-replaced slot. The only blocking work done while holding the
//! lock is engine priming during [`SlotPool::load`].

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use slot_types::SlotStatus;

use crate::engine::{EngineFactory, PlaybackEngine, dispatch_release};
use crate::error::SlotError;
use crate::source::SourceResolver;

/// Maximum number of simultaneously loaded slots.
pub const MAX_SLOTS: usize = 5;

struct Slot {
    engine: Box<dyn PlaybackEngine>,
    looping: bool,
}

impl Slot {
    fn stop(&mut self) {
        self.engine.pause();
        self.engine.seek(0);
    }

    fn status(&self, id: &str) -> SlotStatus {
        SlotStatus {
            id: id.to_string(),
            is_playing: self.engine.is_playing(),
            position_ms: self.engine.position_ms(),
            duration_ms: self.engine.duration_ms().unwrap_or(0),
            volume: self.engine.volume(),
        }
    }
}

/// Owns every loaded slot and its engine.
pub struct SlotPool {
    resolver: Box<dyn SourceResolver>,
    factory: Box<dyn EngineFactory>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl SlotPool {
    pub fn new(
        resolver: impl SourceResolver + 'static,
        factory: impl EngineFactory + 'static,
    ) -> Self {
        Self {
            resolver: Box::new(resolver),
            factory: Box::new(factory),
            slots: Mutex::new(HashMap::with_capacity(MAX_SLOTS)),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load `source` into slot `id`, replacing any engine already there.
    ///
    /// Replacement is unload-then-load: the previous engine is evicted and its
    /// release dispatched before the new engine is created. Returns once the new
    /// engine is primed, so its duration is available immediately.
    pub fn load(&self, id: &str, source: &str, looping: bool) -> Result<(), SlotError> {
        tracing::debug!(slot = %id, source = %source, looping, "slot load requested");
        let resolved = self.resolver.resolve(source)?;

        let mut slots = self.slots();
        if let Some(previous) = slots.remove(id) {
            tracing::info!(slot = %id, "replacing loaded slot");
            dispatch_release(id, previous.engine);
        } else if slots.len() >= MAX_SLOTS {
            tracing::warn!(slot = %id, loaded = slots.len(), "slot pool full");
            return Err(SlotError::CapacityExceeded { max: MAX_SLOTS });
        }

        let mut engine = self
            .factory
            .create(&resolved)
            .map_err(|e| SlotError::invalid_source(source, format!("{e:#}")))?;
        if let Err(e) = engine.prime() {
            tracing::warn!(slot = %id, source = %source, error = %format!("{e:#}"), "engine prime failed");
            dispatch_release(id, engine);
            return Err(SlotError::invalid_source(source, format!("{e:#}")));
        }
        engine.set_looping(looping);

        tracing::info!(
            slot = %id,
            path = %resolved.path.display(),
            duration_ms = ?engine.duration_ms(),
            looping,
            "slot loaded"
        );
        slots.insert(id.to_string(), Slot { engine, looping });
        Ok(())
    }

    /// Start playback of a loaded slot.
    pub fn play(&self, id: &str) -> Result<(), SlotError> {
        let mut slots = self.slots();
        let slot = slots
            .get_mut(id)
            .ok_or_else(|| SlotError::NotLoaded(id.to_string()))?;
        // The engine may have drifted if something else touched its loop mode.
        slot.engine.set_looping(slot.looping);
        slot.engine.play();
        tracing::debug!(slot = %id, looping = slot.looping, "slot play");
        Ok(())
    }

    /// Pause and rewind a slot. Unknown ids are ignored.
    pub fn stop(&self, id: &str) {
        if let Some(slot) = self.slots().get_mut(id) {
            slot.stop();
            tracing::debug!(slot = %id, "slot stopped");
        }
    }

    /// Remove a slot and dispatch its engine's release. Unknown ids are ignored.
    ///
    /// Returns once the slot is gone from the mapping; the native release may
    /// still be pending on the engine's home context.
    pub fn unload(&self, id: &str) {
        let removed = self.slots().remove(id);
        if let Some(slot) = removed {
            dispatch_release(id, slot.engine);
            tracing::info!(slot = %id, "slot unloaded");
        }
    }

    /// Set a slot's volume, clamped to `0.0..=1.0`. Unknown ids are ignored.
    pub fn set_volume(&self, id: &str, level: f32) {
        if let Some(slot) = self.slots().get_mut(id) {
            let volume = clamp_volume(level);
            slot.engine.set_volume(volume);
            tracing::debug!(slot = %id, requested = level, volume, "slot volume set");
        }
    }

    /// Current status of `id`, or zero values when it is not loaded.
    pub fn status(&self, id: &str) -> SlotStatus {
        self.slots()
            .get(id)
            .map(|slot| slot.status(id))
            .unwrap_or_else(|| SlotStatus::absent(id))
    }

    /// Status of every loaded slot, sorted by id.
    pub fn statuses(&self) -> Vec<SlotStatus> {
        let slots = self.slots();
        let mut out: Vec<SlotStatus> = slots.iter().map(|(id, slot)| slot.status(id)).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Stop every loaded slot.
    pub fn stop_all(&self) {
        let mut slots = self.slots();
        tracing::info!(loaded = slots.len(), "stopping all slots");
        for slot in slots.values_mut() {
            slot.stop();
        }
    }

    /// `true` when at least one loaded slot is playing.
    pub fn any_playing(&self) -> bool {
        self.slots().values().any(|slot| slot.engine.is_playing())
    }

    /// Release every engine and empty the pool.
    ///
    /// The pool stays usable afterwards.
    pub fn release_all(&self) {
        let drained: Vec<(String, Slot)> = self.slots().drain().collect();
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "releasing all slots");
        }
        for (id, slot) in drained {
            dispatch_release(&id, slot.engine);
        }
    }

    pub fn has_slot(&self, id: &str) -> bool {
        self.slots().contains_key(id)
    }

    /// Number of loaded slots.
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }
}

impl Drop for SlotPool {
    fn drop(&mut self) {
        self.release_all();
    }
}

/// Clamp a requested volume into `0.0..=1.0`; NaN maps to silence.
fn clamp_volume(level: f32) -> f32 {
    if level.is_nan() {
        0.0
    } else {
        level.clamp(0.0, 1.0)
    }
}
