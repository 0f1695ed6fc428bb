//! Pool plus keep-alive, kept in step after every operation that can change
//! whether anything is audible.

use std::sync::{Mutex, MutexGuard, PoisonError};

use slot_types::{KeepAliveState, KeepAliveStatus, SlotStatus};

use crate::error::SlotError;
use crate::lifecycle::LifecycleController;
use crate::pool::SlotPool;

pub struct SlotService {
    pool: SlotPool,
    keep_alive: LifecycleController,
    control: Mutex<()>,
}

impl SlotService {
    pub fn new(pool: SlotPool, keep_alive: LifecycleController) -> Self {
        Self {
            pool,
            keep_alive,
            control: Mutex::new(()),
        }
    }

    pub fn pool(&self) -> &SlotPool {
        &self.pool
    }

    fn control(&self) -> MutexGuard<'_, ()> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn load(&self, id: &str, source: &str, looping: bool) -> Result<(), SlotError> {
        let _guard = self.control();
        let result = self.pool.load(id, source, looping);
        self.sync_locked();
        result
    }

    pub fn play(&self, id: &str) -> Result<(), SlotError> {
        let _guard = self.control();
        let result = self.pool.play(id);
        self.sync_locked();
        result
    }

    pub fn stop(&self, id: &str) {
        let _guard = self.control();
        self.pool.stop(id);
        self.sync_locked();
    }

    pub fn unload(&self, id: &str) {
        let _guard = self.control();
        self.pool.unload(id);
        self.sync_locked();
    }

    pub fn set_volume(&self, id: &str, level: f32) {
        self.pool.set_volume(id, level);
    }

    pub fn status(&self, id: &str) -> SlotStatus {
        self.pool.status(id)
    }

    pub fn statuses(&self) -> Vec<SlotStatus> {
        self.pool.statuses()
    }

    pub fn has_slot(&self, id: &str) -> bool {
        self.pool.has_slot(id)
    }

    pub fn keep_alive_state(&self) -> KeepAliveState {
        self.keep_alive.state()
    }

    pub fn keep_alive_status(&self) -> KeepAliveStatus {
        let _guard = self.control();
        KeepAliveStatus {
            state: self.keep_alive.state(),
            slots_loaded: self.pool.len(),
            any_playing: self.pool.any_playing(),
        }
    }

    /// Re-evaluate keep-alive against the pool.
    ///
    /// Clips that reach their end on their own stop playing without any call
    /// passing through here, so a periodic sweep is expected to call this.
    pub fn sync_keep_alive(&self) {
        let _guard = self.control();
        self.sync_locked();
    }

    /// Output route changed or the host asked for silence.
    pub fn interrupt(&self) {
        let _guard = self.control();
        tracing::info!("playback interrupted");
        self.pool.stop_all();
        self.keep_alive.stop();
    }

    /// Release every engine and drop keep-alive. The service stays usable.
    pub fn shutdown(&self) {
        let _guard = self.control();
        self.pool.release_all();
        self.keep_alive.stop();
        tracing::info!("slot service shut down");
    }

    fn sync_locked(&self) {
        if self.pool.any_playing() {
            if let Err(err) = self.keep_alive.start() {
                tracing::warn!(error = %err, "keep-alive start failed");
            }
        } else {
            self.keep_alive.stop();
        }
    }
}
