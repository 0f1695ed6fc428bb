//! CPAL playback engine for the slot pool.
//!
//! Clips are decoded fully into memory with Symphonia, resampled to the device
//! rate with Rubato and rendered by a CPAL callback driven by atomic transport
//! state.

pub mod config;
pub mod decode;
pub mod device;
pub mod engine;
pub mod playback;
pub mod resample;

pub use config::PlaybackConfig;
pub use engine::{CpalEngine, CpalEngineFactory};
