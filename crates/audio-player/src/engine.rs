//! CPAL-backed [`PlaybackEngine`].
//!
//! Each engine owns a home thread. The output stream is created on that thread
//! during [`PlaybackEngine::prime`] and kept in thread-local storage there, so
//! it is also dropped there when the pool dispatches the release.

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use cpal::traits::StreamTrait;
use slot_pool::{EngineFactory, HomeContext, HomeControl, HomeThread, PlaybackEngine, ResolvedSource};

use crate::config::PlaybackConfig;
use crate::decode::{DecodedClip, decode_file, frames_to_ms, ms_to_frames};
use crate::device::{pick_device, pick_output_config};
use crate::playback::{ClipState, build_output_stream};
use crate::resample::resample_clip;

thread_local! {
    static STREAM: RefCell<Option<cpal::Stream>> = const { RefCell::new(None) };
}

/// Builds one [`CpalEngine`] per loaded slot.
pub struct CpalEngineFactory {
    config: PlaybackConfig,
    next_id: AtomicU64,
}

impl CpalEngineFactory {
    pub fn new(config: PlaybackConfig) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(0),
        }
    }
}

impl EngineFactory for CpalEngineFactory {
    fn create(&self, source: &ResolvedSource) -> Result<Box<dyn PlaybackEngine>> {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        // Detached: the thread ends when release returns Shutdown.
        let home = HomeThread::spawn(format!("slot-engine-{n}"))
            .context("spawn engine home thread")?;
        Ok(Box::new(CpalEngine {
            source: source.clone(),
            config: self.config.clone(),
            state: Arc::new(ClipState::default()),
            home: home.context(),
            rate: None,
        }))
    }
}

/// In-memory clip rendered through a CPAL output stream.
pub struct CpalEngine {
    source: ResolvedSource,
    config: PlaybackConfig,
    state: Arc<ClipState>,
    home: HomeContext,
    /// Output rate, known once primed.
    rate: Option<u32>,
}

impl PlaybackEngine for CpalEngine {
    fn prime(&mut self) -> Result<()> {
        let clip = decode_file(&self.source, self.config.max_clip_seconds)?;
        let info = clip.source_info.clone();
        let source_ms = clip.duration_ms();
        let (tx, rx) = crossbeam_channel::bounded(1);
        let config = self.config.clone();
        let state = self.state.clone();
        self.home.post(move || {
            let _ = tx.send(open_output(clip, &config, state));
            HomeControl::Continue
        })?;
        let rate = rx
            .recv()
            .context("engine home thread exited while opening output")??;
        self.rate = Some(rate);
        tracing::debug!(
            path = %self.source.path.display(),
            home = %self.home.name(),
            codec = ?info.codec,
            bit_depth = ?info.bit_depth,
            container = ?info.container,
            source_ms,
            rate,
            frames = self.state.total_frames(),
            "engine primed"
        );
        Ok(())
    }

    fn set_looping(&mut self, looping: bool) {
        self.state.set_looping(looping);
    }

    fn play(&mut self) {
        self.state.play();
    }

    fn pause(&mut self) {
        self.state.pause();
    }

    fn seek(&mut self, position_ms: u64) {
        let frame = self.rate.map(|r| ms_to_frames(position_ms, r)).unwrap_or(0);
        self.state.seek(frame);
    }

    fn set_volume(&mut self, volume: f32) {
        self.state.set_volume(volume);
    }

    fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    fn position_ms(&self) -> u64 {
        self.rate
            .map(|r| frames_to_ms(self.state.position(), r))
            .unwrap_or(0)
    }

    fn duration_ms(&self) -> Option<u64> {
        self.rate.map(|r| frames_to_ms(self.state.total_frames(), r))
    }

    fn volume(&self) -> f32 {
        self.state.volume()
    }

    fn home(&self) -> &HomeContext {
        &self.home
    }

    fn release(self: Box<Self>) -> HomeControl {
        self.state.pause();
        let stream = STREAM.with(|s| s.borrow_mut().take());
        tracing::debug!(
            path = %self.source.path.display(),
            home = %self.home.name(),
            had_stream = stream.is_some(),
            "engine released"
        );
        drop(stream);
        HomeControl::Shutdown
    }
}

/// Open the device, fit the clip to it and start a silent stream.
///
/// Runs on the engine's home thread. Returns the output sample rate.
fn open_output(mut clip: DecodedClip, config: &PlaybackConfig, state: Arc<ClipState>) -> Result<u32> {
    let host = cpal::default_host();
    let device = pick_device(&host, config.device.as_deref())?;
    let supported = pick_output_config(&device, Some(clip.rate))?;
    let mut stream_config: cpal::StreamConfig = supported.config();
    if let Some(frames) = config.buffer_frames {
        stream_config.buffer_size = cpal::BufferSize::Fixed(frames);
    }
    let rate = stream_config.sample_rate;

    resample_clip(&mut clip, rate, config.chunk_frames)?;
    state.set_total_frames(clip.frames() as u64);

    let channels = clip.channels;
    let samples: Arc<[f32]> = clip.samples.into();
    let stream = build_output_stream(
        &device,
        &stream_config,
        supported.sample_format(),
        samples,
        channels,
        state,
    )?;
    stream.play().context("start output stream")?;
    STREAM.with(|s| *s.borrow_mut() = Some(stream));
    Ok(rate)
}
