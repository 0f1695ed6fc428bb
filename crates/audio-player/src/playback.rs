//! Playback stage (CPAL output stream).
//!
//! Builds the CPAL output stream and provides the real-time audio callback.
//! The callback:
//! - reads frames from the in-memory clip at the shared position
//! - applies volume and basic channel mapping (mono↔stereo, best-effort otherwise)
//! - converts `f32` samples to the device sample format
//!
//! Transport state lives in [`ClipState`] atomics so control calls from any
//! thread never contend with the callback.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;

/// Low bits of the transport word hold the next frame to render.
const POSITION_BITS: u32 = 48;
const POSITION_MASK: u64 = (1 << POSITION_BITS) - 1;
const PLAYING_BIT: u64 = 1 << 63;
/// Bumped by every control call so the callback can tell its own snapshot apart.
const GENERATION_ONE: u64 = 1 << POSITION_BITS;
const GENERATION_MASK: u64 = !(POSITION_MASK | PLAYING_BIT);

/// Position, playing flag and control generation packed into one word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Transport(u64);

impl Transport {
    fn position(self) -> u64 {
        self.0 & POSITION_MASK
    }

    fn is_playing(self) -> bool {
        self.0 & PLAYING_BIT != 0
    }

    fn with(self, position: u64, playing: bool) -> Self {
        let playing = if playing { PLAYING_BIT } else { 0 };
        Self((self.0 & GENERATION_MASK) | playing | position.min(POSITION_MASK))
    }

    fn next_generation(self) -> Self {
        Self((self.0 & !GENERATION_MASK) | (self.0.wrapping_add(GENERATION_ONE) & GENERATION_MASK))
    }
}

/// Transport state shared between engine handles and the audio callback.
#[derive(Debug)]
pub struct ClipState {
    transport: AtomicU64,
    total_frames: AtomicU64,
    looping: AtomicBool,
    volume_bits: AtomicU32,
}

impl Default for ClipState {
    fn default() -> Self {
        Self {
            transport: AtomicU64::new(0),
            total_frames: AtomicU64::new(0),
            looping: AtomicBool::new(false),
            volume_bits: AtomicU32::new(1.0f32.to_bits()),
        }
    }
}

impl ClipState {
    pub fn set_total_frames(&self, frames: u64) {
        self.total_frames.store(frames, Ordering::Release);
        self.control(|t| (t.position().min(frames), t.is_playing()));
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames.load(Ordering::Acquire)
    }

    pub fn position(&self) -> u64 {
        self.snapshot().position()
    }

    /// Move to `frame`, clamped to the end of the clip.
    pub fn seek(&self, frame: u64) {
        let total = self.total_frames();
        self.control(|t| (frame.min(total), t.is_playing()));
    }

    pub fn is_playing(&self) -> bool {
        self.snapshot().is_playing()
    }

    /// Start playback; a clip that already ran to its end starts over.
    pub fn play(&self) {
        let total = self.total_frames();
        self.control(|t| {
            let at_end = total > 0 && t.position() >= total;
            (if at_end { 0 } else { t.position() }, true)
        });
    }

    pub fn pause(&self) {
        self.control(|t| (t.position(), false));
    }

    pub fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Acquire)
    }

    pub fn set_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Release);
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Acquire))
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume_bits.store(volume.to_bits(), Ordering::Release);
    }

    pub(crate) fn snapshot(&self) -> Transport {
        Transport(self.transport.load(Ordering::Acquire))
    }

    /// Publish what the callback rendered from `start`.
    ///
    /// Fails, leaving the state alone, when any control call landed after
    /// `start` was taken.
    pub(crate) fn commit(&self, start: Transport, position: u64, playing: bool) -> bool {
        self.transport
            .compare_exchange(
                start.0,
                start.with(position, playing).0,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn control(&self, f: impl Fn(Transport) -> (u64, bool)) {
        let _ = self
            .transport
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                let t = Transport(word);
                let (position, playing) = f(t);
                Some(t.next_generation().with(position, playing).0)
            });
    }
}

/// Build a CPAL output stream that renders `samples` under `state`.
///
/// `samples` must be **interleaved `f32`** already at `config.sample_rate`.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    samples: Arc<[f32]>,
    src_channels: usize,
    state: Arc<ClipState>,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, samples, src_channels, state),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, samples, src_channels, state),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, samples, src_channels, state),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, samples, src_channels, state),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    samples: Arc<[f32]>,
    src_channels: usize,
    state: Arc<ClipState>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let dst_channels = config.channels as usize;
    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            render(data, dst_channels, &samples, src_channels, &state);
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Fill one device buffer.
///
/// Writes silence while paused and past the end of a non-looping clip.
pub(crate) fn render<T>(
    data: &mut [T],
    dst_channels: usize,
    samples: &[f32],
    src_channels: usize,
    state: &ClipState,
) where
    T: cpal::Sample + cpal::FromSample<f32>,
{
    let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);
    let total = (samples.len() / src_channels.max(1)) as u64;
    let start = state.snapshot();
    if !start.is_playing() || total == 0 || dst_channels == 0 {
        data.fill(silence);
        return;
    }

    let volume = state.volume();
    let looping = state.is_looping();
    let mut pos = start.position();
    let mut ended = false;

    for frame in data.chunks_mut(dst_channels) {
        if pos >= total {
            if looping {
                pos = 0;
            } else {
                ended = true;
                frame.fill(silence);
                continue;
            }
        }
        let base = pos as usize * src_channels;
        let src = &samples[base..base + src_channels];
        for (ch, out) in frame.iter_mut().enumerate() {
            *out = <T as cpal::Sample>::from_sample::<f32>(map_channel(src, dst_channels, ch) * volume);
        }
        pos += 1;
    }

    // A control call made while this buffer was filled wins.
    let _ = state.commit(start, pos.min(total), !ended);
}

/// Read one output sample for `dst_ch` from a source frame.
///
/// Mapping rules:
/// - mono → stereo: duplicate channel 0
/// - stereo → mono: average L/R
/// - stereo → stereo: pass-through
/// - other layouts: best-effort "clamp to available channels"
fn map_channel(src: &[f32], dst_channels: usize, dst_ch: usize) -> f32 {
    match (src.len(), dst_channels) {
        (0, _) => 0.0,
        (2, 1) => 0.5 * (src[0] + src[1]),
        (n, _) => src[dst_ch.min(n - 1)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(frames: u64) -> ClipState {
        let state = ClipState::default();
        state.set_total_frames(frames);
        state
    }

    #[test]
    fn paused_clip_renders_silence_without_advancing() {
        let st = state(4);
        let mut out = [1.0f32; 4];
        render(&mut out, 2, &[0.5; 4], 1, &st);
        assert_eq!(out, [0.0; 4]);
        assert_eq!(st.position(), 0);
    }

    #[test]
    fn mono_source_is_duplicated_and_scaled() {
        let st = state(3);
        st.set_volume(0.5);
        st.play();
        let mut out = [0.0f32; 4];
        render(&mut out, 2, &[0.2, 0.4, 0.6], 1, &st);
        assert_eq!(out, [0.1, 0.1, 0.2, 0.2]);
        assert_eq!(st.position(), 2);
        assert!(st.is_playing());
    }

    #[test]
    fn stereo_to_mono_averages() {
        let st = state(1);
        st.play();
        st.set_looping(true);
        let mut out = [0.0f32; 1];
        render(&mut out, 1, &[0.2, 0.6], 2, &st);
        assert!((out[0] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn clip_end_pauses_and_keeps_position() {
        let st = state(2);
        st.play();
        let mut out = [9.0f32; 4];
        render(&mut out, 1, &[0.1, 0.2], 1, &st);
        assert_eq!(out, [0.1, 0.2, 0.0, 0.0]);
        assert!(!st.is_playing());
        assert_eq!(st.position(), 2);

        st.play();
        assert_eq!(st.position(), 0);
        assert!(st.is_playing());
    }

    #[test]
    fn looping_clip_wraps_to_start() {
        let st = state(2);
        st.set_looping(true);
        st.play();
        let mut out = [0.0f32; 5];
        render(&mut out, 1, &[0.1, 0.2], 1, &st);
        assert_eq!(out, [0.1, 0.2, 0.1, 0.2, 0.1]);
        assert!(st.is_playing());
        assert_eq!(st.position(), 1);
    }

    #[test]
    fn integer_formats_are_converted() {
        let st = state(1);
        st.set_looping(true);
        st.play();
        let mut out = [0i16; 2];
        render(&mut out, 2, &[0.5], 1, &st);
        assert!(out.iter().all(|s| (16_000..=16_500).contains(s)), "{out:?}");
    }

    #[test]
    fn seek_is_clamped_to_clip_length() {
        let st = state(100);
        st.seek(500);
        assert_eq!(st.position(), 100);
        st.seek(10);
        assert_eq!(st.position(), 10);
    }

    #[test]
    fn stop_during_a_buffer_is_not_overwritten() {
        let st = state(100);
        st.play();
        let start = st.snapshot();
        st.pause();
        st.seek(0);
        assert!(!st.commit(start, 10, true));
        assert_eq!(st.position(), 0);
        assert!(!st.is_playing());
    }

    #[test]
    fn play_after_end_survives_the_end_of_clip_pause() {
        let st = state(4);
        st.seek(3);
        st.play();
        let start = st.snapshot();
        st.seek(0);
        st.play();
        assert!(!st.commit(start, 4, false));
        assert!(st.is_playing());
        assert_eq!(st.position(), 0);
    }

    #[test]
    fn uncontended_commit_keeps_the_rendered_position() {
        let st = state(100);
        st.play();
        let start = st.snapshot();
        assert!(st.commit(start, 40, true));
        assert_eq!(st.position(), 40);
        assert!(st.is_playing());
        // Same generation as the snapshot, so a stale callback would still lose.
        assert!(!st.commit(start, 50, true));
    }

    #[test]
    fn map_channel_handles_wide_sources() {
        assert_eq!(map_channel(&[0.1, 0.2, 0.3], 2, 1), 0.2);
        assert_eq!(map_channel(&[0.1, 0.2], 6, 5), 0.2);
        assert_eq!(map_channel(&[], 2, 0), 0.0);
    }
}
