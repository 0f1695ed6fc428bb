//! Resample stage.
//!
//! Uses Rubato to convert a decoded clip from its source rate to the output
//! device rate in one pass, before the stream is started.

use anyhow::{Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::decode::DecodedClip;

/// Resample `clip` in place to `dst_rate`. A no-op when the rates already match.
///
/// `chunk_frames` sets the resampler's fixed input chunk size.
pub fn resample_clip(clip: &mut DecodedClip, dst_rate: u32, chunk_frames: usize) -> Result<()> {
    if clip.rate == dst_rate {
        return Ok(());
    }
    let channels = clip.channels;
    let f_ratio = dst_rate as f64 / clip.rate as f64;

    let sinc_len = 128;
    let oversampling_factor = 256;
    let interpolation = SincInterpolationType::Cubic;
    let window = WindowFunction::BlackmanHarris2;
    let f_cutoff = calculate_cutoff(sinc_len, window);

    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff,
        interpolation,
        oversampling_factor,
        window,
    };

    let chunk_in_frames = chunk_frames.max(1);
    let mut resampler = Async::<f32>::new_sinc(
        f_ratio,
        1.1,
        &params,
        chunk_in_frames,
        channels,
        FixedAsync::Input,
    )
    .map_err(|e| anyhow!("resampler init: {e}"))?;

    // The sinc filter delays its output. Zeros are fed until the delayed tail
    // has come out, then the head is cut and the clip trimmed to its exact length.
    let delay = resampler.output_delay();
    let total_frames = clip.frames();
    let expected_frames = (total_frames as f64 * f_ratio).round() as usize;
    let wanted_frames = delay + expected_frames;

    let out_capacity_frames = output_capacity(chunk_in_frames, f_ratio);
    let mut out_interleaved = vec![0.0f32; channels * out_capacity_frames];
    let mut resampled = Vec::with_capacity(wanted_frames * channels + out_interleaved.len());

    let mut indexing = Indexing {
        input_offset: 0,
        output_offset: 0,
        active_channels_mask: None,
        partial_len: None,
    };
    let mut chunk_in = vec![0.0f32; channels * chunk_in_frames];

    let mut frame = 0usize;
    while frame < total_frames || resampled.len() < wanted_frames * channels {
        let take = chunk_in_frames.min(total_frames - frame);
        let src = &clip.samples[frame * channels..(frame + take) * channels];
        chunk_in[..src.len()].copy_from_slice(src);
        chunk_in[src.len()..].fill(0.0);

        let input_adapter = InterleavedSlice::new(&chunk_in, channels, chunk_in_frames)
            .map_err(|e| anyhow!("interleaved slice (input): {e}"))?;
        let mut output_adapter =
            InterleavedSlice::new_mut(&mut out_interleaved, channels, out_capacity_frames)
                .map_err(|e| anyhow!("interleaved slice (output): {e}"))?;

        indexing.partial_len = (take > 0 && take < chunk_in_frames).then_some(take);
        let (_nbr_in, nbr_out) = resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
            .map_err(|e| anyhow!("resampler process: {e}"))?;
        if nbr_out == 0 && take == 0 {
            return Err(anyhow!("resampler stalled while flushing"));
        }

        resampled.extend_from_slice(&out_interleaved[..nbr_out * channels]);
        frame += take;
    }
    resampled.drain(..delay * channels);
    resampled.truncate(expected_frames * channels);

    tracing::debug!(
        from = clip.rate,
        to = dst_rate,
        frames_in = total_frames,
        frames_out = resampled.len() / channels,
        delay,
        "clip resampled"
    );
    clip.samples = resampled;
    clip.rate = dst_rate;
    Ok(())
}

/// Output buffer frames needed for one input chunk at `ratio`, with headroom
/// for the resampler's relative-ratio slack.
fn output_capacity(chunk_frames: usize, ratio: f64) -> usize {
    (chunk_frames as f64 * ratio * 1.1).ceil() as usize + 64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::SourceInfo;

    fn clip(rate: u32, channels: usize, frames: usize) -> DecodedClip {
        DecodedClip {
            rate,
            channels,
            samples: vec![0.25; frames * channels],
            source_info: SourceInfo::default(),
        }
    }

    #[test]
    fn matching_rate_is_untouched() {
        let mut c = clip(48_000, 2, 480);
        resample_clip(&mut c, 48_000, 256).unwrap();
        assert_eq!(c.frames(), 480);
        assert_eq!(c.rate, 48_000);
    }

    fn assert_no_edge_silence(c: &DecodedClip) {
        let first = c.samples[0];
        let last = c.samples[c.samples.len() - 1];
        assert!(first.abs() > 0.05, "silent head: {first}");
        assert!(last.abs() > 0.05, "silent tail: {last}");
        let mid = c.samples[c.samples.len() / 2];
        assert!((mid - 0.25).abs() < 0.01, "mid sample {mid}");
    }

    #[test]
    fn upsampling_keeps_exact_length_without_edge_silence() {
        let mut c = clip(24_000, 1, 24_000);
        resample_clip(&mut c, 48_000, 1024).unwrap();
        assert_eq!(c.rate, 48_000);
        assert_eq!(c.frames(), 48_000);
        assert_no_edge_silence(&c);
    }

    #[test]
    fn cd_rate_to_48k_loops_without_a_gap() {
        let mut c = clip(44_100, 1, 44_100);
        resample_clip(&mut c, 48_000, 1024).unwrap();
        assert_eq!(c.frames(), 48_000);
        assert_no_edge_silence(&c);
    }

    #[test]
    fn stereo_downsampling_keeps_channel_layout() {
        let mut c = clip(48_000, 2, 4_800);
        resample_clip(&mut c, 44_100, 512).unwrap();
        assert_eq!(c.channels, 2);
        assert_eq!(c.frames(), 4_410);
        assert_eq!(c.samples.len(), 4_410 * 2);
        assert_no_edge_silence(&c);
    }

    #[test]
    fn output_capacity_has_headroom() {
        assert!(output_capacity(1024, 2.0) >= 2048);
        assert!(output_capacity(1, 0.5) >= 1);
    }
}
