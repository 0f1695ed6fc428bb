//! Decode-to-memory stage.
//!
//! Uses Symphonia to:
//! - probe the input container/codec
//! - decode every packet of the default track into interleaved `f32` samples
//!
//! Clips are short cues and loops, so the whole clip is held in memory and the
//! output callback never waits on a decoder.

use std::fs::File;

use anyhow::{Context, Result, anyhow};
use slot_pool::ResolvedSource;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Metadata captured while probing the source.
#[derive(Clone, Debug, Default)]
pub struct SourceInfo {
    /// Codec name (best-effort).
    pub codec: Option<String>,
    /// Source bit depth (best-effort).
    pub bit_depth: Option<u16>,
    /// Container/extension hint (best-effort).
    pub container: Option<String>,
}

/// A fully decoded clip.
#[derive(Clone, Debug)]
pub struct DecodedClip {
    pub rate: u32,
    pub channels: usize,
    /// Interleaved samples.
    pub samples: Vec<f32>,
    pub source_info: SourceInfo,
}

impl DecodedClip {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1)
    }

    /// Duration derived from the decoded sample count.
    pub fn duration_ms(&self) -> u64 {
        frames_to_ms(self.frames() as u64, self.rate)
    }
}

/// Decode `source` into memory, refusing clips longer than `max_seconds`.
pub fn decode_file(source: &ResolvedSource, max_seconds: u32) -> Result<DecodedClip> {
    let path = source.path.as_path();
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;

    let mut hint = Hint::new();
    let container = source.extension();
    if let Some(ext) = container.as_deref() {
        hint.with_extension(ext);
    }

    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("probe {}", path.display()))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("No default audio track"))?;
    let track_id = track.id;
    let codec_params: CodecParameters = track.codec_params.clone();

    let channels = codec_params
        .channels
        .ok_or_else(|| anyhow!("Unknown channels"))?
        .count();
    let rate = codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("Unknown sample rate"))?;
    if rate == 0 || channels == 0 {
        return Err(anyhow!("Invalid stream layout: {rate} Hz, {channels} channels"));
    }

    if let Some(ms) = duration_ms_from_codec_params(&codec_params) {
        if ms > u64::from(max_seconds) * 1000 {
            return Err(anyhow!(
                "clip is {}s long, limit is {max_seconds}s",
                ms / 1000
            ));
        }
    }
    let max_samples = (max_seconds as usize)
        .saturating_mul(rate as usize)
        .saturating_mul(channels);

    let source_info = SourceInfo {
        codec: codec_name_from_params(&codec_params),
        bit_depth: codec_params
            .bits_per_sample
            .or(codec_params.bits_per_coded_sample)
            .and_then(|v| u16::try_from(v).ok()),
        container,
    };

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .context("create decoder")?;

    let mut samples: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e).context("read packet"),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::debug!(error = %e, "skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e).context("decode packet"),
        };

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());

        if samples.len() > max_samples {
            return Err(anyhow!("clip exceeds {max_seconds}s limit"));
        }
    }

    if samples.is_empty() {
        return Err(anyhow!("no audio decoded from {}", path.display()));
    }

    tracing::debug!(
        path = %path.display(),
        rate,
        channels,
        frames = samples.len() / channels,
        "clip decoded"
    );

    Ok(DecodedClip {
        rate,
        channels,
        samples,
        source_info,
    })
}

pub(crate) fn frames_to_ms(frames: u64, rate: u32) -> u64 {
    if rate == 0 {
        return 0;
    }
    frames.saturating_mul(1000) / u64::from(rate)
}

pub(crate) fn ms_to_frames(ms: u64, rate: u32) -> u64 {
    ms.saturating_mul(u64::from(rate)) / 1000
}

/// Best-effort duration in milliseconds from codec metadata.
///
/// Returns `None` if the container does not provide total frames or sample rate.
fn duration_ms_from_codec_params(codec_params: &CodecParameters) -> Option<u64> {
    let frames = codec_params.n_frames?;
    let rate = codec_params.sample_rate?;
    if rate == 0 {
        return None;
    }
    Some(frames_to_ms(frames, rate))
}

/// Best-effort codec label used in logs.
fn codec_name_from_params(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_OPUS => "OPUS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name.to_string())
}
