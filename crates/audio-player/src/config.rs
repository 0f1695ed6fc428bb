/// Engine tuning shared by decode, resample and output stages.
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    /// Output device substring; `None` selects the host default.
    pub device: Option<String>,
    /// Resampler chunk size in frames.
    pub chunk_frames: usize,
    /// Fixed device buffer in frames; `None` leaves it to the device.
    pub buffer_frames: Option<u32>,
    /// Longest clip accepted by the decode-to-memory stage.
    pub max_clip_seconds: u32,
}

impl Default for PlaybackConfig {
    /// Defaults tuned for short cue and ambience clips.
    fn default() -> Self {
        Self {
            device: None,
            chunk_frames: 1024,
            buffer_frames: None,
            max_clip_seconds: 900,
        }
    }
}
