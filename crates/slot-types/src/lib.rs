use serde::{Deserialize, Serialize};

/// Keep-alive controller state.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeepAliveState {
    /// No background context and no suspend inhibitor are held.
    #[default]
    Stopped,
    /// Background context is up and the host is prevented from suspending.
    Running,
}

/// Point-in-time status of one slot.
///
/// Ids that are not loaded report zero values rather than an error, so this
/// payload is always available for any id a client asks about.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlotStatus {
    /// Slot identifier as chosen by the caller.
    pub id: String,
    /// `true` while the engine is producing sound.
    pub is_playing: bool,
    /// Current playback position in milliseconds.
    pub position_ms: u64,
    /// Total clip duration in milliseconds (`0` when unknown).
    pub duration_ms: u64,
    /// Effective volume in `0.0..=1.0`.
    pub volume: f32,
}

impl SlotStatus {
    /// Zero-valued status reported for an id with no loaded slot.
    pub fn absent(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// Aggregate keep-alive view exposed by the control API.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KeepAliveStatus {
    /// Current controller state.
    pub state: KeepAliveState,
    /// Number of loaded slots.
    pub slots_loaded: usize,
    /// Whether any loaded slot is currently playing.
    pub any_playing: bool,
}

/// Body of a load request; the slot id travels in the path.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoadRequest {
    /// Local file path or `file://` URI.
    pub file_path: String,
    /// Loop the clip until stopped.
    #[serde(default, rename = "loop")]
    pub looping: bool,
}

/// Body of a volume request.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct VolumeRequest {
    /// Requested volume; out-of-range values are clamped by the pool.
    pub volume: f32,
}
