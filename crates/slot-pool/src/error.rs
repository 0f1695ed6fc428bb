use thiserror::Error;

/// Failures reported by slot pool operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SlotError {
    /// The source could not be resolved, or no engine could be primed from it.
    #[error("invalid audio source '{uri}': {reason}")]
    InvalidSource { uri: String, reason: String },

    /// A new id was loaded while the pool already held its maximum slot count.
    #[error("maximum number of audio slots ({max}) reached")]
    CapacityExceeded { max: usize },

    /// The operation needs a loaded slot and none exists for this id.
    #[error("slot '{0}' not preloaded")]
    NotLoaded(String),
}

impl SlotError {
    pub(crate) fn invalid_source(uri: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSource {
            uri: uri.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failures while bringing the keep-alive controller up.
///
/// Tearing it down never fails from the caller's point of view; release
/// problems are logged where they happen.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeepAliveError {
    #[error("failed to start keep-alive context: {0}")]
    Context(String),

    #[error("failed to acquire suspend inhibitor: {0}")]
    WakeLock(String),
}
