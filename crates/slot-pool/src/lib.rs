//! Bounded pool of playback engines addressed by caller-chosen slot ids, plus the
//! keep-alive controller that holds the host awake while any slot is audible.
//!
//! - [`pool::SlotPool`] owns the slot mapping behind one pool-wide lock.
//! - [`lifecycle::LifecycleController`] is the two-state keep-alive machine.
//! - [`service::SlotService`] ties them together for callers that should not
//!   have to remember to re-evaluate keep-alive after every operation.

pub mod engine;
pub mod error;
pub mod home;
pub mod lifecycle;
pub mod pool;
pub mod service;
pub mod source;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use engine::{EngineFactory, PlaybackEngine};
pub use error::{KeepAliveError, SlotError};
pub use home::{HomeContext, HomeControl, HomeThread};
pub use lifecycle::{KeepAliveProvider, LifecycleController};
pub use pool::{MAX_SLOTS, SlotPool};
pub use service::SlotService;
pub use slot_types::{KeepAliveState, KeepAliveStatus, SlotStatus};
pub use source::{FileSourceResolver, ResolvedSource, SourceResolver};
