//! Keep-alive lifecycle: a two-state machine holding a background context and a
//! suspend inhibitor while audio is audible.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{RecvTimeoutError, Sender};
use slot_types::KeepAliveState;

use crate::error::KeepAliveError;

/// A running background execution context.
pub trait KeepAliveContext: Send {
    /// Stop the context and wait for it to exit.
    fn shutdown(self: Box<Self>);
}

/// A held suspend inhibitor.
pub trait WakeGuard: Send {
    fn release(self: Box<Self>) -> Result<()>;
}

/// Platform capabilities used by [`LifecycleController`].
pub trait KeepAliveProvider: Send + Sync {
    fn start_context(&self) -> Result<Box<dyn KeepAliveContext>>;

    fn acquire_wake(&self) -> Result<Box<dyn WakeGuard>>;
}

enum Phase {
    Stopped,
    Running {
        context: Box<dyn KeepAliveContext>,
        wake: Box<dyn WakeGuard>,
    },
}

/// Idempotent Stopped/Running keep-alive state machine.
///
/// `Running` always owns exactly one context and one wake guard; `Stopped` owns
/// neither. Transitions are serialized by an internal lock, so concurrent
/// `start` calls produce a single context.
pub struct LifecycleController {
    provider: Box<dyn KeepAliveProvider>,
    phase: Mutex<Phase>,
}

impl LifecycleController {
    pub fn new(provider: impl KeepAliveProvider + 'static) -> Self {
        Self {
            provider: Box::new(provider),
            phase: Mutex::new(Phase::Stopped),
        }
    }

    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enter `Running`. A no-op when already running.
    ///
    /// If the inhibitor cannot be acquired the freshly started context is shut
    /// down again and the controller stays `Stopped`.
    pub fn start(&self) -> Result<(), KeepAliveError> {
        let mut phase = self.phase();
        if matches!(*phase, Phase::Running { .. }) {
            tracing::debug!("keep-alive already running");
            return Ok(());
        }

        let context = self
            .provider
            .start_context()
            .map_err(|e| KeepAliveError::Context(format!("{e:#}")))?;
        let wake = match self.provider.acquire_wake() {
            Ok(wake) => wake,
            Err(e) => {
                context.shutdown();
                return Err(KeepAliveError::WakeLock(format!("{e:#}")));
            }
        };

        *phase = Phase::Running { context, wake };
        tracing::info!("keep-alive started");
        Ok(())
    }

    /// Return to `Stopped`, releasing the inhibitor before the context.
    ///
    /// A no-op when already stopped. Release failures are logged and do not
    /// prevent the transition.
    pub fn stop(&self) {
        let mut phase = self.phase();
        match std::mem::replace(&mut *phase, Phase::Stopped) {
            Phase::Stopped => tracing::debug!("keep-alive already stopped"),
            Phase::Running { context, wake } => {
                if let Err(e) = wake.release() {
                    tracing::warn!(error = %format!("{e:#}"), "suspend inhibitor release failed");
                }
                context.shutdown();
                tracing::info!("keep-alive stopped");
            }
        }
    }

    pub fn state(&self) -> KeepAliveState {
        match *self.phase() {
            Phase::Stopped => KeepAliveState::Stopped,
            Phase::Running { .. } => KeepAliveState::Running,
        }
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Named thread that stays alive until shut down, logging a heartbeat.
pub struct BackgroundContext {
    stop_tx: Sender<()>,
    join: JoinHandle<()>,
}

impl BackgroundContext {
    pub fn spawn(name: &str, heartbeat: Duration) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let thread_name = name.to_string();
        let join = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                tracing::debug!(context = %thread_name, "keep-alive context running");
                let mut beats = 0u64;
                loop {
                    match stop_rx.recv_timeout(heartbeat) {
                        Err(RecvTimeoutError::Timeout) => {
                            beats += 1;
                            tracing::trace!(context = %thread_name, beats, "keep-alive heartbeat");
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::debug!(context = %thread_name, beats, "keep-alive context exited");
            })?;
        Ok(Self { stop_tx, join })
    }
}

impl KeepAliveContext for BackgroundContext {
    fn shutdown(self: Box<Self>) {
        let Self { stop_tx, join } = *self;
        let _ = stop_tx.send(());
        if join.join().is_err() {
            tracing::warn!("keep-alive context panicked");
        }
    }
}
