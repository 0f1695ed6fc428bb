//! In-memory engines, resolvers and keep-alive providers.
//!
//! Compiled for this crate's tests and for downstream crates that enable the
//! `test-util` feature.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};

use crate::engine::{EngineFactory, PlaybackEngine};
use crate::error::SlotError;
use crate::home::{HomeContext, HomeControl, HomeThread};
use crate::lifecycle::{KeepAliveContext, KeepAliveProvider, WakeGuard};
use crate::source::{ResolvedSource, SourceResolver};

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Resolver that accepts a fixed set of source strings.
#[derive(Debug, Default)]
pub struct InMemoryResolver {
    known: HashSet<String>,
}

impl InMemoryResolver {
    pub fn with_sources<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: sources.into_iter().map(Into::into).collect(),
        }
    }
}

impl SourceResolver for InMemoryResolver {
    fn resolve(&self, source: &str) -> Result<ResolvedSource, SlotError> {
        if self.known.contains(source) {
            Ok(ResolvedSource {
                uri: source.to_string(),
                path: source.into(),
            })
        } else {
            Err(SlotError::invalid_source(source, "audio file does not exist"))
        }
    }
}

/// Observable state of one fake engine, shared with the test.
#[derive(Debug, Default)]
pub struct FakeEngineState {
    pub source: String,
    pub primed: AtomicBool,
    pub playing: AtomicBool,
    pub looping: AtomicBool,
    pub position_ms: AtomicU64,
    pub volume: Mutex<f32>,
    pub play_calls: AtomicUsize,
    pub releases: AtomicUsize,
    /// Name of the thread `release` ran on.
    pub released_on: Mutex<Option<String>>,
}

impl FakeEngineState {
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn released_on(&self) -> Option<String> {
        self.released_on.lock().unwrap().clone()
    }
}

/// Engine that records every call instead of producing sound.
pub struct FakeEngine {
    state: Arc<FakeEngineState>,
    home: HomeContext,
    duration_ms: u64,
    fail_prime: bool,
}

impl PlaybackEngine for FakeEngine {
    fn prime(&mut self) -> Result<()> {
        if self.fail_prime {
            return Err(anyhow!("no default audio track"));
        }
        self.state.primed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn set_looping(&mut self, looping: bool) {
        self.state.looping.store(looping, Ordering::SeqCst);
    }

    fn play(&mut self) {
        self.state.play_calls.fetch_add(1, Ordering::SeqCst);
        self.state.playing.store(true, Ordering::SeqCst);
    }

    fn pause(&mut self) {
        self.state.playing.store(false, Ordering::SeqCst);
    }

    fn seek(&mut self, position_ms: u64) {
        self.state
            .position_ms
            .store(position_ms.min(self.duration_ms), Ordering::SeqCst);
    }

    fn set_volume(&mut self, volume: f32) {
        *self.state.volume.lock().unwrap() = volume;
    }

    fn is_playing(&self) -> bool {
        self.state.playing.load(Ordering::SeqCst)
    }

    fn position_ms(&self) -> u64 {
        self.state.position_ms.load(Ordering::SeqCst)
    }

    fn duration_ms(&self) -> Option<u64> {
        self.state
            .primed
            .load(Ordering::SeqCst)
            .then_some(self.duration_ms)
    }

    fn volume(&self) -> f32 {
        *self.state.volume.lock().unwrap()
    }

    fn home(&self) -> &HomeContext {
        &self.home
    }

    fn release(self: Box<Self>) -> HomeControl {
        self.state.playing.store(false, Ordering::SeqCst);
        *self.state.released_on.lock().unwrap() =
            std::thread::current().name().map(str::to_string);
        self.state.releases.fetch_add(1, Ordering::SeqCst);
        HomeControl::Continue
    }
}

/// Factory producing [`FakeEngine`]s that share one home thread.
pub struct FakeEngineFactory {
    home: HomeThread,
    duration_ms: u64,
    fail_prime: Mutex<HashSet<String>>,
    created: Mutex<Vec<Arc<FakeEngineState>>>,
}

impl FakeEngineFactory {
    /// Home thread name used by every engine from this factory.
    pub const HOME_NAME: &'static str = "fake-engine-home";

    pub fn new(duration_ms: u64) -> Self {
        Self {
            home: HomeThread::spawn(Self::HOME_NAME).expect("spawn fake home thread"),
            duration_ms,
            fail_prime: Mutex::new(HashSet::new()),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Make priming fail for engines created from `source`.
    pub fn fail_prime_for(&self, source: &str) {
        self.fail_prime.lock().unwrap().insert(source.to_string());
    }

    /// Every engine created so far, in creation order.
    pub fn created(&self) -> Vec<Arc<FakeEngineState>> {
        self.created.lock().unwrap().clone()
    }

    /// Most recent engine created for `source`.
    pub fn last_for(&self, source: &str) -> Option<Arc<FakeEngineState>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| s.source == source)
            .cloned()
    }
}

impl EngineFactory for FakeEngineFactory {
    fn create(&self, source: &ResolvedSource) -> Result<Box<dyn PlaybackEngine>> {
        let state = Arc::new(FakeEngineState {
            source: source.uri.clone(),
            volume: Mutex::new(1.0),
            ..FakeEngineState::default()
        });
        self.created.lock().unwrap().push(state.clone());
        let fail_prime = self.fail_prime.lock().unwrap().contains(&source.uri);
        Ok(Box::new(FakeEngine {
            state,
            home: self.home.context(),
            duration_ms: self.duration_ms,
            fail_prime,
        }))
    }
}

/// Counters observed by tests of the keep-alive controller.
#[derive(Debug, Default)]
pub struct FakeKeepAliveProbe {
    pub contexts_started: AtomicUsize,
    pub active_contexts: AtomicUsize,
    pub wakes_acquired: AtomicUsize,
    pub wakes_held: AtomicUsize,
    pub fail_acquire: AtomicBool,
    pub fail_release: AtomicBool,
}

impl FakeKeepAliveProbe {
    pub fn active_contexts(&self) -> usize {
        self.active_contexts.load(Ordering::SeqCst)
    }

    pub fn wakes_held(&self) -> usize {
        self.wakes_held.load(Ordering::SeqCst)
    }
}

/// Keep-alive provider that only counts resources.
#[derive(Clone, Default)]
pub struct FakeKeepAlive {
    probe: Arc<FakeKeepAliveProbe>,
}

impl FakeKeepAlive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> Arc<FakeKeepAliveProbe> {
        self.probe.clone()
    }
}

struct FakeContext(Arc<FakeKeepAliveProbe>);

impl KeepAliveContext for FakeContext {
    fn shutdown(self: Box<Self>) {
        self.0.active_contexts.fetch_sub(1, Ordering::SeqCst);
    }
}

struct FakeWake(Arc<FakeKeepAliveProbe>);

impl WakeGuard for FakeWake {
    fn release(self: Box<Self>) -> Result<()> {
        self.0.wakes_held.fetch_sub(1, Ordering::SeqCst);
        if self.0.fail_release.load(Ordering::SeqCst) {
            return Err(anyhow!("wake lock under-locked"));
        }
        Ok(())
    }
}

impl KeepAliveProvider for FakeKeepAlive {
    fn start_context(&self) -> Result<Box<dyn KeepAliveContext>> {
        self.probe.contexts_started.fetch_add(1, Ordering::SeqCst);
        self.probe.active_contexts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeContext(self.probe.clone())))
    }

    fn acquire_wake(&self) -> Result<Box<dyn WakeGuard>> {
        if self.probe.fail_acquire.load(Ordering::SeqCst) {
            return Err(anyhow!("inhibitor unavailable"));
        }
        self.probe.wakes_acquired.fetch_add(1, Ordering::SeqCst);
        self.probe.wakes_held.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeWake(self.probe.clone())))
    }
}
