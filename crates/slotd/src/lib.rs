//! `slotd`: a daemon exposing a bounded pool of audio playback slots over HTTP
//! and holding the host awake while any slot is audible.

pub mod cli;
pub mod config;
pub mod http_api;
pub mod keep_alive;
pub mod route_watch;
pub mod runtime;
