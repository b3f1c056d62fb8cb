//! Rouse Client Library
//!
//! The client half of the wake-session contract: the interaction
//! orchestrator that drives the enforced loop. It owns the playback
//! sequencer (at most one clip in flight), the named-timer scheduler
//! (idle nudge, countdown, auto-record, silent retry), and the HTTP
//! protocol client. The `client` binary wraps this into a small CLI.

pub mod client;
pub mod event;
pub mod orchestrator;
pub mod playback;
pub mod timers;
