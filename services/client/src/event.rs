//! Orchestrator Event Stream
//!
//! Everything that can happen to the interaction loop arrives as one of
//! these events on a single channel: timer fires, playback completions,
//! and user actions. The orchestrator processes them one at a time, so
//! timers and request callbacks interleave but never run in parallel.

use crate::timers::TimerFired;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A named timer fired; carries its generation stamp for staleness
    /// checks.
    Timer(TimerFired),
    /// The current playback sequence (including its cooldown) finished.
    PlaybackFinished,
    /// The user submitted typed input.
    UserTyped(String),
    /// A spoken-keyword candidate arrived (already transcribed).
    SpokenCaptured(String),
    /// First user interaction; unlocks gated audio playback.
    Gesture,
}
