//! Session Phase State Machine
//!
//! A wake session moves forward through a closed set of phases, from the
//! initial `Awakening` to the terminal `Release`. The failure branch
//! (`Resisting` vs `Escalating`) is decided by the session's escalation
//! level against a configurable threshold; everything else is a fixed
//! edge in the graph. Phases serialize in SCREAMING_SNAKE_CASE to stay
//! wire-compatible with existing clients.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The stages of the enforced wake ritual.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Initial phase: the alarm fired and the user has not responded yet.
    Awakening,
    /// The user responded incorrectly a small number of times.
    Resisting,
    /// Repeated failures pushed the session past the escalation threshold.
    Escalating,
    /// One correct proof of compliance has been given.
    Compliant,
    /// Optional morning-routine step sequence (feature-gated).
    RoutineActive,
    /// Terminal phase: the session is over and the user is free.
    Release,
}

impl Phase {
    /// True once the session has reached its terminal phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Release)
    }

    /// True for the two phases reached through failed validation.
    pub fn is_failure(&self) -> bool {
        matches!(self, Phase::Resisting | Phase::Escalating)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Awakening => "AWAKENING",
            Phase::Resisting => "RESISTING",
            Phase::Escalating => "ESCALATING",
            Phase::Compliant => "COMPLIANT",
            Phase::RoutineActive => "ROUTINE_ACTIVE",
            Phase::Release => "RELEASE",
        };
        write!(f, "{}", name)
    }
}

/// Picks the failure phase for a freshly incremented escalation level.
///
/// Levels at or below the threshold resolve to `Resisting`; levels above
/// it resolve to `Escalating`. The threshold is a tunable constant owned
/// by configuration, not hardcoded at the call sites.
pub fn failure_phase(escalation_level: u32, threshold: u32) -> Phase {
    if escalation_level <= threshold {
        Phase::Resisting
    } else {
        Phase::Escalating
    }
}
