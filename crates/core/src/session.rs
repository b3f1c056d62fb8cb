//! Wake Session Entity
//!
//! `WakeSession` is the authoritative per-alarm state: current phase,
//! escalation counters, and the two-stage proof bookkeeping. All mutation
//! happens through the small set of `record_*`/`apply_*` methods so the
//! invariants (forward-only phases, monotone escalation, `released_at`
//! set exactly once) hold by construction. Callers never mutate fields
//! directly; the store hands sessions out by snapshot only.

use crate::phase::{Phase, failure_phase};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of applying a passing validation to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// First cumulative pass: the session is now `Compliant`.
    Compliant,
    /// Second pass with the routine feature enabled: routine starts.
    RoutineStarted,
    /// Second cumulative pass: the session is released.
    Released,
}

/// State for a single wake session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WakeSession {
    pub id: Uuid,
    pub phase: Phase,
    /// Monotone counter of cumulative failed compliance attempts. Never
    /// decreases for the lifetime of the session.
    pub escalation_level: u32,
    pub failed_attempts: u32,
    /// Idle re-prompts issued while still in `Awakening`.
    pub nudge_count: u32,
    /// True once the spoken half of the dual proof has been accepted;
    /// the remaining step is typed-only.
    pub spoken_verified: bool,
    /// Proof-of-action capture flag (external camera flow, bookkeeping only).
    pub proof_captured: bool,
    /// Current step index while the routine feature is active.
    pub routine_step: usize,
    pub routine_complete: bool,
    pub personality_id: String,
    pub created_at: DateTime<Utc>,
    /// Set exactly once, on entry to `Release`.
    pub released_at: Option<DateTime<Utc>>,
    /// Bumped on every store mutation; drives inactivity expiry.
    pub last_activity: DateTime<Utc>,
}

impl WakeSession {
    /// Creates a fresh session in `Awakening` bound to a personality.
    pub fn new(personality_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            phase: Phase::Awakening,
            escalation_level: 0,
            failed_attempts: 0,
            nudge_count: 0,
            spoken_verified: false,
            proof_captured: false,
            routine_step: 0,
            routine_complete: false,
            personality_id: personality_id.to_string(),
            created_at: now,
            released_at: None,
            last_activity: now,
        }
    }

    pub fn is_released(&self) -> bool {
        self.phase.is_terminal()
    }

    /// True when the session has seen no activity for longer than `ttl`.
    pub fn is_idle_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.last_activity > ttl
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Records an idle re-prompt. Only legal in `Awakening`; the protocol
    /// layer enforces the phase guard before calling this.
    pub fn record_nudge(&mut self) {
        self.nudge_count += 1;
    }

    /// Records a failed validation attempt: both counters increment
    /// unconditionally and the phase moves to the failure branch chosen
    /// by the escalation threshold.
    pub fn record_failure(&mut self, threshold: u32) {
        self.escalation_level += 1;
        self.failed_attempts += 1;
        self.phase = failure_phase(self.escalation_level, threshold);
    }

    /// Marks the spoken half of the dual proof as verified without
    /// advancing the phase.
    pub fn mark_spoken_verified(&mut self) {
        self.spoken_verified = true;
    }

    /// Applies a passing validation. The first pass lands in `Compliant`;
    /// a pass while already `Compliant` releases the session (or starts
    /// the routine when that feature is on). Escalation counters are
    /// deliberately left untouched: the level is monotone.
    pub fn record_pass(&mut self, routine_enabled: bool) -> PassOutcome {
        self.spoken_verified = true;
        match self.phase {
            Phase::Compliant => {
                if routine_enabled {
                    self.phase = Phase::RoutineActive;
                    PassOutcome::RoutineStarted
                } else {
                    self.release();
                    PassOutcome::Released
                }
            }
            Phase::RoutineActive => {
                if self.routine_complete {
                    self.release();
                    PassOutcome::Released
                } else {
                    PassOutcome::RoutineStarted
                }
            }
            _ => {
                self.phase = Phase::Compliant;
                PassOutcome::Compliant
            }
        }
    }

    /// Advances the routine by one step; entering `Release` when the last
    /// step completes. Returns the new step index and whether the routine
    /// has finished.
    pub fn advance_routine(&mut self, total_steps: usize) -> (usize, bool) {
        self.routine_step += 1;
        if self.routine_step >= total_steps {
            self.routine_complete = true;
            self.release();
        }
        (self.routine_step, self.routine_complete)
    }

    fn release(&mut self) {
        self.phase = Phase::Release;
        if self.released_at.is_none() {
            self.released_at = Some(Utc::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_starts_awakening() {
        let session = WakeSession::new("default_savage");
        assert_eq!(session.phase, Phase::Awakening);
        assert_eq!(session.escalation_level, 0);
        assert_eq!(session.failed_attempts, 0);
        assert!(!session.spoken_verified);
        assert!(session.released_at.is_none());
    }

    #[test]
    fn test_failure_increments_both_counters() {
        let mut session = WakeSession::new("default_savage");
        session.record_failure(2);
        assert_eq!(session.escalation_level, 1);
        assert_eq!(session.failed_attempts, 1);
        assert_eq!(session.phase, Phase::Resisting);
    }

    #[test]
    fn test_failures_cross_threshold_into_escalating() {
        let mut session = WakeSession::new("default_savage");
        for _ in 0..3 {
            session.record_failure(2);
        }
        assert_eq!(session.escalation_level, 3);
        assert_eq!(session.phase, Phase::Escalating);
    }

    #[test]
    fn test_escalation_is_monotone_across_pass_fail_interleaving() {
        let mut session = WakeSession::new("default_savage");
        let mut observed = vec![session.escalation_level];
        session.record_failure(2);
        observed.push(session.escalation_level);
        session.record_failure(2);
        observed.push(session.escalation_level);
        session.record_pass(false);
        observed.push(session.escalation_level);
        session.record_failure(2);
        observed.push(session.escalation_level);
        session.record_pass(false);
        observed.push(session.escalation_level);

        assert!(observed.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(session.escalation_level, 3);
    }

    #[test]
    fn test_two_passes_release() {
        let mut session = WakeSession::new("default_savage");
        assert_eq!(session.record_pass(false), PassOutcome::Compliant);
        assert_eq!(session.phase, Phase::Compliant);
        assert!(session.released_at.is_none());

        assert_eq!(session.record_pass(false), PassOutcome::Released);
        assert_eq!(session.phase, Phase::Release);
        assert!(session.released_at.is_some());
    }

    #[test]
    fn test_failure_from_compliant_returns_to_failure_branch() {
        let mut session = WakeSession::new("default_savage");
        session.record_pass(false);
        session.record_failure(2);
        assert_eq!(session.phase, Phase::Resisting);
        // A later pass still needs a second one from Compliant to release.
        assert_eq!(session.record_pass(false), PassOutcome::Compliant);
    }

    #[test]
    fn test_routine_path_to_release() {
        let mut session = WakeSession::new("default_savage");
        session.record_pass(true);
        assert_eq!(session.record_pass(true), PassOutcome::RoutineStarted);
        assert_eq!(session.phase, Phase::RoutineActive);

        let (step, complete) = session.advance_routine(2);
        assert_eq!((step, complete), (1, false));
        let (step, complete) = session.advance_routine(2);
        assert_eq!((step, complete), (2, true));
        assert_eq!(session.phase, Phase::Release);
        assert!(session.released_at.is_some());
    }

    #[test]
    fn test_released_at_set_only_once() {
        let mut session = WakeSession::new("default_savage");
        session.record_pass(false);
        session.record_pass(false);
        let first = session.released_at;
        session.release();
        assert_eq!(session.released_at, first);
    }

    #[test]
    fn test_nudge_touches_only_nudge_count() {
        let mut session = WakeSession::new("default_savage");
        session.record_nudge();
        session.record_nudge();
        assert_eq!(session.nudge_count, 2);
        assert_eq!(session.phase, Phase::Awakening);
        assert_eq!(session.escalation_level, 0);
    }

    #[test]
    fn test_idle_expiry_window() {
        let mut session = WakeSession::new("default_savage");
        session.last_activity = Utc::now() - Duration::minutes(31);
        assert!(session.is_idle_expired(Duration::minutes(30), Utc::now()));
        assert!(!session.is_idle_expired(Duration::minutes(60), Utc::now()));
    }
}
