//! Wake Session Protocol
//!
//! The server half of the contract: Start, Validate, Nudge, and the
//! optional routine/proof extensions. The protocol composes the store,
//! the keyword matcher, and the message selector, and calls out to the
//! synthesis collaborator with a bounded timeout. Every state transition
//! happens inside the store's per-id lock; message building and speech
//! synthesis run after the lock is released.
//!
//! A failing keyword check is a normal outcome (`valid: false`), never an
//! error. Synthesis failure degrades a response to text-only; it never
//! blocks or fails a transition.

use crate::keyword::{KeywordMatcher, KeywordMode, MatchOutcome};
use crate::messages::{BuiltMessage, MessageContext, MessageSelector};
use crate::personality::{DEFAULT_PERSONALITY, Personality, personality};
use crate::phase::Phase;
use crate::session::{PassOutcome, WakeSession};
use crate::speech::{AudioRef, SpeechSynthesizer};
use crate::store::{SessionStore, StoreError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

/// Tunables owned by configuration, not hardcoded in the engine.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Escalation levels at or below this resolve failures to
    /// `Resisting`; above it, `Escalating`.
    pub escalation_threshold: u32,
    /// When true, the second compliance pass starts the morning routine
    /// instead of releasing immediately.
    pub routine_enabled: bool,
    /// Voice passed to the synthesis engine.
    pub speaker: String,
    /// Upper bound on any single synthesis call.
    pub synthesis_timeout: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            escalation_threshold: 2,
            routine_enabled: false,
            speaker: "default".to_string(),
            synthesis_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("session not found")]
    NotFound,
    #[error("operation not allowed in phase {0}")]
    InvalidPhase(Phase),
}

impl From<StoreError> for ProtocolError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ProtocolError::NotFound,
        }
    }
}

/// Append-only analytics sink for session lifecycle events. Failures in
/// an implementation must be swallowed and logged; history never affects
/// control flow.
#[async_trait]
pub trait WakeHistory: Send + Sync {
    async fn record_start(&self, session: &WakeSession);
    async fn record_end(&self, session: &WakeSession);
}

/// History sink that records nothing.
pub struct NoopHistory;

#[async_trait]
impl WakeHistory for NoopHistory {
    async fn record_start(&self, _session: &WakeSession) {}
    async fn record_end(&self, _session: &WakeSession) {}
}

/// A resolved message plus its (possibly absent) audio rendering.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub message_id: String,
    pub text: String,
    pub audio_ref: Option<AudioRef>,
}

#[derive(Debug, Clone)]
pub struct StartOutput {
    pub session_id: Uuid,
    pub phase: Phase,
    pub escalation_level: u32,
    pub message: Utterance,
    pub prompt: Option<Utterance>,
}

#[derive(Debug, Clone)]
pub struct ValidateOutput {
    /// Whether this specific call passed the keyword check, independent
    /// of which phase it landed in.
    pub valid: bool,
    pub phase: Phase,
    pub escalation_level: u32,
    pub released: bool,
    pub spoken_verified: bool,
    pub message: Utterance,
    pub prompt: Option<Utterance>,
}

#[derive(Debug, Clone)]
pub struct NudgeOutput {
    pub phase: Phase,
    pub escalation_level: u32,
    pub message: Utterance,
    pub prompt: Option<Utterance>,
}

#[derive(Debug, Clone)]
pub struct RoutineOutput {
    pub phase: Phase,
    pub step_index: usize,
    pub routine_complete: bool,
    pub message: Utterance,
    pub prompt: Option<Utterance>,
}

/// What one validate call did to the session, decided under its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValidateStep {
    AlreadyReleased,
    EmptyAttempt { had_failures: bool },
    SpokenAccepted,
    WrongFirstStage,
    WrongTyped,
    Passed(PassOutcome),
}

pub struct WakeProtocol<S> {
    store: S,
    matcher: KeywordMatcher,
    selector: MessageSelector,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    history: Arc<dyn WakeHistory>,
    config: ProtocolConfig,
}

impl<S: SessionStore> WakeProtocol<S> {
    pub fn new(
        store: S,
        matcher: KeywordMatcher,
        selector: MessageSelector,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        history: Arc<dyn WakeHistory>,
        config: ProtocolConfig,
    ) -> Self {
        Self {
            store,
            matcher,
            selector,
            synthesizer,
            history,
            config,
        }
    }

    /// Drops sessions idle past the store TTL. Exposed for the periodic
    /// sweep task in the service binary.
    pub async fn expire_idle(&self) -> usize {
        self.store.expire_idle().await
    }

    /// Creates a session in `Awakening` and returns the opening message
    /// plus the listening prompt.
    pub async fn start(
        &self,
        alarm_time: Option<String>,
        user_name: Option<String>,
    ) -> StartOutput {
        let session = WakeSession::new(DEFAULT_PERSONALITY.id);
        let session_id = session.id;
        self.history.record_start(&session).await;
        self.store.insert(session).await;
        info!(%session_id, "wake session started");

        let ctx = MessageContext {
            user_name,
            alarm_time,
        };
        let persona = &DEFAULT_PERSONALITY;
        let message = self
            .voice(self.selector.phase_message(Phase::Awakening, 0, persona, &ctx))
            .await;
        let prompt = Some(
            self.voice(self.selector.listening_prompt(Phase::Awakening))
                .await,
        );

        StartOutput {
            session_id,
            phase: Phase::Awakening,
            escalation_level: 0,
            message,
            prompt,
        }
    }

    /// Runs the dual-stage proof check and applies the phase transition.
    pub async fn validate(
        &self,
        session_id: Uuid,
        typed: &str,
        spoken: Option<&str>,
    ) -> Result<ValidateOutput, ProtocolError> {
        let (step, session) = self
            .store
            .mutate(session_id, |s| {
                let step = self.classify(s, typed, spoken);
                (step, s.clone())
            })
            .await?;

        if step == ValidateStep::Passed(PassOutcome::Released) {
            self.history.record_end(&session).await;
        }
        info!(
            %session_id,
            phase = %session.phase,
            escalation = session.escalation_level,
            ?step,
            "validate applied"
        );

        let persona = lookup_personality(&session);
        let ctx = MessageContext::default();
        let (built, with_prompt) = match step {
            ValidateStep::AlreadyReleased => (
                self.selector
                    .phase_message(Phase::Release, session.escalation_level, persona, &ctx),
                false,
            ),
            ValidateStep::EmptyAttempt { had_failures } => {
                // A silent submission re-prompts; first-timers in dual
                // mode get the explicit phrase instruction instead of a
                // personality line.
                if had_failures || self.matcher.policy().mode == KeywordMode::Single {
                    (
                        self.selector.phase_message(
                            session.phase,
                            session.escalation_level,
                            persona,
                            &ctx,
                        ),
                        true,
                    )
                } else {
                    (
                        BuiltMessage {
                            template_id: "prompt:say_phrase".to_string(),
                            text: format!("Say the phrase: {}.", self.spoken_hint()),
                        },
                        true,
                    )
                }
            }
            ValidateStep::SpokenAccepted => (
                BuiltMessage {
                    template_id: "correct:phrase".to_string(),
                    text: format!("Correct. Now type {}.", self.typed_hint()),
                },
                false,
            ),
            ValidateStep::WrongFirstStage => (
                BuiltMessage {
                    template_id: "resisting:wrong_phrase".to_string(),
                    text: format!("Wrong phrase. Say: {}.", self.spoken_hint()),
                },
                true,
            ),
            ValidateStep::WrongTyped => (
                self.selector.phase_message(
                    session.phase,
                    session.escalation_level,
                    persona,
                    &ctx,
                ),
                true,
            ),
            ValidateStep::Passed(PassOutcome::Compliant) => (
                BuiltMessage {
                    template_id: "correct:type1".to_string(),
                    text: format!("Correct. One more time: type {}.", self.typed_hint()),
                },
                true,
            ),
            ValidateStep::Passed(PassOutcome::RoutineStarted) => {
                (self.selector.routine_step(session.routine_step), true)
            }
            ValidateStep::Passed(PassOutcome::Released) => (
                BuiltMessage {
                    template_id: "correct:release".to_string(),
                    text: "Correct. You're done.".to_string(),
                },
                false,
            ),
        };

        let message = self.voice(built).await;
        let prompt = if with_prompt {
            Some(self.voice(self.selector.listening_prompt(session.phase)).await)
        } else {
            None
        };

        Ok(ValidateOutput {
            valid: matches!(
                step,
                ValidateStep::SpokenAccepted | ValidateStep::Passed(_)
            ),
            phase: session.phase,
            escalation_level: session.escalation_level,
            released: session.is_released(),
            spoken_verified: session.spoken_verified,
            message,
            prompt,
        })
    }

    /// Idle re-prompt; legal only while the session is still `Awakening`.
    pub async fn nudge(&self, session_id: Uuid) -> Result<NudgeOutput, ProtocolError> {
        let session = self
            .store
            .mutate(session_id, |s| {
                if s.phase != Phase::Awakening {
                    return Err(ProtocolError::InvalidPhase(s.phase));
                }
                s.record_nudge();
                Ok(s.clone())
            })
            .await??;
        info!(%session_id, nudge_count = session.nudge_count, "nudge issued");

        let persona = lookup_personality(&session);
        let message = self
            .voice(self.selector.phase_message(
                Phase::Awakening,
                0,
                persona,
                &MessageContext::default(),
            ))
            .await;
        let prompt = Some(
            self.voice(self.selector.listening_prompt(Phase::Awakening))
                .await,
        );

        Ok(NudgeOutput {
            phase: session.phase,
            escalation_level: session.escalation_level,
            message,
            prompt,
        })
    }

    /// Advances the morning routine by one step; the final step releases
    /// the session.
    pub async fn routine_next(&self, session_id: Uuid) -> Result<RoutineOutput, ProtocolError> {
        let total = self.selector.routine_len();
        let (step_index, complete, session) = self
            .store
            .mutate(session_id, |s| {
                if s.phase != Phase::RoutineActive {
                    return Err(ProtocolError::InvalidPhase(s.phase));
                }
                let (step, complete) = s.advance_routine(total);
                Ok((step, complete, s.clone()))
            })
            .await??;

        if complete {
            self.history.record_end(&session).await;
            info!(%session_id, "routine complete; session released");
        }

        let message = self.voice(self.selector.routine_step(step_index)).await;
        let prompt = if complete {
            None
        } else {
            Some(self.voice(self.selector.listening_prompt(session.phase)).await)
        };

        Ok(RoutineOutput {
            phase: session.phase,
            step_index,
            routine_complete: complete,
            message,
            prompt,
        })
    }

    /// Records the external proof-of-action capture. Bookkeeping only.
    pub async fn mark_proof(&self, session_id: Uuid) -> Result<(), ProtocolError> {
        self.store
            .mutate(session_id, |s| s.proof_captured = true)
            .await?;
        Ok(())
    }

    /// Classifies and applies one validate call. Runs under the per-id
    /// store lock; must stay synchronous.
    fn classify(&self, s: &mut WakeSession, typed: &str, spoken: Option<&str>) -> ValidateStep {
        if s.is_released() {
            return ValidateStep::AlreadyReleased;
        }
        let typed = typed.trim();
        let spoken = spoken.map(str::trim).filter(|v| !v.is_empty());
        if typed.is_empty() && spoken.is_none() {
            // Silence is a re-prompt, not a failed attempt: the client's
            // silent-retry timer submits these on the user's behalf.
            return ValidateStep::EmptyAttempt {
                had_failures: s.failed_attempts > 0,
            };
        }

        let dual = self.matcher.policy().mode == KeywordMode::Dual;
        if dual && !s.spoken_verified {
            // First stage. Clients with a single input submit the phrase
            // through the typed field, so it doubles as the candidate.
            let candidate = spoken.or(if typed.is_empty() { None } else { Some(typed) });
            match self.matcher.evaluate(typed, candidate) {
                MatchOutcome::FullOk => {
                    ValidateStep::Passed(s.record_pass(self.config.routine_enabled))
                }
                MatchOutcome::SpokenOnlyOk => {
                    s.mark_spoken_verified();
                    ValidateStep::SpokenAccepted
                }
                MatchOutcome::Fail => {
                    s.record_failure(self.config.escalation_threshold);
                    ValidateStep::WrongFirstStage
                }
            }
        } else if dual {
            // Second stage is typed-only once the phrase has been heard.
            if self.matcher.typed_matches(typed) {
                ValidateStep::Passed(s.record_pass(self.config.routine_enabled))
            } else {
                s.record_failure(self.config.escalation_threshold);
                ValidateStep::WrongTyped
            }
        } else {
            match self.matcher.evaluate(typed, spoken) {
                MatchOutcome::FullOk => {
                    ValidateStep::Passed(s.record_pass(self.config.routine_enabled))
                }
                _ => {
                    s.record_failure(self.config.escalation_threshold);
                    ValidateStep::WrongTyped
                }
            }
        }
    }

    /// Renders a message to audio within the configured bound; on any
    /// failure the utterance degrades to text-only.
    async fn voice(&self, built: BuiltMessage) -> Utterance {
        let audio_ref = match timeout(
            self.config.synthesis_timeout,
            self.synthesizer.synthesize(&built.text, &self.config.speaker),
        )
        .await
        {
            Ok(Ok(audio)) => Some(audio),
            Ok(Err(e)) => {
                warn!(error = %e, template = %built.template_id, "synthesis failed; text-only response");
                None
            }
            Err(_) => {
                warn!(template = %built.template_id, "synthesis timed out; text-only response");
                None
            }
        };
        Utterance {
            message_id: built.template_id,
            text: built.text,
            audio_ref,
        }
    }

    fn typed_hint(&self) -> String {
        let mut words: Vec<&str> = self
            .matcher
            .policy()
            .typed_keywords
            .iter()
            .map(String::as_str)
            .collect();
        words.sort_unstable();
        words.join(" or ")
    }

    fn spoken_hint(&self) -> &'static str {
        "I'm awake or I'm up"
    }
}

fn lookup_personality(session: &WakeSession) -> &'static Personality {
    personality(&session.personality_id).unwrap_or(&DEFAULT_PERSONALITY)
}
