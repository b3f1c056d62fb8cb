//! Client Interaction Orchestrator
//!
//! Drives the enforced wake loop from the consuming side. The
//! orchestrator is single-threaded cooperative: every timer fire,
//! playback completion, and user action arrives as one event on one
//! channel and is handled to completion before the next. Each timer
//! callback re-checks the current phase and release flag before acting,
//! because the world may have moved on since it was armed; the
//! scheduler's generation stamps remove the rest of the stale-callback
//! hazard by construction.
//!
//! On release every timer is cancelled, the exclusive-attention hold is
//! dropped, and nothing is ever re-armed for that session again.

use crate::client::{ClientError, ProtocolClient, StartReply, ValidateReply};
use crate::event::Event;
use crate::playback::{AudioSink, Playback, PlaybackRequest};
use crate::timers::{Scheduler, TimerPurpose};
use async_trait::async_trait;
use rouse_core::phase::Phase;
use rouse_core::speech::AudioRef;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Seam for hands-free audio capture.
#[async_trait]
pub trait VoiceRecorder: Send + Sync {
    async fn capture(&self) -> anyhow::Result<Vec<u8>>;
}

/// Recorder for environments without a microphone; captures nothing.
pub struct NoRecorder;

#[async_trait]
impl VoiceRecorder for NoRecorder {
    async fn capture(&self) -> anyhow::Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Delay between the alarm trigger and the session start call.
    pub countdown: Duration,
    /// Idle window before requesting a fresh AWAKENING line.
    pub idle_nudge: Duration,
    /// Grace delay before hands-free capture begins.
    pub auto_record_delay: Duration,
    /// Grace window after a failure before the empty auto-submit.
    pub silent_retry: Duration,
    /// Pause between the main clip and the listening prompt.
    pub playback_pause: Duration,
    /// Cooldown between consecutive sequences.
    pub playback_cooldown: Duration,
    /// Whether platform policy blocks playback until a user gesture.
    pub gesture_gated: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            countdown: Duration::from_secs(3),
            idle_nudge: Duration::from_secs(30),
            auto_record_delay: Duration::from_secs(2),
            silent_retry: Duration::from_secs(8),
            playback_pause: Duration::from_millis(1200),
            playback_cooldown: Duration::from_millis(1000),
            gesture_gated: false,
        }
    }
}

pub struct Orchestrator<C> {
    client: Arc<C>,
    recorder: Arc<dyn VoiceRecorder>,
    config: OrchestratorConfig,
    scheduler: Scheduler,
    playback: Playback,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    alarm_time: Option<String>,
    user_name: Option<String>,
    session_id: Option<Uuid>,
    phase: Phase,
    speak_now: bool,
    spoken_verified: bool,
    released: bool,
    /// Locked-attention presentation mode held while the session runs.
    exclusive_hold: bool,
    validate_in_flight: bool,
}

impl<C: ProtocolClient> Orchestrator<C> {
    pub fn new(
        client: Arc<C>,
        recorder: Arc<dyn VoiceRecorder>,
        sink: Arc<dyn AudioSink>,
        config: OrchestratorConfig,
        alarm_time: Option<String>,
        user_name: Option<String>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(events_tx.clone());
        let playback = Playback::new(
            sink,
            events_tx.clone(),
            config.playback_pause,
            config.playback_cooldown,
            config.gesture_gated,
        );
        Self {
            client,
            recorder,
            config,
            scheduler,
            playback,
            events_tx,
            events_rx,
            alarm_time,
            user_name,
            session_id: None,
            phase: Phase::Awakening,
            speak_now: false,
            spoken_verified: false,
            released: false,
            exclusive_hold: false,
            validate_in_flight: false,
        }
    }

    /// Handle for feeding user actions into the loop (stdin reader, UI).
    pub fn events(&self) -> mpsc::UnboundedSender<Event> {
        self.events_tx.clone()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// The alarm fired: arm the countdown to the session start.
    pub fn on_alarm(&mut self) {
        info!(delay = ?self.config.countdown, "alarm fired; counting down to session start");
        self.scheduler.arm(TimerPurpose::Countdown, self.config.countdown);
    }

    /// Runs the loop until the session releases.
    pub async fn run(mut self) {
        while let Some(event) = self.events_rx.recv().await {
            self.handle_event(event).await;
            if self.released {
                break;
            }
        }
    }

    /// Processes one event to completion. Events never interleave.
    pub async fn handle_event(&mut self, event: Event) {
        if self.released {
            return;
        }
        match event {
            Event::Timer(fired) => {
                // A stale fire (superseded or cancelled after queuing)
                // must never act.
                if !self.scheduler.acknowledge(fired) {
                    return;
                }
                match fired.purpose {
                    TimerPurpose::Countdown => self.start_session().await,
                    TimerPurpose::IdleNudge => self.idle_nudge().await,
                    TimerPurpose::AutoRecord => self.auto_record().await,
                    TimerPurpose::SilentRetry => self.silent_retry().await,
                }
            }
            Event::UserTyped(text) => {
                self.submit(text, None, false).await;
            }
            Event::SpokenCaptured(text) => {
                self.submit(String::new(), Some(text), false).await;
            }
            Event::Gesture => {
                self.playback.on_gesture();
            }
            Event::PlaybackFinished => {
                self.playback.on_finished();
                // A delivered message restarts the idle clock, but only
                // while the session is still waiting to be woken.
                if self.phase == Phase::Awakening && self.session_id.is_some() {
                    self.scheduler.arm(TimerPurpose::IdleNudge, self.config.idle_nudge);
                }
            }
        }
    }

    async fn start_session(&mut self) {
        match self
            .client
            .start(self.alarm_time.clone(), self.user_name.clone())
            .await
        {
            Ok(reply) => {
                info!(session_id = %reply.session_id, "wake session started");
                self.session_id = Some(reply.session_id);
                self.phase = reply.phase;
                self.spoken_verified = false;
                self.speak_now = true;
                self.exclusive_hold = true;
                self.play_start(&reply);
                self.scheduler.arm(TimerPurpose::IdleNudge, self.config.idle_nudge);
                self.maybe_arm_auto_record();
            }
            Err(e) => {
                // The enforcement loop must survive a flaky network:
                // keep counting down and try again.
                warn!(error = %e, "session start failed; retrying after countdown");
                self.scheduler.arm(TimerPurpose::Countdown, self.config.countdown);
            }
        }
    }

    async fn idle_nudge(&mut self) {
        if self.phase != Phase::Awakening || self.validate_in_flight {
            return;
        }
        let Some(session_id) = self.session_id else {
            return;
        };
        match self.client.nudge(session_id).await {
            Ok(reply) => {
                self.playback.request(PlaybackRequest {
                    main: clip(&reply.audio_url),
                    prompt: clip(&reply.prompt_audio_url),
                    forced: false,
                });
                self.maybe_arm_auto_record();
            }
            Err(ClientError::NotFound) => self.reset_and_restart(),
            Err(ClientError::InvalidPhase(_)) => {
                // The server is ahead of our mirror; validate responses
                // will catch us up. Do not re-arm against a dead phase.
            }
            Err(e) => {
                warn!(error = %e, "nudge failed; re-arming idle timer");
                self.scheduler.arm(TimerPurpose::IdleNudge, self.config.idle_nudge);
            }
        }
    }

    async fn auto_record(&mut self) {
        if !self.speak_now || self.spoken_verified || self.validate_in_flight {
            return;
        }
        let audio = match self.recorder.capture().await {
            Ok(audio) => audio,
            Err(e) => {
                warn!(error = %e, "audio capture failed");
                return;
            }
        };
        if audio.is_empty() {
            self.maybe_arm_auto_record();
            return;
        }
        match self.client.transcribe(audio).await {
            Ok(text) if !text.trim().is_empty() => {
                self.submit(String::new(), Some(text), false).await;
            }
            Ok(_) => self.maybe_arm_auto_record(),
            Err(e) => {
                warn!(error = %e, "transcription failed; listening again");
                self.maybe_arm_auto_record();
            }
        }
    }

    async fn silent_retry(&mut self) {
        if !self.phase.is_failure() || self.validate_in_flight {
            return;
        }
        info!("silence window elapsed; forcing a fresh prompt");
        self.submit(String::new(), None, true).await;
    }

    /// Sends one validate call. `suppress_retry` marks the automatic
    /// empty submission, which must not arm another silent retry.
    async fn submit(&mut self, typed: String, spoken: Option<String>, suppress_retry: bool) {
        let Some(session_id) = self.session_id else {
            return;
        };
        if self.validate_in_flight {
            return;
        }
        // Any submission supersedes the pending grace timers.
        self.scheduler.cancel(TimerPurpose::SilentRetry);
        self.scheduler.cancel(TimerPurpose::AutoRecord);

        self.validate_in_flight = true;
        let result = self.client.validate(session_id, typed, spoken).await;
        self.validate_in_flight = false;

        match result {
            Ok(reply) => self.apply_validate(&reply, suppress_retry),
            Err(ClientError::NotFound) => self.reset_and_restart(),
            Err(e) => {
                warn!(error = %e, "validate failed; awaiting next user action");
            }
        }
    }

    fn apply_validate(&mut self, reply: &ValidateReply, suppress_retry: bool) {
        self.phase = reply.phase;
        self.spoken_verified = reply.spoken_verified;

        // A fresh validate response must always be heard.
        self.playback.request(PlaybackRequest {
            main: clip(&reply.audio_url),
            prompt: clip(&reply.prompt_audio_url),
            forced: true,
        });

        if reply.released {
            self.finish();
            return;
        }
        if self.phase != Phase::Awakening {
            // Leaving Awakening retires the idle-nudge discipline for
            // good; a dangling timer must never nudge this session.
            self.scheduler.cancel(TimerPurpose::IdleNudge);
        }
        if self.spoken_verified {
            // Second stage is typed-only; stop listening.
            self.speak_now = false;
            self.scheduler.cancel(TimerPurpose::AutoRecord);
        }
        if !reply.valid && self.phase.is_failure() && !suppress_retry {
            self.scheduler.arm(TimerPurpose::SilentRetry, self.config.silent_retry);
        }
        self.maybe_arm_auto_record();
    }

    fn play_start(&mut self, reply: &StartReply) {
        self.playback.request(PlaybackRequest {
            main: clip(&reply.audio_url),
            prompt: clip(&reply.prompt_audio_url),
            forced: true,
        });
    }

    fn maybe_arm_auto_record(&mut self) {
        if self.speak_now && !self.spoken_verified && !self.validate_in_flight && !self.released {
            self.scheduler
                .arm(TimerPurpose::AutoRecord, self.config.auto_record_delay);
        }
    }

    /// Terminal teardown: cancel everything, release the screen hold,
    /// never re-arm.
    fn finish(&mut self) {
        self.released = true;
        self.speak_now = false;
        self.scheduler.cancel_all();
        self.playback.shutdown();
        self.exclusive_hold = false;
        info!("session released; enforcement loop closed");
    }

    /// The server no longer knows our session: clear local state and
    /// start over.
    fn reset_and_restart(&mut self) {
        warn!("session unknown or expired on server; restarting");
        self.session_id = None;
        self.spoken_verified = false;
        self.speak_now = false;
        self.scheduler.cancel_all();
        self.scheduler.arm(TimerPurpose::Countdown, self.config.countdown);
    }
}

fn clip(url: &Option<String>) -> Option<AudioRef> {
    url.as_ref().map(|u| AudioRef(u.clone()))
}
