//! Playback Sequencer
//!
//! Guarantees at most one audio utterance in flight. A sequence is the
//! unit of playback: main clip, fixed pause, listening prompt (skipped
//! when both resolve to the same resource), then a cooldown window
//! before `PlaybackFinished` is emitted. While a sequence is in flight,
//! non-forced requests are dropped and forced requests queue. If the
//! platform blocks autonomous playback, the pending sequence is buffered
//! and flushed on the first user gesture.
//!
//! The in-flight flag is explicit state owned by this struct; nothing
//! relies on the audio backend serializing itself. In-flight audio is
//! never preempted: release simply stops new sequences from starting.

use crate::event::Event;
use async_trait::async_trait;
use rouse_core::speech::AudioRef;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Seam for the actual audio backend.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, clip: &AudioRef) -> anyhow::Result<()>;
}

/// Sink that narrates playback to the log; used by the CLI.
pub struct LogSink;

#[async_trait]
impl AudioSink for LogSink {
    async fn play(&self, clip: &AudioRef) -> anyhow::Result<()> {
        info!(clip = %clip.as_str(), "playing audio clip");
        Ok(())
    }
}

/// One playback sequence: main message then listening prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackRequest {
    pub main: Option<AudioRef>,
    pub prompt: Option<AudioRef>,
    /// Forced sequences (fresh validate responses) must be heard: they
    /// queue instead of being dropped when another clip is in flight.
    pub forced: bool,
}

pub struct Playback {
    sink: Arc<dyn AudioSink>,
    events: mpsc::UnboundedSender<Event>,
    /// Fixed pause between the main clip and the listening prompt.
    pause: Duration,
    /// Cooldown appended to every sequence so fast network responses
    /// cannot produce back-to-back overlapping clips.
    cooldown: Duration,
    in_flight: bool,
    unlocked: bool,
    gesture_pending: Option<PlaybackRequest>,
    queued: VecDeque<PlaybackRequest>,
    shut_down: bool,
}

impl Playback {
    pub fn new(
        sink: Arc<dyn AudioSink>,
        events: mpsc::UnboundedSender<Event>,
        pause: Duration,
        cooldown: Duration,
        gesture_gated: bool,
    ) -> Self {
        Self {
            sink,
            events,
            pause,
            cooldown,
            in_flight: false,
            unlocked: !gesture_gated,
            gesture_pending: None,
            queued: VecDeque::new(),
            shut_down: false,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Submits a sequence for playback under the exclusivity rules.
    pub fn request(&mut self, request: PlaybackRequest) {
        if self.shut_down {
            return;
        }
        if !self.unlocked {
            // Buffer for the unlocking gesture; a forced sequence always
            // wins the single buffer slot.
            if request.forced || self.gesture_pending.is_none() {
                self.gesture_pending = Some(request);
            }
            return;
        }
        if self.in_flight {
            if request.forced {
                self.queued.push_back(request);
            } else {
                debug!("dropping non-forced playback while another clip is in flight");
            }
            return;
        }
        self.spawn(request);
    }

    /// First user interaction: unlock playback and flush the buffer.
    pub fn on_gesture(&mut self) {
        self.unlocked = true;
        if let Some(pending) = self.gesture_pending.take() {
            self.request(pending);
        }
    }

    /// Must be called when `PlaybackFinished` is handled; starts the
    /// next queued forced sequence, if any.
    pub fn on_finished(&mut self) {
        self.in_flight = false;
        if self.shut_down {
            self.queued.clear();
            return;
        }
        if let Some(next) = self.queued.pop_front() {
            self.spawn(next);
        }
    }

    /// Stops new sequences from starting. The sequence already in flight
    /// is left to finish; its completion event is the caller's to ignore.
    pub fn shutdown(&mut self) {
        self.shut_down = true;
        self.queued.clear();
        self.gesture_pending = None;
    }

    fn spawn(&mut self, request: PlaybackRequest) {
        self.in_flight = true;
        let sink = self.sink.clone();
        let events = self.events.clone();
        let pause = self.pause;
        let cooldown = self.cooldown;
        tokio::spawn(async move {
            if let Some(main) = &request.main {
                if let Err(e) = sink.play(main).await {
                    warn!(error = %e, "main clip playback failed");
                }
            }
            if let Some(prompt) = &request.prompt {
                if request.main.as_ref() != Some(prompt) {
                    tokio::time::sleep(pause).await;
                    if let Err(e) = sink.play(prompt).await {
                        warn!(error = %e, "prompt clip playback failed");
                    }
                }
            }
            tokio::time::sleep(cooldown).await;
            let _ = events.send(Event::PlaybackFinished);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink {
        clips: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                clips: Mutex::new(Vec::new()),
            })
        }
        fn played(&self) -> Vec<String> {
            self.clips.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AudioSink for RecordingSink {
        async fn play(&self, clip: &AudioRef) -> anyhow::Result<()> {
            self.clips.lock().unwrap().push(clip.as_str().to_string());
            Ok(())
        }
    }

    fn clip(name: &str) -> Option<AudioRef> {
        Some(AudioRef(name.to_string()))
    }

    fn playback(sink: Arc<RecordingSink>) -> (Playback, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Playback::new(
                sink,
                tx,
                Duration::from_millis(1200),
                Duration::from_millis(1000),
                false,
            ),
            rx,
        )
    }

    async fn settle(
        playback: &mut Playback,
        rx: &mut mpsc::UnboundedReceiver<Event>,
        window: Duration,
    ) -> usize {
        tokio::time::sleep(window).await;
        let mut finished = 0;
        while let Ok(event) = rx.try_recv() {
            if event == Event::PlaybackFinished {
                playback.on_finished();
                finished += 1;
            }
        }
        finished
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequence_plays_main_then_prompt() {
        let sink = RecordingSink::new();
        let (mut playback, mut rx) = playback(sink.clone());
        playback.request(PlaybackRequest {
            main: clip("/static/main.wav"),
            prompt: clip("/static/prompt.wav"),
            forced: true,
        });

        let finished = settle(&mut playback, &mut rx, Duration::from_secs(5)).await;
        assert_eq!(finished, 1);
        assert_eq!(sink.played(), vec!["/static/main.wav", "/static/prompt.wav"]);
        assert!(!playback.is_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prompt_skipped_when_same_resource() {
        let sink = RecordingSink::new();
        let (mut playback, mut rx) = playback(sink.clone());
        playback.request(PlaybackRequest {
            main: clip("/static/one.wav"),
            prompt: clip("/static/one.wav"),
            forced: true,
        });

        settle(&mut playback, &mut rx, Duration::from_secs(5)).await;
        assert_eq!(sink.played(), vec!["/static/one.wav"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_forced_dropped_while_in_flight() {
        let sink = RecordingSink::new();
        let (mut playback, mut rx) = playback(sink.clone());
        playback.request(PlaybackRequest {
            main: clip("/static/first.wav"),
            prompt: None,
            forced: true,
        });
        assert!(playback.is_in_flight());
        playback.request(PlaybackRequest {
            main: clip("/static/ignored.wav"),
            prompt: None,
            forced: false,
        });

        settle(&mut playback, &mut rx, Duration::from_secs(10)).await;
        assert_eq!(sink.played(), vec!["/static/first.wav"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_queues_and_plays_after_current() {
        let sink = RecordingSink::new();
        let (mut playback, mut rx) = playback(sink.clone());
        playback.request(PlaybackRequest {
            main: clip("/static/first.wav"),
            prompt: None,
            forced: true,
        });
        playback.request(PlaybackRequest {
            main: clip("/static/second.wav"),
            prompt: None,
            forced: true,
        });

        // First settle finishes the live sequence and starts the queued
        // one; the second settle lets that one run out.
        let mut finished = settle(&mut playback, &mut rx, Duration::from_secs(10)).await;
        finished += settle(&mut playback, &mut rx, Duration::from_secs(10)).await;
        assert_eq!(finished, 2);
        assert_eq!(sink.played(), vec!["/static/first.wav", "/static/second.wav"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gesture_gating_buffers_until_unlock() {
        let sink = RecordingSink::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut playback = Playback::new(
            sink.clone(),
            tx,
            Duration::from_millis(1200),
            Duration::from_millis(1000),
            true,
        );
        playback.request(PlaybackRequest {
            main: clip("/static/blocked.wav"),
            prompt: None,
            forced: true,
        });
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(sink.played().is_empty());

        playback.on_gesture();
        settle(&mut playback, &mut rx, Duration::from_secs(5)).await;
        assert_eq!(sink.played(), vec!["/static/blocked.wav"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_request_wins_gesture_buffer() {
        let sink = RecordingSink::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut playback = Playback::new(
            sink.clone(),
            tx,
            Duration::from_millis(0),
            Duration::from_millis(0),
            true,
        );
        playback.request(PlaybackRequest {
            main: clip("/static/old.wav"),
            prompt: None,
            forced: false,
        });
        playback.request(PlaybackRequest {
            main: clip("/static/new.wav"),
            prompt: None,
            forced: true,
        });

        playback.on_gesture();
        settle(&mut playback, &mut rx, Duration::from_secs(1)).await;
        assert_eq!(sink.played(), vec!["/static/new.wav"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_blocks_new_sequences() {
        let sink = RecordingSink::new();
        let (mut playback, mut rx) = playback(sink.clone());
        playback.request(PlaybackRequest {
            main: clip("/static/live.wav"),
            prompt: None,
            forced: true,
        });
        playback.shutdown();
        playback.request(PlaybackRequest {
            main: clip("/static/after.wav"),
            prompt: None,
            forced: true,
        });

        settle(&mut playback, &mut rx, Duration::from_secs(10)).await;
        // The in-flight clip finished; nothing new started.
        assert_eq!(sink.played(), vec!["/static/live.wav"]);
    }
}
