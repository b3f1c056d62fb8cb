//! Speech Collaborator Seams
//!
//! Text-to-speech and speech-to-text are external engines; the protocol
//! only sees these two traits. Implementations live in the service crates
//! (HTTP engines) and in tests (deterministic mocks). A failing or slow
//! engine must degrade the experience, never stall the state machine, so
//! every call the protocol makes is wrapped in a timeout upstream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque reference to a synthesized clip (typically a URL the client
/// can fetch and play).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioRef(pub String);

impl AudioRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("speech engine unavailable: {0}")]
    Unavailable(String),
}

/// Turns a line of dialogue into a playable audio resource.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, speaker: &str) -> Result<AudioRef, SpeechError>;
}

/// Turns captured audio into a spoken-keyword candidate.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, SpeechError>;
}

/// Deterministic synthesizer for development and tests: the returned ref
/// encodes the speaker and the text length, so assertions can tell clips
/// apart without any audio backend.
pub struct MockSynthesizer;

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str, speaker: &str) -> Result<AudioRef, SpeechError> {
        Ok(AudioRef(format!("mock://tts/{}/{}", speaker, text.len())))
    }
}

/// Synthesizer that always fails; exercises the degraded text-only path.
pub struct UnavailableSynthesizer;

#[async_trait]
impl SpeechSynthesizer for UnavailableSynthesizer {
    async fn synthesize(&self, _text: &str, _speaker: &str) -> Result<AudioRef, SpeechError> {
        Err(SpeechError::Unavailable("engine disabled".to_string()))
    }
}

/// Transcriber echoing the audio bytes back as lossy UTF-8; lets tests
/// and the CLI feed known transcripts through the real code path.
pub struct MockTranscriber;

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, SpeechError> {
        Ok(String::from_utf8_lossy(audio).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_synthesizer_is_deterministic() {
        let synth = MockSynthesizer;
        let a = synth.synthesize("wake up", "sarge").await.unwrap();
        let b = synth.synthesize("wake up", "sarge").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "mock://tts/sarge/7");
    }

    #[tokio::test]
    async fn test_unavailable_synthesizer_errors() {
        let synth = UnavailableSynthesizer;
        assert!(synth.synthesize("hi", "v").await.is_err());
    }

    #[tokio::test]
    async fn test_mock_transcriber_echoes() {
        let stt = MockTranscriber;
        let text = stt.transcribe(b"  i'm awake \n").await.unwrap();
        assert_eq!(text, "i'm awake");
    }
}
