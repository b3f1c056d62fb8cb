//! HTTP Speech Engine Clients
//!
//! Implementations of the core speech traits against external engines.
//! The synthesizer posts text to a TTS engine, stores the returned clip
//! under the served static directory (content-addressed, so repeated
//! lines are synthesized once), and hands back the public URL. The
//! transcriber posts raw audio to an STT engine and returns its text.
//! Any transport or engine failure maps to `SpeechError::Unavailable`;
//! the protocol layer decides how far to degrade.

use async_trait::async_trait;
use rouse_core::speech::{AudioRef, SpeechError, SpeechSynthesizer, Transcriber};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Stable, content-addressed file name for a synthesized clip.
fn clip_name(text: &str, speaker: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(speaker.as_bytes());
    hasher.update(b"\0");
    hasher.update(text.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("tts_{}.wav", &digest[..16])
}

pub struct HttpSynthesizer {
    client: reqwest::Client,
    engine_url: String,
    static_dir: PathBuf,
}

impl HttpSynthesizer {
    pub fn new(engine_url: String, static_dir: PathBuf) -> Self {
        Self {
            client: reqwest::Client::new(),
            engine_url,
            static_dir,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str, speaker: &str) -> Result<AudioRef, SpeechError> {
        let name = clip_name(text, speaker);
        let path = self.static_dir.join(&name);
        let url = format!("/static/{}", name);

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(%url, "tts cache hit");
            return Ok(AudioRef(url));
        }

        let response = self
            .client
            .post(&self.engine_url)
            .json(&serde_json::json!({ "text": text, "speaker": speaker }))
            .send()
            .await
            .map_err(|e| SpeechError::Unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SpeechError::Unavailable(format!(
                "tts engine returned {}",
                response.status()
            )));
        }
        let audio = response
            .bytes()
            .await
            .map_err(|e| SpeechError::Unavailable(e.to_string()))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SpeechError::Unavailable(e.to_string()))?;
        }
        tokio::fs::write(&path, &audio)
            .await
            .map_err(|e| SpeechError::Unavailable(e.to_string()))?;
        debug!(%url, bytes = audio.len(), "tts clip stored");

        Ok(AudioRef(url))
    }
}

#[derive(Deserialize)]
struct SttReply {
    text: String,
}

pub struct HttpTranscriber {
    client: reqwest::Client,
    engine_url: String,
}

impl HttpTranscriber {
    pub fn new(engine_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            engine_url,
        }
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, SpeechError> {
        let response = self
            .client
            .post(&self.engine_url)
            .header("content-type", "application/octet-stream")
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| SpeechError::Unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SpeechError::Unavailable(format!(
                "stt engine returned {}",
                response.status()
            )));
        }
        let reply: SttReply = response
            .json()
            .await
            .map_err(|e| SpeechError::Unavailable(e.to_string()))?;
        Ok(reply.text)
    }
}

/// Ensures the static audio directory exists before the server mounts it.
pub async fn ensure_static_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await
}
