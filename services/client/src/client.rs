//! Protocol Client
//!
//! The orchestrator's view of the server half of the contract. The trait
//! keeps the orchestrator testable against a mock; the HTTP
//! implementation speaks the wire format of the session endpoints.

use async_trait::async_trait;
use base64::Engine;
use reqwest::StatusCode;
use rouse_core::phase::Phase;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("session not found")]
    NotFound,
    #[error("operation not allowed: {0}")]
    InvalidPhase(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartReply {
    pub session_id: Uuid,
    pub phase: Phase,
    pub escalation_level: u32,
    pub message_id: String,
    pub text: String,
    pub audio_url: Option<String>,
    pub prompt_text: Option<String>,
    pub prompt_audio_url: Option<String>,
}

/// Shared shape for validate and nudge responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidateReply {
    pub valid: bool,
    pub phase: Phase,
    pub escalation_level: u32,
    pub message_id: String,
    pub text: String,
    pub audio_url: Option<String>,
    pub released: bool,
    pub prompt_text: Option<String>,
    pub prompt_audio_url: Option<String>,
    #[serde(default)]
    pub spoken_verified: bool,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    async fn start(
        &self,
        alarm_time: Option<String>,
        user_name: Option<String>,
    ) -> Result<StartReply, ClientError>;

    async fn validate(
        &self,
        session_id: Uuid,
        keyword: String,
        spoken: Option<String>,
    ) -> Result<ValidateReply, ClientError>;

    async fn nudge(&self, session_id: Uuid) -> Result<ValidateReply, ClientError>;

    async fn transcribe(&self, audio: Vec<u8>) -> Result<String, ClientError>;
}

pub struct HttpProtocolClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProtocolClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, ClientError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| ClientError::Transport(e.to_string()));
        }
        let detail = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => Err(ClientError::NotFound),
            StatusCode::BAD_REQUEST => Err(ClientError::InvalidPhase(detail)),
            StatusCode::SERVICE_UNAVAILABLE => Err(ClientError::Unavailable(detail)),
            other => Err(ClientError::Transport(format!("{}: {}", other, detail))),
        }
    }
}

#[derive(Serialize)]
struct StartBody {
    alarm_time: Option<String>,
    user_name: Option<String>,
}

#[derive(Serialize)]
struct ValidateBody {
    session_id: Uuid,
    keyword: String,
    spoken: Option<String>,
}

#[derive(Serialize)]
struct SessionBody {
    session_id: Uuid,
}

#[derive(Serialize)]
struct TranscribeBody {
    audio_b64: String,
}

#[derive(Deserialize)]
struct TranscribeReply {
    text: String,
}

#[async_trait]
impl ProtocolClient for HttpProtocolClient {
    async fn start(
        &self,
        alarm_time: Option<String>,
        user_name: Option<String>,
    ) -> Result<StartReply, ClientError> {
        self.post_json(
            "/session/start",
            &StartBody {
                alarm_time,
                user_name,
            },
        )
        .await
    }

    async fn validate(
        &self,
        session_id: Uuid,
        keyword: String,
        spoken: Option<String>,
    ) -> Result<ValidateReply, ClientError> {
        self.post_json(
            "/session/validate",
            &ValidateBody {
                session_id,
                keyword,
                spoken,
            },
        )
        .await
    }

    async fn nudge(&self, session_id: Uuid) -> Result<ValidateReply, ClientError> {
        self.post_json("/session/nudge", &SessionBody { session_id })
            .await
    }

    async fn transcribe(&self, audio: Vec<u8>) -> Result<String, ClientError> {
        let audio_b64 = base64::engine::general_purpose::STANDARD.encode(&audio);
        let reply: TranscribeReply = self
            .post_json("/session/transcribe", &TranscribeBody { audio_b64 })
            .await?;
        Ok(reply.text)
    }
}
