//! Axum Handlers for the Session Protocol
//!
//! Thin HTTP adapters over the protocol engine. Error taxonomy on the
//! wire: 404 for unknown/expired sessions, 400 for operations illegal in
//! the current phase, 503 when an external speech engine is unreachable,
//! 500 for anything unexpected. A failing keyword check is a normal 200
//! with `valid: false`.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use base64::Engine;
use rouse_core::protocol::ProtocolError;
use rouse_core::speech::SpeechError;
use tracing::error;

use crate::{
    models::{
        ErrorResponse, SessionNudgeRequest, SessionProofRequest, SessionProofResponse,
        SessionRoutineNextRequest, SessionRoutineNextResponse, SessionStartRequest,
        SessionStartResponse, SessionValidateRequest, SessionValidateResponse,
        TranscribeRequest, TranscribeResponse,
    },
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unavailable(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::Unavailable(message) => {
                (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl From<ProtocolError> for ApiError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::NotFound => ApiError::NotFound("Session not found".to_string()),
            ProtocolError::InvalidPhase(phase) => {
                ApiError::BadRequest(format!("Operation not allowed in phase {}", phase))
            }
        }
    }
}

impl From<SpeechError> for ApiError {
    fn from(err: SpeechError) -> Self {
        match err {
            SpeechError::Unavailable(detail) => {
                ApiError::Unavailable(format!("Speech engine unavailable: {}", detail))
            }
        }
    }
}

/// Start a wake session and return the first personality-driven message.
#[utoipa::path(
    post,
    path = "/session/start",
    request_body = SessionStartRequest,
    responses(
        (status = 200, description = "Session created", body = SessionStartResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn start_session(
    State(state): State<AppState>,
    Json(payload): Json<SessionStartRequest>,
) -> Result<Json<SessionStartResponse>, ApiError> {
    let output = state
        .protocol
        .start(payload.alarm_time, payload.user_name)
        .await;
    Ok(Json(output.into()))
}

/// Run the two-stage keyword validation against a session.
#[utoipa::path(
    post,
    path = "/session/validate",
    request_body = SessionValidateRequest,
    responses(
        (status = 200, description = "Validation result with next message", body = SessionValidateResponse),
        (status = 404, description = "Session unknown or expired", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn validate_session(
    State(state): State<AppState>,
    Json(payload): Json<SessionValidateRequest>,
) -> Result<Json<SessionValidateResponse>, ApiError> {
    let output = state
        .protocol
        .validate(
            payload.session_id,
            &payload.keyword,
            payload.spoken.as_deref(),
        )
        .await?;
    Ok(Json(output.into()))
}

/// Repeat an AWAKENING message when the user is idle.
#[utoipa::path(
    post,
    path = "/session/nudge",
    request_body = SessionNudgeRequest,
    responses(
        (status = 200, description = "Fresh awakening message", body = SessionValidateResponse),
        (status = 400, description = "Session is past AWAKENING", body = ErrorResponse),
        (status = 404, description = "Session unknown or expired", body = ErrorResponse)
    )
)]
pub async fn nudge_session(
    State(state): State<AppState>,
    Json(payload): Json<SessionNudgeRequest>,
) -> Result<Json<SessionValidateResponse>, ApiError> {
    let output = state.protocol.nudge(payload.session_id).await?;
    Ok(Json(output.into()))
}

/// Mark proof of action (external camera flow) as captured.
#[utoipa::path(
    post,
    path = "/session/proof",
    request_body = SessionProofRequest,
    responses(
        (status = 200, description = "Proof recorded", body = SessionProofResponse),
        (status = 404, description = "Session unknown or expired", body = ErrorResponse)
    )
)]
pub async fn submit_proof(
    State(state): State<AppState>,
    Json(payload): Json<SessionProofRequest>,
) -> Result<Json<SessionProofResponse>, ApiError> {
    state.protocol.mark_proof(payload.session_id).await?;
    Ok(Json(SessionProofResponse { ok: true }))
}

/// Advance to the next routine step.
#[utoipa::path(
    post,
    path = "/session/routine/next",
    request_body = SessionRoutineNextRequest,
    responses(
        (status = 200, description = "Next routine step", body = SessionRoutineNextResponse),
        (status = 400, description = "Routine is not active", body = ErrorResponse),
        (status = 404, description = "Session unknown or expired", body = ErrorResponse)
    )
)]
pub async fn routine_next(
    State(state): State<AppState>,
    Json(payload): Json<SessionRoutineNextRequest>,
) -> Result<Json<SessionRoutineNextResponse>, ApiError> {
    let output = state.protocol.routine_next(payload.session_id).await?;
    Ok(Json(output.into()))
}

/// Transcribe captured audio into a spoken-keyword candidate.
#[utoipa::path(
    post,
    path = "/session/transcribe",
    request_body = TranscribeRequest,
    responses(
        (status = 200, description = "Transcription result", body = TranscribeResponse),
        (status = 400, description = "Audio payload is not valid base64", body = ErrorResponse),
        (status = 503, description = "Transcription engine unavailable", body = ErrorResponse)
    )
)]
pub async fn transcribe(
    State(state): State<AppState>,
    Json(payload): Json<TranscribeRequest>,
) -> Result<Json<TranscribeResponse>, ApiError> {
    let audio = base64::engine::general_purpose::STANDARD
        .decode(payload.audio_b64.as_bytes())
        .map_err(|e| ApiError::BadRequest(format!("Invalid base64 audio: {}", e)))?;
    if audio.is_empty() {
        return Ok(Json(TranscribeResponse {
            text: String::new(),
        }));
    }

    let transcriber = state.transcriber.as_ref().ok_or_else(|| {
        ApiError::Unavailable("No transcription engine configured".to_string())
    })?;
    let text = transcriber.transcribe(&audio).await?;
    Ok(Json(TranscribeResponse { text }))
}
