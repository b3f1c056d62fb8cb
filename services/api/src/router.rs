//! Axum Router Configuration
//!
//! Defines the complete HTTP surface: the session protocol endpoints,
//! the served static audio directory, and the OpenAPI documentation.

use crate::{
    handlers,
    models::{
        ErrorResponse, SessionNudgeRequest, SessionProofRequest, SessionProofResponse,
        SessionRoutineNextRequest, SessionRoutineNextResponse, SessionStartRequest,
        SessionStartResponse, SessionValidateRequest, SessionValidateResponse,
        TranscribeRequest, TranscribeResponse,
    },
    state::AppState,
};

use axum::{Router, routing::post};
use std::path::Path;
use tower_http::services::ServeDir;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::start_session,
        handlers::validate_session,
        handlers::nudge_session,
        handlers::submit_proof,
        handlers::routine_next,
        handlers::transcribe,
    ),
    components(
        schemas(
            SessionStartRequest,
            SessionStartResponse,
            SessionValidateRequest,
            SessionValidateResponse,
            SessionNudgeRequest,
            SessionProofRequest,
            SessionProofResponse,
            SessionRoutineNextRequest,
            SessionRoutineNextResponse,
            TranscribeRequest,
            TranscribeResponse,
            ErrorResponse
        )
    ),
    tags(
        (name = "Rouse API", description = "Wake-session enforcement protocol")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: AppState, static_dir: &Path) -> Router {
    let api_router = Router::new()
        .route("/session/start", post(handlers::start_session))
        .route("/session/validate", post(handlers::validate_session))
        .route("/session/nudge", post(handlers::nudge_session))
        .route("/session/proof", post(handlers::submit_proof))
        .route("/session/routine/next", post(handlers::routine_next))
        .route("/session/transcribe", post(handlers::transcribe))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest_service("/static", ServeDir::new(static_dir))
        .merge(api_router)
}
