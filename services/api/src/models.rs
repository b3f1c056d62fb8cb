//! API Models
//!
//! Wire payloads for the session endpoints, shaped for existing clients
//! of the original service (same field names, SCREAMING_SNAKE phases)
//! and annotated for OpenAPI generation with `utoipa`.

use rouse_core::phase::Phase;
use rouse_core::protocol::{
    NudgeOutput, RoutineOutput, StartOutput, Utterance, ValidateOutput,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Input from the client when a wake session begins.
#[derive(Deserialize, ToSchema, Debug, Default)]
pub struct SessionStartRequest {
    #[schema(example = "07:30")]
    pub alarm_time: Option<String>,
    #[schema(example = "Sam")]
    pub user_name: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct SessionStartResponse {
    #[schema(value_type = String, format = Uuid)]
    pub session_id: Uuid,
    #[schema(value_type = String, example = "AWAKENING")]
    pub phase: Phase,
    pub escalation_level: u32,
    pub message_id: String,
    pub text: String,
    pub audio_url: Option<String>,
    pub prompt_text: Option<String>,
    pub prompt_audio_url: Option<String>,
}

/// Input when the user submits a keyword for validation. `spoken` carries
/// the speech-to-text candidate in dual-keyword mode.
#[derive(Deserialize, ToSchema, Debug)]
pub struct SessionValidateRequest {
    #[schema(value_type = String, format = Uuid)]
    pub session_id: Uuid,
    pub keyword: String,
    pub spoken: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct SessionValidateResponse {
    /// Whether this call passed the keyword check.
    pub valid: bool,
    #[schema(value_type = String, example = "COMPLIANT")]
    pub phase: Phase,
    pub escalation_level: u32,
    pub message_id: String,
    pub text: String,
    pub audio_url: Option<String>,
    /// True once the session reached its terminal phase.
    pub released: bool,
    pub prompt_text: Option<String>,
    pub prompt_audio_url: Option<String>,
    /// True once the spoken half of the proof has been accepted.
    #[serde(default)]
    pub spoken_verified: bool,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct SessionNudgeRequest {
    #[schema(value_type = String, format = Uuid)]
    pub session_id: Uuid,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct SessionProofRequest {
    #[schema(value_type = String, format = Uuid)]
    pub session_id: Uuid,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct SessionProofResponse {
    pub ok: bool,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct SessionRoutineNextRequest {
    #[schema(value_type = String, format = Uuid)]
    pub session_id: Uuid,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct SessionRoutineNextResponse {
    pub step_index: usize,
    pub text: String,
    pub audio_url: Option<String>,
    pub routine_complete: bool,
    pub prompt_text: Option<String>,
    pub prompt_audio_url: Option<String>,
}

/// Audio for transcription, base64-encoded so the contract stays JSON.
#[derive(Deserialize, ToSchema, Debug)]
pub struct TranscribeRequest {
    pub audio_b64: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct TranscribeResponse {
    pub text: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub message: String,
}

fn audio_url(utterance: &Utterance) -> Option<String> {
    utterance.audio_ref.as_ref().map(|a| a.0.clone())
}

fn prompt_fields(prompt: &Option<Utterance>) -> (Option<String>, Option<String>) {
    match prompt {
        Some(p) => (Some(p.text.clone()), audio_url(p)),
        None => (None, None),
    }
}

impl From<StartOutput> for SessionStartResponse {
    fn from(out: StartOutput) -> Self {
        let (prompt_text, prompt_audio_url) = prompt_fields(&out.prompt);
        let audio_url = audio_url(&out.message);
        Self {
            session_id: out.session_id,
            phase: out.phase,
            escalation_level: out.escalation_level,
            message_id: out.message.message_id,
            audio_url,
            text: out.message.text,
            prompt_text,
            prompt_audio_url,
        }
    }
}

impl From<ValidateOutput> for SessionValidateResponse {
    fn from(out: ValidateOutput) -> Self {
        let (prompt_text, prompt_audio_url) = prompt_fields(&out.prompt);
        let audio_url = audio_url(&out.message);
        Self {
            valid: out.valid,
            phase: out.phase,
            escalation_level: out.escalation_level,
            message_id: out.message.message_id,
            audio_url,
            text: out.message.text,
            released: out.released,
            prompt_text,
            prompt_audio_url,
            spoken_verified: out.spoken_verified,
        }
    }
}

impl From<NudgeOutput> for SessionValidateResponse {
    /// Nudges reuse the validate response shape on the wire, with
    /// `valid` and `released` pinned false.
    fn from(out: NudgeOutput) -> Self {
        let (prompt_text, prompt_audio_url) = prompt_fields(&out.prompt);
        let audio_url = audio_url(&out.message);
        Self {
            valid: false,
            phase: out.phase,
            escalation_level: out.escalation_level,
            message_id: out.message.message_id,
            audio_url,
            text: out.message.text,
            released: false,
            prompt_text,
            prompt_audio_url,
            spoken_verified: false,
        }
    }
}

impl From<RoutineOutput> for SessionRoutineNextResponse {
    fn from(out: RoutineOutput) -> Self {
        let (prompt_text, prompt_audio_url) = prompt_fields(&out.prompt);
        let audio_url = audio_url(&out.message);
        Self {
            step_index: out.step_index,
            audio_url,
            text: out.message.text,
            routine_complete: out.routine_complete,
            prompt_text,
            prompt_audio_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rouse_core::speech::AudioRef;

    fn utterance(id: &str, text: &str, audio: Option<&str>) -> Utterance {
        Utterance {
            message_id: id.to_string(),
            text: text.to_string(),
            audio_ref: audio.map(|a| AudioRef(a.to_string())),
        }
    }

    #[test]
    fn test_start_response_wire_format() {
        let out = StartOutput {
            session_id: Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap(),
            phase: Phase::Awakening,
            escalation_level: 0,
            message: utterance("default_savage:AWAKENING:low:0", "Hey. Wake up.", Some("/static/a.wav")),
            prompt: Some(utterance("listening:AWAKENING:1", "Your turn. Say it.", None)),
        };
        let response = SessionStartResponse::from(out);
        let json = serde_json::to_string(&response).unwrap();

        assert!(json.contains("\"phase\":\"AWAKENING\""));
        assert!(json.contains("550e8400-e29b-41d4-a716-446655440000"));
        assert!(json.contains("\"audio_url\":\"/static/a.wav\""));
        assert!(json.contains("\"prompt_audio_url\":null"));
    }

    #[test]
    fn test_validate_response_round_trip() {
        let out = ValidateOutput {
            valid: true,
            phase: Phase::Compliant,
            escalation_level: 2,
            released: false,
            spoken_verified: true,
            message: utterance("correct:type1", "Correct. One more time: type yes.", None),
            prompt: None,
        };
        let response = SessionValidateResponse::from(out);
        let json = serde_json::to_string(&response).unwrap();
        let back: SessionValidateResponse = serde_json::from_str(&json).unwrap();

        assert!(back.valid);
        assert_eq!(back.phase, Phase::Compliant);
        assert_eq!(back.escalation_level, 2);
        assert!(back.spoken_verified);
        assert!(back.audio_url.is_none());
    }

    #[test]
    fn test_nudge_maps_into_validate_shape() {
        let out = NudgeOutput {
            phase: Phase::Awakening,
            escalation_level: 0,
            message: utterance("default_savage:AWAKENING:low:2", "Up. On your feet, you.", None),
            prompt: Some(utterance("listening:AWAKENING:0", "Say the word. I'm listening.", None)),
        };
        let response = SessionValidateResponse::from(out);
        assert!(!response.valid);
        assert!(!response.released);
        assert_eq!(response.prompt_text.as_deref(), Some("Say the word. I'm listening."));
    }

    #[test]
    fn test_validate_request_tolerates_missing_spoken() {
        let json = r#"{"session_id":"550e8400-e29b-41d4-a716-446655440000","keyword":"yes"}"#;
        let request: SessionValidateRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.keyword, "yes");
        assert!(request.spoken.is_none());
    }

    #[test]
    fn test_spoken_verified_defaults_false_on_old_payloads() {
        let json = r#"{
            "valid": false,
            "phase": "RESISTING",
            "escalation_level": 1,
            "message_id": "m",
            "text": "t",
            "audio_url": null,
            "released": false,
            "prompt_text": null,
            "prompt_audio_url": null
        }"#;
        let response: SessionValidateResponse = serde_json::from_str(json).unwrap();
        assert!(!response.spoken_verified);
    }

    #[test]
    fn test_start_request_all_fields_optional() {
        let request: SessionStartRequest = serde_json::from_str("{}").unwrap();
        assert!(request.alarm_time.is_none());
        assert!(request.user_name.is_none());
    }

    #[test]
    fn test_error_response_serialization() {
        let error = ErrorResponse {
            message: "Session not found".to_string(),
        };

        let json = serde_json::to_string(&error).unwrap();
        let expected = r#"{"message":"Session not found"}"#;
        assert_eq!(json, expected);
    }
}
