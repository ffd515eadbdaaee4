//! REST surface (spec §6 "HTTP surface")
//!
//! Handlers follow the teacher's `server/http.rs` shape: `State<Arc<ServerState>>`
//! extractor, `Json<...>` request/response bodies, a per-handler `Result<impl
//! IntoResponse, (StatusCode, Json<ErrorBody>)>` so failures carry a status
//! code instead of panicking through an `Err` path.

use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Html;
use axum::Json;
use serde::Serialize;

use crate::error::SessionError;
use crate::providers::encode_audio_base64;
use crate::server::ServerState;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (status, Json(ErrorBody { message: message.into() }))
}

/// `GET /` — static UI page. No templating; the page talks to `/ws/voice/*`
/// and `/voice` directly from inline script, same as the teacher's
/// `index_page()` but without the Ollama-status banner (no local-model
/// concept here).
pub async fn index_page() -> Html<&'static str> {
    Html(include_str!("index.html"))
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub message: String,
}

/// `POST /session/create`.
pub async fn create_session(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<CreateSessionResponse>, (StatusCode, Json<ErrorBody>)> {
    if !state.store.is_available().await {
        return Err(error_response(StatusCode::SERVICE_UNAVAILABLE, "session store unavailable"));
    }

    let session = state
        .store
        .create_session(state.config.session.idle_timeout_secs, state.config.session.max_duration_secs, None)
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(CreateSessionResponse {
        session_id: session.session_id,
        message: "session created".to_string(),
    }))
}

#[derive(Debug, Serialize)]
pub struct CloseSessionResponse {
    pub message: String,
    pub session_id: String,
}

/// `POST /session/{id}/close`.
pub async fn close_session(
    State(state): State<Arc<ServerState>>,
    Path(session_id): Path<String>,
) -> Result<Json<CloseSessionResponse>, (StatusCode, Json<ErrorBody>)> {
    state
        .store
        .close_session(&session_id)
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(CloseSessionResponse {
        message: "session closed".to_string(),
        session_id,
    }))
}

#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub state: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_activity: chrono::DateTime<chrono::Utc>,
    pub is_idle: bool,
}

/// `GET /session/{id}/status`.
pub async fn session_status(
    State(state): State<Arc<ServerState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionStatusResponse>, (StatusCode, Json<ErrorBody>)> {
    if !state.store.is_available().await {
        return Err(error_response(StatusCode::SERVICE_UNAVAILABLE, "session store unavailable"));
    }

    let session = state
        .store
        .get_session(&session_id)
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, SessionError::NotFound(session_id.clone()).to_string()))?;

    let now = chrono::Utc::now();
    Ok(Json(SessionStatusResponse {
        session_id: session.session_id,
        state: session.state.as_str().to_string(),
        created_at: session.created_at,
        last_activity: session.last_activity,
        is_idle: session.is_idle(now),
    }))
}

#[derive(Debug, Serialize)]
pub struct VoiceResponse {
    pub text: String,
    pub audio: String,
    pub session_id: String,
    pub session_state: String,
    pub conversation_state: String,
    pub should_end: bool,
    pub asr_confidence: f32,
    pub asr_language: String,
    pub asr_action: String,
}

/// `POST /voice` — multipart `audio`, header `X-Session-ID`. One-shot
/// non-streaming turn (spec §6).
pub async fn voice_once(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<VoiceResponse>, (StatusCode, Json<ErrorBody>)> {
    if !state.store.is_available().await {
        return Err(error_response(StatusCode::SERVICE_UNAVAILABLE, "session store unavailable"));
    }

    let session_id = headers
        .get("X-Session-ID")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "missing X-Session-ID header"))?;

    let mut audio_bytes: Option<Vec<u8>> = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("audio") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))?;
            audio_bytes = Some(bytes.to_vec());
        }
    }
    let audio_bytes = audio_bytes.ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "missing audio field"))?;

    let result = state
        .orchestrator
        .run_http_voice_turn(&session_id, &audio_bytes)
        .await
        .map_err(|e| {
            if e.downcast_ref::<SessionError>().is_some() {
                error_response(StatusCode::NOT_FOUND, e.to_string())
            } else {
                error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        })?;

    Ok(Json(VoiceResponse {
        text: result.text,
        audio: encode_audio_base64(&result.audio),
        session_id,
        session_state: result.session_state,
        conversation_state: result.conversation_state,
        should_end: result.should_end,
        asr_confidence: result.asr_confidence,
        asr_language: result.asr_language,
        asr_action: result.asr_action,
    }))
}
