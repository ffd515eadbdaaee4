//! WebSocket surface (spec §6 "WebSocket surface")
//!
//! Translates axum's `Message` in/out of the orchestrator's transport-agnostic
//! `ClientEvent`/`ServerEvent`, following the teacher's `realtime_voice.rs`
//! split: one task reads the socket and feeds an inbound channel, one task
//! drains an outbound channel and is the socket's single writer.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::orchestrator::{ClientEvent, ServerEvent};
use crate::providers::encode_audio_base64;
use crate::server::ServerState;

/// `GET /ws/voice/{session_id}`.
pub async fn voice_ws(
    State(state): State<Arc<ServerState>>,
    Path(session_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, session_id, socket))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ClientControl {
    Ping,
    End,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerWireEvent {
    Pong,
    Transcription {
        text: String,
        confidence: f32,
        language: String,
        action: String,
    },
    Response {
        text: String,
        audio: String,
        conversation_state: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        should_end: Option<bool>,
    },
    BargeIn,
    Error {
        message: String,
    },
}

impl ServerEvent {
    fn into_wire(self) -> ServerWireEvent {
        match self {
            ServerEvent::Pong => ServerWireEvent::Pong,
            ServerEvent::Transcription { text, confidence, language, action } => {
                ServerWireEvent::Transcription { text, confidence, language, action }
            }
            ServerEvent::Response { text, audio, conversation_state, should_end } => {
                ServerWireEvent::Response {
                    text,
                    audio: encode_audio_base64(&audio),
                    conversation_state,
                    should_end,
                }
            }
            ServerEvent::BargeIn => ServerWireEvent::BargeIn,
            ServerEvent::Error { message } => ServerWireEvent::Error { message },
        }
    }
}

async fn handle_socket(state: Arc<ServerState>, session_id: String, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (inbound_tx, inbound_rx) = mpsc::channel::<ClientEvent>(32);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerEvent>(32);

    // Single writer: the only task that ever calls `ws_tx.send(...)`.
    let writer = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let wire = event.into_wire();
            let text = match serde_json::to_string(&wire) {
                Ok(t) => t,
                Err(e) => {
                    warn!(error = %e, "failed to serialize outbound event");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let orchestrator = state.orchestrator.clone();
    let run_session_id = session_id.clone();
    let runner = tokio::spawn(async move {
        if let Err(e) = orchestrator.run_session(&run_session_id, inbound_rx, outbound_tx).await {
            debug!(error = %e, session_id = %run_session_id, "voice session ended with an error");
        }
    });

    while let Some(Ok(message)) = ws_rx.next().await {
        let event = match message {
            Message::Binary(bytes) => Some(ClientEvent::Pcm(bytes.to_vec())),
            Message::Text(text) => match serde_json::from_str::<ClientControl>(&text) {
                Ok(ClientControl::Ping) => Some(ClientEvent::Ping),
                Ok(ClientControl::End) => Some(ClientEvent::End),
                Err(e) => {
                    debug!(error = %e, "ignoring unrecognized control frame");
                    None
                }
            },
            Message::Close(_) => Some(ClientEvent::End),
            Message::Ping(_) | Message::Pong(_) => None,
        };

        if let Some(event) = event {
            let is_end = matches!(event, ClientEvent::End);
            if inbound_tx.send(event).await.is_err() {
                break;
            }
            if is_end {
                break;
            }
        }
    }

    drop(inbound_tx);
    let _ = runner.await;
    let _ = writer.await;
}
