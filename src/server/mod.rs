//! HTTP/WebSocket surface (spec §6)
//!
//! Kept from the teacher's `server/mod.rs` shape: a `ServerState` built once
//! and shared via `Arc`, CORS + `TraceLayer` middleware, `axum::serve` over a
//! plain `TcpListener`. Routes are rewired to the spec's surface; JWT auth,
//! the device registry, and HTTPS are dropped — none of them has a
//! counterpart in this crate's external interfaces.

pub mod http;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::engines::{AsrEngine, LlmEngine, TtsEngine};
use crate::orchestrator::{run_housekeeping, Orchestrator};
use crate::store::Store;

/// Period between housekeeping sweeps (spec §4.E "Background housekeeping").
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(10);

/// Shared server state, cloned (cheaply, via `Arc`) into every handler.
pub struct ServerState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub orchestrator: Arc<Orchestrator>,
}

/// Builds the router and serves it on `host:port` until the process is
/// killed. Spawns the background housekeeping task alongside the listener.
pub async fn start(
    host: &str,
    port: u16,
    config: Config,
    store: Arc<dyn Store>,
    asr: Arc<dyn AsrEngine>,
    llm: Arc<dyn LlmEngine>,
    tts: Arc<dyn TtsEngine>,
    system_prompt: String,
) -> Result<()> {
    let config = Arc::new(config);
    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        store.clone(),
        asr,
        llm,
        tts,
        system_prompt,
    ));

    tokio::spawn(run_housekeeping(store.clone(), HOUSEKEEPING_INTERVAL));

    let state = Arc::new(ServerState {
        config,
        store,
        orchestrator,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(http::index_page))
        .route("/session/create", post(http::create_session))
        .route("/session/{id}/close", post(http::close_session))
        .route("/session/{id}/status", get(http::session_status))
        .route("/voice", post(http::voice_once))
        .route("/ws/voice/{session_id}", get(ws::voice_ws))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("invalid host/port")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!(%addr, "voice dialog server listening");
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
