//! HTTP gateway for Parley.
//!
//! Exposes the chat pipeline to a chat-platform client:
//! - `GET /health`
//! - `POST /api/chat`: one JSON reply
//! - `POST /api/chat/stream`: `text/event-stream` of `data: {"content": …}` events
//!
//! Built on Axum.

pub mod services;

pub use services::{Services, ServicesError};

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::header,
    response::{
        IntoResponse, Json,
        sse::{Event as SseEvent, Sse},
    },
    routing::{get, post},
};
use futures::StreamExt;
use parley_chat::{ChatOrchestrator, ChatOutcome, ChatRequest};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

/// Request bodies above this size are rejected with 413.
pub const BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub orchestrator: ChatOrchestrator,
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/stream", post(chat_stream_handler))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server.
pub async fn start(config: parley_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let services = Services::from_config(&config).await?;
    services.pool.ensure_loaded(services.store.as_ref()).await;
    if services.pool.candidates().is_empty() {
        tracing::warn!(
            "No completion provider configured: set PARLEY_API_KEY or add pool entries"
        );
    }

    let state = Arc::new(GatewayState {
        orchestrator: services.orchestrator,
    });
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /api/chat`
async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Json<ChatOutcome> {
    info!(discord_id = %payload.discord_id, "chat request");
    Json(state.orchestrator.chat_once(payload).await)
}

/// `POST /api/chat/stream`
async fn chat_stream_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> impl IntoResponse {
    info!(discord_id = %payload.discord_id, "chat/stream SSE request");

    let rx = state.orchestrator.handle(payload);
    let stream = ReceiverStream::new(rx)
        .map(|event| Ok::<_, Infallible>(SseEvent::default().data(event.to_json())));

    ([(header::CACHE_CONTROL, "no-cache")], Sse::new(stream))
}
