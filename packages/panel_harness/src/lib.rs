//! # Panel Harness
//!
//! A stand-in control endpoint for developing a remote-control client. The
//! client connects over WebSocket, announces itself with `ready`, and gets a
//! button panel back. Clicks on the panel are answered with the matching
//! device command, and a captured session can be replayed to the client with
//! its original timing.
//!
//! ```text
//! socket frame ─▶ protocol::ControlMessage::decode ─▶ session::Session::dispatch
//!                                                        │
//!                        panel::PanelStore ◀─────────────┤
//!                        playback::PlaybackEngine ◀──────┘
//!                                  │
//! socket frame ◀─ websocket writer ◀─ channel::Outbox ◀──┘
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod panel;
pub mod playback;
pub mod protocol;
pub mod session;
pub mod websocket;

pub use channel::Outbox;
pub use config::{ConfigOverrides, HarnessConfig};
pub use error::HarnessError;
pub use panel::{Button, PanelConfig, PanelStore};
pub use playback::{CapturedEvent, PlaybackEngine, PlaybackLog, PlaybackReport};
pub use protocol::ControlMessage;
pub use session::{Session, SessionState};

use axum::{
    Json, Router,
    extract::{ConnectInfo, State, ws::WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Shared, read-only state handed to every connection.
#[derive(Clone)]
pub struct HarnessState {
    pub config: Arc<HarnessConfig>,
    /// Capture replayed after each `ready`, if configured.
    pub playback: Option<Arc<PlaybackLog>>,
}

impl HarnessState {
    /// Build state from config, loading the playback capture if one is set.
    pub fn new(config: HarnessConfig) -> error::Result<Self> {
        let playback = match config.playback.file {
            Some(ref path) => Some(Arc::new(PlaybackLog::load(path)?)),
            None => None,
        };
        Ok(Self {
            config: Arc::new(config),
            playback,
        })
    }
}

pub fn create_router(state: HarnessState) -> Router {
    let ws_path = state.config.server.path.clone();
    Router::new()
        .route(&ws_path, get(websocket_handler))
        .route("/health", get(health))
        .with_state(state)
}

/// Run the harness on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: HarnessState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<HarnessState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket::handle_websocket(socket, state, peer))
}

async fn health(State(state): State<HarnessState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "path": state.config.server.path,
        "playback_events": state.playback.as_ref().map_or(0, |log| log.len()),
    }))
}
