//! huddle relay server.
//!
//! Clients connect to `/ws`, announce an identity and exchange chat,
//! typing and presence events. The relay keeps nothing but the identity
//! announced on each live connection.

use axum::{extract::State, routing::get, Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod config;
pub mod frame;
pub mod frontend;
pub mod registry;
pub mod relay;
pub mod state;
pub mod ws;

pub use config::{FrontendMode, ServerConfig};
pub use frame::RelayFrame;
pub use registry::{ConnectionId, ConnectionRegistry};
pub use relay::{Audience, Relay};
pub use state::AppState;

/// Build the full router for `state`.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let frontend = state.config.frontend.clone();
    let router = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    frontend.mount(router)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "connections": state.relay.connection_count().await,
    }))
}

/// Serve the relay on an already bound listener until the process stops.
pub async fn serve(listener: tokio::net::TcpListener, config: ServerConfig) -> anyhow::Result<()> {
    let state = AppState::new(config);
    axum::serve(listener, app(state)).await?;
    Ok(())
}
