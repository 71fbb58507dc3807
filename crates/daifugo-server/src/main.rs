//! Multi-room Axum Daifugo server.
//!
//! # Routes
//!
//! | Method | Path            | Description                            |
//! |--------|-----------------|----------------------------------------|
//! | `GET`  | `/`             | Serve the static web frontend          |
//! | `GET`  | `/ws`           | WebSocket upgrade for game connections |
//! | `GET`  | `/api/rooms`    | List active room IDs (JSON)            |
//!
//! Set `STATIC_DIR` to point at the frontend build output (default: `./public`).

mod room;
mod ws_handler;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::EnvFilter;

use room::{RoomRegistry, SWEEP_INTERVAL};

/// Shared application state available to all handlers.
#[derive(Clone)]
struct AppState {
    registry: Arc<RoomRegistry>,
}

#[tokio::main]
async fn main() {
    // Initialise tracing (respects RUST_LOG env var).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let state = AppState {
        registry: Arc::new(RoomRegistry::new()),
    };

    // Idle-room sweeper: rooms untouched past the timeout are torn down.
    let sweeper_registry = Arc::clone(&state.registry);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.tick().await; // first tick fires immediately
        loop {
            ticker.tick().await;
            sweeper_registry.sweep_idle().await;
        }
    });

    // Static file directory for the web frontend.
    let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| "./public".to_string());

    // Try static files first, fall back to index.html for client-side routing.
    let serve_spa = ServeDir::new(&static_dir)
        .not_found_service(ServeFile::new(format!("{static_dir}/index.html")));

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/rooms", get(rooms_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
        .fallback_service(serve_spa);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Daifugo server listening on {addr}");
    tracing::info!("Serving static files from {static_dir}");

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

/// `GET /ws` — upgrade to WebSocket and hand off to [`ws_handler::handle_socket`].
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_handler::handle_socket(socket, state.registry))
}

/// `GET /api/rooms` — return a JSON array of active room IDs.
async fn rooms_handler(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.registry.list_rooms().await)
}
