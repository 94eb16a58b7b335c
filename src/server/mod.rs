mod handlers;
mod state;

use axum::routing::{delete, get};
use axum::Router;
use std::io;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

pub use state::{AppState, DEFAULT_SESSION};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/viewport", get(handlers::viewport))
        .route("/api/visible", get(handlers::visible))
        .route("/api/session", delete(handlers::reset_session))
        .route("/api/search", get(handlers::search))
        .route("/api/shrines", get(handlers::shrines))
        .route("/api/shrines/{slug}", get(handlers::shrine))
        .route("/api/festival-dates", get(handlers::festival_dates))
        .route("/api/decode", get(handlers::decode))
        .route("/api/encode", get(handlers::encode))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start(state: AppState) -> io::Result<()> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let app = build_router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Shrine Atlas listening on http://{}", addr);
    axum::serve(listener, app).await
}
