//! HTTP API over the session manager and chat loop

pub mod api;
pub mod state;

use anyhow::Result;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Configuration for the web server
pub struct WebConfig {
    pub port: u16,
}

/// Start the web server; disconnects every session on Ctrl-C
pub async fn serve(config: WebConfig, state: AppState) -> Result<()> {
    let sessions = state.sessions.clone();
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting web server on http://localhost:{}", config.port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    sessions.shutdown().await;
    Ok(())
}

/// Create the router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(api::health_check))
        // Sessions
        .route("/servers", get(api::list_servers))
        .route("/servers", post(api::connect_server))
        .route("/servers/:name", delete(api::disconnect_server))
        // Tools
        .route("/tools", get(api::list_tools))
        .route("/servers/:name/tools/:tool", post(api::execute_tool))
        // Chat
        .route("/chat", post(api::chat));

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
