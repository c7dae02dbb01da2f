//! HTTP server setup and routing

use crate::state::AppContext;
use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::{handlers, messages, speech, sse};

/// Build the router with every endpoint attached to `ctx`
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        // Health
        .route("/health", get(handlers::health))
        // Cases and sessions
        .route("/api/cases", get(handlers::list_cases))
        .route("/api/cases/:case_id", get(handlers::get_case))
        .route("/api/cases/:case_id/sessions", post(handlers::start_session))
        .route("/api/sessions/:started_case_id", get(handlers::get_session))
        .route("/api/sessions/:started_case_id/end", post(handlers::end_session))
        .route("/api/personas", get(handlers::list_personas))
        // Conversation feed
        .route(
            "/api/messages",
            post(messages::submit_message).get(messages::list_messages),
        )
        .route("/api/messages/stream", get(sse::message_stream))
        // Speech
        .route("/api/speech/synthesize", post(speech::synthesize))
        .route("/api/speech/transcribe", post(speech::transcribe))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve until `shutdown` resolves
pub async fn run<F>(ctx: AppContext, addr: SocketAddr, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on {}", listener.local_addr().unwrap_or(addr));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}
