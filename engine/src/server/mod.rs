//! HTTP and WebSocket server
//!
//! # Endpoints
//!
//! - GET /                                              - Service banner
//! - GET /api/health                                    - Oracle availability
//! - GET /api/conversations                             - Known conversation ids
//! - GET /api/conversations/:id                         - Conversation snapshot
//! - POST /api/conversations/:id/reset                  - Clear a conversation
//! - GET|POST /api/conversations/:id/goals              - List / create goals
//! - GET|PUT|DELETE /api/conversations/:id/goals/:goal  - Read / edit / delete a goal
//! - POST /api/conversations/:id/goals/:goal/lock       - Lock a goal
//! - POST /api/conversations/:id/goals/:goal/unlock     - Unlock a goal
//! - GET /ws, GET /ws/:id                               - Chat socket

use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use sdk::EngineError;
use std::net::SocketAddr;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::pipeline::Orchestrator;

pub mod api;
pub mod ws;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
}

/// Build the application router
pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(api::root))
        .route("/api/health", get(api::health))
        .route("/api/conversations", get(api::list_conversations))
        .route("/api/conversations/:id", get(api::get_conversation))
        .route("/api/conversations/:id/reset", post(api::reset_conversation))
        .route(
            "/api/conversations/:id/goals",
            get(api::list_goals).post(api::create_goal),
        )
        .route(
            "/api/conversations/:id/goals/:goal_id",
            get(api::get_goal)
                .put(api::update_goal)
                .delete(api::delete_goal),
        )
        .route(
            "/api/conversations/:id/goals/:goal_id/lock",
            post(api::lock_goal),
        )
        .route(
            "/api/conversations/:id/goals/:goal_id/unlock",
            post(api::unlock_goal),
        )
        .route("/ws", get(ws::default_handler))
        .route("/ws/:id", get(ws::conversation_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}

/// Bind `host:port` and serve until Ctrl-C
pub async fn serve(
    state: AppState,
    host: &str,
    port: u16,
    allowed_origins: &[String],
) -> Result<(), EngineError> {
    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .map_err(|e| EngineError::Network(format!("Failed to bind to {}:{}: {}", host, port, e)))?;

    let addr: SocketAddr = listener
        .local_addr()
        .map_err(|e| EngineError::Network(format!("Failed to get local address: {}", e)))?;

    tracing::info!("OnGoal server listening on http://{}", addr);
    tracing::info!("WebSocket endpoint: ws://{}/ws", addr);

    let app = router(state, allowed_origins);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Server shutting down gracefully");
        })
        .await
        .map_err(|e| EngineError::Network(format!("Server error: {}", e)))
}
