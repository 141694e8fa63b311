//! Axum router configuration with middleware.
//!
//! All workflow routes are under `/api/v1/`.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::extract::State;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/invoices", post(handlers::invoice::submit_invoice))
        .route("/reviews/pending", get(handlers::review::list_pending))
        .route(
            "/reviews/{ticket_id}/decision",
            post(handlers::review::submit_decision),
        )
        .route("/threads", get(handlers::thread::list_threads))
        .route("/threads/{thread_id}", get(handlers::thread::get_thread))
        .route("/threads/{thread_id}/audit", get(handlers::thread::get_audit));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Liveness plus the registered worker pools.
async fn health_check(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    let mut pools = state.router.pools();
    pools.sort();
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "pools": pools,
    }))
}
