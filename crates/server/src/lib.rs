// crates/server/src/lib.rs
//! statline server library.
//!
//! Axum-based HTTP server for the statline dashboard backend. The
//! interesting part is the background job scheduler (`jobs`): expensive
//! aggregations run detached from the request cycle, deduplicated by key,
//! with progress observable over SSE.

pub mod cache;
pub mod error;
pub mod jobs;
pub mod rankings;
pub mod routes;
pub mod state;

pub use error::*;
pub use jobs::JobStore;
pub use routes::api_routes;
pub use state::AppState;

use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - API routes (health, jobs, rankings)
/// - CORS for development (allows any origin)
/// - Request tracing
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Integration Tests
// ============================================================================
