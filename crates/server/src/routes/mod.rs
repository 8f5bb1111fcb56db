//! API route handlers for the statline server.

pub mod health;
pub mod jobs;
pub mod rankings;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - GET /api/health - Health check
/// - GET /api/jobs/:id - Current snapshot of one job
/// - GET /api/jobs/:id/events - SSE progress channel until terminal
/// - GET /api/rankings/players - Season player rankings (job-backed)
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", jobs::router())
        .nest("/api", rankings::router())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobStore;

    #[tokio::test]
    async fn test_api_routes_creation() {
        let state = AppState::new(JobStore::ephemeral());
        let _router = api_routes(state);
    }
}
