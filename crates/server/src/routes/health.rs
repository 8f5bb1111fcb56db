// crates/server/src/routes/health.rs
//! Health endpoint.
//!
//! Besides liveness, this reports which job-store backend the process
//! selected at startup, so a probe can tell a durable deployment from one
//! running on the in-process fallback (where jobs vanish on restart).

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    /// Active job-store backend: "durable" or "ephemeral".
    pub store: String,
}

/// GET /api/health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
        store: state.jobs.backend().to_string(),
    })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health_check))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn health_body(state: Arc<AppState>) -> HealthResponse {
        let app = Router::new().nest("/api", router()).with_state(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_ephemeral_backend() {
        let health = health_body(AppState::new(JobStore::ephemeral())).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.store, "ephemeral");
        assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_health_reports_durable_backend() {
        let db = statline_db::Database::new_in_memory().await.unwrap();
        let health = health_body(AppState::new(JobStore::durable(db))).await;
        assert_eq!(health.store, "durable");
    }
}
