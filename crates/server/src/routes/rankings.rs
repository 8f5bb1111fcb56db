// crates/server/src/routes/rankings.rs
//! Ranking endpoints built on the job scheduler.
//!
//! - GET /rankings/players — Season-long player rankings (job-backed)
//!
//! The handler is the scheduler's consumer protocol end to end: result
//! cache first, then resolve-or-create the job under a key derived from
//! every output-affecting parameter, start the runner for a pending job
//! (detached, never awaited), and answer with either the stored result or
//! an in-progress snapshot.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use chrono::Datelike;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::jobs::{key, runner};
use crate::rankings;
use crate::state::AppState;
use statline_types::JobStatus;

/// Query parameters for the player rankings endpoint.
#[derive(Debug, Deserialize)]
struct RankingsQuery {
    /// Season year; defaults to the current year.
    season: Option<u32>,
    /// "reg" (18 weeks) or "post" (4 weeks).
    scope: Option<String>,
    /// Skip cache and any existing job; always compute fresh.
    #[serde(default)]
    refresh: bool,
}

/// GET /api/rankings/players?season=2024&scope=reg&refresh=false
async fn player_rankings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RankingsQuery>,
) -> ApiResult<Response> {
    let season = query
        .season
        .unwrap_or_else(|| chrono::Utc::now().year() as u32);
    let scope = query.scope.unwrap_or_else(|| "reg".to_string());
    let weeks = rankings::weeks_in_scope(&scope);

    let cache_key = key::computation_key(
        "rankings:players",
        &[("season", &season.to_string()), ("scope", &scope)],
    );

    if !query.refresh {
        if let Some(result) = state.results.get(&cache_key) {
            return Ok(Json(result).into_response());
        }
    }

    let job_key = if query.refresh {
        key::refresh_key(&cache_key)
    } else {
        cache_key.clone()
    };

    // A failed job counts as absent here: create() resurrects it in place.
    let job = match state.jobs.get_by_key(&job_key).await {
        Some(job) if job.is_active() => job,
        _ => state.jobs.create(&job_key, Some(weeks)).await?,
    };

    if job.status == JobStatus::Completed {
        if let Some(result) = job.result.clone() {
            return Ok(Json(result).into_response());
        }
    }

    if job.status == JobStatus::Pending {
        let results = state.results.clone();
        let worker_scope = scope.clone();
        let worker_key = cache_key.clone();
        // start() claims the job; if a concurrent request resolved the same
        // pending job and got there first, this spawns nothing.
        runner::start(
            state.jobs.clone(),
            job.id.clone(),
            Some(weeks),
            move |reporter| async move {
                let payload =
                    rankings::season_player_rankings(season, worker_scope, reporter).await?;
                results.put(&worker_key, payload.clone());
                Ok(payload)
            },
        )
        .await?;

        // Re-read so the caller sees running, never a started-but-pending job.
        let current = state.jobs.get_by_id(&job.id).await.unwrap_or(job);
        return Ok((StatusCode::ACCEPTED, Json(current.snapshot())).into_response());
    }

    // Already running under another request: hand back the live snapshot.
    Ok((StatusCode::ACCEPTED, Json(job.snapshot())).into_response())
}

/// Build the rankings router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/rankings/players", get(player_rankings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobStore;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(state: Arc<AppState>) -> Router {
        Router::new().nest("/api", router().merge(crate::routes::jobs::router())).with_state(state)
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    /// Poll the job snapshot endpoint until the job settles.
    async fn wait_for_terminal(app: &Router, job_id: &str) -> serde_json::Value {
        for _ in 0..50 {
            let (status, snapshot) = get_json(app, &format!("/api/jobs/{job_id}")).await;
            assert_eq!(status, StatusCode::OK);
            if snapshot["status"] == "completed" || snapshot["status"] == "failed" {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("job {job_id} never settled");
    }

    #[tokio::test]
    async fn test_first_request_kicks_off_a_job() {
        let state = AppState::new(JobStore::ephemeral());
        let app = app(state);

        let (status, snapshot) =
            get_json(&app, "/api/rankings/players?season=2024&scope=reg").await;
        assert_eq!(status, StatusCode::ACCEPTED);
        // Marked running before the handler replied; pending is never visible.
        assert_ne!(snapshot["status"], "pending");
        assert_eq!(snapshot["total"], 18);

        let done = wait_for_terminal(&app, snapshot["id"].as_str().unwrap()).await;
        assert_eq!(done["status"], "completed");
        assert_eq!(done["result"]["season"], 2024);
    }

    #[tokio::test]
    async fn test_completed_result_is_served_directly() {
        let state = AppState::new(JobStore::ephemeral());
        let app = app(state);

        let (_, snapshot) = get_json(&app, "/api/rankings/players?season=2024&scope=post").await;
        wait_for_terminal(&app, snapshot["id"].as_str().unwrap()).await;

        let (status, body) = get_json(&app, "/api/rankings/players?season=2024&scope=post").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["scope"], "post");
        assert_eq!(body["weeks"], 4);
        assert!(body["rankings"].is_array());
    }

    #[tokio::test]
    async fn test_duplicate_requests_share_one_job() {
        let state = AppState::new(JobStore::ephemeral());
        let app = app(state);

        let (_, first) = get_json(&app, "/api/rankings/players?season=2024&scope=reg").await;
        let (status, second) = get_json(&app, "/api/rankings/players?season=2024&scope=reg").await;

        // Either still in flight (202, same job) or already done (200 result).
        if status == StatusCode::ACCEPTED {
            assert_eq!(second["id"], first["id"]);
        } else {
            assert_eq!(status, StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_concurrent_requests_settle_one_job() {
        let state = AppState::new(JobStore::ephemeral());
        let app = app(state);

        // Both land while the key has no settled job; the claim in the
        // runner keeps them from driving the shared job twice.
        let (first, second) = tokio::join!(
            get_json(&app, "/api/rankings/players?season=2024&scope=reg"),
            get_json(&app, "/api/rankings/players?season=2024&scope=reg"),
        );
        let id = first.1["id"].as_str().unwrap();
        if second.0 == StatusCode::ACCEPTED {
            assert_eq!(second.1["id"], id);
        }

        let done = wait_for_terminal(&app, id).await;
        assert_eq!(done["status"], "completed");
        assert_eq!(done["processed"], done["total"]);
    }

    #[tokio::test]
    async fn test_refresh_always_gets_a_fresh_job() {
        let state = AppState::new(JobStore::ephemeral());
        let app = app(state);

        let (_, first) = get_json(&app, "/api/rankings/players?season=2024&scope=reg").await;
        wait_for_terminal(&app, first["id"].as_str().unwrap()).await;

        let (status, second) =
            get_json(&app, "/api/rankings/players?season=2024&scope=reg&refresh=true").await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_ne!(second["id"], first["id"]);
    }

    #[tokio::test]
    async fn test_parameters_are_part_of_the_key() {
        let state = AppState::new(JobStore::ephemeral());
        let app = app(state);

        let (_, reg) = get_json(&app, "/api/rankings/players?season=2024&scope=reg").await;
        let (_, post) = get_json(&app, "/api/rankings/players?season=2024&scope=post").await;
        assert_ne!(reg["id"], post["id"]);
    }
}
