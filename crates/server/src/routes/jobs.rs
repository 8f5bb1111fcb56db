// crates/server/src/routes/jobs.rs
//! Job endpoints: snapshot polling and the SSE progress channel.
//!
//! - GET /jobs/{id} — Current snapshot of one job
//! - GET /jobs/{id}/events — SSE stream of snapshots until terminal

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use statline_types::JobSnapshot;

/// Poll interval bounds for the progress channel, in milliseconds.
const MIN_POLL_MS: u64 = 1_000;
const MAX_POLL_MS: u64 = 30_000;
const DEFAULT_POLL_MS: u64 = 5_000;

/// Query parameters for the SSE endpoint.
#[derive(Debug, Deserialize)]
struct EventsQuery {
    /// Poll interval in milliseconds, clamped to [1000, 30000].
    interval: Option<u64>,
}

fn clamp_interval(requested: Option<u64>) -> Duration {
    Duration::from_millis(
        requested
            .unwrap_or(DEFAULT_POLL_MS)
            .clamp(MIN_POLL_MS, MAX_POLL_MS),
    )
}

/// GET /api/jobs/{id} — Current snapshot of one job.
async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobSnapshot>> {
    match state.jobs.get_by_id(&id).await {
        Some(job) => Ok(Json(job.snapshot())),
        None => Err(ApiError::JobNotFound(id)),
    }
}

/// GET /api/jobs/{id}/events?interval=5000 — SSE progress channel.
///
/// Emits a `retry:` reconnection hint on open, then one snapshot frame per
/// tick. The stream closes right after a terminal frame, or after a
/// `{"status":"missing"}` frame when the job is unknown. Progress between
/// ticks may be skipped; that staleness bound is the contract, not a bug.
/// Dropping the subscriber drops the stream and its timer with it.
async fn job_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let interval = clamp_interval(query.interval);
    let store = state.jobs.clone();

    let stream = async_stream::stream! {
        // Reconnection hint first: a dropped subscriber should come back at
        // roughly its own poll cadence.
        yield Ok(Event::default().retry(interval));

        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match store.get_by_id(&id).await {
                Some(job) => {
                    let terminal = job.status.is_terminal();
                    let json = serde_json::to_string(&job.snapshot()).unwrap_or_default();
                    yield Ok(Event::default().data(json));
                    if terminal {
                        break;
                    }
                }
                None => {
                    let json = serde_json::json!({"id": id, "status": "missing"}).to_string();
                    yield Ok(Event::default().data(json));
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/events", get(job_events))
}
