// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use crate::cache::ResultCache;
use crate::jobs::JobStore;

/// Shared application state accessible from all route handlers.
///
/// The job store backend is decided once, before this is constructed;
/// handlers only ever see the seam.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Job store (durable SQLite or process-local fallback).
    pub jobs: JobStore,
    /// Time-bounded cache of final computation results.
    pub results: Arc<ResultCache>,
}

impl AppState {
    /// Create a new application state wrapped in an Arc for sharing.
    pub fn new(jobs: JobStore) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            jobs,
            results: Arc::new(ResultCache::default()),
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_app_state_new() {
        let state = AppState::new(JobStore::ephemeral());
        assert!(state.uptime_secs() < 1);
    }

    #[tokio::test]
    async fn test_app_state_clone_shares_store() {
        let state = AppState::new(JobStore::ephemeral());
        let job = state.jobs.create("k", None).await.unwrap();

        let cloned = state.clone();
        assert!(cloned.jobs.get_by_id(&job.id).await.is_some());
    }
}
