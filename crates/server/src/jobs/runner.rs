// crates/server/src/jobs/runner.rs
//! Detached execution of a single job.
//!
//! The caller that resolved a pending job hands it to [`start`] and moves
//! on; the spawned task owns the rest of the lifecycle, including the
//! terminal write. There is no retry and no cancellation: a failed job is
//! only retried when a later request for the same key hits the store's
//! resurrection rule, and a worker that never settles leaves its job
//! `running`.

use std::future::Future;

use statline_types::JobPatch;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::store::{JobStore, StoreError};

/// Progress handle passed to workers.
///
/// Ticks are queued to a single writer task per job, so they reach the
/// store in the order they were reported. Each tick is fire-and-forget: a
/// failure to persist one is swallowed and never fails the job. A reporter
/// must not outlive its worker — the runner drains the writer after the
/// worker settles, before the terminal write.
#[derive(Clone)]
pub struct ProgressReporter {
    job_id: String,
    tx: mpsc::UnboundedSender<u64>,
}

impl ProgressReporter {
    /// Open a reporter together with the writer task applying its ticks.
    pub(crate) fn new(store: JobStore, job_id: String) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = job_id.clone();
        let writer = tokio::spawn(async move {
            while let Some(processed) = rx.recv().await {
                if let Err(e) = store.update(&id, JobPatch::progress(processed)).await {
                    tracing::debug!(job_id = %id, error = %e, "dropped progress tick");
                }
            }
        });
        (Self { job_id, tx }, writer)
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Queue a progress tick. Ticks reported after the writer has shut
    /// down are dropped.
    pub fn report(&self, processed: u64) {
        let _ = self.tx.send(processed);
    }
}

/// Drive one job to a terminal state.
///
/// Claims the job first: the pending -> running transition is atomic in
/// the store, so exactly one runner ever drives a given job — a second
/// `start` for the same id finds it already claimed and spawns nothing.
/// No concurrent observer sees `pending` once a run has started; if the
/// claim write fails, the error propagates and nothing is spawned. The
/// worker then runs detached and the task records `completed`/`failed`
/// when it settles.
pub async fn start<W, Fut>(
    store: JobStore,
    job_id: String,
    total: Option<u64>,
    worker: W,
) -> Result<(), StoreError>
where
    W: FnOnce(ProgressReporter) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
{
    if !store.claim(&job_id, total).await? {
        return Ok(());
    }

    tokio::spawn(async move {
        let (reporter, progress_writer) = ProgressReporter::new(store.clone(), job_id.clone());
        // The worker gets its own task so a panic is caught here and
        // recorded as a failure instead of escaping the runner.
        let outcome = tokio::spawn(worker(reporter)).await;
        // The worker and its reporter are gone; drain the queued ticks so
        // a straggler cannot land after the terminal write.
        let _ = progress_writer.await;
        let patch = match outcome {
            Ok(Ok(result)) => JobPatch::completed(result),
            Ok(Err(e)) => JobPatch::failed(e.to_string()),
            Err(join_err) => JobPatch::failed(format!("worker panicked: {join_err}")),
        };
        if let Err(e) = store.update(&job_id, patch).await {
            // Nothing retries a lost terminal write; the job would look
            // stuck running, so it must at least be visible in the logs.
            tracing::error!(job_id = %job_id, error = %e, "failed to record terminal job state");
        }
    });

    Ok(())
}
