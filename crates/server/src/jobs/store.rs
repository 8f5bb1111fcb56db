// crates/server/src/jobs/store.rs
//! Job persistence behind a single seam with two interchangeable backends.
//!
//! The backend is chosen once at process start by capability: if SQLite
//! opened, jobs are durable and deduplicated across processes; otherwise a
//! process-local map stands in. Nothing downstream of construction branches
//! on which backend is active.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use statline_db::{jobs as job_queries, Database};
use statline_types::{Job, JobPatch, JobStatus};
use thiserror::Error;

/// How long an untouched ephemeral job survives before the lazy sweep
/// removes it.
pub const EPHEMERAL_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job store write failed: {0}")]
    Db(#[from] statline_db::DbError),

    #[error("job index lock poisoned")]
    LockPoisoned,
}

/// Storage seam for job records. This type exclusively owns all mutation of
/// jobs; runners and routes go through it.
#[derive(Clone)]
pub enum JobStore {
    Durable(Database),
    Ephemeral(MemoryJobs),
}

impl JobStore {
    pub fn durable(db: Database) -> Self {
        JobStore::Durable(db)
    }

    pub fn ephemeral() -> Self {
        JobStore::Ephemeral(MemoryJobs::new(EPHEMERAL_TTL))
    }

    /// Ephemeral store with a custom TTL, for tests.
    pub fn ephemeral_with_ttl(ttl: Duration) -> Self {
        JobStore::Ephemeral(MemoryJobs::new(ttl))
    }

    /// Name of the active backend, for health reporting.
    pub fn backend(&self) -> &'static str {
        match self {
            JobStore::Durable(_) => "durable",
            JobStore::Ephemeral(_) => "ephemeral",
        }
    }

    /// Fetch a job by id. Read failures degrade to `None` so a poller sees
    /// "missing" instead of a broken stream.
    pub async fn get_by_id(&self, id: &str) -> Option<Job> {
        match self {
            JobStore::Durable(db) => match job_queries::get_job_by_id(db, id).await {
                Ok(job) => job,
                Err(e) => {
                    tracing::warn!(job_id = %id, error = %e, "job read failed, treating as missing");
                    None
                }
            },
            JobStore::Ephemeral(mem) => mem.get_by_id(id),
        }
    }

    /// Fetch the canonical job for a key: most recently created row wins.
    pub async fn get_by_key(&self, key: &str) -> Option<Job> {
        match self {
            JobStore::Durable(db) => match job_queries::get_job_by_key(db, key).await {
                Ok(job) => job,
                Err(e) => {
                    tracing::warn!(job_key = %key, error = %e, "job read failed, treating as missing");
                    None
                }
            },
            JobStore::Ephemeral(mem) => mem.get_by_key(key),
        }
    }

    /// Idempotent create: an active (non-failed) job for `key` is returned
    /// unchanged; a failed job is resurrected in place (same id, fresh
    /// pending state); otherwise a brand-new pending job is inserted.
    ///
    /// The lookup and the insert are not one atomic step. Two
    /// near-simultaneous creates for a brand-new key may both insert; the
    /// deterministic `get_by_key` tie-break resolves the duplicates to one
    /// observable job, so the duplicated work is bounded to that window.
    pub async fn create(&self, key: &str, total: Option<u64>) -> Result<Job, StoreError> {
        match self {
            JobStore::Durable(db) => {
                if let Some(mut job) = job_queries::get_job_by_key(db, key).await? {
                    if job.is_active() {
                        return Ok(job);
                    }
                    job_queries::reset_failed_job(db, &job.id, total).await?;
                    job.resurrect(total);
                    return Ok(job);
                }
                let job = Job::new(key, total);
                job_queries::insert_job(db, &job).await?;
                Ok(job)
            }
            JobStore::Ephemeral(mem) => mem.create(key, total).ok_or(StoreError::LockPoisoned),
        }
    }

    /// Atomically transition a pending job to running, setting `total` and
    /// zeroing `processed`. Returns `false` when the job is absent, already
    /// running, or terminal — i.e. when the caller did not win the claim.
    /// The runner goes through this, never through a blind `update`, so two
    /// callers resolving the same pending job can never both drive it.
    pub async fn claim(&self, id: &str, total: Option<u64>) -> Result<bool, StoreError> {
        match self {
            JobStore::Durable(db) => Ok(job_queries::claim_pending_job(db, id, total).await?),
            JobStore::Ephemeral(mem) => mem.claim(id, total).ok_or(StoreError::LockPoisoned),
        }
    }

    /// Merge `patch` into the job, refreshing `updated_at`. A no-op for
    /// unknown ids. Write failures propagate: callers decide whether a lost
    /// write is tolerable (progress ticks) or must be logged (terminal
    /// transitions).
    pub async fn update(&self, id: &str, patch: JobPatch) -> Result<(), StoreError> {
        match self {
            JobStore::Durable(db) => {
                job_queries::update_job(db, id, &patch).await?;
                Ok(())
            }
            JobStore::Ephemeral(mem) => mem.update(id, patch).ok_or(StoreError::LockPoisoned),
        }
    }
}

/// Process-local fallback store.
///
/// State does not survive restarts and gives no cross-process
/// deduplication — an accepted degradation when SQLite is unavailable, not
/// something this type papers over. Every access lazily sweeps jobs whose
/// `updated_at` is older than the TTL; that sweep is the only automatic
/// resource reclamation in the scheduler.
#[derive(Clone)]
pub struct MemoryJobs {
    inner: Arc<RwLock<MemoryIndex>>,
    ttl: chrono::Duration,
}

#[derive(Default)]
struct MemoryIndex {
    jobs: HashMap<String, Job>,
    /// key -> id of the most recently created job under that key.
    by_key: HashMap<String, String>,
}

impl MemoryJobs {
    fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemoryIndex::default())),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1)),
        }
    }

    /// Run `f` against the swept index. Returns `None` if the lock is
    /// poisoned (logged, never propagated as a panic).
    fn with_index<T>(&self, f: impl FnOnce(&mut MemoryIndex) -> T) -> Option<T> {
        match self.inner.write() {
            Ok(mut index) => {
                let cutoff = Utc::now() - self.ttl;
                let MemoryIndex { jobs, by_key } = &mut *index;
                jobs.retain(|_, job| job.updated_at >= cutoff);
                by_key.retain(|_, id| jobs.contains_key(id));
                Some(f(&mut index))
            }
            Err(e) => {
                tracing::error!("RwLock poisoned accessing job index: {e}");
                None
            }
        }
    }

    fn get_by_id(&self, id: &str) -> Option<Job> {
        self.with_index(|index| index.jobs.get(id).cloned())
            .flatten()
    }

    fn get_by_key(&self, key: &str) -> Option<Job> {
        self.with_index(|index| {
            index
                .by_key
                .get(key)
                .and_then(|id| index.jobs.get(id))
                .cloned()
        })
        .flatten()
    }

    fn create(&self, key: &str, total: Option<u64>) -> Option<Job> {
        self.with_index(|index| {
            if let Some(job) = index
                .by_key
                .get(key)
                .and_then(|id| index.jobs.get_mut(id))
            {
                if job.is_active() {
                    return job.clone();
                }
                job.resurrect(total);
                return job.clone();
            }
            let job = Job::new(key, total);
            index.by_key.insert(key.to_string(), job.id.clone());
            index.jobs.insert(job.id.clone(), job.clone());
            job
        })
    }

    fn claim(&self, id: &str, total: Option<u64>) -> Option<bool> {
        self.with_index(|index| match index.jobs.get_mut(id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.apply(JobPatch::running(total));
                true
            }
            _ => false,
        })
    }

    fn update(&self, id: &str, patch: JobPatch) -> Option<()> {
        self.with_index(|index| {
            if let Some(job) = index.jobs.get_mut(id) {
                job.apply(patch);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statline_types::JobStatus;

    async fn durable() -> JobStore {
        JobStore::durable(Database::new_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_create_is_idempotent_ephemeral() {
        let store = JobStore::ephemeral();
        let first = store.create("rankings:2024:reg", Some(18)).await.unwrap();
        let second = store.create("rankings:2024:reg", Some(18)).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.status, JobStatus::Pending);

        let canonical = store.get_by_key("rankings:2024:reg").await.unwrap();
        assert_eq!(canonical.id, first.id);
    }

    #[tokio::test]
    async fn test_create_is_idempotent_durable() {
        let store = durable().await;
        let first = store.create("rankings:2024:reg", Some(18)).await.unwrap();
        let second = store.create("rankings:2024:reg", Some(18)).await.unwrap();
        assert_eq!(first.id, second.id);

        let canonical = store.get_by_key("rankings:2024:reg").await.unwrap();
        assert_eq!(canonical.id, first.id);
    }

    #[tokio::test]
    async fn test_create_returns_running_job_unchanged() {
        for store in [JobStore::ephemeral(), durable().await] {
            let job = store.create("k", Some(10)).await.unwrap();
            store
                .update(&job.id, JobPatch::running(Some(10)))
                .await
                .unwrap();
            store.update(&job.id, JobPatch::progress(3)).await.unwrap();

            let resolved = store.create("k", Some(99)).await.unwrap();
            assert_eq!(resolved.id, job.id);
            assert_eq!(resolved.status, JobStatus::Running);
            assert_eq!(resolved.processed, Some(3));
            // total untouched: the active job was returned as-is
            assert_eq!(resolved.total, Some(10));
        }
    }

    #[tokio::test]
    async fn test_create_resurrects_failed_job() {
        for store in [JobStore::ephemeral(), durable().await] {
            let job = store.create("k", Some(5)).await.unwrap();
            store
                .update(&job.id, JobPatch::failed("upstream 503"))
                .await
                .unwrap();

            let revived = store.create("k", Some(7)).await.unwrap();
            assert_eq!(revived.id, job.id);
            assert_eq!(revived.status, JobStatus::Pending);
            assert_eq!(revived.total, Some(7));
            assert_eq!(revived.error, None);
            assert_eq!(revived.result, None);
            assert_eq!(revived.processed, None);

            // And the stored row agrees with the returned copy.
            let fetched = store.get_by_id(&job.id).await.unwrap();
            assert_eq!(fetched.status, JobStatus::Pending);
            assert_eq!(fetched.error, None);
        }
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        for store in [JobStore::ephemeral(), durable().await] {
            let job = store.create("k", Some(5)).await.unwrap();

            assert!(store.claim(&job.id, Some(5)).await.unwrap());
            let claimed = store.get_by_id(&job.id).await.unwrap();
            assert_eq!(claimed.status, JobStatus::Running);
            assert_eq!(claimed.processed, Some(0));

            // Second claimant loses; so do claims on terminal or unknown jobs.
            assert!(!store.claim(&job.id, Some(5)).await.unwrap());
            store
                .update(&job.id, JobPatch::failed("upstream 503"))
                .await
                .unwrap();
            assert!(!store.claim(&job.id, Some(5)).await.unwrap());
            assert!(!store.claim("ghost", None).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_resurrected_job_is_claimable_again() {
        for store in [JobStore::ephemeral(), durable().await] {
            let job = store.create("k", Some(5)).await.unwrap();
            assert!(store.claim(&job.id, Some(5)).await.unwrap());
            store
                .update(&job.id, JobPatch::failed("upstream 503"))
                .await
                .unwrap();

            let revived = store.create("k", Some(7)).await.unwrap();
            assert_eq!(revived.id, job.id);
            assert!(store.claim(&revived.id, Some(7)).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_noop() {
        for store in [JobStore::ephemeral(), durable().await] {
            store
                .update("ghost", JobPatch::progress(1))
                .await
                .expect("unknown id should not error");
            assert!(store.get_by_id("ghost").await.is_none());
        }
    }

    #[tokio::test]
    async fn test_terminal_state_survives_further_progress() {
        let store = JobStore::ephemeral();
        let job = store.create("k", Some(2)).await.unwrap();
        store
            .update(&job.id, JobPatch::completed(serde_json::json!({"ok": true})))
            .await
            .unwrap();
        // A straggling progress tick must not regress the status.
        store.update(&job.id, JobPatch::progress(2)).await.unwrap();

        let fetched = store.get_by_id(&job.id).await.unwrap();
        assert_eq!(fetched.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_ttl_sweep_evicts_stale_jobs() {
        let store = JobStore::ephemeral_with_ttl(Duration::from_millis(20));
        let job = store.create("k", None).await.unwrap();
        assert!(store.get_by_id(&job.id).await.is_some());

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(store.get_by_id(&job.id).await.is_none());
        assert!(store.get_by_key("k").await.is_none());

        // The key is free again: the next create starts a fresh job.
        let fresh = store.create("k", None).await.unwrap();
        assert_ne!(fresh.id, job.id);
    }

    #[tokio::test]
    async fn test_touched_jobs_outlive_the_ttl() {
        let store = JobStore::ephemeral_with_ttl(Duration::from_millis(80));
        let job = store.create("k", Some(100)).await.unwrap();

        // Progress writes keep bumping updated_at, so the job stays alive
        // well past the TTL measured from creation.
        for tick in 1..=4u64 {
            tokio::time::sleep(Duration::from_millis(40)).await;
            store
                .update(&job.id, JobPatch::progress(tick))
                .await
                .unwrap();
        }
        assert!(store.get_by_id(&job.id).await.is_some());
    }

    #[tokio::test]
    async fn test_durable_reads_degrade_to_missing() {
        let db = Database::new_in_memory().await.unwrap();
        let store = JobStore::durable(db.clone());
        let job = store.create("k", None).await.unwrap();

        db.pool().close().await;

        // Reads never raise: the job just looks missing.
        assert!(store.get_by_id(&job.id).await.is_none());
        assert!(store.get_by_key("k").await.is_none());

        // Writes do propagate failure.
        assert!(store.update(&job.id, JobPatch::progress(1)).await.is_err());
    }
}
