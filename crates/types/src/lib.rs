// crates/types/src/lib.rs
//! Shared job types for the statline background scheduler.
//!
//! A [`Job`] is the unit of trackable deferred work: expensive aggregations
//! (season rankings, portfolio rollups) run detached from the request cycle
//! and report progress through the job record. The job store crates own all
//! mutation; everything else observes jobs through [`JobSnapshot`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a background job.
///
/// Valid transitions: `Pending -> Running -> (Completed | Failed)`. A job
/// never leaves a terminal state except through resurrection, where a
/// `Failed` row is reset in place to `Pending` by the next create for its
/// key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether the job has settled (no further transitions except resurrection).
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A background job record.
///
/// `error` is present iff `status == Failed`; `result` iff
/// `status == Completed`. `updated_at` is bumped on every mutation and is
/// what the ephemeral store's TTL sweep compares against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub key: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total: Option<u64>,
    pub processed: Option<u64>,
    pub error: Option<String>,
    pub result: Option<serde_json::Value>,
}

impl Job {
    /// Create a fresh pending job under the given idempotency key.
    pub fn new(key: impl Into<String>, total: Option<u64>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            key: key.into(),
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            total,
            processed: None,
            error: None,
            result: None,
        }
    }

    /// A non-failed job is "active": at most one exists per key at any time.
    pub fn is_active(&self) -> bool {
        self.status != JobStatus::Failed
    }

    /// Merge a partial update into this job, bumping `updated_at`.
    pub fn apply(&mut self, patch: JobPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(total) = patch.total {
            self.total = Some(total);
        }
        if let Some(processed) = patch.processed {
            self.processed = Some(processed);
        }
        if let Some(error) = patch.error {
            self.error = Some(error);
        }
        if let Some(result) = patch.result {
            self.result = Some(result);
        }
        self.updated_at = Utc::now();
    }

    /// Reset a failed job in place for a fresh attempt: same `id` and `key`,
    /// back to `Pending`, progress/error/result cleared.
    pub fn resurrect(&mut self, total: Option<u64>) {
        self.status = JobStatus::Pending;
        self.total = total;
        self.processed = None;
        self.error = None;
        self.result = None;
        self.updated_at = Utc::now();
    }

    /// The wire-shape view of this job.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            status: self.status,
            total: self.total,
            processed: self.processed,
            error: self.error.clone(),
            result: self.result.clone(),
        }
    }
}

/// Wire shape served to pollers and SSE subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

/// Partial job update. Unset fields are left untouched by the store;
/// `updated_at` is refreshed on every applied patch regardless.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub total: Option<u64>,
    pub processed: Option<u64>,
    pub error: Option<String>,
    pub result: Option<serde_json::Value>,
}

impl JobPatch {
    /// Patch issued by the runner immediately before invoking the worker.
    pub fn running(total: Option<u64>) -> Self {
        Self {
            status: Some(JobStatus::Running),
            total,
            processed: Some(0),
            ..Default::default()
        }
    }

    /// Progress tick from the worker's reporter.
    pub fn progress(processed: u64) -> Self {
        Self {
            processed: Some(processed),
            ..Default::default()
        }
    }

    /// Terminal success patch.
    pub fn completed(result: serde_json::Value) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            result: Some(result),
            ..Default::default()
        }
    }

    /// Terminal failure patch; the message is captured verbatim.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error: Some(error.into()),
            ..Default::default()
        }
    }
}
