// crates/db/src/jobs.rs
//! Query functions for the `jobs` table.
//!
//! These are the primitives the durable job-store backend is built from.
//! The idempotent-create protocol (return active row / resurrect failed row
//! / insert fresh) lives in the store layer; this module only reads and
//! writes rows.

use crate::{Database, DbResult};
use chrono::{DateTime, Utc};
use sqlx::Row;
use statline_types::{Job, JobPatch, JobStatus};

fn decode_timestamp(ms: i64) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| sqlx::Error::Decode(format!("timestamp out of range: {ms}").into()))
}

/// Newtype so `FromRow` can be implemented here rather than in the types crate.
struct JobRow(Job);

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for JobRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status: JobStatus = status
            .parse()
            .map_err(|e: String| sqlx::Error::Decode(e.into()))?;
        let result: Option<String> = row.try_get("result")?;
        let result = result
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(Self(Job {
            id: row.try_get("id")?,
            key: row.try_get("key")?,
            status,
            created_at: decode_timestamp(row.try_get("created_at")?)?,
            updated_at: decode_timestamp(row.try_get("updated_at")?)?,
            total: row.try_get::<Option<i64>, _>("total")?.map(|v| v as u64),
            processed: row
                .try_get::<Option<i64>, _>("processed")?
                .map(|v| v as u64),
            error: row.try_get("error")?,
            result,
        }))
    }
}

const SELECT_COLUMNS: &str =
    "id, key, status, created_at, updated_at, total, processed, error, result";

/// Insert a brand-new job row.
pub async fn insert_job(db: &Database, job: &Job) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO jobs (id, key, status, created_at, updated_at, total, processed, error, result)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&job.id)
    .bind(&job.key)
    .bind(job.status.as_str())
    .bind(job.created_at.timestamp_millis())
    .bind(job.updated_at.timestamp_millis())
    .bind(job.total.map(|v| v as i64))
    .bind(job.processed.map(|v| v as i64))
    .bind(&job.error)
    .bind(
        job.result
            .as_ref()
            .map(|v| serde_json::to_string(v).unwrap_or_default()),
    )
    .execute(db.pool())
    .await?;
    Ok(())
}

/// Fetch a job by its id.
pub async fn get_job_by_id(db: &Database, id: &str) -> DbResult<Option<Job>> {
    let row: Option<JobRow> = sqlx::query_as(&format!(
        "SELECT {SELECT_COLUMNS} FROM jobs WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(db.pool())
    .await?;
    Ok(row.map(|r| r.0))
}

/// Fetch the canonical job for a key: the most recently created row wins,
/// with id as the tie-break so duplicate inserts resolve deterministically.
pub async fn get_job_by_key(db: &Database, key: &str) -> DbResult<Option<Job>> {
    let row: Option<JobRow> = sqlx::query_as(&format!(
        "SELECT {SELECT_COLUMNS} FROM jobs
         WHERE key = ?
         ORDER BY created_at DESC, id DESC
         LIMIT 1"
    ))
    .bind(key)
    .fetch_optional(db.pool())
    .await?;
    Ok(row.map(|r| r.0))
}

/// Merge a partial update into a job, always refreshing `updated_at`.
/// A no-op for unknown ids.
pub async fn update_job(db: &Database, id: &str, patch: &JobPatch) -> DbResult<()> {
    sqlx::query(
        "UPDATE jobs SET
             status = COALESCE(?, status),
             total = COALESCE(?, total),
             processed = COALESCE(?, processed),
             error = COALESCE(?, error),
             result = COALESCE(?, result),
             updated_at = ?
         WHERE id = ?",
    )
    .bind(patch.status.map(JobStatus::as_str))
    .bind(patch.total.map(|v| v as i64))
    .bind(patch.processed.map(|v| v as i64))
    .bind(&patch.error)
    .bind(
        patch
            .result
            .as_ref()
            .map(|v| serde_json::to_string(v).unwrap_or_default()),
    )
    .bind(Utc::now().timestamp_millis())
    .bind(id)
    .execute(db.pool())
    .await?;
    Ok(())
}

/// Transition a pending job to running, setting `total` and zeroing
/// `processed`. Guarded by `status = 'pending'`, so of any number of
/// concurrent claimants exactly one sees `true`.
pub async fn claim_pending_job(db: &Database, id: &str, total: Option<u64>) -> DbResult<bool> {
    let outcome = sqlx::query(
        "UPDATE jobs SET
             status = 'running',
             total = COALESCE(?, total),
             processed = 0,
             updated_at = ?
         WHERE id = ? AND status = 'pending'",
    )
    .bind(total.map(|v| v as i64))
    .bind(Utc::now().timestamp_millis())
    .bind(id)
    .execute(db.pool())
    .await?;
    Ok(outcome.rows_affected() == 1)
}

/// Reset a failed job in place: back to pending with the given total,
/// progress/error/result cleared. Same row, same id.
pub async fn reset_failed_job(
    db: &Database,
    id: &str,
    total: Option<u64>,
) -> DbResult<()> {
    sqlx::query(
        "UPDATE jobs SET
             status = 'pending',
             total = ?,
             processed = NULL,
             error = NULL,
             result = NULL,
             updated_at = ?
         WHERE id = ? AND status = 'failed'",
    )
    .bind(total.map(|v| v as i64))
    .bind(Utc::now().timestamp_millis())
    .bind(id)
    .execute(db.pool())
    .await?;
    Ok(())
}
