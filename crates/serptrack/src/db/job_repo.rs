//! Job repository: conditional state transitions for the `jobs` table.
//!
//! Every status change is an `UPDATE … WHERE status IN (…)` and every
//! counter change is an in-place increment, so overlapping orchestrator
//! runs can never double-claim a job or overshoot its progress.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub user_id: String,
    pub domain: String,
    /// JSON array of requested keywords.
    pub keywords: String,
    pub location_code: u32,
    pub location_name: String,
    pub language: String,
    pub device: String,
    pub os: String,
    pub status: String,
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            domain: row.get("domain")?,
            keywords: row.get("keywords")?,
            location_code: row.get("location_code")?,
            location_name: row.get("location_name")?,
            language: row.get("language")?,
            device: row.get("device")?,
            os: row.get("os")?,
            status: row.get("status")?,
            total: row.get("total")?,
            completed: row.get("completed")?,
            failed: row.get("failed")?,
            error: row.get("error")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Which progress counter a resolved keyword increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    Completed,
    Failed,
}

impl ProgressKind {
    fn column(&self) -> &'static str {
        match self {
            ProgressKind::Completed => "completed",
            ProgressKind::Failed => "failed",
        }
    }
}

/// Result of trying to advance a job's progress by one keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressOutcome {
    /// Counter incremented; `job_completed` is set when this increment
    /// moved the job to `completed`.
    Advanced { job_completed: bool },
    /// Job was cancelled; reporting stops.
    Cancelled,
    /// Job is in another state that accepts no progress.
    NotProcessing,
    /// Job is processing but every keyword is already accounted for.
    Saturated,
    /// No such job.
    JobMissing,
}

/// Query filter parameters for job listing.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub user_id: Option<String>,
    pub status: Option<String>,
    pub domain: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Inserts a new job row.
pub fn insert(conn: &Connection, job: &JobRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO jobs (id, user_id, domain, keywords, location_code, location_name,
         language, device, os, status, total, completed, failed, error, created_at,
         updated_at, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            job.id,
            job.user_id,
            job.domain,
            job.keywords,
            job.location_code,
            job.location_name,
            job.language,
            job.device,
            job.os,
            job.status,
            job.total,
            job.completed,
            job.failed,
            job.error,
            job.created_at,
            job.updated_at,
            job.completed_at,
        ],
    )?;
    Ok(())
}

/// Finds a job by its ID.
pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM jobs WHERE id = ?1",
            params![id],
            JobRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Ranking ids appended to a job, in resolution order.
pub fn result_ids(conn: &Connection, job_id: &str) -> Result<Vec<String>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT ranking_id FROM job_results WHERE job_id = ?1 ORDER BY seq")?;
    let ids = stmt
        .query_map(params![job_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Queries jobs with filters (newest first), returning (rows, total_count).
pub fn query(conn: &Connection, filter: &JobFilter) -> Result<(Vec<JobRow>, u64), DatabaseError> {
    let mut conditions = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(ref user_id) = filter.user_id {
        conditions.push(format!("user_id = ?{}", param_values.len() + 1));
        param_values.push(Box::new(user_id.clone()));
    }
    if let Some(ref status) = filter.status {
        conditions.push(format!("status = ?{}", param_values.len() + 1));
        param_values.push(Box::new(status.clone()));
    }
    if let Some(ref domain) = filter.domain {
        conditions.push(format!("domain = ?{}", param_values.len() + 1));
        param_values.push(Box::new(domain.clone()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM jobs {}", where_clause);
    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

    let limit = filter.limit.unwrap_or(100) as i64;
    let offset = filter.offset.unwrap_or(0) as i64;
    param_values.push(Box::new(limit));
    param_values.push(Box::new(offset));
    let query_sql = format!(
        "SELECT * FROM jobs {} ORDER BY created_at DESC LIMIT ?{} OFFSET ?{}",
        where_clause,
        param_values.len() - 1,
        param_values.len()
    );

    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&query_sql)?;
    let rows: Vec<JobRow> = stmt
        .query_map(params_ref.as_slice(), JobRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok((rows, total))
}

/// Counts jobs with the given status.
pub fn count_by_status(conn: &Connection, status: &str) -> Result<u64, DatabaseError> {
    let count: u64 = conn.query_row(
        "SELECT COUNT(*) FROM jobs WHERE status = ?1",
        params![status],
        |r| r.get(0),
    )?;
    Ok(count)
}

/// Moves the oldest pending job to `processing` and returns its id.
///
/// The outer `status = 'pending'` guard makes the claim a compare-and-set:
/// two callers racing for the same row cannot both see a change.
pub fn claim_next_pending(conn: &Connection, now: &str) -> Result<Option<String>, DatabaseError> {
    let id = conn
        .query_row(
            "UPDATE jobs SET status = 'processing', updated_at = ?1
             WHERE id = (
                 SELECT id FROM jobs WHERE status = 'pending'
                 ORDER BY created_at, rowid LIMIT 1
             ) AND status = 'pending'
             RETURNING id",
            params![now],
            |r| r.get::<_, String>(0),
        )
        .optional()?;
    Ok(id)
}

/// Moves one specific job from `pending` to `processing`.
pub fn claim(conn: &Connection, id: &str, now: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET status = 'processing', updated_at = ?2
         WHERE id = ?1 AND status = 'pending'",
        params![id, now],
    )?;
    Ok(changed == 1)
}

/// Replaces the raw keyword count with the deduplicated one.
///
/// Only allowed while processing and before any keyword was resolved.
pub fn reset_total(
    conn: &Connection,
    id: &str,
    total: u32,
    now: &str,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET total = ?2, updated_at = ?3
         WHERE id = ?1 AND status = 'processing' AND completed = 0 AND failed = 0",
        params![id, total, now],
    )?;
    Ok(changed == 1)
}

/// Increments one progress counter, appends the ranking reference when
/// given, and completes the job once every keyword is accounted for.
///
/// Call inside a transaction so the increment and the result append
/// land together.
pub fn advance(
    conn: &Connection,
    id: &str,
    kind: ProgressKind,
    ranking_id: Option<&str>,
    now: &str,
) -> Result<ProgressOutcome, DatabaseError> {
    let column = kind.column();
    let changed = conn.execute(
        &format!(
            "UPDATE jobs SET {col} = {col} + 1, updated_at = ?2
             WHERE id = ?1 AND status = 'processing' AND completed + failed < total",
            col = column
        ),
        params![id, now],
    )?;

    if changed == 0 {
        let state = conn
            .query_row(
                "SELECT status, completed + failed >= total FROM jobs WHERE id = ?1",
                params![id],
                |r| Ok((r.get::<_, String>(0)?, r.get::<_, bool>(1)?)),
            )
            .optional()?;
        return Ok(match state {
            None => ProgressOutcome::JobMissing,
            Some((status, _)) if status == "cancelled" => ProgressOutcome::Cancelled,
            Some((status, true)) if status == "processing" => ProgressOutcome::Saturated,
            Some(_) => ProgressOutcome::NotProcessing,
        });
    }

    if let Some(ranking_id) = ranking_id {
        conn.execute(
            "INSERT INTO job_results (job_id, ranking_id, created_at) VALUES (?1, ?2, ?3)",
            params![id, ranking_id, now],
        )?;
    }

    let job_completed = complete_if_done(conn, id, now)?;
    Ok(ProgressOutcome::Advanced { job_completed })
}

/// Marks a processing job `completed` when `completed + failed >= total`.
pub fn complete_if_done(conn: &Connection, id: &str, now: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET status = 'completed', completed_at = ?2, updated_at = ?2
         WHERE id = ?1 AND status = 'processing' AND completed + failed >= total",
        params![id, now],
    )?;
    Ok(changed == 1)
}

/// Marks a processing job `failed` with a message.
pub fn fail(conn: &Connection, id: &str, error: &str, now: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET status = 'failed', error = ?2, completed_at = ?3, updated_at = ?3
         WHERE id = ?1 AND status = 'processing'",
        params![id, error, now],
    )?;
    Ok(changed == 1)
}

/// Cancels a non-terminal job owned by `user_id`.
pub fn cancel(
    conn: &Connection,
    id: &str,
    user_id: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET status = 'cancelled', completed_at = ?3, updated_at = ?3
         WHERE id = ?1 AND user_id = ?2 AND status IN ('pending', 'processing')",
        params![id, user_id, now],
    )?;
    Ok(changed == 1)
}
