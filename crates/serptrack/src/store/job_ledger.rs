use chrono::Utc;

use super::convert::{job_from_row, job_to_row};
use crate::db::job_repo::{self, JobFilter, ProgressKind, ProgressOutcome};
use crate::db::{format_timestamp, Database, DatabaseError};
use crate::model::{Job, JobStatus, Location, Progress, SearchFilters};

/// Persisted Jobs and their state machine.
#[derive(Clone)]
pub struct JobLedger {
    db: Database,
}

impl JobLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Creates a `pending` job. `total` is the raw keyword count until
    /// dispatch replaces it with the deduplicated one.
    pub fn create_job(
        &self,
        user_id: &str,
        domain: &str,
        keywords: &[String],
        location: &Location,
        filters: &SearchFilters,
    ) -> Result<Job, DatabaseError> {
        let now = Utc::now();
        let job = Job {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            domain: domain.to_string(),
            keywords: keywords.to_vec(),
            location: location.clone(),
            filters: filters.clone(),
            status: JobStatus::Pending,
            progress: Progress {
                total: keywords.len() as u32,
                completed: 0,
                failed: 0,
            },
            results: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        let row = job_to_row(&job)?;
        self.db.with_conn(|conn| job_repo::insert(conn, &row))?;
        log::info!(
            "Created job {} for {} ({} keywords)",
            job.id,
            job.domain,
            job.keywords.len()
        );
        Ok(job)
    }

    /// Loads a job together with its result references.
    pub fn get(&self, id: &str) -> Result<Option<Job>, DatabaseError> {
        self.db.with_conn(|conn| {
            let Some(row) = job_repo::find_by_id(conn, id)? else {
                return Ok(None);
            };
            let results = job_repo::result_ids(conn, id)?;
            job_from_row(row, results).map(Some)
        })
    }

    /// Lists jobs newest first. Result references are not loaded.
    pub fn list(&self, filter: &JobFilter) -> Result<(Vec<Job>, u64), DatabaseError> {
        let (rows, total) = self.db.with_conn(|conn| job_repo::query(conn, filter))?;
        let jobs = rows
            .into_iter()
            .map(|row| job_from_row(row, Vec::new()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((jobs, total))
    }

    /// Claims the oldest pending job (pending → processing).
    ///
    /// Claim and load share one transaction, so a failed load leaves the
    /// job pending.
    pub fn claim_next_pending(&self) -> Result<Option<Job>, DatabaseError> {
        let now = format_timestamp(Utc::now());
        self.db.with_tx(|conn| {
            let Some(id) = job_repo::claim_next_pending(conn, &now)? else {
                return Ok(None);
            };
            let row = job_repo::find_by_id(conn, &id)?.ok_or_else(|| DatabaseError::CorruptRow {
                table: "jobs",
                reason: format!("claimed job {} vanished", id),
            })?;
            let results = job_repo::result_ids(conn, &id)?;
            job_from_row(row, results).map(Some)
        })
    }

    /// Claims one specific job. `false` if it was not pending.
    pub fn claim(&self, id: &str) -> Result<bool, DatabaseError> {
        let now = format_timestamp(Utc::now());
        self.db.with_conn(|conn| job_repo::claim(conn, id, &now))
    }

    pub fn reset_total(&self, id: &str, total: u32) -> Result<bool, DatabaseError> {
        let now = format_timestamp(Utc::now());
        self.db
            .with_conn(|conn| job_repo::reset_total(conn, id, total, &now))
    }

    /// Counts a cache hit as a completed keyword and appends its ranking.
    pub fn record_cached_hit(
        &self,
        id: &str,
        ranking_id: &str,
    ) -> Result<ProgressOutcome, DatabaseError> {
        let now = format_timestamp(Utc::now());
        self.db.with_tx(|conn| {
            job_repo::advance(conn, id, ProgressKind::Completed, Some(ranking_id), &now)
        })
    }

    /// Counts a keyword the gateway accepted no task for as failed.
    pub fn record_unsubmitted(&self, id: &str) -> Result<ProgressOutcome, DatabaseError> {
        let now = format_timestamp(Utc::now());
        self.db
            .with_tx(|conn| job_repo::advance(conn, id, ProgressKind::Failed, None, &now))
    }

    pub fn fail(&self, id: &str, error: &str) -> Result<bool, DatabaseError> {
        let now = format_timestamp(Utc::now());
        let failed = self
            .db
            .with_conn(|conn| job_repo::fail(conn, id, error, &now))?;
        if failed {
            log::warn!("Job {} failed: {}", id, error);
        }
        Ok(failed)
    }

    pub fn complete_if_done(&self, id: &str) -> Result<bool, DatabaseError> {
        let now = format_timestamp(Utc::now());
        self.db
            .with_conn(|conn| job_repo::complete_if_done(conn, id, &now))
    }

    /// Cancels a pending or processing job owned by `user_id`.
    ///
    /// `false` when the job is terminal, missing, or owned by someone else.
    pub fn cancel(&self, id: &str, user_id: &str) -> Result<bool, DatabaseError> {
        let now = format_timestamp(Utc::now());
        let cancelled = self
            .db
            .with_conn(|conn| job_repo::cancel(conn, id, user_id, &now))?;
        if cancelled {
            log::info!("Job {} cancelled by {}", id, user_id);
        }
        Ok(cancelled)
    }

    pub fn count_by_status(&self, status: JobStatus) -> Result<u64, DatabaseError> {
        self.db
            .with_conn(|conn| job_repo::count_by_status(conn, status.as_str()))
    }
}
