use chrono::{DateTime, Utc};

use super::convert::{ranking_to_row, task_from_row, task_to_row};
use crate::db::job_repo::{self, ProgressKind, ProgressOutcome};
use crate::db::task_repo::{self, TaskRow};
use crate::db::{format_timestamp, ranking_repo, Database, DatabaseError};
use crate::gateway::StoredPayload;
use crate::model::{RankingRecord, Task, TaskStatus};

/// What resolving a task did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Task moved out of its open status; the job's progress reacted as
    /// described by the outcome.
    Recorded(ProgressOutcome),
    /// Task was already `ready` or `failed`. Nothing was written.
    AlreadyResolved,
    TaskMissing,
}

/// Persisted record of every task submitted to the gateway.
#[derive(Clone)]
pub struct TaskLedger {
    db: Database,
}

impl TaskLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Records a task returned by a submission. `false` if the external id
    /// is already known.
    pub fn record_submitted(&self, task: &Task) -> Result<bool, DatabaseError> {
        let row = task_to_row(task);
        self.db.with_conn(|conn| task_repo::insert(conn, &row))
    }

    /// Records every task of one submission in a single transaction.
    ///
    /// Either all rows land or none do. Returns the ids that were new;
    /// already known ids are left untouched.
    pub fn record_submitted_batch(&self, tasks: &[Task]) -> Result<Vec<String>, DatabaseError> {
        let rows: Vec<TaskRow> = tasks.iter().map(task_to_row).collect();
        self.db.with_tx(|conn| {
            let mut inserted = Vec::with_capacity(rows.len());
            for row in &rows {
                if task_repo::insert(conn, row)? {
                    inserted.push(row.external_id.clone());
                }
            }
            Ok(inserted)
        })
    }

    pub fn get(&self, external_id: &str) -> Result<Option<Task>, DatabaseError> {
        self.db
            .with_conn(|conn| task_repo::find_by_id(conn, external_id))?
            .map(task_from_row)
            .transpose()
    }

    /// Raw stored payload of a resolved task.
    pub fn payload(&self, external_id: &str) -> Result<Option<StoredPayload>, DatabaseError> {
        let row = self
            .db
            .with_conn(|conn| task_repo::find_by_id(conn, external_id))?;
        match row.and_then(|r| r.raw_payload) {
            Some(json) => Ok(Some(StoredPayload::from_json(&json)?)),
            None => Ok(None),
        }
    }

    /// Open tasks among `external_ids`; unknown ids are skipped.
    pub fn find_open(&self, external_ids: &[String]) -> Result<Vec<Task>, DatabaseError> {
        self.load(|conn| task_repo::find_open_by_ids(conn, external_ids))
    }

    pub fn list_for_job(&self, job_id: &str) -> Result<Vec<Task>, DatabaseError> {
        self.load(|conn| task_repo::list_for_job(conn, job_id))
    }

    pub fn count_for_job(&self, job_id: &str, status: TaskStatus) -> Result<u64, DatabaseError> {
        self.db
            .with_conn(|conn| task_repo::count_for_job(conn, job_id, status.as_str()))
    }

    /// Open tasks created before `cutoff`, oldest first.
    pub fn find_stale(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Task>, DatabaseError> {
        let cutoff = format_timestamp(cutoff);
        self.load(|conn| task_repo::find_stale(conn, &cutoff, limit))
    }

    pub fn mark_processing(&self, external_id: &str) -> Result<bool, DatabaseError> {
        let now = format_timestamp(Utc::now());
        self.db
            .with_conn(|conn| task_repo::mark_processing(conn, external_id, &now))
    }

    /// Persists a fetched result in one transaction: the ranking record,
    /// the task's move to `ready`, and the job's progress.
    ///
    /// The ranking is kept even when the job was cancelled; only job
    /// progress stops.
    pub fn resolve_ready(
        &self,
        external_id: &str,
        record: &RankingRecord,
        payload: &StoredPayload,
    ) -> Result<Resolution, DatabaseError> {
        let ranking = ranking_to_row(record)?;
        let payload = payload.to_json()?;
        let now = format_timestamp(Utc::now());

        self.db.with_tx(|conn| {
            let job_id = match open_task(conn, external_id)? {
                Ok(row) => row.job_id,
                Err(resolution) => return Ok(resolution),
            };

            ranking_repo::insert(conn, &ranking)?;
            task_repo::mark_ready(conn, external_id, &payload, &record.id, &now)?;
            let outcome = job_repo::advance(
                conn,
                &job_id,
                ProgressKind::Completed,
                Some(&record.id),
                &now,
            )?;
            Ok(Resolution::Recorded(outcome))
        })
    }

    /// Marks a task `failed` and counts it against the job, in one
    /// transaction.
    pub fn resolve_failed(
        &self,
        external_id: &str,
        error: &str,
    ) -> Result<Resolution, DatabaseError> {
        let now = format_timestamp(Utc::now());

        self.db.with_tx(|conn| {
            let job_id = match open_task(conn, external_id)? {
                Ok(row) => row.job_id,
                Err(resolution) => return Ok(resolution),
            };

            task_repo::mark_failed(conn, external_id, error, &now)?;
            let outcome = job_repo::advance(conn, &job_id, ProgressKind::Failed, None, &now)?;
            Ok(Resolution::Recorded(outcome))
        })
    }

    fn load<F>(&self, f: F) -> Result<Vec<Task>, DatabaseError>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<Vec<TaskRow>, DatabaseError>,
    {
        self.db
            .with_conn(f)?
            .into_iter()
            .map(task_from_row)
            .collect()
    }
}

/// The task row if it is still open, otherwise the resolution to report.
fn open_task(
    conn: &rusqlite::Connection,
    external_id: &str,
) -> Result<Result<TaskRow, Resolution>, DatabaseError> {
    let Some(row) = task_repo::find_by_id(conn, external_id)? else {
        return Ok(Err(Resolution::TaskMissing));
    };
    let open = TaskStatus::parse(&row.status).is_some_and(|s| s.is_open());
    if open {
        Ok(Ok(row))
    } else {
        Ok(Err(Resolution::AlreadyResolved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::SerpResult;
    use crate::model::{Job, JobStatus, Location, SearchFilters, SerpMetadata};
    use crate::store::JobLedger;

    struct Fixture {
        jobs: JobLedger,
        tasks: TaskLedger,
        job: Job,
    }

    fn fixture(keywords: &[&str]) -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let jobs = JobLedger::new(db.clone());
        let tasks = TaskLedger::new(db);
        let keywords: Vec<String> = keywords.iter().map(|k| k.to_string()).collect();
        let job = jobs
            .create_job(
                "user-1",
                "store.example",
                &keywords,
                &Location {
                    code: 2840,
                    name: "United States".to_string(),
                },
                &SearchFilters::default(),
            )
            .unwrap();
        jobs.claim(&job.id).unwrap();
        Fixture { jobs, tasks, job }
    }

    fn submit(f: &Fixture, keyword: &str, id: &str) -> Task {
        let task = Task::submitted(&f.job, keyword, id, Utc::now());
        assert!(f.tasks.record_submitted(&task).unwrap());
        task
    }

    fn record_for(task: &Task, id: &str) -> RankingRecord {
        RankingRecord {
            id: id.to_string(),
            domain: task.domain.clone(),
            keyword: task.keyword.clone(),
            location: task.location.clone(),
            filters: task.filters.clone(),
            rank: Some(2),
            rank_absolute: Some(2),
            url: None,
            title: None,
            description: None,
            competitors: vec![],
            serp: SerpMetadata::default(),
            created_at: Utc::now(),
        }
    }

    fn payload() -> StoredPayload {
        StoredPayload::V1(SerpResult::default())
    }

    #[test]
    fn test_duplicate_external_id_is_ignored() {
        let f = fixture(&["shoes"]);
        let task = submit(&f, "shoes", "ext-1");
        assert!(!f.tasks.record_submitted(&task).unwrap());
        assert_eq!(f.tasks.list_for_job(&f.job.id).unwrap().len(), 1);
    }

    #[test]
    fn test_batch_insert_is_all_or_nothing() {
        let f = fixture(&["shoes", "boots", "socks"]);
        submit(&f, "shoes", "ext-1");

        let batch = vec![
            Task::submitted(&f.job, "shoes", "ext-1", Utc::now()),
            Task::submitted(&f.job, "boots", "ext-2", Utc::now()),
        ];
        let inserted = f.tasks.record_submitted_batch(&batch).unwrap();
        assert_eq!(inserted, vec!["ext-2".to_string()]);

        let mut broken = Task::submitted(&f.job, "socks", "ext-3", Utc::now());
        broken.job_id = "no-such-job".to_string();
        let batch = vec![Task::submitted(&f.job, "socks", "ext-4", Utc::now()), broken];
        assert!(f.tasks.record_submitted_batch(&batch).is_err());
        assert!(f.tasks.get("ext-4").unwrap().is_none());
        assert_eq!(f.tasks.list_for_job(&f.job.id).unwrap().len(), 2);
    }

    #[test]
    fn test_resolve_ready_is_atomic_and_idempotent() {
        let f = fixture(&["shoes", "boots"]);
        let task = submit(&f, "shoes", "ext-1");
        submit(&f, "boots", "ext-2");

        let record = record_for(&task, "r-1");
        let first = f.tasks.resolve_ready("ext-1", &record, &payload()).unwrap();
        assert_eq!(
            first,
            Resolution::Recorded(ProgressOutcome::Advanced {
                job_completed: false
            })
        );

        let again = record_for(&task, "r-2");
        let second = f.tasks.resolve_ready("ext-1", &again, &payload()).unwrap();
        assert_eq!(second, Resolution::AlreadyResolved);

        let stored = f.tasks.get("ext-1").unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Ready);
        assert_eq!(stored.ranking_id.as_deref(), Some("r-1"));
        assert!(f.tasks.payload("ext-1").unwrap().is_some());

        let job = f.jobs.get(&f.job.id).unwrap().unwrap();
        assert_eq!(job.progress.completed, 1);
        assert_eq!(job.results, vec!["r-1".to_string()]);
    }

    #[test]
    fn test_failed_task_completes_job() {
        let f = fixture(&["shoes"]);
        submit(&f, "shoes", "ext-1");

        let resolution = f.tasks.resolve_failed("ext-1", "40501 invalid field").unwrap();
        assert_eq!(
            resolution,
            Resolution::Recorded(ProgressOutcome::Advanced {
                job_completed: true
            })
        );

        let job = f.jobs.get(&f.job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress.failed, 1);
        assert!(job.is_partial_success());
        assert_eq!(
            f.tasks.get("ext-1").unwrap().unwrap().error.as_deref(),
            Some("40501 invalid field")
        );
    }

    #[test]
    fn test_cancelled_job_keeps_ranking_but_not_progress() {
        let f = fixture(&["shoes"]);
        let task = submit(&f, "shoes", "ext-1");
        assert!(f.jobs.cancel(&f.job.id, "user-1").unwrap());

        let resolution = f
            .tasks
            .resolve_ready("ext-1", &record_for(&task, "r-1"), &payload())
            .unwrap();
        assert_eq!(resolution, Resolution::Recorded(ProgressOutcome::Cancelled));
        assert_eq!(
            f.tasks.get("ext-1").unwrap().unwrap().status,
            TaskStatus::Ready
        );

        let job = f.jobs.get(&f.job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.progress.completed, 0);
        assert!(job.results.is_empty());
    }

    #[test]
    fn test_unknown_task() {
        let f = fixture(&["shoes"]);
        assert_eq!(
            f.tasks.resolve_failed("nope", "x").unwrap(),
            Resolution::TaskMissing
        );
        assert!(f.tasks.find_open(&["nope".to_string()]).unwrap().is_empty());
    }

    #[test]
    fn test_find_stale_and_processing() {
        let f = fixture(&["shoes", "boots"]);
        let old = Task::submitted(&f.job, "shoes", "ext-old", Utc::now() - chrono::Duration::days(2));
        f.tasks.record_submitted(&old).unwrap();
        submit(&f, "boots", "ext-new");

        let stale = f
            .tasks
            .find_stale(Utc::now() - chrono::Duration::hours(24), 10)
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].external_id, "ext-old");

        assert!(f.tasks.mark_processing("ext-new").unwrap());
        assert!(!f.tasks.mark_processing("ext-new").unwrap());
        assert_eq!(
            f.tasks
                .count_for_job(&f.job.id, TaskStatus::Processing)
                .unwrap(),
            1
        );
    }
}
