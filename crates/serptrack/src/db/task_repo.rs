//! Task repository: the ledger of externally submitted tasks.
//!
//! Rows are never deleted. Resolution (`mark_ready` / `mark_failed`) only
//! succeeds from an open status, which is what makes repeated or
//! overlapping reconciliation runs a no-op for already resolved tasks.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;

/// A raw task row from the database.
#[derive(Debug, Clone)]
pub struct TaskRow {
    pub external_id: String,
    pub job_id: String,
    pub keyword: String,
    pub domain: String,
    pub location_code: u32,
    pub location_name: String,
    pub language: String,
    pub device: String,
    pub os: String,
    pub status: String,
    /// Versioned JSON payload as returned by the gateway.
    pub raw_payload: Option<String>,
    pub ranking_id: Option<String>,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl TaskRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            external_id: row.get("external_id")?,
            job_id: row.get("job_id")?,
            keyword: row.get("keyword")?,
            domain: row.get("domain")?,
            location_code: row.get("location_code")?,
            location_name: row.get("location_name")?,
            language: row.get("language")?,
            device: row.get("device")?,
            os: row.get("os")?,
            status: row.get("status")?,
            raw_payload: row.get("raw_payload")?,
            ranking_id: row.get("ranking_id")?,
            error: row.get("error")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Inserts a task row. Returns `false` if the external id already exists.
pub fn insert(conn: &Connection, task: &TaskRow) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO tasks (external_id, job_id, keyword, domain, location_code,
         location_name, language, device, os, status, raw_payload, ranking_id, error,
         created_at, updated_at, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            task.external_id,
            task.job_id,
            task.keyword,
            task.domain,
            task.location_code,
            task.location_name,
            task.language,
            task.device,
            task.os,
            task.status,
            task.raw_payload,
            task.ranking_id,
            task.error,
            task.created_at,
            task.updated_at,
            task.completed_at,
        ],
    )?;
    Ok(changed == 1)
}

/// Finds a task by its external ID.
pub fn find_by_id(conn: &Connection, external_id: &str) -> Result<Option<TaskRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM tasks WHERE external_id = ?1",
            params![external_id],
            TaskRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Returns the open (pending or processing) tasks among `external_ids`.
/// Unknown ids are silently skipped.
pub fn find_open_by_ids(
    conn: &Connection,
    external_ids: &[String],
) -> Result<Vec<TaskRow>, DatabaseError> {
    if external_ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders: Vec<String> = (0..external_ids.len())
        .map(|i| format!("?{}", i + 1))
        .collect();
    let sql = format!(
        "SELECT * FROM tasks
         WHERE status IN ('pending', 'processing') AND external_id IN ({})
         ORDER BY created_at",
        placeholders.join(", ")
    );

    let params_ref: Vec<&dyn rusqlite::types::ToSql> = external_ids
        .iter()
        .map(|id| id as &dyn rusqlite::types::ToSql)
        .collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_ref.as_slice(), TaskRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Lists every task of a job in submission order.
pub fn list_for_job(conn: &Connection, job_id: &str) -> Result<Vec<TaskRow>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT * FROM tasks WHERE job_id = ?1 ORDER BY created_at, rowid")?;
    let rows = stmt
        .query_map(params![job_id], TaskRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Counts a job's tasks in the given status.
pub fn count_for_job(conn: &Connection, job_id: &str, status: &str) -> Result<u64, DatabaseError> {
    let count: u64 = conn.query_row(
        "SELECT COUNT(*) FROM tasks WHERE job_id = ?1 AND status = ?2",
        params![job_id, status],
        |r| r.get(0),
    )?;
    Ok(count)
}

/// Open tasks created before `cutoff`, oldest first.
pub fn find_stale(
    conn: &Connection,
    cutoff: &str,
    limit: u32,
) -> Result<Vec<TaskRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM tasks
         WHERE status IN ('pending', 'processing') AND created_at < ?1
         ORDER BY created_at LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![cutoff, limit], TaskRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// pending → processing once the gateway reports the task ready.
pub fn mark_processing(
    conn: &Connection,
    external_id: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE tasks SET status = 'processing', updated_at = ?2
         WHERE external_id = ?1 AND status = 'pending'",
        params![external_id, now],
    )?;
    Ok(changed == 1)
}

/// open → ready, storing the raw payload and the produced ranking.
pub fn mark_ready(
    conn: &Connection,
    external_id: &str,
    raw_payload: &str,
    ranking_id: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE tasks SET status = 'ready', raw_payload = ?2, ranking_id = ?3,
         completed_at = ?4, updated_at = ?4
         WHERE external_id = ?1 AND status IN ('pending', 'processing')",
        params![external_id, raw_payload, ranking_id, now],
    )?;
    Ok(changed == 1)
}

/// open → failed with an error message.
pub fn mark_failed(
    conn: &Connection,
    external_id: &str,
    error: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE tasks SET status = 'failed', error = ?2, completed_at = ?3, updated_at = ?3
         WHERE external_id = ?1 AND status IN ('pending', 'processing')",
        params![external_id, error, now],
    )?;
    Ok(changed == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::job_repo::{self, JobRow};
    use crate::db::Database;

    const T0: &str = "2026-01-01T00:00:00.000000Z";
    const T1: &str = "2026-01-02T00:00:00.000000Z";

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            job_repo::insert(
                conn,
                &JobRow {
                    id: "job-1".to_string(),
                    user_id: "u".to_string(),
                    domain: "example.com".to_string(),
                    keywords: "[]".to_string(),
                    location_code: 2840,
                    location_name: "United States".to_string(),
                    language: "en".to_string(),
                    device: "desktop".to_string(),
                    os: "windows".to_string(),
                    status: "processing".to_string(),
                    total: 3,
                    completed: 0,
                    failed: 0,
                    error: None,
                    created_at: T0.to_string(),
                    updated_at: T0.to_string(),
                    completed_at: None,
                },
            )
        })
        .unwrap();
        db
    }

    fn sample_task(id: &str, created_at: &str) -> TaskRow {
        TaskRow {
            external_id: id.to_string(),
            job_id: "job-1".to_string(),
            keyword: format!("kw-{}", id),
            domain: "example.com".to_string(),
            location_code: 2840,
            location_name: "United States".to_string(),
            language: "en".to_string(),
            device: "desktop".to_string(),
            os: "windows".to_string(),
            status: "pending".to_string(),
            raw_payload: None,
            ranking_id: None,
            error: None,
            created_at: created_at.to_string(),
            updated_at: created_at.to_string(),
            completed_at: None,
        }
    }

    #[test]
    fn test_insert_is_unique_on_external_id() {
        let db = test_db();
        assert!(db.with_conn(|conn| insert(conn, &sample_task("t1", T0))).unwrap());
        assert!(!db.with_conn(|conn| insert(conn, &sample_task("t1", T1))).unwrap());

        let found = db.with_conn(|conn| find_by_id(conn, "t1")).unwrap().unwrap();
        assert_eq!(found.created_at, T0);
    }

    #[test]
    fn test_find_open_skips_resolved_and_unknown() {
        let db = test_db();
        db.with_conn(|conn| {
            insert(conn, &sample_task("a", T0))?;
            insert(conn, &sample_task("b", T0))?;
            insert(conn, &sample_task("c", T0))?;
            mark_processing(conn, "b", T1)?;
            mark_failed(conn, "c", "gone", T1)?;
            Ok(())
        })
        .unwrap();

        let ids = vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            "zzz".to_string(),
        ];
        let open = db.with_conn(|conn| find_open_by_ids(conn, &ids)).unwrap();
        let mut open_ids: Vec<_> = open.iter().map(|t| t.external_id.as_str()).collect();
        open_ids.sort();
        assert_eq!(open_ids, vec!["a", "b"]);

        assert!(db
            .with_conn(|conn| find_open_by_ids(conn, &[]))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_resolution_happens_once() {
        let db = test_db();
        db.with_conn(|conn| {
            insert(conn, &sample_task("t1", T0))?;
            conn.execute(
                "INSERT INTO rankings (id, domain, domain_key, keyword, keyword_key,
                 location_code, location_name, language, device, os, serp, created_at)
                 VALUES ('r1', 'example.com', 'example.com', 'kw', 'kw', 2840, 'US',
                 'en', 'desktop', 'windows', '{}', ?1)",
                params![T1],
            )?;
            Ok(())
        })
        .unwrap();

        assert!(db
            .with_conn(|conn| mark_ready(conn, "t1", "{}", "r1", T1))
            .unwrap());
        assert!(!db
            .with_conn(|conn| mark_ready(conn, "t1", "{}", "r1", T1))
            .unwrap());
        assert!(!db.with_conn(|conn| mark_failed(conn, "t1", "late", T1)).unwrap());

        let row = db.with_conn(|conn| find_by_id(conn, "t1")).unwrap().unwrap();
        assert_eq!(row.status, "ready");
        assert_eq!(row.ranking_id.as_deref(), Some("r1"));
        assert!(row.error.is_none());
        assert_eq!(
            db.with_conn(|conn| count_for_job(conn, "job-1", "ready"))
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_find_stale() {
        let db = test_db();
        db.with_conn(|conn| {
            insert(conn, &sample_task("old", T0))?;
            insert(conn, &sample_task("young", T1))?;
            insert(conn, &sample_task("done", T0))?;
            mark_failed(conn, "done", "x", T1)?;
            Ok(())
        })
        .unwrap();

        let stale = db
            .with_conn(|conn| find_stale(conn, "2026-01-01T12:00:00.000000Z", 10))
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].external_id, "old");
    }

    #[test]
    fn test_list_for_job() {
        let db = test_db();
        db.with_conn(|conn| {
            insert(conn, &sample_task("x", T0))?;
            insert(conn, &sample_task("y", T1))?;
            Ok(())
        })
        .unwrap();
        let rows = db.with_conn(|conn| list_for_job(conn, "job-1")).unwrap();
        let ids: Vec<_> = rows.iter().map(|t| t.external_id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y"]);
    }
}
