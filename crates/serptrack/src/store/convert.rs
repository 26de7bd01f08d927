//! Row ↔ model conversions.
//!
//! Rows keep the column representation (strings, JSON text); models are
//! strongly typed. Anything a model cannot represent surfaces as
//! `DatabaseError::CorruptRow` instead of being guessed.

use crate::db::job_repo::JobRow;
use crate::db::ranking_repo::RankingRow;
use crate::db::task_repo::TaskRow;
use crate::db::{format_timestamp, parse_timestamp, DatabaseError};
use crate::model::{
    Device, Job, JobStatus, Location, LookupKey, Progress, RankingRecord, SearchFilters, Task,
    TaskStatus,
};

// ─── Helpers ────────────────────────────────────────────────────────────────

fn parse_device(s: &str, table: &'static str) -> Result<Device, DatabaseError> {
    s.parse::<Device>()
        .map_err(|reason| DatabaseError::CorruptRow { table, reason })
}

fn parse_optional_timestamp(
    s: Option<&str>,
) -> Result<Option<chrono::DateTime<chrono::Utc>>, DatabaseError> {
    s.map(parse_timestamp).transpose()
}

fn filters(language: &str, device: &str, os: &str, table: &'static str) -> Result<SearchFilters, DatabaseError> {
    Ok(SearchFilters {
        language: language.to_string(),
        device: parse_device(device, table)?,
        os: os.to_string(),
    })
}

// ─── Jobs ───────────────────────────────────────────────────────────────────

pub fn job_from_row(row: JobRow, results: Vec<String>) -> Result<Job, DatabaseError> {
    let status = JobStatus::parse(&row.status).ok_or_else(|| DatabaseError::CorruptRow {
        table: "jobs",
        reason: format!("unknown status '{}' for job {}", row.status, row.id),
    })?;
    let keywords: Vec<String> = serde_json::from_str(&row.keywords)?;

    Ok(Job {
        filters: filters(&row.language, &row.device, &row.os, "jobs")?,
        location: Location {
            code: row.location_code,
            name: row.location_name,
        },
        status,
        progress: Progress {
            total: row.total,
            completed: row.completed,
            failed: row.failed,
        },
        results,
        created_at: parse_timestamp(&row.created_at)?,
        updated_at: parse_timestamp(&row.updated_at)?,
        completed_at: parse_optional_timestamp(row.completed_at.as_deref())?,
        id: row.id,
        user_id: row.user_id,
        domain: row.domain,
        keywords,
        error: row.error,
    })
}

pub fn job_to_row(job: &Job) -> Result<JobRow, DatabaseError> {
    Ok(JobRow {
        id: job.id.clone(),
        user_id: job.user_id.clone(),
        domain: job.domain.clone(),
        keywords: serde_json::to_string(&job.keywords)?,
        location_code: job.location.code,
        location_name: job.location.name.clone(),
        language: job.filters.language.clone(),
        device: job.filters.device.as_str().to_string(),
        os: job.filters.os.clone(),
        status: job.status.as_str().to_string(),
        total: job.progress.total,
        completed: job.progress.completed,
        failed: job.progress.failed,
        error: job.error.clone(),
        created_at: format_timestamp(job.created_at),
        updated_at: format_timestamp(job.updated_at),
        completed_at: job.completed_at.map(format_timestamp),
    })
}

// ─── Tasks ──────────────────────────────────────────────────────────────────

pub fn task_from_row(row: TaskRow) -> Result<Task, DatabaseError> {
    let status = TaskStatus::parse(&row.status).ok_or_else(|| DatabaseError::CorruptRow {
        table: "tasks",
        reason: format!(
            "unknown status '{}' for task {}",
            row.status, row.external_id
        ),
    })?;

    Ok(Task {
        filters: filters(&row.language, &row.device, &row.os, "tasks")?,
        location: Location {
            code: row.location_code,
            name: row.location_name,
        },
        status,
        created_at: parse_timestamp(&row.created_at)?,
        updated_at: parse_timestamp(&row.updated_at)?,
        completed_at: parse_optional_timestamp(row.completed_at.as_deref())?,
        external_id: row.external_id,
        job_id: row.job_id,
        keyword: row.keyword,
        domain: row.domain,
        ranking_id: row.ranking_id,
        error: row.error,
    })
}

/// Row for a freshly submitted task; the payload is attached on resolution.
pub fn task_to_row(task: &Task) -> TaskRow {
    TaskRow {
        external_id: task.external_id.clone(),
        job_id: task.job_id.clone(),
        keyword: task.keyword.clone(),
        domain: task.domain.clone(),
        location_code: task.location.code,
        location_name: task.location.name.clone(),
        language: task.filters.language.clone(),
        device: task.filters.device.as_str().to_string(),
        os: task.filters.os.clone(),
        status: task.status.as_str().to_string(),
        raw_payload: None,
        ranking_id: task.ranking_id.clone(),
        error: task.error.clone(),
        created_at: format_timestamp(task.created_at),
        updated_at: format_timestamp(task.updated_at),
        completed_at: task.completed_at.map(format_timestamp),
    }
}

// ─── Rankings ───────────────────────────────────────────────────────────────

pub fn ranking_from_row(row: RankingRow) -> Result<RankingRecord, DatabaseError> {
    Ok(RankingRecord {
        filters: filters(&row.language, &row.device, &row.os, "rankings")?,
        location: Location {
            code: row.location_code,
            name: row.location_name,
        },
        competitors: serde_json::from_str(&row.competitors)?,
        serp: serde_json::from_str(&row.serp)?,
        created_at: parse_timestamp(&row.created_at)?,
        id: row.id,
        domain: row.domain,
        keyword: row.keyword,
        rank: row.rank,
        rank_absolute: row.rank_absolute,
        url: row.url,
        title: row.title,
        description: row.description,
    })
}

pub fn ranking_to_row(record: &RankingRecord) -> Result<RankingRow, DatabaseError> {
    let key = LookupKey::new(
        &record.domain,
        &record.keyword,
        record.location.code,
        &record.filters,
    );
    Ok(RankingRow {
        id: record.id.clone(),
        domain: record.domain.clone(),
        domain_key: key.domain_key,
        keyword: record.keyword.clone(),
        keyword_key: key.keyword_key,
        location_code: record.location.code,
        location_name: record.location.name.clone(),
        language: key.language,
        device: key.device.as_str().to_string(),
        os: key.os,
        rank: record.rank,
        rank_absolute: record.rank_absolute,
        url: record.url.clone(),
        title: record.title.clone(),
        description: record.description.clone(),
        competitors: serde_json::to_string(&record.competitors)?,
        serp: serde_json::to_string(&record.serp)?,
        created_at: format_timestamp(record.created_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample_job() -> Job {
        let t = Utc.with_ymd_and_hms(2026, 2, 1, 8, 30, 0).unwrap();
        Job {
            id: "job-1".to_string(),
            user_id: "user-1".to_string(),
            domain: "store.example".to_string(),
            keywords: vec!["shoes".to_string(), "Shoes".to_string()],
            location: Location {
                code: 2840,
                name: "United States".to_string(),
            },
            filters: SearchFilters {
                language: "en".to_string(),
                device: Device::Mobile,
                os: "ios".to_string(),
            },
            status: JobStatus::Processing,
            progress: Progress {
                total: 1,
                completed: 0,
                failed: 0,
            },
            results: vec![],
            error: None,
            created_at: t,
            updated_at: t,
            completed_at: None,
        }
    }

    #[test]
    fn test_job_row_conversion_keeps_fields() {
        let job = sample_job();
        let row = job_to_row(&job).unwrap();
        assert_eq!(row.device, "mobile");
        assert_eq!(row.keywords, r#"["shoes","Shoes"]"#);

        let back = job_from_row(row, vec!["r-1".to_string()]).unwrap();
        assert_eq!(back.filters, job.filters);
        assert_eq!(back.created_at, job.created_at);
        assert_eq!(back.results, vec!["r-1".to_string()]);
    }

    #[test]
    fn test_unknown_status_is_corrupt() {
        let mut row = job_to_row(&sample_job()).unwrap();
        row.status = "superseded".to_string();
        let err = job_from_row(row, vec![]).unwrap_err();
        assert!(matches!(err, DatabaseError::CorruptRow { table: "jobs", .. }));
    }

    #[test]
    fn test_ranking_row_uses_normalized_keys() {
        let job = sample_job();
        let record = RankingRecord {
            id: "r-1".to_string(),
            domain: "www.Store.example".to_string(),
            keyword: "Running  Shoes".to_string(),
            location: job.location.clone(),
            filters: job.filters.clone(),
            rank: Some(4),
            rank_absolute: Some(6),
            url: None,
            title: None,
            description: None,
            competitors: vec![],
            serp: Default::default(),
            created_at: job.created_at,
        };
        let row = ranking_to_row(&record).unwrap();
        assert_eq!(row.domain_key, "store.example");
        assert_eq!(row.keyword_key, "running shoes");
        assert_eq!(row.domain, "www.Store.example");
    }
}
