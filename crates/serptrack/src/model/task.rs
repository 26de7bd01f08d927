use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::filters::{Location, SearchFilters};
use super::job::Job;

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Submitted, not yet reported ready by the gateway.
    Pending,
    /// Reported ready, results being fetched.
    Processing,
    Ready,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Ready => "ready",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "processing" => Some(TaskStatus::Processing),
            "ready" => Some(TaskStatus::Ready),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    /// Still waiting on the gateway.
    pub fn is_open(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Processing)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One externally submitted keyword lookup belonging to a job.
///
/// Location and filters are a snapshot taken at submission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Identifier assigned by the gateway; natural key.
    pub external_id: String,
    pub job_id: String,
    pub keyword: String,
    pub domain: String,
    pub location: Location,
    pub filters: SearchFilters,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranking_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// New `pending` task for a keyword of `job`, snapshotting the job's
    /// location and filters.
    pub fn submitted(job: &Job, keyword: &str, external_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            external_id: external_id.to_string(),
            job_id: job.id.clone(),
            keyword: keyword.to_string(),
            domain: job.domain.clone(),
            location: job.location.clone(),
            filters: job.filters.clone(),
            status: TaskStatus::Pending,
            ranking_id: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_statuses() {
        assert!(TaskStatus::Pending.is_open());
        assert!(TaskStatus::Processing.is_open());
        assert!(!TaskStatus::Ready.is_open());
        assert!(!TaskStatus::Failed.is_open());
        assert_eq!(TaskStatus::parse("ready"), Some(TaskStatus::Ready));
        assert_eq!(TaskStatus::parse("done"), None);
    }
}
