//! Dispatch Orchestrator: pending Job → cache hits + submitted Tasks.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};

use super::intake::dedupe_keywords;
use super::retry::with_store_retries;
use crate::error::{EngineError, Result};
use crate::gateway::{SubmitItem, TaskGateway};
use crate::model::{normalize_keyword, Job, JobStatus, LookupKey, Task};
use crate::store::{JobLedger, ProgressOutcome, RankCache, TaskLedger};

/// What one dispatch attempt did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum DispatchOutcome {
    /// No pending job was waiting.
    Idle,
    /// The job was no longer pending; nothing was done.
    #[serde(rename_all = "camelCase")]
    Skipped { job_id: String, status: JobStatus },
    Dispatched(DispatchSummary),
}

impl DispatchOutcome {
    /// Number of tasks sent to the gateway.
    pub fn submitted(&self) -> u32 {
        match self {
            DispatchOutcome::Dispatched(summary) => summary.submitted,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSummary {
    pub job_id: String,
    /// Job status when dispatch returned.
    pub status: JobStatus,
    /// Deduplicated keyword count.
    pub total: u32,
    pub cached: u32,
    pub submitted: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Partitions a job's keywords into cache hits and gateway submissions.
pub struct Dispatcher {
    jobs: JobLedger,
    tasks: TaskLedger,
    cache: RankCache,
    gateway: Arc<dyn TaskGateway>,
    store_retries: u32,
}

impl Dispatcher {
    pub fn new(
        jobs: JobLedger,
        tasks: TaskLedger,
        cache: RankCache,
        gateway: Arc<dyn TaskGateway>,
        store_retries: u32,
    ) -> Self {
        Self {
            jobs,
            tasks,
            cache,
            gateway,
            store_retries,
        }
    }

    /// Claims the oldest pending job and dispatches it.
    pub async fn run_dispatch_once(&self) -> Result<DispatchOutcome> {
        match self.jobs.claim_next_pending()? {
            Some(job) => self.dispatch_claimed(job).await,
            None => Ok(DispatchOutcome::Idle),
        }
    }

    /// Dispatches one specific job if it is still pending.
    ///
    /// A second call for the same job is a no-op: the claim fails and no
    /// task is submitted again.
    pub async fn process_job(&self, job_id: &str) -> Result<DispatchOutcome> {
        if !self.jobs.claim(job_id)? {
            let job = self
                .jobs
                .get(job_id)?
                .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))?;
            debug!(job_id, status = %job.status, "Job is not pending, skipping dispatch");
            return Ok(DispatchOutcome::Skipped {
                job_id: job.id,
                status: job.status,
            });
        }

        match self.jobs.get(job_id) {
            Ok(Some(job)) => self.dispatch_claimed(job).await,
            Ok(None) => Err(EngineError::JobNotFound(job_id.to_string())),
            Err(e) => Err(self.abandon(job_id, e.into())),
        }
    }

    /// Runs dispatch for a job this caller claimed. Any error fails the
    /// job so it does not stay `processing` without an owner.
    async fn dispatch_claimed(&self, job: Job) -> Result<DispatchOutcome> {
        let job_id = job.id.clone();
        let span = info_span!("dispatch", job_id = %job.id, domain = %job.domain);
        self.dispatch_inner(job)
            .instrument(span)
            .await
            .map_err(|e| self.abandon(&job_id, e))
    }

    /// Fails a claimed job with the error that stopped its dispatch.
    fn abandon(&self, job_id: &str, error: EngineError) -> EngineError {
        let message = format!("Dispatch failed: {}", error);
        warn!(job_id, "{}", message);
        if let Err(e) = self.jobs.fail(job_id, &message) {
            warn!(job_id, "Could not mark job failed: {}", e);
        }
        error
    }

    async fn dispatch_inner(&self, job: Job) -> Result<DispatchOutcome> {
        let keywords = dedupe_keywords(&job.keywords);
        let total = keywords.len() as u32;
        let mut summary = DispatchSummary {
            job_id: job.id.clone(),
            status: JobStatus::Processing,
            total,
            cached: 0,
            submitted: 0,
            error: None,
        };

        if !self.jobs.reset_total(&job.id, total)? {
            let status = self.current_status(&job.id)?;
            if status != JobStatus::Processing {
                info!(%status, "Job left processing before dispatch, nothing submitted");
                summary.status = status;
                return Ok(DispatchOutcome::Dispatched(summary));
            }
            warn!("Could not reset total for job {}", job.id);
        }

        // Cache lookups are best effort: a store error is a miss.
        let now = Utc::now();
        let mut to_fetch = Vec::new();
        for keyword in keywords {
            let key = LookupKey::new(&job.domain, &keyword, job.location.code, &job.filters);
            match self.cache.lookup(&key, now) {
                Ok(Some(record)) => match self.jobs.record_cached_hit(&job.id, &record.id)? {
                    ProgressOutcome::Advanced { .. } => summary.cached += 1,
                    ProgressOutcome::Cancelled => {
                        info!("Job {} was cancelled during dispatch", job.id);
                        summary.status = JobStatus::Cancelled;
                        return Ok(DispatchOutcome::Dispatched(summary));
                    }
                    other => warn!(?other, "Cached hit for '{}' not counted", keyword),
                },
                Ok(None) => to_fetch.push(keyword),
                Err(e) => {
                    warn!("Cache lookup for '{}' failed, treating as miss: {}", keyword, e);
                    to_fetch.push(keyword);
                }
            }
        }

        if to_fetch.is_empty() {
            self.jobs.complete_if_done(&job.id)?;
            summary.status = self.current_status(&job.id)?;
            info!(cached = summary.cached, "All keywords served from cache");
            return Ok(DispatchOutcome::Dispatched(summary));
        }

        let items: Vec<SubmitItem> = to_fetch
            .iter()
            .map(|keyword| SubmitItem {
                keyword: keyword.clone(),
                domain: job.domain.clone(),
                location_code: job.location.code,
                location_name: job.location.name.clone(),
                language: job.filters.language.clone(),
                device: job.filters.device,
                os: job.filters.os.clone(),
            })
            .collect();

        let submitted = match self.gateway.submit_batch(&items).await {
            Ok(submitted) => submitted,
            Err(e) => {
                let message = format!("Task submission failed: {}", e);
                warn!("{}", message);
                self.jobs.fail(&job.id, &message)?;
                summary.status = self.current_status(&job.id)?;
                summary.error = Some(message);
                return Ok(DispatchOutcome::Dispatched(summary));
            }
        };

        // Correlate by keyword, never by position.
        let mut unsubmitted: HashMap<String, &String> = to_fetch
            .iter()
            .map(|k| (normalize_keyword(k), k))
            .collect();
        let now = Utc::now();
        let mut tasks = Vec::with_capacity(submitted.len());
        for entry in &submitted {
            let Some(keyword) = unsubmitted.remove(&normalize_keyword(&entry.keyword)) else {
                warn!(
                    "Gateway returned task {} for unexpected keyword '{}'",
                    entry.external_id, entry.keyword
                );
                continue;
            };
            tasks.push(Task::submitted(&job, keyword, &entry.external_id, now));
        }

        // All rows of the batch land together; without them the gateway's
        // tasks could never be reconciled.
        let inserted = with_store_retries(self.store_retries, || {
            self.tasks.record_submitted_batch(&tasks)
        })
        .await
        .inspect_err(|e| {
            let ids: Vec<&str> = tasks.iter().map(|t| t.external_id.as_str()).collect();
            warn!(?ids, "Submitted tasks could not be recorded: {}", e);
        })?;
        summary.submitted = inserted.len() as u32;
        for task in tasks.iter().filter(|t| !inserted.contains(&t.external_id)) {
            warn!("Task {} already recorded, ignoring duplicate", task.external_id);
        }

        // The gateway promised one id per item; anything left over will
        // never resolve, so it counts as failed right away.
        for keyword in unsubmitted.into_values() {
            warn!("Gateway returned no task for '{}'", keyword);
            self.jobs.record_unsubmitted(&job.id)?;
        }

        summary.status = self.current_status(&job.id)?;
        info!(
            total = summary.total,
            cached = summary.cached,
            submitted = summary.submitted,
            "Job dispatched"
        );
        Ok(DispatchOutcome::Dispatched(summary))
    }

    fn current_status(&self, job_id: &str) -> Result<JobStatus> {
        self.jobs
            .get(job_id)?
            .map(|job| job.status)
            .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))
    }
}
