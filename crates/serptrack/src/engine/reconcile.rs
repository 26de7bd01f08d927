//! Reconciliation Orchestrator: ready gateway tasks → rankings + progress.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};

use super::retry::with_store_retries;
use crate::db::DatabaseError;
use crate::error::Result;
use crate::extract::Extractor;
use crate::gateway::{FetchOutcome, SerpResult, StoredPayload, TaskGateway};
use crate::model::Task;
use crate::store::{ProgressOutcome, Resolution, TaskLedger};

/// Upper bound on tasks expired per sweep.
const STALE_SWEEP_LIMIT: u32 = 500;

/// A task whose resolution could not be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFailure {
    pub external_id: String,
    pub message: String,
}

/// Counters for one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Ids the gateway reported ready.
    pub ready_ids: usize,
    /// Of those, ids with an open task in the ledger.
    pub matched: usize,
    /// Ready ids without an open task (unknown or already resolved).
    pub skipped: usize,
    /// Matched tasks whose result was not available yet.
    pub not_ready: usize,
    /// Tasks moved to `ready`.
    pub resolved: usize,
    /// Tasks moved to `failed` on a gateway error.
    pub failed: usize,
    /// Tasks failed by the stale sweep.
    pub expired: usize,
    /// Resolutions that did not count because the job was cancelled.
    pub cancelled: usize,
    /// Jobs that reached `completed` during this pass.
    pub jobs_completed: usize,
    pub errors: Vec<TaskFailure>,
}

impl ReconcileReport {
    fn count(&mut self, resolution: Resolution) {
        match resolution {
            Resolution::Recorded(ProgressOutcome::Advanced { job_completed: true }) => {
                self.jobs_completed += 1
            }
            Resolution::Recorded(ProgressOutcome::Cancelled) => self.cancelled += 1,
            _ => {}
        }
    }

    /// Adds the counters of another pass.
    pub fn merge(&mut self, other: ReconcileReport) {
        self.ready_ids += other.ready_ids;
        self.matched += other.matched;
        self.skipped += other.skipped;
        self.not_ready += other.not_ready;
        self.resolved += other.resolved;
        self.failed += other.failed;
        self.expired += other.expired;
        self.cancelled += other.cancelled;
        self.jobs_completed += other.jobs_completed;
        self.errors.extend(other.errors);
    }
}

/// Tunables for reconciliation.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileSettings {
    /// Extra attempts after a retryable store error.
    pub store_retries: u32,
    /// Open tasks older than this are failed by the sweep.
    pub max_task_age: chrono::Duration,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            store_retries: 3,
            max_task_age: chrono::Duration::hours(24),
        }
    }
}

pub struct Reconciler {
    tasks: TaskLedger,
    gateway: Arc<dyn TaskGateway>,
    extractor: Extractor,
    settings: ReconcileSettings,
}

impl Reconciler {
    pub fn new(
        tasks: TaskLedger,
        gateway: Arc<dyn TaskGateway>,
        extractor: Extractor,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            tasks,
            gateway,
            extractor,
            settings,
        }
    }

    /// Collects every ready result and writes it back to its task and job.
    ///
    /// Gateway errors fail the pass as a whole; store errors are isolated
    /// to the task they happened on and reported in `errors`.
    pub async fn reconcile_ready_tasks(&self) -> Result<ReconcileReport> {
        self.reconcile_inner()
            .instrument(info_span!("reconcile"))
            .await
    }

    async fn reconcile_inner(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        let ready_ids = self.gateway.list_ready_task_ids().await?;
        report.ready_ids = ready_ids.len();
        if ready_ids.is_empty() {
            debug!("No ready tasks");
            return Ok(report);
        }

        let open = self.tasks.find_open(&ready_ids)?;
        report.matched = open.len();
        report.skipped = ready_ids.len() - open.len();
        if open.is_empty() {
            debug!(skipped = report.skipped, "No open tasks among ready ids");
            return Ok(report);
        }

        for task in &open {
            if let Err(e) = self.tasks.mark_processing(&task.external_id) {
                warn!("Could not mark task {} processing: {}", task.external_id, e);
            }
        }

        let ids: Vec<String> = open.iter().map(|t| t.external_id.clone()).collect();
        let mut results = self.gateway.fetch_results(&ids).await?;

        for task in open {
            let Some(outcome) = results.remove(&task.external_id) else {
                report.not_ready += 1;
                continue;
            };

            let span = info_span!(
                "reconcile_task",
                task_id = %task.external_id,
                job_id = %task.job_id,
                keyword = %task.keyword,
            );
            let resolved = match outcome {
                FetchOutcome::Ready(serp) => self
                    .resolve_ready(&task, serp)
                    .instrument(span)
                    .await
                    .map(|r| (r, true)),
                FetchOutcome::Failed(message) => {
                    warn!("Task {} failed at the gateway: {}", task.external_id, message);
                    self.resolve_failed(&task.external_id, &message)
                        .instrument(span)
                        .await
                        .map(|r| (r, false))
                }
            };

            match resolved {
                Ok((Resolution::AlreadyResolved | Resolution::TaskMissing, _)) => {
                    report.skipped += 1;
                }
                Ok((resolution, ready)) => {
                    if ready {
                        report.resolved += 1;
                    } else {
                        report.failed += 1;
                    }
                    report.count(resolution);
                }
                Err(e) => {
                    warn!("Resolving task {} failed: {}", task.external_id, e);
                    report.errors.push(TaskFailure {
                        external_id: task.external_id.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            ready = report.ready_ids,
            resolved = report.resolved,
            failed = report.failed,
            not_ready = report.not_ready,
            errors = report.errors.len(),
            "Reconciliation pass finished"
        );
        Ok(report)
    }

    async fn resolve_ready(
        &self,
        task: &Task,
        serp: SerpResult,
    ) -> std::result::Result<Resolution, DatabaseError> {
        let captured_at = Utc::now();
        let record = self
            .extractor
            .extract(&serp, &task.domain)
            .into_record(task, captured_at);
        debug!(rank = ?record.rank, "Extracted ranking");

        let payload = StoredPayload::V1(serp);
        with_store_retries(self.settings.store_retries, || {
            self.tasks
                .resolve_ready(&task.external_id, &record, &payload)
        })
        .await
    }

    async fn resolve_failed(
        &self,
        external_id: &str,
        message: &str,
    ) -> std::result::Result<Resolution, DatabaseError> {
        with_store_retries(self.settings.store_retries, || {
            self.tasks.resolve_failed(external_id, message)
        })
        .await
    }

    /// Fails open tasks that have waited longer than the configured age.
    pub async fn sweep_stale(&self, now: DateTime<Utc>) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let cutoff = now - self.settings.max_task_age;
        let stale = self.tasks.find_stale(cutoff, STALE_SWEEP_LIMIT)?;
        if stale.is_empty() {
            return Ok(report);
        }

        let message = format!(
            "Task expired: no result within {} hours",
            self.settings.max_task_age.num_hours()
        );
        for task in stale {
            match self.resolve_failed(&task.external_id, &message).await {
                Ok(Resolution::Recorded(outcome)) => {
                    report.expired += 1;
                    report.count(Resolution::Recorded(outcome));
                }
                Ok(_) => {}
                Err(e) => report.errors.push(TaskFailure {
                    external_id: task.external_id.clone(),
                    message: e.to_string(),
                }),
            }
        }

        info!(expired = report.expired, "Stale task sweep finished");
        Ok(report)
    }
}
