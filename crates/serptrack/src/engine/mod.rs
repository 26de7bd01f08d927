//! Orchestration: intake, dispatch, reconciliation and their triggers.
//!
//! `Engine` is the entry point for callers. Both loops are exposed as
//! one-shot operations that are safe to call repeatedly and concurrently;
//! `Scheduler` drives them from timers and trigger signals.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;

pub mod dispatch;
pub mod intake;
pub mod reconcile;
mod retry;
pub mod scheduler;

pub use dispatch::{DispatchOutcome, DispatchSummary, Dispatcher};
pub use intake::{dedupe_keywords, NewJob, ValidJob, ValidationError, MAX_KEYWORD_CHARS};
pub use reconcile::{ReconcileReport, ReconcileSettings, Reconciler, TaskFailure};
pub use scheduler::Scheduler;

use crate::config::Config;
use crate::db::Database;
use crate::error::{EngineError, Result};
use crate::extract::Extractor;
use crate::gateway::TaskGateway;
use crate::model::{Job, RankingRecord, Task};
use crate::store::{JobFilter, JobLedger, RankCache, TaskLedger, DEFAULT_CACHE_TTL_DAYS};

/// Signals understood by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A job was created; run dispatch now.
    Dispatch,
    /// Tasks were submitted; run reconciliation now.
    Reconcile,
}

/// Engine tunables.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub cache_ttl: chrono::Duration,
    pub extractor: Extractor,
    pub reconcile: ReconcileSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            cache_ttl: chrono::Duration::days(DEFAULT_CACHE_TTL_DAYS as i64),
            extractor: Extractor::default(),
            reconcile: ReconcileSettings::default(),
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cache_ttl: chrono::Duration::days(config.cache.ttl_days as i64),
            extractor: Extractor::new(
                config.extraction.competitor_limit,
                config.extraction.domain_match,
            ),
            reconcile: ReconcileSettings {
                store_retries: config.reconcile.store_retries,
                max_task_age: chrono::Duration::hours(config.reconcile.max_task_age_hours as i64),
            },
        }
    }
}

const TRIGGER_CAPACITY: usize = 64;

pub struct Engine {
    jobs: JobLedger,
    tasks: TaskLedger,
    cache: RankCache,
    dispatcher: Dispatcher,
    reconciler: Reconciler,
    triggers: broadcast::Sender<Trigger>,
}

impl Engine {
    pub fn new(db: Database, gateway: Arc<dyn TaskGateway>, settings: EngineSettings) -> Self {
        let jobs = JobLedger::new(db.clone());
        let tasks = TaskLedger::new(db.clone());
        let cache = RankCache::new(db, settings.cache_ttl);
        let dispatcher = Dispatcher::new(
            jobs.clone(),
            tasks.clone(),
            cache.clone(),
            Arc::clone(&gateway),
            settings.reconcile.store_retries,
        );
        let reconciler = Reconciler::new(
            tasks.clone(),
            gateway,
            settings.extractor,
            settings.reconcile,
        );
        let (triggers, _) = broadcast::channel(TRIGGER_CAPACITY);

        Self {
            jobs,
            tasks,
            cache,
            dispatcher,
            reconciler,
            triggers,
        }
    }

    pub fn jobs(&self) -> &JobLedger {
        &self.jobs
    }

    pub fn tasks(&self) -> &TaskLedger {
        &self.tasks
    }

    pub fn cache(&self) -> &RankCache {
        &self.cache
    }

    /// Validates and stores a new job, then signals dispatch.
    pub fn create_job(&self, request: NewJob) -> Result<Job> {
        let valid = request.validate()?;
        let job = self.jobs.create_job(
            &valid.user_id,
            &valid.domain,
            &valid.keywords,
            &valid.location,
            &valid.filters,
        )?;
        self.trigger(Trigger::Dispatch);
        Ok(job)
    }

    /// Cancels a pending or processing job.
    ///
    /// Tasks already at the gateway keep running; their results are still
    /// stored but no longer counted against the job.
    pub fn cancel_job(&self, job_id: &str, user_id: &str) -> Result<Job> {
        let job = self
            .jobs
            .get(job_id)?
            .filter(|job| job.user_id == user_id)
            .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))?;

        if !self.jobs.cancel(job_id, user_id)? {
            let status = self
                .jobs
                .get(job_id)?
                .map(|j| j.status)
                .unwrap_or(job.status);
            return Err(EngineError::AlreadyTerminal {
                id: job_id.to_string(),
                status,
            });
        }

        self.jobs
            .get(job_id)?
            .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))
    }

    pub fn job(&self, job_id: &str) -> Result<Option<Job>> {
        Ok(self.jobs.get(job_id)?)
    }

    pub fn list_jobs(&self, filter: &JobFilter) -> Result<(Vec<Job>, u64)> {
        Ok(self.jobs.list(filter)?)
    }

    pub fn tasks_for_job(&self, job_id: &str) -> Result<Vec<Task>> {
        Ok(self.tasks.list_for_job(job_id)?)
    }

    pub fn ranking(&self, ranking_id: &str) -> Result<Option<RankingRecord>> {
        Ok(self.cache.get(ranking_id)?)
    }

    /// Claims and dispatches the oldest pending job, if any.
    ///
    /// When tasks were submitted a follow-up reconciliation is signalled.
    pub async fn run_dispatch_once(&self) -> Result<DispatchOutcome> {
        let outcome = self.dispatcher.run_dispatch_once().await?;
        self.after_dispatch(&outcome);
        Ok(outcome)
    }

    /// Dispatches one job by id; a no-op unless it is pending.
    pub async fn process_job(&self, job_id: &str) -> Result<DispatchOutcome> {
        let outcome = self.dispatcher.process_job(job_id).await?;
        self.after_dispatch(&outcome);
        Ok(outcome)
    }

    /// Reconciles ready tasks, then fails tasks that waited too long.
    pub async fn run_reconciliation_once(&self) -> Result<ReconcileReport> {
        let mut report = self.reconciler.reconcile_ready_tasks().await?;
        let swept = self.reconciler.sweep_stale(Utc::now()).await?;
        report.merge(swept);
        Ok(report)
    }

    /// Receiver for trigger signals; subscribe before they are sent.
    pub fn subscribe(&self) -> broadcast::Receiver<Trigger> {
        self.triggers.subscribe()
    }

    pub fn trigger(&self, trigger: Trigger) {
        if self.triggers.send(trigger).is_err() {
            log::debug!("No scheduler listening for {:?}", trigger);
        }
    }

    fn after_dispatch(&self, outcome: &DispatchOutcome) {
        if outcome.submitted() > 0 {
            self.trigger(Trigger::Reconcile);
        }
    }
}
