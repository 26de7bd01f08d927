//! Test harness for orchestration scenarios.
//!
//! Each harness owns a temp directory with its own SQLite file, an
//! in-memory gateway, and an `Engine` wired to both.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use serptrack::engine::{Engine, EngineSettings, ReconcileReport};
use serptrack::gateway::{MemoryGateway, SerpResult};
use serptrack::model::{Job, LookupKey, RankingRecord, SearchFilters, SerpMetadata, Task};
use serptrack::{Database, DispatchOutcome};

use super::builders::{us, JobBuilder, DOMAIN};

pub struct TestHarness {
    temp_dir: TempDir,
    pub db_path: PathBuf,
    pub db: Database,
    pub gateway: Arc<MemoryGateway>,
    pub engine: Engine,
    settings: EngineSettings,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_settings(EngineSettings::default())
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("serptrack.db");
        let db = Database::open(&db_path).expect("Failed to open test database");
        let gateway = Arc::new(MemoryGateway::new());
        let engine = Engine::new(db.clone(), gateway.clone(), settings);

        Self {
            temp_dir,
            db_path,
            db,
            gateway,
            engine,
            settings,
        }
    }

    /// Replaces the engine with a fresh one over the same database file
    /// and gateway, as after a process restart.
    pub fn restart(&mut self) {
        let db = Database::open(&self.db_path).expect("Failed to reopen test database");
        self.engine = Engine::new(db.clone(), self.gateway.clone(), self.settings);
        self.db = db;
    }

    /// Runs raw SQL against the engine's database, e.g. to install a
    /// trigger that makes certain writes fail.
    pub fn execute(&self, sql: &str) {
        self.db
            .with_conn(|conn| Ok(conn.execute_batch(sql)?))
            .expect("Failed to execute SQL");
    }

    pub fn create(&self, keywords: &[&str]) -> Job {
        self.engine
            .create_job(JobBuilder::new(keywords).build())
            .expect("Failed to create job")
    }

    pub fn dispatch(&self) -> DispatchOutcome {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(self.engine.run_dispatch_once())
            .expect("dispatch failed")
    }

    pub fn reconcile(&self) -> ReconcileReport {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(self.engine.run_reconciliation_once())
            .expect("reconciliation failed")
    }

    pub fn job(&self, id: &str) -> Job {
        self.engine.job(id).unwrap().expect("job not found")
    }

    pub fn tasks(&self, job_id: &str) -> Vec<Task> {
        self.engine.tasks_for_job(job_id).unwrap()
    }

    /// Gateway id of the task submitted for `keyword`.
    pub fn task_id(&self, keyword: &str) -> String {
        self.gateway
            .task_id_for(keyword)
            .unwrap_or_else(|| panic!("no task submitted for '{}'", keyword))
    }

    pub fn complete(&self, keyword: &str, serp: SerpResult) {
        let id = self.task_id(keyword);
        self.gateway.complete(&id, serp);
    }

    /// Stores a ranking for `keyword` on the default domain, `age` old.
    pub fn seed_ranking(&self, keyword: &str, rank: Option<u32>, age: Duration) -> RankingRecord {
        let record = RankingRecord {
            id: uuid::Uuid::new_v4().to_string(),
            domain: DOMAIN.to_string(),
            keyword: keyword.to_string(),
            location: us(),
            filters: SearchFilters::default(),
            rank,
            rank_absolute: rank,
            url: None,
            title: None,
            description: None,
            competitors: vec![],
            serp: SerpMetadata::default(),
            created_at: Utc::now() - age,
        };
        self.engine
            .cache()
            .insert(&record)
            .expect("Failed to seed ranking");
        record
    }

    pub fn lookup(&self, keyword: &str) -> Option<RankingRecord> {
        let key = LookupKey::new(DOMAIN, keyword, us().code, &SearchFilters::default());
        self.engine.cache().lookup(&key, Utc::now()).unwrap()
    }
}
