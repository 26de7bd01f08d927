use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::extract::{DomainMatch, DEFAULT_COMPETITOR_LIMIT};
use crate::store::DEFAULT_CACHE_TTL_DAYS;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Defaults to `~/.serptrack/data/serptrack.db`.
    #[serde(default)]
    pub path: Option<String>,
}

impl DatabaseConfig {
    pub fn resolved_path(&self) -> Option<PathBuf> {
        match &self.path {
            Some(path) => Some(PathBuf::from(crate::secrets::expand_home(path))),
            None => crate::db::default_database_path(),
        }
    }
}

/// Search-results API endpoint and credentials.
///
/// The password may be given directly, as a file path, or as the name of
/// an environment variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub login: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_file: Option<String>,
    #[serde(default)]
    pub password_env_var: Option<String>,
    #[serde(default = "default_depth")]
    pub depth: u32,
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.dataforseo.com".to_string()
}

fn default_depth() -> u32 {
    100
}

fn default_fetch_concurrency() -> usize {
    4
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u32,
}

fn default_ttl_days() -> u32 {
    DEFAULT_CACHE_TTL_DAYS
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_days: DEFAULT_CACHE_TTL_DAYS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_dispatch_interval")]
    pub dispatch_interval_secs: u64,
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
    /// Upper bound on jobs dispatched per tick.
    #[serde(default = "default_max_jobs_per_tick")]
    pub max_jobs_per_tick: u32,
}

fn default_dispatch_interval() -> u64 {
    30
}

fn default_reconcile_interval() -> u64 {
    60
}

fn default_max_jobs_per_tick() -> u32 {
    10
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            dispatch_interval_secs: default_dispatch_interval(),
            reconcile_interval_secs: default_reconcile_interval(),
            max_jobs_per_tick: default_max_jobs_per_tick(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Open tasks older than this are failed by the stale sweep.
    #[serde(default = "default_max_task_age_hours")]
    pub max_task_age_hours: u32,
    /// Extra attempts for a task resolution that hit a store error.
    #[serde(default = "default_store_retries")]
    pub store_retries: u32,
}

fn default_max_task_age_hours() -> u32 {
    24
}

fn default_store_retries() -> u32 {
    3
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            max_task_age_hours: default_max_task_age_hours(),
            store_retries: default_store_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_competitor_limit")]
    pub competitor_limit: usize,
    #[serde(default)]
    pub domain_match: DomainMatch,
}

fn default_competitor_limit() -> usize {
    DEFAULT_COMPETITOR_LIMIT
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            competitor_limit: DEFAULT_COMPETITOR_LIMIT,
            domain_match: DomainMatch::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` overrides it.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            format: LogFormat::default(),
        }
    }
}

impl GatewayConfig {
    /// Resolves the password and builds the HTTP gateway settings.
    pub fn http_config(
        &self,
    ) -> Result<crate::gateway::HttpGatewayConfig, crate::secrets::SecretError> {
        let password = crate::secrets::resolve_secret(
            self.password.as_deref(),
            self.password_file.as_deref(),
            self.password_env_var.as_deref(),
        )?;
        Ok(crate::gateway::HttpGatewayConfig {
            base_url: self.base_url.clone(),
            login: self.login.clone(),
            password,
            depth: self.depth,
            fetch_concurrency: self.fetch_concurrency,
            connect_timeout: std::time::Duration::from_secs(self.connect_timeout_secs),
            request_timeout: std::time::Duration::from_secs(self.request_timeout_secs),
        })
    }
}
