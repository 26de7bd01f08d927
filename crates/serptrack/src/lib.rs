pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod secrets;
pub mod store;

pub use config::{load_config, load_config_from_str, Config};
pub use db::{Database, DatabaseError};
pub use engine::{
    DispatchOutcome, Engine, EngineSettings, NewJob, ReconcileReport, Scheduler, Trigger,
    ValidationError,
};
pub use error::{ConfigError, EngineError, Result};
pub use extract::{DomainMatch, Extractor};
pub use gateway::{GatewayError, HttpGateway, MemoryGateway, TaskGateway};
pub use model::{Job, JobStatus, RankingRecord, Task, TaskStatus};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
