pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str, CONFIG_ENV_VAR};
pub use schema::{
    CacheConfig, Config, DatabaseConfig, ExtractionConfig, GatewayConfig, LogFormat,
    LoggingConfig, ReconcileConfig, SchedulerConfig,
};
