use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

/// Environment variable consulted when no config path is passed.
pub const CONFIG_ENV_VAR: &str = "SERPTRACK_CONFIG";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config = load_config_from_str(&content)?;
    log::info!("Loaded config from {}", path.display());
    Ok(config)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.gateway.login.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "gateway.login must not be empty".to_string(),
        });
    }

    if !crate::secrets::has_secret_source(
        config.gateway.password.as_deref(),
        config.gateway.password_file.as_deref(),
        config.gateway.password_env_var.as_deref(),
    ) {
        return Err(ConfigError::Validation {
            message: "gateway needs one of password, password_file or password_env_var"
                .to_string(),
        });
    }

    let positive = [
        ("cache.ttl_days", config.cache.ttl_days as u64),
        (
            "scheduler.dispatch_interval_secs",
            config.scheduler.dispatch_interval_secs,
        ),
        (
            "scheduler.reconcile_interval_secs",
            config.scheduler.reconcile_interval_secs,
        ),
        (
            "scheduler.max_jobs_per_tick",
            config.scheduler.max_jobs_per_tick as u64,
        ),
        (
            "reconcile.max_task_age_hours",
            config.reconcile.max_task_age_hours as u64,
        ),
        ("gateway.depth", config.gateway.depth as u64),
        (
            "gateway.fetch_concurrency",
            config.gateway.fetch_concurrency as u64,
        ),
    ];
    for (name, value) in positive {
        if value == 0 {
            return Err(ConfigError::Validation {
                message: format!("{} must be greater than zero", name),
            });
        }
    }

    if !(1..=10).contains(&config.extraction.competitor_limit) {
        return Err(ConfigError::Validation {
            message: format!(
                "extraction.competitor_limit must be between 1 and 10, got {}",
                config.extraction.competitor_limit
            ),
        });
    }

    Ok(())
}
