use std::path::PathBuf;
use thiserror::Error;

use crate::engine::ValidationError;
use crate::gateway::GatewayError;
use crate::model::JobStatus;
use crate::secrets::SecretError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Invalid job request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Secret error: {0}")]
    Secret(#[from] SecretError),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {id} is already {status}")]
    AlreadyTerminal { id: String, status: JobStatus },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("No config file given (pass a path or set {env_var})")]
    MissingPath { env_var: &'static str },
}

pub type Result<T> = std::result::Result<T, EngineError>;
