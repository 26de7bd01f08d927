//! HTTP client for a DataForSEO-v3-style SERP task API.
//!
//! Submission goes through `task_post`, readiness through `tasks_ready`,
//! and results through `task_get/advanced/{id}`. Submitted keywords are
//! correlated with their ids through the per-task `tag`, never by the
//! order of the response.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use log::{debug, warn};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::error::GatewayError;
use super::payload::SerpResult;
use super::{FetchOutcome, SubmitItem, SubmittedTask, TaskGateway};

/// Request-level success.
const STATUS_OK: u32 = 20000;
/// Per-task success on `task_post`.
const STATUS_TASK_CREATED: u32 = 20100;
/// Task accepted but not finished yet.
const STATUS_TASK_IN_QUEUE: u32 = 40602;
/// Task handed to a worker but not finished yet.
const STATUS_TASK_HANDED: u32 = 40601;

/// Maximum length for error bodies kept in messages.
const MAX_ERROR_BODY_LENGTH: usize = 200;

const SERP_PATH: &str = "/v3/serp/google/organic";

/// Connection settings for [`HttpGateway`].
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    pub base_url: String,
    pub login: String,
    pub password: SecretString,
    /// Number of results requested per SERP.
    pub depth: u32,
    /// Parallel `task_get` requests per fetch.
    pub fetch_concurrency: usize,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

/// Gateway backed by the remote HTTP API.
pub struct HttpGateway {
    client: Client,
    base_url: String,
    login: String,
    password: SecretString,
    depth: u32,
    fetch_concurrency: usize,
}

#[derive(Debug, Serialize)]
struct TaskPostItem<'a> {
    keyword: &'a str,
    location_code: u32,
    language_code: &'a str,
    device: &'a str,
    os: &'a str,
    depth: u32,
    tag: String,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    status_code: u32,
    #[serde(default)]
    status_message: String,
    #[serde(default = "Vec::new")]
    tasks: Vec<ApiTask<T>>,
}

#[derive(Debug, Deserialize)]
struct ApiTask<T> {
    #[serde(default)]
    id: String,
    status_code: u32,
    #[serde(default)]
    status_message: String,
    #[serde(default)]
    data: Option<TaskData>,
    #[serde(default = "Option::default")]
    result: Option<Vec<T>>,
}

#[derive(Debug, Deserialize)]
struct TaskData {
    #[serde(default)]
    tag: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReadyTask {
    id: String,
}

/// Truncates response bodies so error messages stay readable.
fn truncate_body(body: &str) -> String {
    if body.len() > MAX_ERROR_BODY_LENGTH {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &body[..end])
    } else {
        body.to_string()
    }
}

impl HttpGateway {
    /// Creates a client with connect and request timeouts applied.
    pub fn new(config: HttpGatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            login: config.login,
            password: config.password,
            depth: config.depth,
            fetch_concurrency: config.fetch_concurrency.max(1),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, SERP_PATH, path)
    }

    async fn read_envelope<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<ApiEnvelope<T>, GatewayError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Api {
                status_code: u32::from(status.as_u16()),
                message: truncate_body(&body),
            });
        }

        let envelope: ApiEnvelope<T> = serde_json::from_str(&body)
            .map_err(|e| GatewayError::Decode(format!("{}: {}", e, truncate_body(&body))))?;
        if envelope.status_code != STATUS_OK {
            return Err(GatewayError::Api {
                status_code: envelope.status_code,
                message: envelope.status_message,
            });
        }
        Ok(envelope)
    }

    async fn get_envelope<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<ApiEnvelope<T>, GatewayError> {
        let response = self
            .client
            .get(self.url(path))
            .basic_auth(&self.login, Some(self.password.expose_secret()))
            .send()
            .await?;
        Self::read_envelope(response).await
    }

    async fn fetch_one(&self, id: &str) -> Result<Option<FetchOutcome>, GatewayError> {
        let envelope: ApiEnvelope<SerpResult> =
            self.get_envelope(&format!("/task_get/advanced/{}", id)).await?;

        let Some(task) = envelope.tasks.into_iter().next() else {
            return Err(GatewayError::Decode(format!("no task in response for {}", id)));
        };

        match task.status_code {
            STATUS_OK => match task.result.and_then(|r| r.into_iter().next()) {
                Some(result) => Ok(Some(FetchOutcome::Ready(result))),
                None => Ok(Some(FetchOutcome::Failed(
                    "Task finished without a result".to_string(),
                ))),
            },
            STATUS_TASK_IN_QUEUE | STATUS_TASK_HANDED => Ok(None),
            code => Ok(Some(FetchOutcome::Failed(format!(
                "{} ({})",
                task.status_message, code
            )))),
        }
    }
}

#[async_trait]
impl TaskGateway for HttpGateway {
    async fn submit_batch(&self, items: &[SubmitItem]) -> Result<Vec<SubmittedTask>, GatewayError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let body: Vec<TaskPostItem<'_>> = items
            .iter()
            .enumerate()
            .map(|(index, item)| TaskPostItem {
                keyword: &item.keyword,
                location_code: item.location_code,
                language_code: &item.language,
                device: item.device.as_str(),
                os: &item.os,
                depth: self.depth,
                tag: index.to_string(),
            })
            .collect();

        let response = self
            .client
            .post(self.url("/task_post"))
            .basic_auth(&self.login, Some(self.password.expose_secret()))
            .json(&body)
            .send()
            .await?;
        let envelope: ApiEnvelope<serde_json::Value> = Self::read_envelope(response).await?;

        let rejected: Vec<&ApiTask<serde_json::Value>> = envelope
            .tasks
            .iter()
            .filter(|t| t.status_code != STATUS_TASK_CREATED)
            .collect();
        if let Some(first) = rejected.first() {
            return Err(GatewayError::Rejected {
                rejected: rejected.len(),
                total: items.len(),
                message: first.status_message.clone(),
            });
        }

        let mut submitted = Vec::with_capacity(items.len());
        for task in envelope.tasks {
            let index = task
                .data
                .as_ref()
                .and_then(|d| d.tag.as_deref())
                .and_then(|tag| tag.parse::<usize>().ok())
                .filter(|i| *i < items.len())
                .ok_or_else(|| {
                    GatewayError::Decode(format!("task {} has no usable tag", task.id))
                })?;
            submitted.push(SubmittedTask {
                keyword: items[index].keyword.clone(),
                external_id: task.id,
            });
        }

        if submitted.len() != items.len() {
            return Err(GatewayError::Decode(format!(
                "submitted {} keywords but received {} task ids",
                items.len(),
                submitted.len()
            )));
        }

        debug!("Submitted {} SERP tasks", submitted.len());
        Ok(submitted)
    }

    async fn list_ready_task_ids(&self) -> Result<Vec<String>, GatewayError> {
        let envelope: ApiEnvelope<ReadyTask> = self.get_envelope("/tasks_ready").await?;
        let ids = envelope
            .tasks
            .into_iter()
            .flat_map(|t| t.result.unwrap_or_default())
            .map(|r| r.id)
            .collect();
        Ok(ids)
    }

    async fn fetch_results(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, FetchOutcome>, GatewayError> {
        let fetched: Vec<(String, Result<Option<FetchOutcome>, GatewayError>)> =
            stream::iter(ids.iter().cloned())
                .map(|id| async move {
                    let outcome = self.fetch_one(&id).await;
                    (id, outcome)
                })
                .buffer_unordered(self.fetch_concurrency)
                .collect()
                .await;

        let mut outcomes = HashMap::with_capacity(fetched.len());
        for (id, result) in fetched {
            match result {
                Ok(Some(outcome)) => {
                    outcomes.insert(id, outcome);
                }
                Ok(None) => debug!("Task {} is not finished yet", id),
                Err(e) if e.is_retryable() => {
                    warn!("Fetching task {} failed, will retry later: {}", id, e);
                }
                Err(e) => {
                    outcomes.insert(id, FetchOutcome::Failed(e.to_string()));
                }
            }
        }
        Ok(outcomes)
    }
}
