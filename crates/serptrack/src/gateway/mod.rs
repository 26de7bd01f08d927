//! External Task Gateway: the bulk search-results API the engine drives.
//!
//! The gateway is asynchronous on its side: submitting returns task ids
//! immediately, results become ready later and are collected by id.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod client;
pub mod error;
pub mod memory;
pub mod payload;

pub use client::{HttpGateway, HttpGatewayConfig};
pub use error::GatewayError;
pub use memory::MemoryGateway;
pub use payload::{SerpItem, SerpResult, StoredPayload};

use crate::model::Device;

/// One keyword lookup to submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitItem {
    pub keyword: String,
    pub domain: String,
    pub location_code: u32,
    pub location_name: String,
    pub language: String,
    pub device: Device,
    pub os: String,
}

/// Gateway-assigned id for a submitted keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedTask {
    pub keyword: String,
    pub external_id: String,
}

/// Per-task result of a fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Ready(SerpResult),
    /// The gateway gave up on this task; the message is stored on it.
    Failed(String),
}

/// The search-results API as seen by the orchestrators.
#[async_trait]
pub trait TaskGateway: Send + Sync {
    /// Submits every item in one call. Either all items get an id or the
    /// call fails as a whole.
    async fn submit_batch(&self, items: &[SubmitItem]) -> Result<Vec<SubmittedTask>, GatewayError>;

    /// Ids of previously submitted tasks whose results can be collected.
    async fn list_ready_task_ids(&self) -> Result<Vec<String>, GatewayError>;

    /// Collects results for ready ids. Ids missing from the map are not
    /// available yet and should be asked for again later.
    async fn fetch_results(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, FetchOutcome>, GatewayError>;
}
