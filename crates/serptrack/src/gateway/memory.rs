//! In-process gateway with scripted behaviour.
//!
//! Ids are deterministic (`mem-000001`, …). Results are handed out once:
//! after `fetch_results` collects an id it disappears from the ready list,
//! the same way the remote API forgets collected tasks. `relist` puts an
//! id back to simulate duplicate readiness notifications.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::error::GatewayError;
use super::payload::SerpResult;
use super::{FetchOutcome, SubmitItem, SubmittedTask, TaskGateway};

#[derive(Default)]
struct MemoryState {
    next_id: u64,
    submit_calls: usize,
    submitted: Vec<(String, SubmitItem)>,
    ready: Vec<String>,
    outcomes: HashMap<String, FetchOutcome>,
    submit_failure: Option<String>,
    unavailable: Option<String>,
}

/// Gateway that keeps everything in memory.
#[derive(Default)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Makes every following `submit_batch` fail with `message`.
    pub fn fail_submissions(&self, message: impl Into<String>) {
        self.lock().submit_failure = Some(message.into());
    }

    /// Makes readiness checks and fetches fail with `message`.
    pub fn set_unavailable(&self, message: Option<String>) {
        self.lock().unavailable = message;
    }

    /// Number of `submit_batch` calls, including failed ones.
    pub fn submit_calls(&self) -> usize {
        self.lock().submit_calls
    }

    /// Every accepted submission as (external id, item), in order.
    pub fn submitted(&self) -> Vec<(String, SubmitItem)> {
        self.lock().submitted.clone()
    }

    /// Id assigned to the most recent submission of `keyword`.
    pub fn task_id_for(&self, keyword: &str) -> Option<String> {
        self.lock()
            .submitted
            .iter()
            .rev()
            .find(|(_, item)| item.keyword == keyword)
            .map(|(id, _)| id.clone())
    }

    /// Finishes a task with a result.
    pub fn complete(&self, external_id: &str, result: SerpResult) {
        self.finish(external_id, FetchOutcome::Ready(result));
    }

    /// Finishes a task with an error.
    pub fn fail(&self, external_id: &str, message: impl Into<String>) {
        self.finish(external_id, FetchOutcome::Failed(message.into()));
    }

    /// Announces an id as ready again, even if it was already collected
    /// or was never submitted here.
    pub fn relist(&self, external_id: &str) {
        let mut state = self.lock();
        if !state.ready.iter().any(|id| id == external_id) {
            state.ready.push(external_id.to_string());
        }
    }

    fn finish(&self, external_id: &str, outcome: FetchOutcome) {
        let mut state = self.lock();
        state.outcomes.insert(external_id.to_string(), outcome);
        if !state.ready.iter().any(|id| id == external_id) {
            state.ready.push(external_id.to_string());
        }
    }
}

#[async_trait]
impl TaskGateway for MemoryGateway {
    async fn submit_batch(&self, items: &[SubmitItem]) -> Result<Vec<SubmittedTask>, GatewayError> {
        let mut state = self.lock();
        state.submit_calls += 1;
        if let Some(message) = &state.submit_failure {
            return Err(GatewayError::Unavailable(message.clone()));
        }

        let mut submitted = Vec::with_capacity(items.len());
        for item in items {
            state.next_id += 1;
            let id = format!("mem-{:06}", state.next_id);
            state.submitted.push((id.clone(), item.clone()));
            submitted.push(SubmittedTask {
                keyword: item.keyword.clone(),
                external_id: id,
            });
        }
        Ok(submitted)
    }

    async fn list_ready_task_ids(&self) -> Result<Vec<String>, GatewayError> {
        let state = self.lock();
        if let Some(message) = &state.unavailable {
            return Err(GatewayError::Unavailable(message.clone()));
        }
        Ok(state.ready.clone())
    }

    async fn fetch_results(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, FetchOutcome>, GatewayError> {
        let mut state = self.lock();
        if let Some(message) = &state.unavailable {
            return Err(GatewayError::Unavailable(message.clone()));
        }

        let mut results = HashMap::new();
        for id in ids {
            if let Some(outcome) = state.outcomes.get(id) {
                results.insert(id.clone(), outcome.clone());
            }
        }
        state.ready.retain(|id| !results.contains_key(id));
        Ok(results)
    }
}
