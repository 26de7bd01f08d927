//! Raw SERP payloads as returned by the search-results API.
//!
//! `SerpResult` models only the fields the engine reads; everything else
//! in the upstream document is ignored. Payloads are persisted wrapped in
//! `StoredPayload` so that the stored format carries its own schema tag.

use serde::{Deserialize, Serialize};

/// One SERP ("advanced" result) for one keyword.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SerpResult {
    #[serde(default)]
    pub keyword: String,
    #[serde(default)]
    pub check_url: Option<String>,
    #[serde(default)]
    pub datetime: Option<String>,
    #[serde(default)]
    pub item_types: Option<Vec<String>>,
    #[serde(default)]
    pub se_results_count: Option<u64>,
    #[serde(default)]
    pub items_count: Option<u32>,
    #[serde(default)]
    pub items: Option<Vec<SerpItem>>,
}

impl SerpResult {
    pub fn items(&self) -> &[SerpItem] {
        self.items.as_deref().unwrap_or(&[])
    }

    /// Organic entries in rank order.
    pub fn organic(&self) -> impl Iterator<Item = &SerpItem> {
        self.items().iter().filter(|item| item.is_organic())
    }

    /// Whether any block of the given type is on the page.
    pub fn has_item_type(&self, item_type: &str) -> bool {
        self.item_types
            .as_deref()
            .is_some_and(|types| types.iter().any(|t| t == item_type))
            || self.items().iter().any(|item| item.item_type == item_type)
    }
}

/// One block on the results page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerpItem {
    /// Blocks without a type are kept and treated as non-organic.
    #[serde(rename = "type", default)]
    pub item_type: String,
    #[serde(default)]
    pub rank_group: Option<u32>,
    #[serde(default)]
    pub rank_absolute: Option<u32>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl SerpItem {
    pub fn is_organic(&self) -> bool {
        self.item_type == "organic"
    }
}

/// Versioned wrapper used for the `raw_payload` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schema", content = "result")]
pub enum StoredPayload {
    #[serde(rename = "serp.v1")]
    V1(SerpResult),
}

impl StoredPayload {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn serp(&self) -> &SerpResult {
        match self {
            StoredPayload::V1(result) => result,
        }
    }
}
