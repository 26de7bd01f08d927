use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::filters::{Location, SearchFilters};

/// One of the top organic results captured alongside the tracked domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Competitor {
    pub rank: u32,
    pub domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// SERP-level facts, independent of whether the domain was found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerpMetadata {
    /// Total results the engine reports for the query.
    pub results_count: u64,
    /// Number of SERP items returned within the search depth.
    pub items_count: u32,
    pub has_ai_overview: bool,
    pub has_people_also_ask: bool,
    pub has_featured_snippet: bool,
    pub has_local_pack: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_url: Option<String>,
}

/// Immutable point-in-time snapshot of a domain's position for a keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingRecord {
    pub id: String,
    pub domain: String,
    pub keyword: String,
    pub location: Location,
    pub filters: SearchFilters,
    /// Organic rank; `None` means not found within the search depth.
    pub rank: Option<u32>,
    /// Position among all SERP items, including non-organic blocks.
    pub rank_absolute: Option<u32>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub competitors: Vec<Competitor>,
    pub serp: SerpMetadata,
    pub created_at: DateTime<Utc>,
}

impl RankingRecord {
    pub fn is_found(&self) -> bool {
        self.rank.is_some()
    }

    /// Fresh while strictly younger than `ttl` at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.created_at < ttl
    }
}
