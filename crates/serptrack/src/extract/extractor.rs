use chrono::{DateTime, Utc};

use super::domain::{normalize_domain, DomainMatch};
use crate::gateway::{SerpItem, SerpResult};
use crate::model::{Competitor, RankingRecord, SerpMetadata, Task};

/// Competitor snapshots kept per record unless configured otherwise.
pub const DEFAULT_COMPETITOR_LIMIT: usize = 3;

const AI_OVERVIEW: &str = "ai_overview";
const PEOPLE_ALSO_ASK: &str = "people_also_ask";
const FEATURED_SNIPPET: &str = "featured_snippet";
const LOCAL_PACK: &str = "local_pack";

/// What the extractor read from one SERP for one target domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub rank: Option<u32>,
    pub rank_absolute: Option<u32>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub competitors: Vec<Competitor>,
    pub serp: SerpMetadata,
}

impl Extraction {
    /// Builds the immutable record for the task the SERP was fetched for.
    pub fn into_record(self, task: &Task, captured_at: DateTime<Utc>) -> RankingRecord {
        RankingRecord {
            id: uuid::Uuid::new_v4().to_string(),
            domain: task.domain.clone(),
            keyword: task.keyword.clone(),
            location: task.location.clone(),
            filters: task.filters.clone(),
            rank: self.rank,
            rank_absolute: self.rank_absolute,
            url: self.url,
            title: self.title,
            description: self.description,
            competitors: self.competitors,
            serp: self.serp,
            created_at: captured_at,
        }
    }
}

/// Locates a domain in a SERP and snapshots the page around it.
#[derive(Debug, Clone, Copy)]
pub struct Extractor {
    competitor_limit: usize,
    domain_match: DomainMatch,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(DEFAULT_COMPETITOR_LIMIT, DomainMatch::default())
    }
}

impl Extractor {
    pub fn new(competitor_limit: usize, domain_match: DomainMatch) -> Self {
        Self {
            competitor_limit,
            domain_match,
        }
    }

    pub fn domain_match(&self) -> DomainMatch {
        self.domain_match
    }

    /// Finds the first organic entry for `target_domain`.
    ///
    /// A SERP without the domain is a normal outcome: rank and the
    /// descriptive fields are `None`, competitors and metadata are still
    /// filled in.
    pub fn extract(&self, raw: &SerpResult, target_domain: &str) -> Extraction {
        let target = normalize_domain(target_domain);

        let mut extraction = Extraction {
            rank: None,
            rank_absolute: None,
            url: None,
            title: None,
            description: None,
            competitors: Vec::with_capacity(self.competitor_limit),
            serp: serp_metadata(raw),
        };

        let mut matched = false;
        for (ordinal, item) in raw.organic().enumerate() {
            let rank = item.rank_group.unwrap_or(ordinal as u32 + 1);
            let domain = item_domain(item);

            if extraction.competitors.len() < self.competitor_limit {
                extraction.competitors.push(Competitor {
                    rank,
                    domain: domain.clone(),
                    url: item.url.clone(),
                    title: item.title.clone(),
                });
            }

            if !matched && self.domain_match.matches(&domain, &target) {
                matched = true;
                extraction.rank = Some(rank);
                extraction.rank_absolute = item.rank_absolute;
                extraction.url = item.url.clone();
                extraction.title = item.title.clone();
                extraction.description = item.description.clone();
            }

            if matched && extraction.competitors.len() >= self.competitor_limit {
                break;
            }
        }

        extraction
    }
}

/// Domain reported for the entry, falling back to the host of its URL.
fn item_domain(item: &SerpItem) -> String {
    let from_field = item
        .domain
        .as_deref()
        .map(normalize_domain)
        .unwrap_or_default();
    if !from_field.is_empty() {
        return from_field;
    }
    item.url
        .as_deref()
        .map(normalize_domain)
        .unwrap_or_default()
}

fn serp_metadata(raw: &SerpResult) -> SerpMetadata {
    SerpMetadata {
        results_count: raw.se_results_count.unwrap_or(0),
        items_count: raw.items_count.unwrap_or(raw.items().len() as u32),
        has_ai_overview: raw.has_item_type(AI_OVERVIEW),
        has_people_also_ask: raw.has_item_type(PEOPLE_ALSO_ASK),
        has_featured_snippet: raw.has_item_type(FEATURED_SNIPPET),
        has_local_pack: raw.has_item_type(LOCAL_PACK),
        check_url: raw.check_url.clone(),
    }
}
