//! Builder patterns for creating test data programmatically.

#![allow(dead_code)]

use serptrack::engine::NewJob;
use serptrack::gateway::{SerpItem, SerpResult};
use serptrack::model::{Device, Location, SearchFilters};

pub const DOMAIN: &str = "store.example";
pub const USER: &str = "user-1";

pub fn us() -> Location {
    Location {
        code: 2840,
        name: "United States".to_string(),
    }
}

/// Builder for `NewJob` requests.
pub struct JobBuilder {
    user_id: String,
    domain: String,
    keywords: Vec<String>,
    location: Location,
    filters: SearchFilters,
}

impl JobBuilder {
    pub fn new(keywords: &[&str]) -> Self {
        Self {
            user_id: USER.to_string(),
            domain: DOMAIN.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            location: us(),
            filters: SearchFilters::default(),
        }
    }

    pub fn user(mut self, user_id: &str) -> Self {
        self.user_id = user_id.to_string();
        self
    }

    pub fn domain(mut self, domain: &str) -> Self {
        self.domain = domain.to_string();
        self
    }

    pub fn device(mut self, device: Device) -> Self {
        self.filters.device = device;
        self
    }

    pub fn build(self) -> NewJob {
        NewJob {
            user_id: self.user_id,
            domain: self.domain,
            keywords: self.keywords,
            location: self.location,
            filters: self.filters,
        }
    }
}

/// Builder for SERP payloads.
pub struct SerpBuilder {
    keyword: String,
    items: Vec<SerpItem>,
    item_types: Vec<String>,
    organic_count: u32,
}

impl SerpBuilder {
    pub fn new(keyword: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            items: Vec::new(),
            item_types: Vec::new(),
            organic_count: 0,
        }
    }

    /// Appends an organic entry for `domain` at the next organic rank.
    pub fn organic(mut self, domain: &str) -> Self {
        self.organic_count += 1;
        let absolute = self.items.len() as u32 + 1;
        self.items.push(SerpItem {
            item_type: "organic".to_string(),
            rank_group: Some(self.organic_count),
            rank_absolute: Some(absolute),
            domain: Some(domain.to_string()),
            url: Some(format!("https://{}/{}", domain, self.keyword.replace(' ', "-"))),
            title: Some(format!("{} at {}", self.keyword, domain)),
            description: None,
        });
        self.add_type("organic")
    }

    /// Appends a non-organic block such as `people_also_ask`.
    pub fn block(mut self, item_type: &str) -> Self {
        let absolute = self.items.len() as u32 + 1;
        self.items.push(SerpItem {
            item_type: item_type.to_string(),
            rank_group: Some(1),
            rank_absolute: Some(absolute),
            ..SerpItem::default()
        });
        self.add_type(item_type)
    }

    fn add_type(mut self, item_type: &str) -> Self {
        if !self.item_types.iter().any(|t| t == item_type) {
            self.item_types.push(item_type.to_string());
        }
        self
    }

    pub fn build(self) -> SerpResult {
        SerpResult {
            keyword: self.keyword,
            check_url: Some("https://www.google.com/search?q=test".to_string()),
            datetime: None,
            item_types: Some(self.item_types),
            se_results_count: Some(1_000_000),
            items_count: Some(self.items.len() as u32),
            items: Some(self.items),
        }
    }
}
