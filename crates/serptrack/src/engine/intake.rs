//! Validation of job requests before they reach the Job Ledger.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extract::normalize_domain;
use crate::model::{normalize_keyword, Location, SearchFilters};

/// Longest keyword the search-results API accepts.
pub const MAX_KEYWORD_CHARS: usize = 700;

/// A job request as received from a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    pub user_id: String,
    pub domain: String,
    pub keywords: Vec<String>,
    pub location: Location,
    #[serde(default)]
    pub filters: SearchFilters,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("user id is required")]
    MissingUser,

    #[error("domain is required")]
    MissingDomain,

    #[error("'{0}' is not a valid domain")]
    InvalidDomain(String),

    #[error("at least one keyword is required")]
    NoKeywords,

    #[error("keyword '{keyword}…' exceeds {max} characters")]
    KeywordTooLong { keyword: String, max: usize },

    #[error("location code must be positive")]
    InvalidLocation,

    #[error("{0} filter is required")]
    MissingFilter(&'static str),
}

/// A request that passed validation, with domain and filters normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidJob {
    pub user_id: String,
    pub domain: String,
    /// Trimmed, blank entries dropped, duplicates kept.
    pub keywords: Vec<String>,
    pub location: Location,
    pub filters: SearchFilters,
}

impl NewJob {
    pub fn validate(self) -> Result<ValidJob, ValidationError> {
        let user_id = self.user_id.trim().to_string();
        if user_id.is_empty() {
            return Err(ValidationError::MissingUser);
        }

        if self.domain.trim().is_empty() {
            return Err(ValidationError::MissingDomain);
        }
        let domain = normalize_domain(&self.domain);
        if domain.is_empty() || domain.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidDomain(self.domain));
        }

        let keywords: Vec<String> = self
            .keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();
        if keywords.is_empty() {
            return Err(ValidationError::NoKeywords);
        }
        if let Some(long) = keywords
            .iter()
            .find(|k| k.chars().count() > MAX_KEYWORD_CHARS)
        {
            return Err(ValidationError::KeywordTooLong {
                keyword: long.chars().take(32).collect(),
                max: MAX_KEYWORD_CHARS,
            });
        }

        if self.location.code == 0 {
            return Err(ValidationError::InvalidLocation);
        }

        let language = self.filters.language.trim().to_ascii_lowercase();
        if language.is_empty() {
            return Err(ValidationError::MissingFilter("language"));
        }
        let os = self.filters.os.trim().to_ascii_lowercase();
        if os.is_empty() {
            return Err(ValidationError::MissingFilter("os"));
        }

        Ok(ValidJob {
            user_id,
            domain,
            keywords,
            location: self.location,
            filters: SearchFilters {
                language,
                device: self.filters.device,
                os,
            },
        })
    }
}

/// Unique keywords in first-occurrence order.
///
/// Comparison ignores case and surrounding/repeated whitespace; the first
/// spelling seen is kept (trimmed).
pub fn dedupe_keywords(keywords: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(normalize_keyword(k)))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Device;

    fn request(domain: &str, keywords: &[&str]) -> NewJob {
        NewJob {
            user_id: "user-1".to_string(),
            domain: domain.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            location: Location {
                code: 2840,
                name: "United States".to_string(),
            },
            filters: SearchFilters::default(),
        }
    }

    #[test]
    fn test_dedupe_is_case_insensitive_and_ordered() {
        let keywords: Vec<String> = ["shoes", "Shoes", "boots", " shoes ", "running  shoes", "Running Shoes"]
            .iter()
            .map(|k| k.to_string())
            .collect();
        assert_eq!(
            dedupe_keywords(&keywords),
            vec!["shoes", "boots", "running  shoes"]
        );
    }

    #[test]
    fn test_valid_request_is_normalized() {
        let mut req = request("https://www.Store.example/", &["shoes", "  ", "Shoes"]);
        req.filters = SearchFilters {
            language: " EN ".to_string(),
            device: Device::Mobile,
            os: "iOS".to_string(),
        };
        let job = req.validate().unwrap();
        assert_eq!(job.domain, "store.example");
        assert_eq!(job.keywords, vec!["shoes", "Shoes"]);
        assert_eq!(job.filters.language, "en");
        assert_eq!(job.filters.os, "ios");
    }

    #[test]
    fn test_rejections() {
        assert_eq!(
            request("", &["shoes"]).validate(),
            Err(ValidationError::MissingDomain)
        );
        assert_eq!(
            request("store.example", &[" ", ""]).validate(),
            Err(ValidationError::NoKeywords)
        );
        assert!(matches!(
            request("bad domain.com", &["x"]).validate(),
            Err(ValidationError::InvalidDomain(_))
        ));

        let long = "k".repeat(MAX_KEYWORD_CHARS + 1);
        assert!(matches!(
            request("store.example", &[long.as_str()]).validate(),
            Err(ValidationError::KeywordTooLong { max: 700, .. })
        ));

        let mut req = request("store.example", &["shoes"]);
        req.location.code = 0;
        assert_eq!(req.validate(), Err(ValidationError::InvalidLocation));

        let mut req = request("store.example", &["shoes"]);
        req.filters.language = String::new();
        assert_eq!(req.validate(), Err(ValidationError::MissingFilter("language")));

        let mut req = request("store.example", &["shoes"]);
        req.user_id = " ".to_string();
        assert_eq!(req.validate(), Err(ValidationError::MissingUser));
    }
}
