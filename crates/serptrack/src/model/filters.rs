use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::extract::normalize_domain;

/// Search location as understood by the search-results API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Numeric location code (e.g. 2840 for the United States).
    pub code: u32,
    /// Human-readable location name.
    pub name: String,
}

/// Device the SERP is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Desktop,
    Mobile,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Desktop => "desktop",
            Device::Mobile => "mobile",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "desktop" => Ok(Device::Desktop),
            "mobile" => Ok(Device::Mobile),
            other => Err(format!("unknown device '{}'", other)),
        }
    }
}

/// Language/device/OS filter triple applied to every keyword of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    pub language: String,
    #[serde(default)]
    pub device: Device,
    pub os: String,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            device: Device::Desktop,
            os: "windows".to_string(),
        }
    }
}

/// Rank cache key: (domain, keyword, location, language, device, os).
///
/// Domain and keyword are kept in their normalized form so that
/// `www.Example.com` / `example.com` and `Shoes` / `shoes` share entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupKey {
    pub domain_key: String,
    pub keyword_key: String,
    pub location_code: u32,
    pub language: String,
    pub device: Device,
    pub os: String,
}

impl LookupKey {
    pub fn new(domain: &str, keyword: &str, location_code: u32, filters: &SearchFilters) -> Self {
        Self {
            domain_key: normalize_domain(domain),
            keyword_key: normalize_keyword(keyword),
            location_code,
            language: filters.language.to_ascii_lowercase(),
            device: filters.device,
            os: filters.os.to_ascii_lowercase(),
        }
    }
}

/// Case-insensitive keyword identity with whitespace collapsed.
pub fn normalize_keyword(keyword: &str) -> String {
    keyword
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
