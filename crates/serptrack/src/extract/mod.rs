//! Result Extractor: raw SERP payload → normalized `RankingRecord`.

pub mod domain;
pub mod extractor;

pub use domain::{host_of, normalize_domain, DomainMatch};
pub use extractor::{Extraction, Extractor, DEFAULT_COMPETITOR_LIMIT};
