//! Strongly typed domain values shared by the ledgers and orchestrators.

pub mod filters;
pub mod job;
pub mod ranking;
pub mod task;

pub use filters::{normalize_keyword, Device, Location, LookupKey, SearchFilters};
pub use job::{Job, JobStatus, Progress};
pub use ranking::{Competitor, RankingRecord, SerpMetadata};
pub use task::{Task, TaskStatus};
