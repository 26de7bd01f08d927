//! Typed ledgers over the repositories.
//!
//! The ledgers own the `Database` handle and speak in model types; the
//! repositories below them speak in rows and SQL. Every state change is
//! delegated to a conditional repository call, so a ledger method that
//! returns `false` means "someone else already moved this record".

pub mod convert;
pub mod job_ledger;
pub mod rank_cache;
pub mod task_ledger;

pub use crate::db::job_repo::{JobFilter, ProgressOutcome};
pub use job_ledger::JobLedger;
pub use rank_cache::{RankCache, DEFAULT_CACHE_TTL_DAYS};
pub use task_ledger::{Resolution, TaskLedger};
