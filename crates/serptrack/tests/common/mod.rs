//! Shared test utilities for serptrack integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring an `Engine` to a `MemoryGateway` over a temp database
//! - Builders for job requests and SERP payloads

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
