//! Shared test utilities for reposync integration tests.
//!
//! This module provides:
//! - `SyncHarness`, an in-memory remote plus local folder wired together
//! - Builders for remote repositories and local folder selections

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::SyncHarness;
