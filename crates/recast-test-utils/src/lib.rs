//! Shared test utilities for recast integration tests.
//!
//! This crate provides:
//! - [`TracingMemoryBackend`]: In-memory storage with operation recording and
//!   failure injection
//! - [`CtasSimulator`]: A query engine stand-in that materializes CTAS
//!   statements into the in-memory catalog and store
//! - [`TestLake`]: Pre-wired catalog, storage and query service
//! - Custom assertion helpers
//!
//! # Example
//!
//! ```rust,ignore
//! use recast_test_utils::TestLake;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let lake = TestLake::new();
//!     lake.seed_table("events", &[("id", "int"), ("dt", "string")], &["dt"], &[&["2024-01-01"]]);
//!     // ... run a conversion ...
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod assertions;
pub mod fixtures;
pub mod services;
pub mod storage;

pub use assertions::*;
pub use fixtures::*;
pub use services::*;
pub use storage::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("recast=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
