//! # recast-query
//!
//! Client side of the external distributed query service.
//!
//! - **Service boundary**: [`QueryService`], one method per remote call, with
//!   an in-memory scripted implementation for tests
//! - **Executions**: [`QueryExecution`] and its state machine
//! - **Client**: [`QueryClient`] submits statements, reads status and pages
//!   through results
//! - **Waiter**: [`QueryWaiter`] polls one or many executions to a terminal
//!   state with capped linear backoff and an optional deadline
//!
//! A wait deadline only stops the waiting. The remote query keeps running
//! until it finishes or [`QueryClient::cancel`] is called.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod error;
pub mod execution;
pub mod memory;
pub mod results;
pub mod service;
pub mod waiter;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::client::QueryClient;
    pub use crate::error::{QueryError, Result};
    pub use crate::execution::{QueryExecution, QueryState};
    pub use crate::service::{QueryDestination, QueryService};
    pub use crate::waiter::{QueryWaiter, WaitOptions};
}

pub use client::QueryClient;
pub use error::{QueryError, Result};
pub use execution::{scan_cost, QueryExecution, QueryState, QueryStatistics, COST_PER_TIB};
pub use memory::{InMemoryQueryService, ScriptedOutcome};
pub use results::{QueryResults, Row};
pub use service::{
    BatchExecutions, QueryDestination, QueryService, ResultPage, StartQueryRequest, UnprocessedExecution, WorkGroup,
    WorkGroupConfig, WorkGroupState,
};
pub use waiter::{QueryWaiter, WaitOptions};
