//! Polling query executions to completion.
//!
//! Both waits share one schedule: the delay before the next poll starts at
//! one `step` and grows by one `step` per pending poll up to `max_delay`.
//! Each wait call starts its own schedule. Before every sleep the waiter
//! checks whether the sleep would push the total time slept past the
//! deadline; if so it fails with [`QueryError::Timeout`] without sleeping.
//! The remote queries are left running.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use recast_core::observability::query_span;
use recast_core::retry::{Backoff, Schedule};

use crate::error::{QueryError, Result};
use crate::execution::QueryExecution;
use crate::service::QueryService;

/// Default cap on the delay between polls.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default delay increment per poll.
pub const DEFAULT_STEP: Duration = Duration::from_secs(1);

/// Polling configuration for one wait call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Upper bound on the total time slept, if any.
    pub deadline: Option<Duration>,
    /// Delay increment per pending poll.
    pub step: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            max_delay: DEFAULT_MAX_DELAY,
            deadline: None,
            step: DEFAULT_STEP,
        }
    }
}

impl WaitOptions {
    /// Sets the delay cap.
    #[must_use]
    pub const fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Sets the total sleep deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets the delay increment.
    #[must_use]
    pub const fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    /// The backoff schedule these options describe.
    #[must_use]
    pub const fn backoff(&self) -> Backoff {
        Backoff::LinearCapped {
            step: self.step,
            max: self.max_delay,
        }
    }
}

/// Sleep bookkeeping for one wait call.
struct Snooze {
    schedule: Schedule,
    deadline: Option<Duration>,
    slept: Duration,
}

impl Snooze {
    fn new(options: &WaitOptions) -> Self {
        Self {
            schedule: options.backoff().schedule(),
            deadline: options.deadline,
            slept: Duration::ZERO,
        }
    }

    async fn sleep<F>(&mut self, pending: F) -> Result<()>
    where
        F: FnOnce() -> Vec<String>,
    {
        let delay = self.schedule.next().unwrap_or_default();
        if let Some(deadline) = self.deadline {
            if self.slept + delay > deadline {
                return Err(QueryError::Timeout {
                    waited: self.slept,
                    pending: pending(),
                });
            }
        }
        tokio::time::sleep(delay).await;
        self.slept += delay;
        Ok(())
    }
}

/// Waits for query executions to reach a terminal state.
#[derive(Clone)]
pub struct QueryWaiter {
    service: Arc<dyn QueryService>,
}

impl std::fmt::Debug for QueryWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryWaiter").finish_non_exhaustive()
    }
}

impl QueryWaiter {
    /// Creates a waiter over the given service.
    #[must_use]
    pub fn new(service: Arc<dyn QueryService>) -> Self {
        Self { service }
    }

    /// Polls one execution until it is terminal.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Timeout`] if the deadline would be exceeded, or
    /// any error from the status lookup.
    pub async fn wait_for(&self, execution_id: &str, options: &WaitOptions) -> Result<QueryExecution> {
        self.wait_for_inner(execution_id, options)
            .instrument(query_span("wait_for", execution_id))
            .await
    }

    async fn wait_for_inner(&self, execution_id: &str, options: &WaitOptions) -> Result<QueryExecution> {
        let mut snooze = Snooze::new(options);
        loop {
            let execution = self.service.get_query_execution(execution_id).await?;
            if execution.is_terminal() {
                tracing::info!(state = %execution.state, slept = ?snooze.slept, "query is done");
                return Ok(execution);
            }
            snooze.sleep(|| vec![execution_id.to_string()]).await?;
        }
    }

    /// Polls many executions until all are terminal, with one batched lookup
    /// per round.
    ///
    /// Ids the service reports as unprocessed are recorded as `FAILED` with
    /// the service's message as the reason. Ids the lookup neither returns nor
    /// reports stay pending.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Timeout`] if the deadline would be exceeded, or
    /// any error from the batched lookup.
    pub async fn wait_for_all(
        &self,
        execution_ids: &[String],
        options: &WaitOptions,
    ) -> Result<BTreeMap<String, QueryExecution>> {
        let mut pending: BTreeSet<String> = execution_ids.iter().cloned().collect();
        let mut done = BTreeMap::new();
        let mut snooze = Snooze::new(options);

        while !pending.is_empty() {
            let ids: Vec<String> = pending.iter().cloned().collect();
            let batch = self.service.batch_get_query_execution(&ids).await?;

            for execution in batch.found {
                if execution.is_terminal() && pending.remove(&execution.id) {
                    done.insert(execution.id.clone(), execution);
                }
            }
            for unprocessed in batch.unprocessed {
                if pending.remove(&unprocessed.id) {
                    tracing::warn!(
                        execution_id = %unprocessed.id,
                        error_code = ?unprocessed.error_code,
                        error_message = ?unprocessed.error_message,
                        "query execution could not be processed; treating as failed"
                    );
                    let execution = QueryExecution::unprocessed(unprocessed.id, unprocessed.error_message);
                    done.insert(execution.id.clone(), execution);
                }
            }

            if !pending.is_empty() {
                snooze.sleep(|| pending.iter().cloned().collect()).await?;
            }
        }

        tracing::info!(count = done.len(), slept = ?snooze.slept, "batch queries are done");
        Ok(done)
    }
}
