//! Lazy, single-pass paging over query results.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use recast_core::StorageBackend;

use crate::error::Result;
use crate::service::QueryService;

/// One result row keyed by column name. Null values are `None`.
pub type Row = BTreeMap<String, Option<String>>;

/// Pager over the rows of one execution.
///
/// Pages are fetched on demand. The header row the service sends at the top
/// of the first page is never yielded. When `delete_output` is set, the
/// query's output object is deleted once the pager is exhausted, either by
/// running out of rows or by reaching `max_rows`.
pub struct QueryResults {
    service: Arc<dyn QueryService>,
    storage: Arc<dyn StorageBackend>,
    execution_id: String,
    max_rows: Option<usize>,
    delete_output: bool,
    column_names: Vec<String>,
    buffer: VecDeque<Vec<Option<String>>>,
    next_token: Option<String>,
    started: bool,
    exhausted: bool,
    yielded: usize,
}

impl std::fmt::Debug for QueryResults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryResults")
            .field("execution_id", &self.execution_id)
            .field("max_rows", &self.max_rows)
            .field("yielded", &self.yielded)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

impl QueryResults {
    /// Creates a pager. Nothing is fetched until the first call to
    /// [`next_row`](Self::next_row).
    #[must_use]
    pub fn new(
        service: Arc<dyn QueryService>,
        storage: Arc<dyn StorageBackend>,
        execution_id: impl Into<String>,
        max_rows: Option<usize>,
        delete_output: bool,
    ) -> Self {
        Self {
            service,
            storage,
            execution_id: execution_id.into(),
            max_rows,
            delete_output,
            column_names: Vec::new(),
            buffer: VecDeque::new(),
            next_token: None,
            started: false,
            exhausted: false,
            yielded: 0,
        }
    }

    /// Column names of the result set, known after the first fetch.
    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Returns the next row, or `None` once the results are exhausted.
    pub async fn next_row(&mut self) -> Result<Option<Row>> {
        loop {
            if self.exhausted {
                return Ok(None);
            }
            if self.max_rows.is_some_and(|max| self.yielded >= max) {
                self.finish().await?;
                return Ok(None);
            }
            if let Some(values) = self.buffer.pop_front() {
                self.yielded += 1;
                return Ok(Some(self.to_row(values)));
            }
            if self.started && self.next_token.is_none() {
                self.finish().await?;
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }

    /// Reads every remaining row.
    pub async fn collect(mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn fetch_page(&mut self) -> Result<()> {
        let page = self
            .service
            .get_query_results(&self.execution_id, self.next_token.as_deref())
            .await?;

        let mut rows: VecDeque<_> = page.rows.into();
        if !self.started {
            self.column_names = page.column_names;
            if rows.front().is_some_and(|first| self.is_header(first)) {
                rows.pop_front();
            }
            self.started = true;
        }
        self.next_token = page.next_token;
        self.buffer.extend(rows);
        Ok(())
    }

    fn is_header(&self, row: &[Option<String>]) -> bool {
        row.len() == self.column_names.len()
            && row
                .iter()
                .zip(&self.column_names)
                .all(|(value, name)| value.as_deref() == Some(name.as_str()))
    }

    fn to_row(&self, values: Vec<Option<String>>) -> Row {
        self.column_names.iter().cloned().zip(values).collect()
    }

    async fn finish(&mut self) -> Result<()> {
        self.exhausted = true;
        self.buffer.clear();
        if !self.delete_output {
            return Ok(());
        }
        let execution = self.service.get_query_execution(&self.execution_id).await?;
        if let Some(location) = execution.result_location {
            self.storage.delete_prefix(&location).await?;
            tracing::debug!(execution_id = %self.execution_id, %location, "deleted query output");
        }
        Ok(())
    }
}
