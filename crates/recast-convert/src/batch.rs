//! Per-table outcomes of a database conversion and how they aggregate.

use serde::Serialize;

use recast_query::scan_cost;

use crate::error::{ConvertError, Result};

/// Result of converting one table: bytes scanned, or the failure.
#[derive(Debug)]
pub struct TableOutcome {
    /// Table name.
    pub table: String,
    /// Bytes scanned by the conversion query, or why it failed.
    pub result: Result<u64>,
}

impl TableOutcome {
    /// Whether the table converted.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Which failure a batch with failures surfaces.
///
/// Every failure is logged as it completes regardless of the policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// The failure that completed last.
    #[default]
    LastErrorWins,
    /// The failure that completed first.
    FirstErrorWins,
}

/// Totals of a successful database conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseSummary {
    /// Target database.
    pub target_database: String,
    /// Number of tables converted.
    pub tables_converted: usize,
    /// Total bytes scanned by the conversion queries.
    pub bytes_scanned: u64,
    /// Informational query cost of the scanned bytes.
    pub cost: f64,
}

/// Outcomes of every table in a database conversion, in completion order.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Target database.
    pub target_database: String,
    /// One outcome per table.
    pub outcomes: Vec<TableOutcome>,
}

impl BatchReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new(target_database: impl Into<String>) -> Self {
        Self {
            target_database: target_database.into(),
            outcomes: Vec::new(),
        }
    }

    /// Records one table's outcome.
    pub fn push(&mut self, outcome: TableOutcome) {
        self.outcomes.push(outcome);
    }

    /// Number of tables that converted.
    #[must_use]
    pub fn tables_converted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Names of the tables that failed, in completion order.
    #[must_use]
    pub fn failed_tables(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| o.table.as_str())
            .collect()
    }

    /// Bytes scanned by the tables that converted.
    #[must_use]
    pub fn bytes_scanned(&self) -> u64 {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .sum()
    }

    /// Totals over the tables that converted.
    #[must_use]
    pub fn summary(&self) -> DatabaseSummary {
        let bytes_scanned = self.bytes_scanned();
        DatabaseSummary {
            target_database: self.target_database.clone(),
            tables_converted: self.tables_converted(),
            bytes_scanned,
            cost: scan_cost(bytes_scanned),
        }
    }

    /// Applies `policy`: the summary when every table converted, otherwise
    /// the selected failure.
    ///
    /// # Errors
    ///
    /// Returns the failure `policy` selects if any table failed.
    pub fn into_result(self, policy: FailurePolicy) -> Result<DatabaseSummary> {
        let summary = self.summary();
        let mut failures = self.outcomes.into_iter().filter_map(|o| o.result.err());
        let selected: Option<ConvertError> = match policy {
            FailurePolicy::LastErrorWins => failures.last(),
            FailurePolicy::FirstErrorWins => failures.next(),
        };
        match selected {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> BatchReport {
        let mut report = BatchReport::new("curated");
        report.push(TableOutcome {
            table: "a".into(),
            result: Ok(100),
        });
        report.push(TableOutcome {
            table: "b".into(),
            result: Err(ConvertError::configuration("first")),
        });
        report.push(TableOutcome {
            table: "c".into(),
            result: Ok(50),
        });
        report.push(TableOutcome {
            table: "d".into(),
            result: Err(ConvertError::configuration("second")),
        });
        report
    }

    #[test]
    fn totals_count_only_successes() {
        let report = report();
        assert_eq!(report.tables_converted(), 2);
        assert_eq!(report.bytes_scanned(), 150);
        assert_eq!(report.failed_tables(), vec!["b", "d"]);
    }

    #[test]
    fn last_failure_wins_by_default() {
        let err = report().into_result(FailurePolicy::default()).unwrap_err();
        assert!(err.to_string().contains("second"));
    }

    #[test]
    fn first_failure_can_be_selected() {
        let err = report().into_result(FailurePolicy::FirstErrorWins).unwrap_err();
        assert!(err.to_string().contains("first"));
    }

    #[test]
    fn empty_report_succeeds() {
        let summary = BatchReport::new("curated")
            .into_result(FailurePolicy::LastErrorWins)
            .unwrap();
        assert_eq!(summary.tables_converted, 0);
        assert_eq!(summary.bytes_scanned, 0);
    }
}
