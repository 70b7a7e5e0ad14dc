//! Conversion configuration.
//!
//! A [`ConvertConfig`] is read from JSON and then overridden from the
//! environment:
//!
//! ```json
//! {
//!   "tables": {
//!     "events": { "partition_by": ["dt"], "bucket_by": ["user_id"], "bucket_count": 8 }
//!   },
//!   "default_partition_by": ["dt"],
//!   "workgroup": "etl"
//! }
//! ```
//!
//! Environment overrides:
//!
//! - `RECAST_QUERY_RESULT_LOCATION`
//! - `RECAST_WORKGROUP`
//! - `RECAST_MAX_CONCURRENT` (positive integer)
//! - `RECAST_MAX_POLL_DELAY_SECS` (positive integer)
//! - `RECAST_WAIT_DEADLINE_SECS` (positive integer)

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use recast_query::{QueryDestination, WaitOptions};

use crate::error::{ConvertError, Result};

/// Default bound on concurrently converted tables.
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Default cap on the delay between status polls, in seconds.
pub const DEFAULT_MAX_POLL_DELAY_SECS: u64 = 30;

const ENV_QUERY_RESULT_LOCATION: &str = "RECAST_QUERY_RESULT_LOCATION";
const ENV_WORKGROUP: &str = "RECAST_WORKGROUP";
const ENV_MAX_CONCURRENT: &str = "RECAST_MAX_CONCURRENT";
const ENV_MAX_POLL_DELAY_SECS: &str = "RECAST_MAX_POLL_DELAY_SECS";
const ENV_WAIT_DEADLINE_SECS: &str = "RECAST_WAIT_DEADLINE_SECS";

/// Per-table conversion settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TableConfig {
    /// Partition columns; overrides the database default when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_by: Option<Vec<String>>,
    /// Bucket columns.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bucket_by: Vec<String>,
    /// Bucket count, required with `bucket_by`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_count: Option<u32>,
}

/// Settings of one database conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConvertConfig {
    /// Per-table settings by table name.
    pub tables: BTreeMap<String, TableConfig>,
    /// Partition columns for tables without their own.
    pub default_partition_by: Option<Vec<String>>,
    /// Query output location.
    pub query_result_location: Option<String>,
    /// Query workgroup.
    pub workgroup: Option<String>,
    /// Bound on concurrently converted tables.
    pub max_concurrent: usize,
    /// Cap on the delay between status polls, in seconds.
    pub max_poll_delay_secs: u64,
    /// Limit on the total time one wait may sleep, in seconds.
    pub wait_deadline_secs: Option<u64>,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            tables: BTreeMap::new(),
            default_partition_by: None,
            query_result_location: None,
            workgroup: None,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_poll_delay_secs: DEFAULT_MAX_POLL_DELAY_SECS,
            wait_deadline_secs: None,
        }
    }
}

impl ConvertConfig {
    /// Parses a JSON document.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed JSON or invalid values.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| ConvertError::configuration(format!("invalid conversion config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ConvertError::configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    /// Applies overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a numeric variable is present but
    /// not a positive integer.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Applies overrides from a custom environment source.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a numeric variable is present but
    /// not a positive integer.
    pub fn apply_env_with<F>(mut self, get_env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| get_env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(location) = get(ENV_QUERY_RESULT_LOCATION) {
            self.query_result_location = Some(location);
        }
        if let Some(workgroup) = get(ENV_WORKGROUP) {
            self.workgroup = Some(workgroup);
        }
        if let Some(raw) = get(ENV_MAX_CONCURRENT) {
            let value = parse_positive(ENV_MAX_CONCURRENT, &raw)?;
            self.max_concurrent = usize::try_from(value).map_err(|_| {
                ConvertError::configuration(format!("{ENV_MAX_CONCURRENT} value {value} exceeds supported range"))
            })?;
        }
        if let Some(raw) = get(ENV_MAX_POLL_DELAY_SECS) {
            self.max_poll_delay_secs = parse_positive(ENV_MAX_POLL_DELAY_SECS, &raw)?;
        }
        if let Some(raw) = get(ENV_WAIT_DEADLINE_SECS) {
            self.wait_deadline_secs = Some(parse_positive(ENV_WAIT_DEADLINE_SECS, &raw)?);
        }

        self.validate()?;
        Ok(self)
    }

    /// Checks value ranges and bucketing settings.
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(ConvertError::configuration("max_concurrent must be positive"));
        }
        if self.max_poll_delay_secs == 0 {
            return Err(ConvertError::configuration("max_poll_delay_secs must be positive"));
        }
        if self.wait_deadline_secs == Some(0) {
            return Err(ConvertError::configuration(
                "wait_deadline_secs must be positive; omit it to wait without a deadline",
            ));
        }
        for (name, table) in &self.tables {
            if !table.bucket_by.is_empty() && table.bucket_count.is_none() {
                return Err(ConvertError::configuration(format!(
                    "table {name}: bucket_count is required when bucket_by is given"
                )));
            }
        }
        Ok(())
    }

    /// Settings for `table`, with the database default partitioning applied.
    #[must_use]
    pub fn table(&self, table: &str) -> TableConfig {
        let mut config = self.tables.get(table).cloned().unwrap_or_default();
        if config.partition_by.is_none() {
            config.partition_by.clone_from(&self.default_partition_by);
        }
        config
    }

    /// Query output destination.
    #[must_use]
    pub fn destination(&self) -> QueryDestination {
        QueryDestination::new(self.query_result_location.clone(), self.workgroup.clone())
    }

    /// Polling options for conversion queries.
    #[must_use]
    pub fn wait_options(&self) -> WaitOptions {
        let options = WaitOptions::default().with_max_delay(Duration::from_secs(self.max_poll_delay_secs));
        match self.wait_deadline_secs {
            Some(secs) => options.with_deadline(Duration::from_secs(secs)),
            None => options,
        }
    }
}

fn parse_positive(key: &str, raw: &str) -> Result<u64> {
    match raw.parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConvertError::configuration(format!(
            "{key} must be a positive integer, got '{raw}'"
        ))),
    }
}
