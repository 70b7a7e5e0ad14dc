//! # recast-cli
//!
//! Command-line interface for recast conversions.
//!
//! ## Commands
//!
//! - `recast convert-database` - Convert every table of a database
//! - `recast convert-table` - Convert one table
//! - `recast show-partitions` - List partitions as the query engine sees them
//! - `recast repair-partitions` - Discover partitions from storage
//! - `recast copy-table` - Copy a table definition, files and partitions
//! - `recast ensure-workgroup` - Create a query workgroup if missing
//!
//! ## Configuration
//!
//! Settings come from flags, then environment variables, then an optional
//! JSON config file (`--config`):
//!
//! - `RECAST_QUERY_RESULT_LOCATION` - Query output location
//! - `RECAST_WORKGROUP` - Query workgroup
//! - `RECAST_MAX_CONCURRENT` - Tables converted at once (default: 10)
//! - `RECAST_MAX_POLL_DELAY_SECS` - Cap on the status poll delay (default: 30)
//! - `RECAST_WAIT_DEADLINE_SECS` - Limit on a single query wait
//!
//! AWS region and credentials come from the standard AWS environment.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

pub mod commands;
pub mod context;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};

use recast_convert::ConvertConfig;

pub use context::Context;

/// recast - catalog-driven data lake format conversion.
#[derive(Debug, Parser)]
#[command(name = "recast")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Object storage location for query output.
    #[arg(long, env = "RECAST_QUERY_RESULT_LOCATION", global = true)]
    pub query_result_location: Option<String>,

    /// Query workgroup.
    #[arg(long, env = "RECAST_WORKGROUP", global = true)]
    pub workgroup: Option<String>,

    /// JSON conversion config file.
    #[arg(long, env = "RECAST_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(long, default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Emit JSON logs instead of pretty logs.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Resolves the effective settings: the config file (if any), then
    /// `RECAST_*` variables, then flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or a setting is
    /// invalid.
    pub fn settings(&self) -> Result<Settings> {
        let config = match &self.config {
            Some(path) => ConvertConfig::from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => ConvertConfig::default(),
        };
        let mut config = config.apply_env().context("Invalid RECAST_* environment")?;
        if let Some(location) = &self.query_result_location {
            config.query_result_location = Some(location.clone());
        }
        if let Some(workgroup) = &self.workgroup {
            config.workgroup = Some(workgroup.clone());
        }
        Ok(Settings {
            convert: config,
            format: self.format.clone(),
        })
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Convert every table of a database.
    ConvertDatabase(commands::convert_database::ConvertDatabaseArgs),
    /// Convert one table.
    ConvertTable(commands::convert_table::ConvertTableArgs),
    /// List a table's partitions through the query engine.
    ShowPartitions(commands::partitions::ShowPartitionsArgs),
    /// Discover a table's partitions from storage.
    RepairPartitions(commands::partitions::RepairPartitionsArgs),
    /// Copy a table definition, its files and its partitions.
    CopyTable(commands::copy_table::CopyTableArgs),
    /// Create a query workgroup unless it exists.
    EnsureWorkgroup(commands::workgroup::EnsureWorkgroupArgs),
}

/// Output format.
#[derive(Debug, Clone, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
    /// Table output.
    Table,
}

/// Effective CLI settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Conversion settings.
    pub convert: ConvertConfig,
    /// Output format.
    pub format: OutputFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            convert: ConvertConfig::default(),
            format: OutputFormat::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recast_core::StorageFormat;

    #[test]
    fn convert_database_flags() {
        let cli = Cli::parse_from([
            "recast",
            "--workgroup",
            "etl",
            "--format",
            "json",
            "convert-database",
            "raw",
            "curated",
            "--target-format",
            "parquet",
            "--target-uri",
            "s3://lake/curated/",
            "--max-concurrent",
            "4",
            "--first-error",
        ]);

        assert_eq!(cli.workgroup.as_deref(), Some("etl"));
        assert_eq!(cli.format, OutputFormat::Json);
        let Commands::ConvertDatabase(args) = cli.command else {
            panic!("expected convert-database");
        };
        assert_eq!(args.source_database, "raw");
        assert_eq!(args.target_database, "curated");
        assert_eq!(args.target_format, StorageFormat::Parquet);
        assert_eq!(args.max_concurrent, Some(4));
        assert!(args.first_error);
    }

    #[test]
    fn convert_table_splits_column_lists() {
        let cli = Cli::parse_from([
            "recast",
            "convert-table",
            "raw",
            "curated",
            "events",
            "--target-uri",
            "s3://lake/curated/",
            "--partition-by",
            "dt,region",
            "--bucket-by",
            "id",
            "--bucket-count",
            "8",
        ]);

        let Commands::ConvertTable(args) = cli.command else {
            panic!("expected convert-table");
        };
        assert_eq!(args.partition_by, vec!["dt", "region"]);
        assert_eq!(args.bucket_by, vec!["id"]);
        assert_eq!(args.bucket_count, Some(8));
        assert_eq!(args.target_format, StorageFormat::Parquet);
    }

    #[test]
    fn unknown_storage_formats_are_rejected() {
        let err = Cli::try_parse_from([
            "recast",
            "convert-table",
            "raw",
            "curated",
            "events",
            "--target-uri",
            "s3://lake/curated/",
            "--target-format",
            "avro",
        ])
        .unwrap_err();
        assert!(err.to_string().contains("avro"));
    }

    #[test]
    fn flags_override_the_config_file() {
        let cli = Cli::parse_from([
            "recast",
            "--query-result-location",
            "s3://results/",
            "show-partitions",
            "raw",
            "events",
        ]);
        let settings = cli.settings().unwrap();
        assert_eq!(settings.convert.query_result_location.as_deref(), Some("s3://results/"));
    }
}
