//! Copy-table command - copy a table definition, files and partitions.

use anyhow::{Context as _, Result};
use clap::Args;

use recast_catalog::CopyTableRequest;
use recast_core::StorageFormat;

use super::parse_storage_format;
use crate::{Context, OutputFormat};

/// Arguments for the copy-table command.
#[derive(Debug, Args)]
pub struct CopyTableArgs {
    /// Database holding the source table.
    pub source_database: String,

    /// Database receiving the copy.
    pub target_database: String,

    /// Source table.
    pub source_table: String,

    /// Target table name (defaults to the source table name).
    pub target_table: Option<String>,

    /// Storage location of the copy.
    #[arg(long)]
    pub target_location: String,

    /// Storage format of the copy (csv, json, parquet).
    #[arg(long, default_value = "parquet", value_parser = parse_storage_format)]
    pub target_format: StorageFormat,

    /// Partition key columns of the copy, comma separated.
    #[arg(long, value_delimiter = ',')]
    pub partition_by: Vec<String>,

    /// Do not copy partition metadata.
    #[arg(long)]
    pub skip_partitions: bool,

    /// Do not copy data files.
    #[arg(long)]
    pub skip_files: bool,
}

/// Execute the copy-table command.
///
/// # Errors
///
/// Returns an error if the source table is missing or the copy fails.
pub async fn execute(args: CopyTableArgs, ctx: &Context) -> Result<()> {
    let target_table = args.target_table.unwrap_or_else(|| args.source_table.clone());
    let request = CopyTableRequest::new(
        &args.source_database,
        &args.target_database,
        &args.source_table,
        &target_table,
        &args.target_location,
        args.target_format,
    )
    .with_partition_columns(args.partition_by)
    .copy_partitions(!args.skip_partitions)
    .copy_files(!args.skip_files);

    let changed = ctx.catalog.copy_table(&request).await.with_context(|| {
        format!(
            "Failed to copy {}.{} to {}.{}",
            args.source_database, args.source_table, args.target_database, target_table
        )
    })?;

    match ctx.settings.format {
        OutputFormat::Json => {
            let document = serde_json::json!({
                "table": format!("{}.{}", args.target_database, target_table),
                "changed": changed,
            });
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
        OutputFormat::Text | OutputFormat::Table => {
            let verb = if changed { "Copied" } else { "Already up to date:" };
            println!("{verb} {}.{}", args.target_database, target_table);
        }
    }
    Ok(())
}
