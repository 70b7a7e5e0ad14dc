//! Convert-table command - convert one table.

use anyhow::{Context as _, Result};
use clap::Args;
use owo_colors::OwoColorize;

use recast_convert::{ConvertOptions, Converter, TableConversion};
use recast_core::StorageFormat;
use recast_query::scan_cost;

use super::{format_bytes, parse_storage_format};
use crate::{Context, OutputFormat};

/// Arguments for the convert-table command.
#[derive(Debug, Args)]
pub struct ConvertTableArgs {
    /// Database holding the source table.
    pub source_database: String,

    /// Database receiving the converted table.
    pub target_database: String,

    /// Table to convert.
    pub table: String,

    /// Target storage format (csv, json, parquet).
    #[arg(long, default_value = "parquet", value_parser = parse_storage_format)]
    pub target_format: StorageFormat,

    /// Root URI under which the converted table is written.
    #[arg(long)]
    pub target_uri: String,

    /// Partition columns, comma separated (overrides the config).
    #[arg(long, value_delimiter = ',')]
    pub partition_by: Vec<String>,

    /// Bucket columns, comma separated.
    #[arg(long, value_delimiter = ',')]
    pub bucket_by: Vec<String>,

    /// Number of buckets, required with --bucket-by.
    #[arg(long)]
    pub bucket_count: Option<u32>,
}

/// Execute the convert-table command.
///
/// # Errors
///
/// Returns an error if the conversion fails.
pub async fn execute(args: ConvertTableArgs, ctx: &Context) -> Result<()> {
    let config = &ctx.settings.convert;
    let options = ConvertOptions::from_config(config, args.target_format, &args.target_uri);

    let mut conversion = TableConversion::new(&args.source_database, &args.target_database, &args.table)
        .with_config(config.table(&args.table));
    if !args.partition_by.is_empty() {
        conversion = conversion.with_partition_columns(Some(args.partition_by));
    }
    if !args.bucket_by.is_empty() {
        conversion = conversion.with_bucketing(args.bucket_by, args.bucket_count);
    }

    let bytes_scanned = Converter::new(ctx.catalog.clone(), ctx.query.clone(), options)
        .convert_table(&conversion)
        .await
        .with_context(|| format!("Failed to convert {}.{}", args.source_database, args.table))?;

    match ctx.settings.format {
        OutputFormat::Json => {
            let document = serde_json::json!({
                "table": format!("{}.{}", args.target_database, args.table),
                "bytes_scanned": bytes_scanned,
                "cost": scan_cost(bytes_scanned),
            });
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
        OutputFormat::Text | OutputFormat::Table => {
            println!(
                "{} Converted {}.{} to {} ({} scanned)",
                "✓".green(),
                args.target_database,
                args.table,
                args.target_format,
                format_bytes(bytes_scanned)
            );
        }
    }
    Ok(())
}
