//! Convert-database command - convert every table of a database.

use anyhow::{Context as _, Result};
use clap::Args;
use owo_colors::OwoColorize;
use serde::Serialize;

use recast_convert::{BatchReport, ConvertOptions, Converter, DatabaseConversion, FailurePolicy};
use recast_core::StorageFormat;

use super::{format_bytes, parse_storage_format};
use crate::{Context, OutputFormat};

/// Arguments for the convert-database command.
#[derive(Debug, Args)]
pub struct ConvertDatabaseArgs {
    /// Database whose tables are converted.
    pub source_database: String,

    /// Database receiving the converted tables.
    pub target_database: String,

    /// Target storage format (csv, json, parquet).
    #[arg(long, default_value = "parquet", value_parser = parse_storage_format)]
    pub target_format: StorageFormat,

    /// Root URI under which converted tables are written.
    #[arg(long)]
    pub target_uri: String,

    /// Tables converted at once (overrides the config).
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Report the first failure instead of the last.
    #[arg(long)]
    pub first_error: bool,
}

#[derive(Debug, Serialize)]
struct TableReport<'a> {
    table: &'a str,
    converted: bool,
    bytes_scanned: Option<u64>,
    error: Option<String>,
}

/// Execute the convert-database command.
///
/// # Errors
///
/// Returns an error if the database cannot be listed or any table failed.
pub async fn execute(args: ConvertDatabaseArgs, ctx: &Context) -> Result<()> {
    let config = &ctx.settings.convert;
    let mut options = ConvertOptions::from_config(config, args.target_format, &args.target_uri);
    if let Some(max_concurrent) = args.max_concurrent {
        options = options.with_max_concurrent(max_concurrent);
    }
    if args.first_error {
        options = options.with_failure_policy(FailurePolicy::FirstErrorWins);
    }
    let policy = options.failure_policy;

    let conversion = DatabaseConversion::new(&args.source_database, &args.target_database).with_config(config);
    let converter = Converter::new(ctx.catalog.clone(), ctx.query.clone(), options);
    let report = converter
        .convert_database_report(&conversion)
        .await
        .with_context(|| format!("Failed to convert database {}", args.source_database))?;

    print_report(&report, &ctx.settings.format)?;

    let failed = report.failed_tables().len();
    let total = report.outcomes.len();
    report
        .into_result(policy)
        .with_context(|| format!("{failed} of {total} tables failed to convert"))?;
    Ok(())
}

fn print_report(report: &BatchReport, format: &OutputFormat) -> Result<()> {
    let rows: Vec<TableReport<'_>> = report
        .outcomes
        .iter()
        .map(|outcome| TableReport {
            table: &outcome.table,
            converted: outcome.is_success(),
            bytes_scanned: outcome.result.as_ref().ok().copied(),
            error: outcome.result.as_ref().err().map(ToString::to_string),
        })
        .collect();

    match format {
        OutputFormat::Json => {
            let document = serde_json::json!({
                "summary": report.summary(),
                "tables": rows,
            });
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
        OutputFormat::Text => {
            for row in &rows {
                match &row.error {
                    None => println!(
                        "  {} {} ({} scanned)",
                        "✓".green(),
                        row.table,
                        format_bytes(row.bytes_scanned.unwrap_or(0))
                    ),
                    Some(error) => println!("  {} {}: {}", "✗".red(), row.table, error),
                }
            }
            let summary = report.summary();
            println!();
            println!(
                "Converted {}/{} tables into {} ({} scanned, cost {:.4})",
                summary.tables_converted,
                rows.len(),
                summary.target_database,
                format_bytes(summary.bytes_scanned),
                summary.cost
            );
        }
        OutputFormat::Table => {
            use tabled::{Table, Tabled};

            #[derive(Tabled)]
            struct Row {
                #[tabled(rename = "Table")]
                table: String,
                #[tabled(rename = "Status")]
                status: String,
                #[tabled(rename = "Scanned")]
                scanned: String,
            }

            let table_rows: Vec<Row> = rows
                .iter()
                .map(|row| Row {
                    table: row.table.to_string(),
                    status: if row.converted { "converted" } else { "failed" }.to_string(),
                    scanned: row.bytes_scanned.map(format_bytes).unwrap_or_default(),
                })
                .collect();

            if table_rows.is_empty() {
                println!("No tables found");
            } else {
                println!("{}", Table::new(table_rows));
            }
        }
    }
    Ok(())
}
