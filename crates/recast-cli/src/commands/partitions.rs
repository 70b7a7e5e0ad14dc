//! Partition commands - list and repair partitions through the query engine.

use anyhow::{Context as _, Result};
use clap::Args;

use crate::{Context, OutputFormat};

/// Arguments for the show-partitions command.
#[derive(Debug, Args)]
pub struct ShowPartitionsArgs {
    /// Database name.
    pub database: String,

    /// Table name.
    pub table: String,
}

/// Arguments for the repair-partitions command.
#[derive(Debug, Args)]
pub struct RepairPartitionsArgs {
    /// Database name.
    pub database: String,

    /// Table name.
    pub table: String,
}

/// Execute the show-partitions command.
///
/// # Errors
///
/// Returns an error if no output destination is configured or the query
/// fails.
pub async fn show(args: ShowPartitionsArgs, ctx: &Context) -> Result<()> {
    let partitions = ctx
        .query
        .show_partitions(&args.database, &args.table, &ctx.destination())
        .await
        .with_context(|| format!("Failed to list partitions of {}.{}", args.database, args.table))?;

    match ctx.settings.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&partitions)?),
        OutputFormat::Text => {
            if partitions.is_empty() {
                println!("No partitions found");
            }
            for partition in &partitions {
                println!("{partition}");
            }
        }
        OutputFormat::Table => {
            use tabled::{Table, Tabled};

            #[derive(Tabled)]
            struct Row {
                #[tabled(rename = "Partition")]
                partition: String,
            }

            let rows: Vec<Row> = partitions.into_iter().map(|partition| Row { partition }).collect();
            if rows.is_empty() {
                println!("No partitions found");
            } else {
                println!("{}", Table::new(rows));
            }
        }
    }
    Ok(())
}

/// Execute the repair-partitions command.
///
/// # Errors
///
/// Returns an error if no output destination is configured or the query
/// fails.
pub async fn repair(args: RepairPartitionsArgs, ctx: &Context) -> Result<()> {
    let execution = ctx
        .query
        .repair_partitions(&args.database, &args.table, &ctx.destination())
        .await
        .with_context(|| format!("Failed to repair partitions of {}.{}", args.database, args.table))?;

    match ctx.settings.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&execution)?),
        OutputFormat::Text | OutputFormat::Table => {
            println!(
                "Repaired partitions of {}.{} (query {})",
                args.database, args.table, execution.id
            );
        }
    }
    Ok(())
}
