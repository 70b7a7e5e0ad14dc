//! recast CLI - command-line interface for conversions.
//!
//! The main entry point for the `recast` CLI binary.

use anyhow::Result;
use clap::Parser;

use recast_cli::commands::{convert_database, convert_table, copy_table, partitions, workgroup};
use recast_cli::{Cli, Commands, Context};
use recast_core::{LogFormat, init_logging};

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    init_logging(if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    });
    recast_convert::metrics::register_metrics();

    let settings = cli.settings()?;

    // Create runtime and execute
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let ctx = Context::from_aws(settings).await;
        match cli.command {
            Commands::ConvertDatabase(args) => convert_database::execute(args, &ctx).await,
            Commands::ConvertTable(args) => convert_table::execute(args, &ctx).await,
            Commands::ShowPartitions(args) => partitions::show(args, &ctx).await,
            Commands::RepairPartitions(args) => partitions::repair(args, &ctx).await,
            Commands::CopyTable(args) => copy_table::execute(args, &ctx).await,
            Commands::EnsureWorkgroup(args) => workgroup::execute(args, &ctx).await,
        }
    })
}
