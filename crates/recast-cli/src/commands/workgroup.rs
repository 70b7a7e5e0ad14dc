//! Ensure-workgroup command - create a query workgroup if missing.

use anyhow::{Context as _, Result};
use clap::Args;

use crate::{Context, OutputFormat};

/// Arguments for the ensure-workgroup command.
#[derive(Debug, Args)]
pub struct EnsureWorkgroupArgs {
    /// Workgroup name.
    pub name: String,

    /// Default query output location of the workgroup.
    #[arg(long)]
    pub output_location: String,

    /// Description (defaults to the name).
    #[arg(long)]
    pub description: Option<String>,
}

/// Execute the ensure-workgroup command.
///
/// # Errors
///
/// Returns an error if the workgroup is missing or disabled afterwards.
pub async fn execute(args: EnsureWorkgroupArgs, ctx: &Context) -> Result<()> {
    let created = ctx
        .query
        .ensure_workgroup(&args.name, &args.output_location, args.description)
        .await
        .with_context(|| format!("Failed to ensure workgroup {}", args.name))?;

    match ctx.settings.format {
        OutputFormat::Json => {
            let document = serde_json::json!({ "workgroup": args.name, "created": created });
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
        OutputFormat::Text | OutputFormat::Table => {
            if created {
                println!("Created workgroup {}", args.name);
            } else {
                println!("Workgroup {} already exists", args.name);
            }
        }
    }
    Ok(())
}
