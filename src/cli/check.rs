//! `oic check` command implementation

use super::resolve::SourceArgs;
use crate::bundle::ArchiveTool;
use crate::config::{BundleConfig, DEFAULT_CONTAINER_TOOL};
use crate::log::RunLog;
use crate::tool::probe;
use clap::Args;

/// Arguments for the `check` command
#[derive(Args)]
pub struct CheckArgs {
    /// Container CLI used for pull, save and login
    #[arg(long, env = "OIC_CONTAINER_TOOL", default_value = DEFAULT_CONTAINER_TOOL)]
    pub container_tool: String,

    /// Program that builds the bundle
    #[arg(long, value_enum, default_value_t = ArchiveTool::Tar)]
    pub archive_tool: ArchiveTool,

    #[command(flatten)]
    pub source: SourceArgs,
}

/// Execute the `check` command
pub async fn execute(args: CheckArgs) -> anyhow::Result<()> {
    let config = BundleConfig {
        container_tool: args.container_tool,
        archive_tool: args.archive_tool,
        manifest: args.source.location(),
        ..Default::default()
    };

    let log = RunLog::in_memory();
    let report = probe::check(&config.required_tools(), &log).await;

    println!("{:<15} {:<10}", "TOOL", "STATUS");
    for tool in &report.available {
        println!("{:<15} {:<10}", tool, "found");
    }
    for tool in &report.missing {
        println!("{:<15} {:<10}", tool, "missing");
    }

    report.require()?;
    Ok(())
}
