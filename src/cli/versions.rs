//! `oic versions` command implementation

use crate::catalog::Version;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the `versions` command
#[derive(Args)]
pub struct VersionsArgs {
    /// Version catalog document (YAML or JSON); built-in version table when omitted
    #[arg(long, env = "OIC_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Versions per row
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u16).range(1..))]
    pub columns: u16,

    /// One version per line, no header
    #[arg(short, long)]
    pub quiet: bool,
}

/// Execute the `versions` command
pub async fn execute(args: VersionsArgs) -> anyhow::Result<()> {
    let catalog = super::load_catalog(args.catalog.as_deref())?;

    if args.quiet {
        for version in catalog.versions() {
            println!("{}", version);
        }
        return Ok(());
    }

    println!("Available versions:");
    for row in catalog.display_rows(args.columns as usize) {
        println!("{}", format_row(&row));
    }
    Ok(())
}

fn format_row(row: &[Version]) -> String {
    row.iter()
        .map(|v| format!("{:<15}", v.to_string()))
        .collect::<String>()
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_row_pads_columns() {
        let row = vec![
            Version::parse("2024.7.0").unwrap(),
            Version::parse("2024.4.1").unwrap(),
        ];
        assert_eq!(format_row(&row), "2024.7.0       2024.4.1");
    }
}
