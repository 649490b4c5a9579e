//! Versions command for the zigx CLI.
//!
//! Lists versions from the release indexes that have a build for this
//! platform, grouped by channel and newest first.
//!
//! ## Usage
//!
//! ```bash
//! zigx versions           # Stable releases
//! zigx versions --all     # Including nightly and nominated builds
//! zigx versions --json
//! ```
//!
//! ## Output Format
//!
//! ```text
//! 0.13.0            stable     *
//! 0.12.1            stable
//! 0.14.0-dev.2+abc  nightly    master
//! 2024.10.0-mach    nominated  mach-latest
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use zigx_toolchain::{ReleaseChannel, VersionRecord};

use super::open_context;

#[derive(Args)]
pub struct VersionsArgs {
    /// Include nightly and nominated builds.
    #[clap(long, short = 'a')]
    pub all: bool,

    /// Print JSON.
    #[clap(long, short = 'j')]
    pub json: bool,
}

/// Executes the versions command.
///
/// # Errors
///
/// Returns an error if no release index can be fetched and none is cached.
pub async fn execute(workspace: Option<PathBuf>, args: &VersionsArgs) -> Result<()> {
    let context = open_context(workspace)?;
    let records = context
        .catalog()
        .fetch_versions(&CancellationToken::new())
        .await
        .context("Failed to fetch the release index")?;
    let records: Vec<&VersionRecord> = records
        .iter()
        .filter(|record| args.all || record.channel == ReleaseChannel::Stable)
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No versions available for {}.", context.platform());
        return Ok(());
    }
    for record in records {
        let channel = match record.channel {
            ReleaseChannel::Stable => "stable",
            ReleaseChannel::Nightly => "nightly",
            ReleaseChannel::Nominated => "nominated",
        };
        let label = match (&record.name, record.latest_of_channel) {
            (Some(name), _) => name.as_str(),
            (None, true) => "*",
            (None, false) => "",
        };
        println!("{:<24} {channel:<10} {label}", record.version.to_string());
    }
    Ok(())
}
