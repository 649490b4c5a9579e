//! Install command for the zigx CLI.
//!
//! Downloads, verifies and installs a Zig version, then the ZLS build that
//! supports it. The installed Zig becomes the configured `zig.version`.
//!
//! ## Usage
//!
//! ```bash
//! zigx install            # Latest stable release
//! zigx install 0.13.0     # A tagged release
//! zigx install master     # The current nightly build
//! zigx install --no-zls   # Zig only
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use zigx_toolchain::VersionRequest;

use super::{ProgressPrinter, open_context};

#[derive(Args)]
pub struct InstallArgs {
    /// Version to install: a semantic version, "latest" or "master".
    #[clap(default_value = "latest")]
    pub version: String,

    /// Skip installing ZLS.
    #[clap(long)]
    pub no_zls: bool,
}

/// Executes the install command.
///
/// # Errors
///
/// Returns an error if the version is invalid or Zig cannot be installed. A
/// ZLS failure is reported as a warning.
pub async fn execute(workspace: Option<PathBuf>, args: &InstallArgs) -> Result<()> {
    let request: VersionRequest = args.version.parse()?;
    let context = open_context(workspace)?;
    let progress = ProgressPrinter::start();

    let zig = context
        .install_zig(&request, progress.options())
        .await
        .with_context(|| format!("Failed to install Zig {}", args.version))?;

    let zls = if !args.no_zls && context.settings().effective().zls_enabled() {
        Some(context.install_zls_for(&zig.version, progress.options()).await)
    } else {
        None
    };
    progress.finish().await;

    println!("Zig {} installed at {}", zig.version, zig.path.display());
    match zls {
        Some(Ok(zls)) => println!("ZLS {} installed at {}", zls.version, zls.path.display()),
        Some(Err(e)) => eprintln!("warning: ZLS was not installed: {e}"),
        None => {}
    }
    Ok(())
}
