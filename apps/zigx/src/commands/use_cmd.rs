//! Use command for the zigx CLI.
//!
//! Selects an existing executable and saves it as `zig.path` (or `zls.path`).
//!
//! ## Usage
//!
//! ```bash
//! zigx use /opt/zig/zig       # A specific file
//! zigx use zig                # Looked up on PATH
//! zigx use --zls ~/bin/zls
//! zigx use --clear            # Back to version resolution
//! ```

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args;

use super::open_context;

#[derive(Args)]
pub struct UseArgs {
    /// Executable to use.
    #[clap(required_unless_present = "clear")]
    pub path: Option<PathBuf>,

    /// Apply to ZLS instead of Zig.
    #[clap(long)]
    pub zls: bool,

    /// Forget the saved path.
    #[clap(long, conflicts_with = "path")]
    pub clear: bool,
}

/// Executes the use command.
///
/// # Errors
///
/// Returns an error if the executable does not report a version or the
/// settings cannot be saved.
pub async fn execute(workspace: Option<PathBuf>, args: &UseArgs) -> Result<()> {
    let context = open_context(workspace)?;
    let provider = if args.zls { context.zls() } else { context.zig() };

    if args.clear {
        provider.clear_and_persist()?;
        println!("Cleared the saved {} path.", provider.exe_name());
        return Ok(());
    }
    let Some(path) = &args.path else {
        bail!("a path is required");
    };

    let state = provider.set_and_persist(path).await?;
    println!(
        "Using {} {} from {}",
        provider.exe_name(),
        state.version,
        state.path.display()
    );
    Ok(())
}
