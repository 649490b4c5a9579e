//! Status command for the zigx CLI.
//!
//! Reports the Zig and ZLS that activation would use. Nothing is downloaded.
//!
//! ```text
//! zig: 0.13.0 (/home/user/.zigx/installs/zig/x86_64-linux-0.13.0/zig)
//! zls: unavailable: ZLS 0.13.0 is not installed
//! ```

use std::path::PathBuf;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use super::open_context;

/// Executes the status command.
///
/// # Errors
///
/// Returns an error if the context cannot be created. Missing toolchains are
/// part of the report.
pub async fn execute(workspace: Option<PathBuf>) -> Result<()> {
    let context = open_context(workspace)?;
    let report = context.status(&CancellationToken::new()).await;
    println!("zig: {}", report.zig);
    println!("zls: {}", report.zls);
    Ok(())
}
