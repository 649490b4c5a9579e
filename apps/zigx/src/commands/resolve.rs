//! Resolve command for the zigx CLI.
//!
//! ```text
//! 0.13.0 (from .zigversion)
//! ```

use std::path::PathBuf;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use super::open_context;
use crate::errors::ZigxError;

/// Executes the resolve command.
///
/// # Errors
///
/// Returns [`ZigxError::Unresolved`] if no source yields a version.
pub async fn execute(workspace: Option<PathBuf>) -> Result<()> {
    let context = open_context(workspace)?;
    let resolution = context
        .resolve_zig(&CancellationToken::new())
        .await
        .ok_or(ZigxError::Unresolved)?;
    println!("{} (from {})", resolution.version, resolution.source);
    Ok(())
}
