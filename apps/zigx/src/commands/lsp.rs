//! Lsp command for the zigx CLI.
//!
//! Activates the toolchain for the workspace, then runs ZLS with this
//! process's stdin and stdout. ZLS is restarted when the selected Zig or ZLS
//! changes, and `zigx` exits with the server's exit code.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use tracing::info;
use zigx_toolchain::{Commands, LanguageServer, Notifier, ServerStdio, ToolchainStatus};

use super::{ProgressPrinter, open_context};
use crate::errors::ZigxError;
use crate::notifier::TerminalNotifier;

/// Executes the lsp command.
///
/// # Errors
///
/// Returns an error if ZLS is unavailable or does not start. Returns
/// [`ZigxError::ProcessExitCode`] when ZLS exits unsuccessfully.
pub async fn execute(workspace: Option<PathBuf>) -> Result<()> {
    let context = Arc::new(open_context(workspace)?);
    let notifier: Arc<dyn Notifier> = Arc::new(TerminalNotifier);

    let progress = ProgressPrinter::start();
    let report = context.activate(progress.options()).await;
    progress.finish().await;

    if let ToolchainStatus::Unavailable(reason) = &report.zig {
        notifier.warn(&format!("Zig is unavailable: {reason}"));
    }
    match &report.zls {
        ToolchainStatus::Ready(zls) => info!(version = %zls.version, "ZLS ready"),
        ToolchainStatus::Disabled => bail!("ZLS is disabled; set zls.enabled = true"),
        ToolchainStatus::Unavailable(reason) => bail!("ZLS is unavailable: {reason}"),
    }

    let server = Arc::new(LanguageServer::new(
        Arc::clone(context.zig()),
        Arc::clone(context.zls()),
        context.paths().zls_config_file(),
        ServerStdio::Inherit,
    ));
    let commands = Commands::new(Arc::clone(&context), Arc::clone(&server), notifier);
    commands.start_server().await;
    if !server.is_running().await {
        bail!("ZLS did not start");
    }
    let watcher = server.watch();

    let status = tokio::select! {
        status = server.wait() => status,
        _ = tokio::signal::ctrl_c() => {
            commands.stop_server().await;
            None
        }
    };
    watcher.abort();

    match status.and_then(|status| status.code()) {
        Some(0) | None => Ok(()),
        Some(code) => Err(ZigxError::ProcessExitCode { code }.into()),
    }
}
