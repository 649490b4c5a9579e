//! Command modules for the zigx CLI.
//!
//! ## Toolchain Commands
//!
//! - [`install`] - Install Zig and ZLS
//! - [`use_cmd`] - Select an existing executable
//! - [`resolve`] - Resolve the workspace's Zig version
//! - [`versions`] - List remote versions
//! - [`list`] - List installs
//! - [`status`] - Show the active toolchain
//!
//! ## Other Commands
//!
//! - [`config`] - Settings
//! - [`lsp`] - Run the language server

pub mod config;
pub mod install;
pub mod list;
pub mod lsp;
pub mod resolve;
pub mod status;
pub mod use_cmd;
pub mod versions;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use zigx_toolchain::{ContextOptions, InstallOptions, ProgressReporter, ToolchainContext};

/// Builds the toolchain context for `workspace`, or the current directory.
pub(crate) fn open_context(workspace: Option<PathBuf>) -> Result<ToolchainContext> {
    let workspace = match workspace {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to read the current directory")?,
    };
    let options = ContextOptions::from_env(Some(workspace))?;
    ToolchainContext::new(options).context("Failed to initialize zigx")
}

/// Install options that print progress to stderr and cancel on Ctrl-C.
pub(crate) struct ProgressPrinter {
    options: InstallOptions,
    printer: JoinHandle<()>,
}

impl ProgressPrinter {
    pub(crate) fn start() -> Self {
        let (progress, mut events) = ProgressReporter::channel();
        let options = InstallOptions::with_progress(progress);

        let cancel = options.cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Cancelling...");
                cancel.cancel();
            }
        });

        let printer = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event.percent {
                    Some(percent) => eprintln!("[{percent:>3}%] {}", event.message),
                    None => eprintln!("       {}", event.message),
                }
            }
        });

        Self { options, printer }
    }

    pub(crate) fn options(&self) -> &InstallOptions {
        &self.options
    }

    /// Waits until every queued event is printed.
    pub(crate) async fn finish(self) {
        drop(self.options);
        let _ = self.printer.await;
    }
}
