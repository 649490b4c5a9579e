#![warn(clippy::pedantic)]

//! # zigx
//!
//! Command-line front end for the Zig and ZLS toolchain manager. It exposes
//! the same operations an editor integration binds to commands.
//!
//! ## Subcommands
//!
//! - `install` - Install a Zig version and the matching ZLS
//! - `use` - Select an existing `zig` or `zls` executable
//! - `resolve` - Show which Zig version the workspace wants
//! - `versions` - List versions from the release index
//! - `list` - List installed toolchains
//! - `status` - Show the Zig and ZLS that would be used
//! - `config` - Read and change settings
//! - `lsp` - Activate the toolchain and run ZLS on this process's stdio
//!
//! ## Examples
//!
//! Install the latest stable Zig:
//! ```bash
//! zigx install
//! ```
//!
//! Run the language server for an editor:
//! ```bash
//! zigx lsp --workspace ~/src/project
//! ```

mod commands;
mod errors;
mod notifier;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{config, install, list, lsp, resolve, status, use_cmd, versions};
use errors::ZigxError;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "ZIGX_LOG";

/// Zig and ZLS toolchain manager.
#[derive(Parser)]
#[command(
    name = "zigx",
    author,
    version,
    about = "Installs and selects Zig and ZLS toolchains",
    after_help = "\
VERSION RESOLUTION:
    The Zig version for a workspace is taken from the first of:
    1. .zigversion in the workspace
    2. .minimum_zig_version in build.zig.zon
    3. zig.version setting
    4. zig on PATH
    5. Latest stable release

ENVIRONMENT VARIABLES:
    ZIGX_HOME               Home directory (default: ~/.zigx)
    ZIGX_LOG                Log filter (default: warn)
    ZIGX_INDEX_URL          Zig release index
    ZIGX_MACH_INDEX_URL     Supplementary index, empty to disable
    ZIGX_ZLS_API_URL        ZLS release API
    ZIGX_MIRROR_LIST_URL    Community mirror list, empty to disable"
)]
pub struct Cli {
    /// Workspace root. Defaults to the current directory.
    #[clap(long, global = true, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install a Zig version and the matching ZLS.
    ///
    /// The installed version becomes the configured `zig.version`.
    Install(install::InstallArgs),

    /// Select an existing executable.
    ///
    /// The path is saved in the user settings and takes precedence over
    /// version resolution.
    Use(use_cmd::UseArgs),

    /// Show which Zig version the workspace wants and why.
    Resolve,

    /// List versions available for this platform.
    Versions(versions::VersionsArgs),

    /// List installed toolchains.
    List,

    /// Show the Zig and ZLS that would be used, without downloading.
    Status,

    /// Read and change settings.
    Config(config::ConfigArgs),

    /// Activate the toolchain and run ZLS.
    ///
    /// ZLS inherits this process's stdio, so an editor can start `zigx lsp`
    /// as its language server. Messages go to stderr.
    Lsp,
}

#[tokio::main]
async fn main() {
    init_logging();
    if let Err(e) = run().await {
        let exit_code = handle_error(&e);
        std::process::exit(exit_code);
    }
}

/// Logs go to stderr so stdout stays free for the language server.
fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Handles an error and returns the process exit code.
///
/// A `ProcessExitCode` error carries the language server's own exit code and
/// is not printed.
fn handle_error(e: &anyhow::Error) -> i32 {
    if let Some(ZigxError::ProcessExitCode { code }) = e.downcast_ref::<ZigxError>() {
        return *code;
    }
    eprintln!("Error: {e:?}");
    1
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let workspace = cli.workspace;

    match cli.command {
        Commands::Install(args) => install::execute(workspace, &args).await,
        Commands::Use(args) => use_cmd::execute(workspace, &args).await,
        Commands::Resolve => resolve::execute(workspace).await,
        Commands::Versions(args) => versions::execute(workspace, &args).await,
        Commands::List => list::execute(workspace),
        Commands::Status => status::execute(workspace).await,
        Commands::Config(args) => config::execute(workspace, &args),
        Commands::Lsp => lsp::execute(workspace).await,
    }
}
