#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]

//! Zig and ZLS toolchain management for editor integrations.
//!
//! This crate decides which Zig version a workspace wants, installs signed
//! Zig and ZLS builds side by side, tracks the selected executables and
//! supervises the ZLS language server.
//!
//! ## Module Structure
//!
//! - [`platform`] - Host OS and architecture
//! - [`paths`] - Home directory layout
//! - [`settings`] - User and workspace settings
//! - [`state`] - Access records and manifest snapshots
//! - [`download`] - HTTP transfers with progress and cancellation
//! - [`archive`] - Archive extraction
//! - [`catalog`] - Release indexes and the ZLS compatibility API
//! - [`resolver`] - Version resolution for a workspace
//! - [`install`] - Verified, single-flight installs and eviction
//! - [`components`] - Zig and ZLS install configurations
//! - [`provider`] - The selected executable of each component
//! - [`server`] - ZLS process supervision
//! - [`context`] - Wiring and activation
//! - [`commands`] - Notifier-driven user actions

pub mod archive;
pub mod catalog;
pub mod commands;
pub mod components;
pub mod context;
pub mod download;
pub mod error;
pub mod install;
pub mod paths;
pub mod platform;
pub mod process;
pub mod provider;
pub mod resolver;
pub mod server;
pub mod settings;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use catalog::{ReleaseCatalog, ReleaseChannel, VersionRecord, ZlsVersionSelector};
pub use commands::{Commands, NotifyAction, Notifier};
pub use context::{
    ContextOptions, ToolchainContext, ToolchainReport, ToolchainStatus, VersionRequest,
};
pub use download::{InstallProgress, ProgressReporter};
pub use error::{Error, InstallError, InstallFailure, Result};
pub use install::{InstallConfig, InstallManager, InstallOptions, InstalledToolchain};
pub use paths::ToolchainPaths;
pub use platform::Platform;
pub use provider::{ToolchainChanged, ToolchainProvider, ToolchainState};
pub use resolver::{Resolution, ResolveContext, VersionResolver, VersionSource};
pub use server::{LanguageServer, ServerStdio};
pub use settings::{Settings, SettingsStore};
pub use state::StateStore;
