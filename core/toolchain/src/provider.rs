//! The currently selected executable of one component.
//!
//! A provider holds the path and version of the `zig` or `zls` in use and
//! broadcasts a [`ToolchainChanged`] event whenever the version changes.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use semver::Version;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::process::query_version;
use crate::settings::SettingsStore;

const EVENT_CAPACITY: usize = 16;

/// An executable and the version it reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolchainState {
    pub path: PathBuf,
    pub version: Version,
}

/// Setting under which a provider persists its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistedPath {
    ZigPath,
    ZlsPath,
}

impl PersistedPath {
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            PersistedPath::ZigPath => "zig.path",
            PersistedPath::ZlsPath => "zls.path",
        }
    }
}

/// Broadcast after a provider's state changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainChanged {
    pub exe_name: String,
    pub state: Option<ToolchainState>,
}

#[derive(Debug)]
pub struct ToolchainProvider {
    exe_name: String,
    version_args: Vec<String>,
    setting: PersistedPath,
    settings: Arc<SettingsStore>,
    query_timeout: Duration,
    state: RwLock<Option<ToolchainState>>,
    events: broadcast::Sender<ToolchainChanged>,
}

impl ToolchainProvider {
    #[must_use]
    pub fn new(
        exe_name: impl Into<String>,
        version_args: Vec<String>,
        setting: PersistedPath,
        settings: Arc<SettingsStore>,
        query_timeout: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            exe_name: exe_name.into(),
            version_args,
            setting,
            settings,
            query_timeout,
            state: RwLock::new(None),
            events,
        }
    }

    #[must_use]
    pub fn exe_name(&self) -> &str {
        &self.exe_name
    }

    #[must_use]
    pub fn get(&self) -> Option<ToolchainState> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the state and notifies subscribers.
    ///
    /// States with the same version count as equal, so setting one is a
    /// no-op. Returns whether the state changed.
    pub fn set(&self, next: Option<ToolchainState>) -> bool {
        let mut state = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let unchanged = match (&*state, &next) {
            (None, None) => true,
            (Some(current), Some(next)) => current.version == next.version,
            _ => false,
        };
        if unchanged {
            return false;
        }

        debug!(exe = %self.exe_name, version = ?next.as_ref().map(|s| &s.version), "toolchain changed");
        state.clone_from(&next);
        // Sent under the lock so events arrive in the order of updates.
        let _ = self.events.send(ToolchainChanged {
            exe_name: self.exe_name.clone(),
            state: next,
        });
        true
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ToolchainChanged> {
        self.events.subscribe()
    }

    /// Resolves `path` to an executable and queries its version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the path is not a working executable.
    pub async fn probe(&self, path: &Path) -> Result<ToolchainState> {
        let exe = resolve_executable(path)?;
        let version = query_version(&exe, &self.version_args, self.query_timeout)
            .await
            .map_err(|e| {
                Error::config(format!(
                    "{} is not a usable {}: {e}",
                    exe.display(),
                    self.exe_name
                ))
            })?;
        Ok(ToolchainState { path: exe, version })
    }

    /// Selects the executable at `path` and saves it in the user settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the executable cannot report its version,
    /// in which case neither the state nor the settings change. Returns an
    /// error if the settings cannot be written.
    pub async fn set_and_persist(&self, path: &Path) -> Result<ToolchainState> {
        let state = self.probe(path).await?;
        let key = self.setting.key();
        let value = state.path.to_string_lossy().into_owned();
        self.settings.update(|settings| settings.set(key, &value))?;
        info!(exe = %self.exe_name, path = %state.path.display(), version = %state.version, "selected executable");
        self.set(Some(state.clone()));
        Ok(state)
    }

    /// Removes the persisted path and clears the state.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be written.
    pub fn clear_and_persist(&self) -> Result<()> {
        let key = self.setting.key();
        self.settings.update(|settings| settings.unset(key))?;
        self.set(None);
        Ok(())
    }
}

/// Resolves a bare executable name through `PATH`; anything else must be an
/// existing file.
///
/// # Errors
///
/// Returns [`Error::Config`] if nothing executable is found.
pub fn resolve_executable(path: &Path) -> Result<PathBuf> {
    if path.components().count() == 1 && !path.is_file() {
        return which::which(path)
            .map_err(|e| Error::config(format!("`{}` not found on PATH: {e}", path.display())));
    }
    if path.is_file() {
        Ok(path.to_path_buf())
    } else {
        Err(Error::config(format!("{} is not a file", path.display())))
    }
}
