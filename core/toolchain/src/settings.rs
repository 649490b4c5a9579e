//! User and workspace settings.
//!
//! Settings live in two TOML files: the user file `<home>/config.toml` and an
//! optional `zigx.toml` at the workspace root. Values present in the
//! workspace file override the user file field by field.
//!
//! ```toml
//! [zig]
//! version = "0.13.0"
//! # path = "/opt/zig/zig"
//!
//! [zls]
//! enabled = true
//!
//! [install]
//! mirrors = ["https://zig.mirror.example/"]
//! max-installed = 5
//! ```

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::paths::write_atomic;

/// File name of the workspace settings file.
pub const WORKSPACE_SETTINGS_FILE: &str = "zigx.toml";

/// Number of installs kept per executable when not configured.
pub const DEFAULT_MAX_INSTALLED: usize = 5;

/// Keys accepted by [`Settings::set`] and [`Settings::unset`].
pub const SETTING_KEYS: &[&str] = &[
    "zig.path",
    "zig.version",
    "zls.path",
    "zls.enabled",
    "install.mirrors",
    "install.max-installed",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub zig: ZigSettings,
    pub zls: ZlsSettings,
    pub install: InstallSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZigSettings {
    /// Explicit `zig` executable. Bypasses version resolution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Wanted Zig version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZlsSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Explicit `zls` executable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct InstallSettings {
    /// Extra mirrors tried before the community list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirrors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_installed: Option<usize>,
}

impl Settings {
    /// Reads a settings file. A missing file yields default settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file is not valid settings TOML or
    /// sets `max-installed` to zero, and [`Error::Io`] if it cannot be read.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(Error::io(format!("failed to read {}", path.display()), e)),
        };
        let settings: Self = toml::from_str(&text)
            .map_err(|e| Error::config(format!("invalid settings in {}: {e}", path.display())))?;
        if settings.install.max_installed == Some(0) {
            return Err(Error::config(format!(
                "invalid settings in {}: install.max-installed must be at least 1",
                path.display()
            )));
        }
        Ok(settings)
    }

    /// Writes the settings to `path` atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self)
            .map_err(|e| Error::format("settings", e))?;
        write_atomic(path, text.as_bytes())
    }

    /// Returns `self` with every field that `other` sets replaced.
    #[must_use]
    pub fn overlay(mut self, other: Settings) -> Settings {
        self.zig.path = other.zig.path.or(self.zig.path);
        self.zig.version = other.zig.version.or(self.zig.version);
        self.zls.enabled = other.zls.enabled.or(self.zls.enabled);
        self.zls.path = other.zls.path.or(self.zls.path);
        self.install.mirrors = other.install.mirrors.or(self.install.mirrors);
        self.install.max_installed = other.install.max_installed.or(self.install.max_installed);
        self
    }

    /// Whether ZLS should be managed. Defaults to `true`.
    #[must_use]
    pub fn zls_enabled(&self) -> bool {
        self.zls.enabled.unwrap_or(true)
    }

    /// Installs kept per executable, never less than one.
    #[must_use]
    pub fn max_installed(&self) -> usize {
        self.install
            .max_installed
            .unwrap_or(DEFAULT_MAX_INSTALLED)
            .max(1)
    }

    /// The configured Zig version, if it parses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `zig.version` is set but is not semver.
    pub fn zig_version(&self) -> Result<Option<Version>> {
        self.zig
            .version
            .as_deref()
            .map(|raw| {
                Version::parse(raw.trim())
                    .map_err(|e| Error::config(format!("zig.version `{raw}` is not a version: {e}")))
            })
            .transpose()
    }

    /// Sets a dotted key from its string form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown key or an invalid value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "zig.path" => self.zig.path = Some(non_empty_path(key, value)?),
            "zig.version" => {
                let version = Version::parse(value.trim()).map_err(|e| {
                    Error::config(format!("zig.version `{value}` is not a version: {e}"))
                })?;
                self.zig.version = Some(version.to_string());
            }
            "zls.path" => self.zls.path = Some(non_empty_path(key, value)?),
            "zls.enabled" => {
                self.zls.enabled = Some(value.trim().parse().map_err(|_| {
                    Error::config(format!("zls.enabled expects true or false, got `{value}`"))
                })?);
            }
            "install.mirrors" => {
                let mirrors = value
                    .split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(|m| {
                        reqwest::Url::parse(m)
                            .map(|_| m.to_string())
                            .map_err(|e| Error::config(format!("mirror `{m}` is not a URL: {e}")))
                    })
                    .collect::<Result<Vec<_>>>()?;
                self.install.mirrors = Some(mirrors);
            }
            "install.max-installed" => {
                let max = value
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| {
                        Error::config(format!(
                            "install.max-installed expects a positive number, got `{value}`"
                        ))
                    })?;
                self.install.max_installed = Some(max);
            }
            _ => return Err(unknown_key(key)),
        }
        Ok(())
    }

    /// Clears a dotted key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown key.
    pub fn unset(&mut self, key: &str) -> Result<()> {
        match key {
            "zig.path" => self.zig.path = None,
            "zig.version" => self.zig.version = None,
            "zls.path" => self.zls.path = None,
            "zls.enabled" => self.zls.enabled = None,
            "install.mirrors" => self.install.mirrors = None,
            "install.max-installed" => self.install.max_installed = None,
            _ => return Err(unknown_key(key)),
        }
        Ok(())
    }
}

fn non_empty_path(key: &str, value: &str) -> Result<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::config(format!("{key} must not be empty")));
    }
    Ok(PathBuf::from(trimmed))
}

fn unknown_key(key: &str) -> Error {
    Error::config(format!(
        "unknown setting `{key}`, expected one of: {}",
        SETTING_KEYS.join(", ")
    ))
}

/// The user settings file plus an optional workspace overlay.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    workspace_file: Option<PathBuf>,
    user: RwLock<Settings>,
}

impl SettingsStore {
    /// Loads the user settings at `path` and remembers the workspace root.
    ///
    /// # Errors
    ///
    /// Returns an error if the user settings file exists but is invalid.
    pub fn load(path: PathBuf, workspace: Option<&Path>) -> Result<Self> {
        let user = Settings::load(&path)?;
        Ok(Self {
            path,
            workspace_file: workspace.map(|root| root.join(WORKSPACE_SETTINGS_FILE)),
            user: RwLock::new(user),
        })
    }

    /// Path of the user settings file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// User settings without the workspace overlay.
    #[must_use]
    pub fn user(&self) -> Settings {
        self.user.read().map(|s| s.clone()).unwrap_or_default()
    }

    /// User settings overlaid with the workspace file.
    ///
    /// An unreadable workspace file is logged and ignored.
    #[must_use]
    pub fn effective(&self) -> Settings {
        let user = self.user();
        let Some(file) = &self.workspace_file else {
            return user;
        };
        match Settings::load(file) {
            Ok(workspace) => user.overlay(workspace),
            Err(e) => {
                warn!(file = %file.display(), error = %e, "ignoring workspace settings");
                user
            }
        }
    }

    /// Applies `change` to the user settings and saves them.
    ///
    /// Nothing is saved if `change` fails.
    ///
    /// # Errors
    ///
    /// Returns the error from `change` or from writing the file.
    pub fn update<F>(&self, change: F) -> Result<Settings>
    where
        F: FnOnce(&mut Settings) -> Result<()>,
    {
        let mut guard = self
            .user
            .write()
            .map_err(|_| Error::config("settings lock poisoned"))?;
        let mut next = guard.clone();
        change(&mut next)?;
        next.save(&self.path)?;
        *guard = next.clone();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_default() {
        let temp = tempfile::tempdir().expect("Should create temp dir");
        let settings = Settings::load(&temp.path().join("config.toml")).expect("Should load");
        assert_eq!(settings, Settings::default());
        assert!(settings.zls_enabled());
        assert_eq!(settings.max_installed(), DEFAULT_MAX_INSTALLED);
    }

    #[test]
    fn parses_documented_layout() {
        let settings: Settings = toml::from_str(
            r#"
            [zig]
            version = "0.13.0"

            [zls]
            enabled = false

            [install]
            mirrors = ["https://zig.mirror.example/"]
            max-installed = 3
            "#,
        )
        .expect("Should parse");

        assert_eq!(
            settings.zig_version().expect("Should be valid"),
            Some(Version::new(0, 13, 0))
        );
        assert!(!settings.zls_enabled());
        assert_eq!(settings.max_installed(), 3);
        assert_eq!(
            settings.install.mirrors.as_deref(),
            Some(&["https://zig.mirror.example/".to_string()][..])
        );
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let temp = tempfile::tempdir().expect("Should create temp dir");
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[zig\nversion = ").expect("Should write");
        assert!(matches!(Settings::load(&path), Err(Error::Config { .. })));
    }

    #[test]
    fn zero_max_installed_is_rejected_on_load() {
        let temp = tempfile::tempdir().expect("Should create temp dir");
        let path = temp.path().join("zigx.toml");
        std::fs::write(&path, "[install]\nmax-installed = 0\n").expect("Should write");
        assert!(matches!(Settings::load(&path), Err(Error::Config { .. })));

        let mut settings = Settings::default();
        settings.install.max_installed = Some(0);
        assert_eq!(settings.max_installed(), 1);
    }

    #[test]
    fn workspace_overlay_wins_field_by_field() {
        let mut user = Settings::default();
        user.zig.version = Some("0.12.0".to_string());
        user.zls.enabled = Some(false);

        let mut workspace = Settings::default();
        workspace.zig.version = Some("0.13.0".to_string());

        let merged = user.overlay(workspace);
        assert_eq!(merged.zig.version.as_deref(), Some("0.13.0"));
        assert_eq!(merged.zls.enabled, Some(false));
    }

    #[test]
    fn set_validates_values() {
        let mut settings = Settings::default();

        settings.set("zig.version", "0.14.1").expect("Should accept semver");
        assert_eq!(settings.zig.version.as_deref(), Some("0.14.1"));
        assert!(matches!(
            settings.set("zig.version", "fourteen"),
            Err(Error::Config { .. })
        ));
        assert!(settings.set("install.max-installed", "0").is_err());
        assert!(settings.set("zls.enabled", "maybe").is_err());
        assert!(settings.set("install.mirrors", "not a url").is_err());
        assert!(settings.set("zig.path", "  ").is_err());
        assert!(settings.set("editor.theme", "dark").is_err());

        settings
            .set("install.mirrors", "https://a.example/, https://b.example/")
            .expect("Should accept mirrors");
        assert_eq!(settings.install.mirrors.as_ref().map(Vec::len), Some(2));

        settings.unset("zig.version").expect("Should unset");
        assert_eq!(settings.zig.version, None);
    }

    #[test]
    fn store_update_persists_and_reloads() {
        let temp = tempfile::tempdir().expect("Should create temp dir");
        let path = temp.path().join("config.toml");
        let store = SettingsStore::load(path.clone(), None).expect("Should load");

        store
            .update(|s| s.set("zig.path", "/opt/zig/zig"))
            .expect("Should update");

        let reloaded = Settings::load(&path).expect("Should reload");
        assert_eq!(reloaded.zig.path, Some(PathBuf::from("/opt/zig/zig")));
        assert_eq!(store.user(), reloaded);
    }

    #[test]
    fn failed_update_leaves_file_untouched() {
        let temp = tempfile::tempdir().expect("Should create temp dir");
        let path = temp.path().join("config.toml");
        let store = SettingsStore::load(path.clone(), None).expect("Should load");

        let result = store.update(|s| s.set("zig.version", "nope"));

        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn effective_reads_workspace_file() {
        let home = tempfile::tempdir().expect("Should create temp dir");
        let workspace = tempfile::tempdir().expect("Should create temp dir");
        std::fs::write(
            workspace.path().join(WORKSPACE_SETTINGS_FILE),
            "[zig]\nversion = \"0.11.0\"\n",
        )
        .expect("Should write");

        let store = SettingsStore::load(home.path().join("config.toml"), Some(workspace.path()))
            .expect("Should load");
        store
            .update(|s| s.set("zig.version", "0.13.0"))
            .expect("Should update");

        assert_eq!(store.user().zig.version.as_deref(), Some("0.13.0"));
        assert_eq!(store.effective().zig.version.as_deref(), Some("0.11.0"));
    }
}
