//! On-disk layout of the zigx home directory.
//!
//! The default root is `~/.zigx/` (`%APPDATA%\zigx` on Windows) and can be
//! overridden with the `ZIGX_HOME` environment variable.
//!
//! ## Directory Structure
//!
//! ```text
//! ~/.zigx/                          # Root directory (or ZIGX_HOME)
//!   config.toml                     # User settings
//!   state.json                      # Access records and manifest snapshots
//!   zls.json                        # Generated ZLS configuration
//!   installs/
//!     zig/
//!       x86_64-linux-0.13.0/        # One directory per (platform, version)
//!         zig
//!         lib/...
//!       .staging-3f1c.../           # In-progress install, never addressable
//!     zls/
//!       x86_64-linux-0.13.0/
//!         zls
//! ```

use std::path::{Path, PathBuf};

use semver::Version;

use crate::error::{Error, Result};
use crate::platform::Platform;

/// Environment variable overriding the default root directory.
pub const ZIGX_HOME_ENV: &str = "ZIGX_HOME";

/// Prefix of per-install staging directories.
pub const STAGING_PREFIX: &str = ".staging-";

/// Paths under the zigx home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainPaths {
    /// The home directory itself.
    pub root: PathBuf,
    /// Parent of all per-executable install roots.
    pub installs: PathBuf,
}

impl ToolchainPaths {
    /// Resolves the home directory from `ZIGX_HOME` or the user's home.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no home directory can be determined.
    pub fn new() -> Result<Self> {
        if let Ok(home) = std::env::var(ZIGX_HOME_ENV)
            && !home.is_empty()
        {
            return Ok(Self::with_root(PathBuf::from(home)));
        }

        #[cfg(windows)]
        let root = dirs::data_dir()
            .ok_or_else(|| {
                Error::config("cannot determine AppData directory, set ZIGX_HOME")
            })?
            .join("zigx");
        #[cfg(not(windows))]
        let root = dirs::home_dir()
            .ok_or_else(|| Error::config("cannot determine home directory, set ZIGX_HOME"))?
            .join(".zigx");

        Ok(Self::with_root(root))
    }

    /// Uses `root` as the home directory.
    #[must_use]
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            installs: root.join("installs"),
            root,
        }
    }

    /// User settings file.
    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Persisted state file.
    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.root.join("state.json")
    }

    /// Generated ZLS configuration file.
    #[must_use]
    pub fn zls_config_file(&self) -> PathBuf {
        self.root.join("zls.json")
    }

    /// Directory holding every install of `exe_name`.
    #[must_use]
    pub fn install_root(&self, exe_name: &str) -> PathBuf {
        self.installs.join(exe_name)
    }

    /// Directory name of one install, `<platform>-<version>`.
    #[must_use]
    pub fn install_dir_name(platform: Platform, version: &Version) -> String {
        format!("{platform}-{version}")
    }

    /// Directory of one install.
    #[must_use]
    pub fn install_dir(&self, exe_name: &str, platform: Platform, version: &Version) -> PathBuf {
        self.install_root(exe_name)
            .join(Self::install_dir_name(platform, version))
    }

    /// Path of the executable inside an install directory.
    #[must_use]
    pub fn executable_path(
        &self,
        exe_name: &str,
        platform: Platform,
        version: &Version,
    ) -> PathBuf {
        self.install_dir(exe_name, platform, version)
            .join(platform.executable_name(exe_name))
    }

    /// A fresh staging directory path for an install of `exe_name`.
    ///
    /// The directory is not created.
    #[must_use]
    pub fn staging_dir(&self, exe_name: &str) -> PathBuf {
        self.install_root(exe_name)
            .join(format!("{STAGING_PREFIX}{:016x}", rand::random::<u64>()))
    }

    /// Creates the root and install directories.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if a directory cannot be created.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.root, &self.installs] {
            std::fs::create_dir_all(dir).map_err(|e| {
                Error::io(format!("failed to create directory {}", dir.display()), e)
            })?;
        }
        Ok(())
    }
}

/// Writes `contents` to `path` through a temporary sibling and a rename.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::io(format!("failed to create directory {}", parent.display()), e)
        })?;
    }
    let tmp = path.with_extension(format!("tmp-{:08x}", rand::random::<u32>()));
    std::fs::write(&tmp, contents)
        .map_err(|e| Error::io(format!("failed to write {}", tmp.display()), e))?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        Error::io(format!("failed to replace {}", path.display()), e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Arch, Os};
    use serial_test::serial;

    const LINUX: Platform = Platform::new(Os::Linux, Arch::X86_64);

    #[test]
    fn install_layout_is_keyed_by_exe_platform_and_version() {
        let paths = ToolchainPaths::with_root(PathBuf::from("/home/user/.zigx"));
        let version = Version::new(0, 13, 0);

        assert_eq!(
            paths.install_dir("zig", LINUX, &version),
            PathBuf::from("/home/user/.zigx/installs/zig/x86_64-linux-0.13.0")
        );
        assert_eq!(
            paths.executable_path("zig", LINUX, &version),
            PathBuf::from("/home/user/.zigx/installs/zig/x86_64-linux-0.13.0/zig")
        );
        let windows = Platform::new(Os::Windows, Arch::X86_64);
        assert!(
            paths
                .executable_path("zls", windows, &version)
                .ends_with("x86_64-windows-0.13.0/zls.exe")
        );
    }

    #[test]
    fn staging_dirs_are_unique_and_hidden() {
        let paths = ToolchainPaths::with_root(PathBuf::from("/tmp/zigx"));
        let a = paths.staging_dir("zig");
        let b = paths.staging_dir("zig");
        assert_ne!(a, b);
        let name = a.file_name().and_then(|n| n.to_str()).expect("Should have a name");
        assert!(name.starts_with(STAGING_PREFIX));
        assert_eq!(a.parent(), Some(paths.install_root("zig").as_path()));
    }

    #[test]
    #[serial]
    fn new_honours_zigx_home() {
        let temp = tempfile::tempdir().expect("Should create temp dir");
        // SAFETY: serialized with every other test touching the environment.
        unsafe { std::env::set_var(ZIGX_HOME_ENV, temp.path()) };
        let paths = ToolchainPaths::new();
        unsafe { std::env::remove_var(ZIGX_HOME_ENV) };

        let paths = paths.expect("Should resolve paths");
        assert_eq!(paths.root, temp.path());
        assert_eq!(paths.settings_file(), temp.path().join("config.toml"));
    }

    #[test]
    fn write_atomic_replaces_existing_file() {
        let temp = tempfile::tempdir().expect("Should create temp dir");
        let target = temp.path().join("nested").join("state.json");

        write_atomic(&target, b"first").expect("Should write");
        write_atomic(&target, b"second").expect("Should overwrite");

        assert_eq!(std::fs::read(&target).expect("Should read"), b"second");
        let leftovers = std::fs::read_dir(target.parent().expect("Should have parent"))
            .expect("Should list")
            .count();
        assert_eq!(leftovers, 1);
    }
}
