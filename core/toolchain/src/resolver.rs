//! Zig version resolution for a workspace.
//!
//! The wanted version is taken from the first source that yields one:
//!
//! 1. An explicit override for this run
//! 2. The workspace pin file `.zigversion`
//! 3. `.minimum_zig_version` in `build.zig.zon`, widened to the newest
//!    catalog version with the same caret range
//! 4. The `zig.version` setting
//! 5. A `zig` executable on the search path
//! 6. The latest stable release
//!
//! A failing source is logged and skipped. Resolution never errors; when no
//! source applies the result is `None`.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use semver::{Comparator, Op, Version, VersionReq};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::{LATEST_STABLE_PURPOSE, ReleaseCatalog};
use crate::error::{Error, Result};
use crate::process::query_version;
use crate::settings::Settings;
use crate::state::StateStore;

/// Workspace file pinning an exact Zig version.
pub const PIN_FILE: &str = ".zigversion";

/// Zig package manifest.
pub const BUILD_MANIFEST: &str = "build.zig.zon";

const ZIG_EXE: &str = "zig";

/// Where a resolved version came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionSource {
    Override,
    PinFile,
    BuildManifest,
    Settings,
    SystemPath,
    LatestStable,
}

impl fmt::Display for VersionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VersionSource::Override => "override",
            VersionSource::PinFile => PIN_FILE,
            VersionSource::BuildManifest => BUILD_MANIFEST,
            VersionSource::Settings => "zig.version setting",
            VersionSource::SystemPath => "zig on PATH",
            VersionSource::LatestStable => "latest stable release",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub version: Version,
    pub source: VersionSource,
}

impl Resolution {
    fn new(version: Version, source: VersionSource) -> Self {
        Self { version, source }
    }
}

/// Inputs of one resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    /// Workspace root holding the pin file and build manifest.
    pub workspace: Option<PathBuf>,
    pub override_version: Option<Version>,
    /// Effective settings, workspace overlay applied.
    pub settings: Settings,
    pub cancel: CancellationToken,
}

/// Walks the version sources in order.
#[derive(Debug, Clone)]
pub struct VersionResolver {
    catalog: ReleaseCatalog,
    state: Arc<StateStore>,
    search_path: Option<OsString>,
    query_timeout: Duration,
}

impl VersionResolver {
    #[must_use]
    pub fn new(catalog: ReleaseCatalog, state: Arc<StateStore>, query_timeout: Duration) -> Self {
        Self {
            catalog,
            state,
            search_path: None,
            query_timeout,
        }
    }

    /// Searches `path` instead of `PATH` for a system `zig`.
    #[must_use]
    pub fn with_search_path(mut self, path: Option<OsString>) -> Self {
        self.search_path = path;
        self
    }

    pub async fn resolve(&self, ctx: &ResolveContext) -> Option<Resolution> {
        if let Some(version) = &ctx.override_version {
            return Some(Resolution::new(version.clone(), VersionSource::Override));
        }

        if let Some(workspace) = &ctx.workspace {
            match read_pin_file(workspace) {
                Ok(Some(version)) => {
                    return Some(Resolution::new(version, VersionSource::PinFile));
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "ignoring pin file"),
            }

            match read_build_manifest(workspace) {
                Ok(Some(minimum)) => {
                    let version = self.widen(minimum, &ctx.cancel).await;
                    return Some(Resolution::new(version, VersionSource::BuildManifest));
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "ignoring build manifest"),
            }
        }

        match ctx.settings.zig_version() {
            Ok(Some(version)) => return Some(Resolution::new(version, VersionSource::Settings)),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "ignoring zig.version setting"),
        }

        match self.system_version(ctx).await {
            Ok(Some(version)) => return Some(Resolution::new(version, VersionSource::SystemPath)),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "ignoring zig on PATH"),
        }

        self.latest_stable(&ctx.cancel)
            .await
            .map(|version| Resolution::new(version, VersionSource::LatestStable))
    }

    /// Widens a minimum version to the newest compatible catalog version.
    ///
    /// Offline, an earlier widening of the same minimum is reused, otherwise
    /// the minimum itself is returned.
    async fn widen(&self, minimum: Version, cancel: &CancellationToken) -> Version {
        let purpose = format!("zig-closest:{minimum}");
        let req = VersionReq {
            comparators: vec![Comparator {
                op: Op::Caret,
                major: minimum.major,
                minor: Some(minimum.minor),
                patch: Some(minimum.patch),
                pre: minimum.pre.clone(),
            }],
        };

        match self.catalog.max_satisfying(&req, cancel).await {
            Ok(Some(version)) => {
                debug!(%minimum, %version, "widened minimum Zig version");
                self.state
                    .store_snapshot(&purpose, Value::String(version.to_string()));
                return version;
            }
            Ok(None) => {
                debug!(%minimum, "no catalog version satisfies the minimum");
                return minimum;
            }
            Err(e) => warn!(%minimum, error = %e, "cannot widen minimum Zig version"),
        }

        match self.cached_version(&purpose) {
            Some(version) => {
                info!(%minimum, %version, "using cached widening");
                version
            }
            None => minimum,
        }
    }

    async fn system_version(&self, ctx: &ResolveContext) -> Result<Option<Version>> {
        let search_path = self
            .search_path
            .clone()
            .or_else(|| std::env::var_os("PATH"));
        let cwd = ctx.workspace.clone().unwrap_or_else(|| PathBuf::from("."));
        let Ok(exe) = which::which_in(ZIG_EXE, search_path, cwd) else {
            return Ok(None);
        };
        let args = ["version".to_string()];
        let version = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return Err(Error::Cancelled),
            version = query_version(&exe, &args, self.query_timeout) => version?,
        };
        debug!(exe = %exe.display(), %version, "found zig on PATH");
        Ok(Some(version))
    }

    async fn latest_stable(&self, cancel: &CancellationToken) -> Option<Version> {
        match self.catalog.latest_stable(cancel).await {
            Ok(Some(record)) => {
                self.state.store_snapshot(
                    LATEST_STABLE_PURPOSE,
                    Value::String(record.version.to_string()),
                );
                return Some(record.version);
            }
            Ok(None) => warn!("catalog lists no stable release"),
            Err(e) => warn!(error = %e, "cannot determine latest stable Zig"),
        }
        let cached = self.cached_version(LATEST_STABLE_PURPOSE);
        if let Some(version) = &cached {
            info!(%version, "using cached latest stable Zig");
        }
        cached
    }

    fn cached_version(&self, purpose: &str) -> Option<Version> {
        let snapshot = self.state.snapshot(purpose)?;
        Version::parse(snapshot.body.as_str()?).ok()
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(format!("failed to read {}", path.display()), e)),
    }
}

fn read_pin_file(workspace: &Path) -> Result<Option<Version>> {
    let path = workspace.join(PIN_FILE);
    let Some(text) = read_optional(&path)? else {
        return Ok(None);
    };
    let line = text.lines().next().unwrap_or_default().trim();
    Version::parse(line)
        .map(Some)
        .map_err(|e| Error::format(path.display().to_string(), format!("`{line}`: {e}")))
}

fn read_build_manifest(workspace: &Path) -> Result<Option<Version>> {
    let path = workspace.join(BUILD_MANIFEST);
    let Some(text) = read_optional(&path)? else {
        return Ok(None);
    };
    let Some(raw) = minimum_zig_version(&text) else {
        return Ok(None);
    };
    Version::parse(raw)
        .map(Some)
        .map_err(|e| Error::format(path.display().to_string(), format!("`{raw}`: {e}")))
}

/// The value of `.minimum_zig_version = "..."` in a ZON manifest.
fn minimum_zig_version(manifest: &str) -> Option<&str> {
    manifest.lines().find_map(|line| {
        let rest = line.trim().strip_prefix(".minimum_zig_version")?;
        let rest = rest.trim_start().strip_prefix('=')?.trim_start();
        let (value, _) = rest.strip_prefix('"')?.split_once('"')?;
        Some(value)
    })
}
