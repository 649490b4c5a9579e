//! The toolchain context: every long-lived component wired together.
//!
//! A [`ToolchainContext`] is built once per process from [`ContextOptions`].
//! It owns the HTTP client, the persisted state and settings, the catalog,
//! the install manager and the Zig and ZLS providers.
//!
//! ## Environment Variables
//!
//! - `ZIGX_HOME`: Home directory (default `~/.zigx`)
//! - `ZIGX_INDEX_URL`: Zig release index
//! - `ZIGX_MACH_INDEX_URL`: Supplementary index, empty to disable
//! - `ZIGX_ZLS_API_URL`: Base URL of the ZLS release API
//! - `ZIGX_ZIG_DOWNLOAD_URL`, `ZIGX_ZIG_BUILDS_URL`: Zig artifact hosts
//! - `ZIGX_ZLS_DOWNLOAD_URL`: ZLS artifact host
//! - `ZIGX_MIRROR_LIST_URL`: Community mirror list, empty to disable

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Url};
use semver::Version;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::{
    IndexSource, MACH_INDEX_URL, ReleaseCatalog, ZIG_INDEX_URL, ZLS_API_URL, ZlsVersionSelector,
};
use crate::components::{
    ComponentKeys, ComponentUrls, parse_mirrors, parse_url, zig_config, zls_config,
};
use crate::download::http_client;
use crate::error::{Error, Result};
use crate::install::{InstallConfig, InstallManager, InstallOptions};
use crate::paths::ToolchainPaths;
use crate::platform::Platform;
use crate::process::VERSION_QUERY_TIMEOUT;
use crate::provider::{PersistedPath, ToolchainProvider, ToolchainState};
use crate::resolver::{Resolution, ResolveContext, VersionResolver};
use crate::settings::{Settings, SettingsStore};
use crate::state::StateStore;

pub const INDEX_URL_ENV: &str = "ZIGX_INDEX_URL";
pub const MACH_INDEX_URL_ENV: &str = "ZIGX_MACH_INDEX_URL";
pub const ZLS_API_URL_ENV: &str = "ZIGX_ZLS_API_URL";
pub const ZIG_DOWNLOAD_URL_ENV: &str = "ZIGX_ZIG_DOWNLOAD_URL";
pub const ZIG_BUILDS_URL_ENV: &str = "ZIGX_ZIG_BUILDS_URL";
pub const ZLS_DOWNLOAD_URL_ENV: &str = "ZIGX_ZLS_DOWNLOAD_URL";
pub const MIRROR_LIST_URL_ENV: &str = "ZIGX_MIRROR_LIST_URL";

/// Snapshot purpose of the Mach index.
const MACH_INDEX_PURPOSE: &str = "mach-index";

/// How a [`ToolchainContext`] is built.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub paths: ToolchainPaths,
    pub platform: Platform,
    /// Workspace root for the pin file, build manifest and `zigx.toml`.
    pub workspace: Option<PathBuf>,
    pub zig_index: Url,
    pub supplementary_indexes: Vec<IndexSource>,
    pub zls_api: Url,
    pub urls: ComponentUrls,
    pub keys: ComponentKeys,
    pub query_timeout: Duration,
    /// Replaces `PATH` when looking for a system `zig`.
    pub search_path: Option<OsString>,
}

impl ContextOptions {
    /// Official endpoints and keys for the host platform under `paths`.
    ///
    /// # Errors
    ///
    /// Returns an error if the host platform is unsupported.
    pub fn new(paths: ToolchainPaths) -> Result<Self> {
        Ok(Self {
            paths,
            platform: Platform::detect()?,
            workspace: None,
            zig_index: parse_url(ZIG_INDEX_URL)?,
            supplementary_indexes: vec![IndexSource::nominated(
                parse_url(MACH_INDEX_URL)?,
                MACH_INDEX_PURPOSE,
            )],
            zls_api: parse_url(ZLS_API_URL)?,
            urls: ComponentUrls::official()?,
            keys: ComponentKeys::official()?,
            query_timeout: VERSION_QUERY_TIMEOUT,
            search_path: None,
        })
    }

    /// Options from `ZIGX_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable holds an invalid URL.
    pub fn from_env(workspace: Option<PathBuf>) -> Result<Self> {
        let mut options = Self::new(ToolchainPaths::new()?)?;
        options.workspace = workspace;

        if let Some(url) = env_url(INDEX_URL_ENV)?.flatten() {
            options.zig_index = url;
        }
        if let Some(url) = env_url(MACH_INDEX_URL_ENV)? {
            options.supplementary_indexes = url
                .map(|url| IndexSource::nominated(url, MACH_INDEX_PURPOSE))
                .into_iter()
                .collect();
        }
        if let Some(url) = env_url(ZLS_API_URL_ENV)?.flatten() {
            options.zls_api = url;
        }
        if let Some(url) = env_url(ZIG_DOWNLOAD_URL_ENV)?.flatten() {
            options.urls.zig_download = url;
        }
        if let Some(url) = env_url(ZIG_BUILDS_URL_ENV)?.flatten() {
            options.urls.zig_builds = url;
        }
        if let Some(url) = env_url(ZLS_DOWNLOAD_URL_ENV)?.flatten() {
            options.urls.zls_download = url;
        }
        if let Some(url) = env_url(MIRROR_LIST_URL_ENV)? {
            options.urls.mirror_list = url;
        }
        Ok(options)
    }
}

/// `None` when unset, `Some(None)` when set but empty.
fn env_url(name: &str) -> Result<Option<Option<Url>>> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Some(None));
    }
    Url::parse(raw)
        .map(|url| Some(Some(url)))
        .map_err(|e| Error::config(format!("{name}=`{raw}` is not a URL: {e}")))
}

/// Which Zig to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRequest {
    /// The newest stable release.
    Latest,
    /// The current `master` build.
    Nightly,
    Exact(Version),
}

impl FromStr for VersionRequest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "latest" | "stable" => Ok(VersionRequest::Latest),
            "master" | "nightly" => Ok(VersionRequest::Nightly),
            other => Version::parse(other.trim_start_matches('v'))
                .map(VersionRequest::Exact)
                .map_err(|e| Error::config(format!("`{s}` is not a version: {e}"))),
        }
    }
}

/// Outcome of activating one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolchainStatus {
    Ready(ToolchainState),
    /// Turned off in the settings.
    Disabled,
    Unavailable(String),
}

impl ToolchainStatus {
    #[must_use]
    pub fn state(&self) -> Option<&ToolchainState> {
        match self {
            ToolchainStatus::Ready(state) => Some(state),
            _ => None,
        }
    }
}

impl fmt::Display for ToolchainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolchainStatus::Ready(state) => {
                write!(f, "{} ({})", state.version, state.path.display())
            }
            ToolchainStatus::Disabled => f.write_str("disabled"),
            ToolchainStatus::Unavailable(reason) => write!(f, "unavailable: {reason}"),
        }
    }
}

/// Status of both components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainReport {
    pub zig: ToolchainStatus,
    pub zls: ToolchainStatus,
}

#[derive(Debug)]
pub struct ToolchainContext {
    paths: ToolchainPaths,
    platform: Platform,
    workspace: Option<PathBuf>,
    state: Arc<StateStore>,
    settings: Arc<SettingsStore>,
    catalog: ReleaseCatalog,
    zls_selector: ZlsVersionSelector,
    resolver: VersionResolver,
    installer: InstallManager,
    zig_config: Arc<InstallConfig>,
    zls_config: Arc<InstallConfig>,
    zig: Arc<ToolchainProvider>,
    zls: Arc<ToolchainProvider>,
}

impl ToolchainContext {
    /// Builds the context and creates the home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be created, the user
    /// settings file is invalid or the HTTP client cannot be built.
    pub fn new(options: ContextOptions) -> Result<Self> {
        let ContextOptions {
            paths,
            platform,
            workspace,
            zig_index,
            supplementary_indexes,
            zls_api,
            urls,
            keys,
            query_timeout,
            search_path,
        } = options;

        paths.ensure_directories()?;
        let client = http_client()?;
        let state = Arc::new(StateStore::open(paths.state_file()));
        let settings = Arc::new(SettingsStore::load(
            paths.settings_file(),
            workspace.as_deref(),
        )?);
        let effective = settings.effective();

        let mut sources = vec![IndexSource::canonical(zig_index)];
        sources.extend(supplementary_indexes);
        let catalog = ReleaseCatalog::new(client.clone(), sources, platform, Arc::clone(&state));
        let zls_selector = ZlsVersionSelector::new(client.clone(), zls_api, Arc::clone(&state));
        let resolver = VersionResolver::new(catalog.clone(), Arc::clone(&state), query_timeout)
            .with_search_path(search_path);
        let installer = InstallManager::new(
            client,
            paths.clone(),
            platform,
            Arc::clone(&state),
            query_timeout,
        );

        let mirrors = match parse_mirrors(effective.install.mirrors.as_deref().unwrap_or_default()) {
            Ok(mirrors) => mirrors,
            Err(e) => {
                warn!(error = %e, "ignoring configured mirrors");
                Vec::new()
            }
        };
        let max_installed = effective.max_installed();
        let zig_config = Arc::new(zig_config(&urls, &keys, mirrors, max_installed));
        let zls_config = Arc::new(zls_config(&urls, &keys, max_installed));

        let provider = |config: &InstallConfig, setting| {
            Arc::new(ToolchainProvider::new(
                config.exe_name.clone(),
                config.version_args.clone(),
                setting,
                Arc::clone(&settings),
                query_timeout,
            ))
        };
        let zig = provider(&zig_config, PersistedPath::ZigPath);
        let zls = provider(&zls_config, PersistedPath::ZlsPath);

        Ok(Self {
            paths,
            platform,
            workspace,
            state,
            settings,
            catalog,
            zls_selector,
            resolver,
            installer,
            zig_config,
            zls_config,
            zig,
            zls,
        })
    }

    #[must_use]
    pub fn paths(&self) -> &ToolchainPaths {
        &self.paths
    }

    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }

    #[must_use]
    pub fn workspace(&self) -> Option<&Path> {
        self.workspace.as_deref()
    }

    #[must_use]
    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    #[must_use]
    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    #[must_use]
    pub fn catalog(&self) -> &ReleaseCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn installer(&self) -> &InstallManager {
        &self.installer
    }

    #[must_use]
    pub fn zig_config(&self) -> &Arc<InstallConfig> {
        &self.zig_config
    }

    #[must_use]
    pub fn zls_config(&self) -> &Arc<InstallConfig> {
        &self.zls_config
    }

    #[must_use]
    pub fn zig(&self) -> &Arc<ToolchainProvider> {
        &self.zig
    }

    #[must_use]
    pub fn zls(&self) -> &Arc<ToolchainProvider> {
        &self.zls
    }

    /// Resolves the Zig version wanted for the workspace.
    pub async fn resolve_zig(&self, cancel: &CancellationToken) -> Option<Resolution> {
        let ctx = ResolveContext {
            workspace: self.workspace.clone(),
            override_version: None,
            settings: self.settings.effective(),
            cancel: cancel.clone(),
        };
        self.resolver.resolve(&ctx).await
    }

    /// Selects or installs Zig and then ZLS, updating both providers.
    ///
    /// Failures are reported in the returned statuses.
    pub async fn activate(&self, options: &InstallOptions) -> ToolchainReport {
        let settings = self.settings.effective();

        let zig = match self.activate_zig(&settings, options).await {
            Ok(state) => {
                self.zig.set(Some(state.clone()));
                ToolchainStatus::Ready(state)
            }
            Err(e) => {
                warn!(error = %e, "Zig is unavailable");
                self.zig.set(None);
                ToolchainStatus::Unavailable(e.to_string())
            }
        };

        let zls = if settings.zls_enabled() {
            match self.activate_zls(&settings, zig.state(), options).await {
                Ok(state) => {
                    self.zls.set(Some(state.clone()));
                    ToolchainStatus::Ready(state)
                }
                Err(e) => {
                    warn!(error = %e, "ZLS is unavailable");
                    self.zls.set(None);
                    ToolchainStatus::Unavailable(e.to_string())
                }
            }
        } else {
            self.zls.set(None);
            ToolchainStatus::Disabled
        };

        ToolchainReport { zig, zls }
    }

    async fn activate_zig(
        &self,
        settings: &Settings,
        options: &InstallOptions,
    ) -> Result<ToolchainState> {
        if let Some(path) = &settings.zig.path {
            return self.zig.probe(path).await;
        }
        let resolution = self
            .resolve_zig(&options.cancel)
            .await
            .ok_or_else(|| Error::config("no Zig version could be determined"))?;
        info!(version = %resolution.version, source = %resolution.source, "resolved Zig");
        let path = self
            .installer
            .install(&self.zig_config, &resolution.version, options.clone())
            .await?;
        Ok(ToolchainState {
            path,
            version: resolution.version,
        })
    }

    async fn activate_zls(
        &self,
        settings: &Settings,
        zig: Option<&ToolchainState>,
        options: &InstallOptions,
    ) -> Result<ToolchainState> {
        if let Some(path) = &settings.zls.path {
            return self.zls.probe(path).await;
        }
        let zig = zig.ok_or_else(|| Error::config("ZLS needs a working Zig"))?;
        self.install_zls_for(&zig.version, options).await
    }

    /// Installs the ZLS build matching `zig_version`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no ZLS build supports `zig_version`, or
    /// the selection or install error.
    pub async fn install_zls_for(
        &self,
        zig_version: &Version,
        options: &InstallOptions,
    ) -> Result<ToolchainState> {
        let version = self
            .zls_selector
            .select(zig_version, &options.cancel)
            .await?
            .ok_or_else(|| {
                Error::config(format!("no ZLS build is compatible with Zig {zig_version}"))
            })?;
        let path = self
            .installer
            .install(&self.zls_config, &version, options.clone())
            .await?;
        Ok(ToolchainState { path, version })
    }

    /// Installs a Zig version, makes it the configured version and selects it.
    ///
    /// Clears any explicit `zig.path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the version cannot be determined or installed, or
    /// if the settings cannot be saved.
    pub async fn install_zig(
        &self,
        request: &VersionRequest,
        options: &InstallOptions,
    ) -> Result<ToolchainState> {
        let version = match request {
            VersionRequest::Exact(version) => version.clone(),
            VersionRequest::Latest => {
                self.catalog
                    .latest_stable(&options.cancel)
                    .await?
                    .ok_or_else(|| Error::config("the release index lists no stable Zig"))?
                    .version
            }
            VersionRequest::Nightly => {
                self.catalog
                    .latest_nightly(&options.cancel)
                    .await?
                    .ok_or_else(|| Error::config("the release index lists no nightly Zig"))?
                    .version
            }
        };

        let path = self
            .installer
            .install(&self.zig_config, &version, options.clone())
            .await?;
        let value = version.to_string();
        self.settings.update(|settings| {
            settings.set("zig.version", &value)?;
            settings.unset("zig.path")
        })?;

        let state = ToolchainState { path, version };
        self.zig.set(Some(state.clone()));
        Ok(state)
    }

    /// Reports what activation would select, without downloading anything.
    pub async fn status(&self, cancel: &CancellationToken) -> ToolchainReport {
        let settings = self.settings.effective();

        let zig = match &settings.zig.path {
            Some(path) => probe_status(&self.zig, path).await,
            None => match self.resolve_zig(cancel).await {
                Some(resolution) => self.installed_status(&self.zig_config, &resolution.version),
                None => ToolchainStatus::Unavailable("no Zig version could be determined".into()),
            },
        };

        let zls = if !settings.zls_enabled() {
            ToolchainStatus::Disabled
        } else if let Some(path) = &settings.zls.path {
            probe_status(&self.zls, path).await
        } else if let Some(zig) = zig.state() {
            match self.zls_selector.select(&zig.version, cancel).await {
                Ok(Some(version)) => self.installed_status(&self.zls_config, &version),
                Ok(None) => ToolchainStatus::Unavailable(format!(
                    "no ZLS build is compatible with Zig {}",
                    zig.version
                )),
                Err(e) => ToolchainStatus::Unavailable(e.to_string()),
            }
        } else {
            ToolchainStatus::Unavailable("ZLS needs a working Zig".into())
        };

        ToolchainReport { zig, zls }
    }

    fn installed_status(&self, config: &InstallConfig, version: &Version) -> ToolchainStatus {
        let path = self
            .paths
            .executable_path(&config.exe_name, self.platform, version);
        if path.is_file() {
            ToolchainStatus::Ready(ToolchainState {
                path,
                version: version.clone(),
            })
        } else {
            ToolchainStatus::Unavailable(format!("{} {version} is not installed", config.title))
        }
    }
}

async fn probe_status(provider: &ToolchainProvider, path: &Path) -> ToolchainStatus {
    match provider.probe(path).await {
        Ok(state) => ToolchainStatus::Ready(state),
        Err(e) => ToolchainStatus::Unavailable(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_requests_parse() {
        assert_eq!("latest".parse::<VersionRequest>().ok(), Some(VersionRequest::Latest));
        assert_eq!("master".parse::<VersionRequest>().ok(), Some(VersionRequest::Nightly));
        assert_eq!(
            "v0.13.0".parse::<VersionRequest>().ok(),
            Some(VersionRequest::Exact(Version::new(0, 13, 0)))
        );
        assert!(matches!(
            "0.13".parse::<VersionRequest>(),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn status_display_is_human_readable() {
        let ready = ToolchainStatus::Ready(ToolchainState {
            path: PathBuf::from("/opt/zig/zig"),
            version: Version::new(0, 13, 0),
        });
        assert_eq!(ready.to_string(), "0.13.0 (/opt/zig/zig)");
        assert_eq!(ToolchainStatus::Disabled.to_string(), "disabled");
        assert_eq!(
            ToolchainStatus::Unavailable("offline".into()).to_string(),
            "unavailable: offline"
        );
    }
}
