//! Signed, single-flight installs of versioned toolchain executables.
//!
//! An install tries every mirror in random order and then the canonical
//! source. Each attempt downloads the artifact and its `.minisig` file,
//! verifies the signature, extracts into a private staging directory,
//! checks that the executable reports the requested version and only then
//! renames the tree into place. A failed attempt never leaves anything at
//! the final location.
//!
//! Concurrent requests for the same executable and version share one
//! in-flight future, so every caller observes the same outcome.
//!
//! ## Layout
//!
//! ```text
//! installs/<exe>/<arch>-<os>-<version>/<exe>
//! installs/<exe>/.staging-<random>/       # removed after every attempt
//! ```
//!
//! Staging directories left behind by a killed process are swept by
//! eviction once they are older than a day.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use rand::seq::SliceRandom;
use reqwest::{Client, Url};
use semver::Version;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zigx_minisign::{PublicKey, Signature, verify_signature};

use crate::archive::{extract_archive, set_executable_permissions};
use crate::download::{ProgressReporter, download_file, fetch_bytes};
use crate::error::{AttemptFailure, Error, InstallError, InstallFailure, InstallStep, Result};
use crate::paths::{STAGING_PREFIX, ToolchainPaths};
use crate::platform::Platform;
use crate::process::query_version;
use crate::state::{AccessRecord, StateStore};

/// Query parameter identifying this client to community mirrors.
const MIRROR_SOURCE_QUERY: &str = "source=zigx";

/// Age after which a staging directory is assumed abandoned.
const STALE_STAGING_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Where the canonical artifacts of a component live.
#[derive(Debug, Clone)]
pub struct CanonicalSource {
    /// Base URL of tagged releases.
    pub release_base: Url,
    /// Base URL of pre-release builds.
    pub nightly_base: Url,
    /// Whether releases sit under a `<version>/` directory.
    pub versioned_release_dirs: bool,
}

impl CanonicalSource {
    /// The canonical URL of `artifact` for `version`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL cannot be built.
    pub fn artifact_url(&self, version: &Version, artifact: &str) -> Result<Url> {
        let joined = if !version.pre.is_empty() {
            base_url(&self.nightly_base).join(artifact)
        } else if self.versioned_release_dirs {
            base_url(&self.release_base).join(&format!("{version}/{artifact}"))
        } else {
            base_url(&self.release_base).join(artifact)
        };
        joined.map_err(|e| Error::config(format!("invalid artifact URL for {artifact}: {e}")))
    }
}

/// Mirrors tried before the canonical source.
#[derive(Debug, Clone, Default)]
pub struct Mirrors {
    /// Mirrors from the user's settings.
    pub fixed: Vec<Url>,
    /// Plain-text list of community mirrors, one URL per line.
    pub list_url: Option<Url>,
}

/// Everything the install manager needs to know about one component.
#[derive(Debug, Clone)]
pub struct InstallConfig {
    /// Display name, e.g. `Zig`.
    pub title: String,
    /// Executable name without platform extension.
    pub exe_name: String,
    /// Arguments that make the executable print its version.
    pub version_args: Vec<String>,
    pub minisign_key: PublicKey,
    pub canonical: CanonicalSource,
    pub mirrors: Mirrors,
    /// File name of the archive for a version and platform.
    pub artifact_name: fn(&Version, Platform) -> String,
    /// Leading path components dropped during extraction.
    pub strip_components: usize,
    /// Installs kept after eviction. Values below one act as one.
    pub max_installed: usize,
}

/// Per-call controls for an install.
///
/// Callers that join an install already in flight share the first caller's
/// options.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    pub cancel: CancellationToken,
    pub progress: ProgressReporter,
}

impl InstallOptions {
    #[must_use]
    pub fn with_progress(progress: ProgressReporter) -> Self {
        Self {
            cancel: CancellationToken::new(),
            progress,
        }
    }
}

/// One install found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledToolchain {
    pub platform: Platform,
    pub version: Version,
    /// The install directory.
    pub path: PathBuf,
    pub last_access: Option<AccessRecord>,
}

type InstallFuture = Shared<BoxFuture<'static, Result<PathBuf, InstallError>>>;

/// Installs toolchains under a [`ToolchainPaths`] root.
///
/// Cloning is cheap; clones share the in-flight map.
#[derive(Clone)]
pub struct InstallManager {
    inner: Arc<Inner>,
}

struct Inner {
    client: Client,
    paths: ToolchainPaths,
    platform: Platform,
    state: Arc<StateStore>,
    query_timeout: Duration,
    in_flight: Mutex<HashMap<String, InstallFuture>>,
}

impl fmt::Debug for InstallManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallManager")
            .field("installs", &self.inner.paths.installs)
            .field("platform", &self.inner.platform)
            .finish_non_exhaustive()
    }
}

impl InstallManager {
    #[must_use]
    pub fn new(
        client: Client,
        paths: ToolchainPaths,
        platform: Platform,
        state: Arc<StateStore>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                paths,
                platform,
                state,
                query_timeout,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Installs `version` of the component and returns the executable path.
    ///
    /// Returns immediately if the install already exists. A second call for
    /// the same executable and version while the first is running joins it.
    ///
    /// # Errors
    ///
    /// Returns an [`InstallError`] naming every source that was tried and the
    /// step at which it failed, or carrying [`InstallFailure::Cancelled`].
    pub async fn install(
        &self,
        config: &Arc<InstallConfig>,
        version: &Version,
        options: InstallOptions,
    ) -> Result<PathBuf, InstallError> {
        let key = format!("{}@{version}", config.exe_name);
        let future = {
            let mut in_flight = self.in_flight();
            if let Some(existing) = in_flight.get(&key) {
                debug!(%key, "joining in-flight install");
                existing.clone()
            } else {
                let manager = self.clone();
                let config = Arc::clone(config);
                let version = version.clone();
                let entry = key.clone();
                let future = async move {
                    let result = manager.run_install(config, &version, &options).await;
                    manager.in_flight().remove(&entry);
                    result
                }
                .boxed()
                .shared();
                in_flight.insert(key, future.clone());
                future
            }
        };
        future.await
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<String, InstallFuture>> {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_install(
        &self,
        config: Arc<InstallConfig>,
        version: &Version,
        options: &InstallOptions,
    ) -> Result<PathBuf, InstallError> {
        let fail = |failure| InstallError {
            title: config.title.clone(),
            version: version.clone(),
            failure,
        };
        let platform = self.inner.platform;
        let paths = &self.inner.paths;

        let exe_path = paths.executable_path(&config.exe_name, platform, version);
        if exe_path.is_file() {
            debug!(exe = %exe_path.display(), "already installed");
            self.inner
                .state
                .record_access(&access_key(&config.exe_name, platform, version));
            return Ok(exe_path);
        }
        if options.cancel.is_cancelled() {
            return Err(fail(InstallFailure::Cancelled));
        }

        let install_root = paths.install_root(&config.exe_name);
        tokio::fs::create_dir_all(&install_root)
            .await
            .map_err(|e| {
                fail(InstallFailure::Local {
                    step: InstallStep::Prepare,
                    message: format!("failed to create {}: {e}", install_root.display()),
                })
            })?;

        let artifact = (config.artifact_name)(version, platform);
        let sources = match self.sources(&config, version, &artifact, &options.cancel).await {
            Ok(sources) => sources,
            Err(Error::Cancelled) => return Err(fail(InstallFailure::Cancelled)),
            Err(e) => {
                return Err(fail(InstallFailure::Local {
                    step: InstallStep::Prepare,
                    message: e.to_string(),
                }));
            }
        };

        info!(title = %config.title, %version, sources = sources.len(), "installing");
        let mut attempts = Vec::new();
        for source in sources {
            match self.attempt(&config, version, &source, &artifact, options).await {
                Ok(path) => {
                    let key = access_key(&config.exe_name, platform, version);
                    self.evict_after_install(&config, key).await;
                    return Ok(path);
                }
                Err((_, Error::Cancelled)) => return Err(fail(InstallFailure::Cancelled)),
                Err((step, e)) => {
                    warn!(%source, %step, error = %e, "install attempt failed");
                    attempts.push(AttemptFailure {
                        source: source.to_string(),
                        step,
                        message: e.to_string(),
                    });
                }
            }
        }
        Err(fail(InstallFailure::Exhausted(attempts)))
    }

    /// Artifact URLs in the order they are tried: shuffled mirrors, then
    /// the canonical source.
    async fn sources(
        &self,
        config: &InstallConfig,
        version: &Version,
        artifact: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Url>> {
        let mut mirrors = config.mirrors.fixed.clone();
        if let Some(list_url) = &config.mirrors.list_url {
            match fetch_bytes(&self.inner.client, list_url, cancel).await {
                Ok(body) => mirrors.extend(parse_mirror_list(&String::from_utf8_lossy(&body))),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => warn!(url = %list_url, error = %e, "mirror list unreachable"),
            }
        }
        mirrors.shuffle(&mut rand::rng());

        let mut urls = mirrors
            .iter()
            .map(|mirror| mirror_artifact_url(mirror, artifact))
            .collect::<Result<Vec<_>>>()?;
        urls.push(config.canonical.artifact_url(version, artifact)?);
        Ok(urls)
    }

    async fn attempt(
        &self,
        config: &InstallConfig,
        version: &Version,
        url: &Url,
        artifact: &str,
        options: &InstallOptions,
    ) -> Result<PathBuf, (InstallStep, Error)> {
        let staging = self.inner.paths.staging_dir(&config.exe_name);
        let result = self
            .attempt_in(config, version, url, artifact, &staging, options)
            .await;
        if let Err(e) = tokio::fs::remove_dir_all(&staging).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(dir = %staging.display(), error = %e, "failed to remove staging directory");
        }
        result
    }

    async fn attempt_in(
        &self,
        config: &InstallConfig,
        version: &Version,
        url: &Url,
        artifact: &str,
        staging: &Path,
        options: &InstallOptions,
    ) -> Result<PathBuf, (InstallStep, Error)> {
        let InstallOptions { cancel, progress } = options;
        let client = &self.inner.client;
        let platform = self.inner.platform;
        let label = format!("{} {version}", config.title);

        tokio::fs::create_dir_all(staging).await.map_err(|e| {
            let context = format!("failed to create {}", staging.display());
            (InstallStep::Prepare, Error::io(context, e))
        })?;

        progress.report(None, format!("Fetching signature for {label}"));
        let signature_bytes = fetch_bytes(client, &signature_url(url), cancel)
            .await
            .map_err(at(InstallStep::FetchSignature))?;
        let signature = Signature::parse(&signature_bytes)
            .map_err(|e| (InstallStep::VerifySignature, Error::from(e)))?;

        let archive_path = staging.join(artifact);
        download_file(client, url, &archive_path, cancel, progress, &label)
            .await
            .map_err(at(InstallStep::Download))?;

        progress.report(None, format!("Verifying {label}"));
        let content = tokio::fs::read(&archive_path).await.map_err(|e| {
            let context = format!("failed to read {}", archive_path.display());
            (InstallStep::VerifySignature, Error::io(context, e))
        })?;
        if !verify_signature(&config.minisign_key, &signature, &content) {
            return Err((
                InstallStep::VerifySignature,
                Error::Verification {
                    message: format!("minisign signature does not match {artifact}"),
                },
            ));
        }
        drop(content);

        progress.report(None, format!("Extracting {label}"));
        let tree = staging.join("tree");
        let extraction = {
            let (archive, dest, token) = (archive_path.clone(), tree.clone(), cancel.clone());
            let strip = config.strip_components;
            tokio::task::spawn_blocking(move || extract_archive(&archive, &dest, strip, &token))
        };
        extraction
            .await
            .map_err(|e| {
                let source = std::io::Error::other(e);
                (InstallStep::Extract, Error::io("extraction task failed", source))
            })?
            .map_err(at(InstallStep::Extract))?;
        let _ = tokio::fs::remove_file(&archive_path).await;

        let staged_exe = tree.join(platform.executable_name(&config.exe_name));
        if !staged_exe.is_file() {
            return Err((
                InstallStep::Extract,
                Error::format(
                    "archive",
                    format!("{artifact} does not contain {}", config.exe_name),
                ),
            ));
        }
        set_executable_permissions(&staged_exe).map_err(at(InstallStep::Permissions))?;

        progress.report(None, format!("Validating {label}"));
        let reported = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            reported = query_version(&staged_exe, &config.version_args, self.inner.query_timeout) => reported,
        }
        .map_err(at(InstallStep::ValidateVersion))?;
        if reported != *version {
            return Err((
                InstallStep::ValidateVersion,
                Error::Verification {
                    message: format!("{} reports version {reported}, expected {version}", config.exe_name),
                },
            ));
        }

        if cancel.is_cancelled() {
            return Err((InstallStep::Finalize, Error::Cancelled));
        }
        let final_dir = self.inner.paths.install_dir(&config.exe_name, platform, version);
        if final_dir.exists() {
            tokio::fs::remove_dir_all(&final_dir).await.map_err(|e| {
                let context = format!("failed to replace {}", final_dir.display());
                (InstallStep::Finalize, Error::io(context, e))
            })?;
        }
        self.inner
            .state
            .record_access(&access_key(&config.exe_name, platform, version));
        tokio::fs::rename(&tree, &final_dir).await.map_err(|e| {
            let context = format!("failed to move install into {}", final_dir.display());
            (InstallStep::Finalize, Error::io(context, e))
        })?;

        progress.report(Some(100), format!("Installed {label}"));
        info!(%url, dir = %final_dir.display(), "installed");
        Ok(final_dir.join(platform.executable_name(&config.exe_name)))
    }

    async fn evict_after_install(&self, config: &Arc<InstallConfig>, installed: String) {
        let manager = self.clone();
        let config = Arc::clone(config);
        let evict = move || manager.evict_keeping(&config, Some(&installed));
        match tokio::task::spawn_blocking(evict).await {
            Ok(Ok(removed)) if !removed.is_empty() => {
                debug!(count = removed.len(), "evicted old installs");
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "eviction failed"),
            Err(e) => warn!(error = %e, "eviction task failed"),
        }
    }

    /// Removes installs beyond `config.max_installed`, least recently used
    /// first, along with any install that has no access record and any
    /// staging directory older than a day.
    ///
    /// At least one install is always kept. A directory that cannot be
    /// removed is logged and skipped.
    ///
    /// Returns the removed directories.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the install root cannot be listed.
    pub fn evict(&self, config: &InstallConfig) -> Result<Vec<PathBuf>> {
        self.evict_keeping(config, None)
    }

    /// [`evict`](Self::evict), never removing the install with access key
    /// `keep`.
    fn evict_keeping(&self, config: &InstallConfig, keep: Option<&str>) -> Result<Vec<PathBuf>> {
        let mut kept = Vec::new();
        let mut removed = Vec::new();

        for (name, path) in self.root_entries(&config.exe_name)? {
            if name.starts_with(STAGING_PREFIX) {
                if is_stale(&path) {
                    debug!(dir = %path.display(), "removing abandoned staging directory");
                    if remove_install(&path) {
                        removed.push(path);
                    }
                }
                continue;
            }
            let key = format!("{}-{name}", config.exe_name);
            if let Some(record) = self.inner.state.last_access(&key) {
                kept.push((record, path, key));
            } else if keep != Some(key.as_str()) {
                debug!(dir = %path.display(), "removing install without access record");
                if remove_install(&path) {
                    removed.push(path);
                }
            }
        }

        kept.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, path, key) in kept.into_iter().skip(config.max_installed.max(1)) {
            if keep == Some(key.as_str()) {
                continue;
            }
            debug!(dir = %path.display(), "evicting least recently used install");
            if remove_install(&path) {
                self.inner.state.forget_access(&key);
                removed.push(path);
            }
        }
        Ok(removed)
    }

    /// Installs of `exe_name` on disk, newest version first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the install root cannot be listed.
    pub fn installed(&self, exe_name: &str) -> Result<Vec<InstalledToolchain>> {
        let mut installs: Vec<InstalledToolchain> = self
            .install_dirs(exe_name)?
            .into_iter()
            .filter_map(|(name, path)| {
                let (platform, version) = parse_install_dir(&name)?;
                Some(InstalledToolchain {
                    last_access: self.inner.state.last_access(&format!("{exe_name}-{name}")),
                    platform,
                    version,
                    path,
                })
            })
            .collect();
        installs.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(installs)
    }

    fn install_dirs(&self, exe_name: &str) -> Result<Vec<(String, PathBuf)>> {
        let mut dirs = self.root_entries(exe_name)?;
        dirs.retain(|(name, _)| !name.starts_with(STAGING_PREFIX));
        Ok(dirs)
    }

    /// Every directory under the install root of `exe_name`, staging
    /// directories included.
    fn root_entries(&self, exe_name: &str) -> Result<Vec<(String, PathBuf)>> {
        let root = self.inner.paths.install_root(exe_name);
        let entries = match std::fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(format!("failed to list {}", root.display()), e)),
        };

        let mut dirs = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| Error::io(format!("failed to list {}", root.display()), e))?;
            let path = entry.path();
            if path.is_dir() {
                dirs.push((entry.file_name().to_string_lossy().into_owned(), path));
            }
        }
        Ok(dirs)
    }
}

fn at(step: InstallStep) -> impl Fn(Error) -> (InstallStep, Error) {
    move |e| (step, e)
}

fn is_stale(dir: &Path) -> bool {
    std::fs::metadata(dir)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age > STALE_STAGING_AGE)
}

fn remove_install(path: &Path) -> bool {
    match std::fs::remove_dir_all(path) {
        Ok(()) => true,
        Err(e) => {
            warn!(dir = %path.display(), error = %e, "failed to remove install");
            false
        }
    }
}

/// State key of an install, `<exe>-<arch>-<os>-<version>`.
#[must_use]
pub fn access_key(exe_name: &str, platform: Platform, version: &Version) -> String {
    format!(
        "{exe_name}-{}",
        ToolchainPaths::install_dir_name(platform, version)
    )
}

fn parse_install_dir(name: &str) -> Option<(Platform, Version)> {
    let mut parts = name.splitn(3, '-');
    let (arch, os, version) = (parts.next()?, parts.next()?, parts.next()?);
    let platform = format!("{arch}-{os}").parse().ok()?;
    let version = Version::parse(version).ok()?;
    Some((platform, version))
}

/// `url` with a trailing slash, so that joins append instead of replace.
fn base_url(url: &Url) -> Url {
    if url.path().ends_with('/') {
        return url.clone();
    }
    let mut url = url.clone();
    let path = format!("{}/", url.path());
    url.set_path(&path);
    url
}

/// Parses a mirror list: one URL per line, blank lines and `#` comments
/// ignored. Lines that are not URLs are skipped.
#[must_use]
pub fn parse_mirror_list(body: &str) -> Vec<Url> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match Url::parse(line) {
            Ok(url) => Some(url),
            Err(e) => {
                debug!(line, error = %e, "skipping mirror list entry");
                None
            }
        })
        .collect()
}

/// `<mirror>/<artifact>?source=zigx`.
///
/// # Errors
///
/// Returns [`Error::Config`] if the URL cannot be built.
pub fn mirror_artifact_url(mirror: &Url, artifact: &str) -> Result<Url> {
    let mut url = base_url(mirror)
        .join(artifact)
        .map_err(|e| Error::config(format!("invalid mirror URL {mirror}: {e}")))?;
    url.set_query(Some(MIRROR_SOURCE_QUERY));
    Ok(url)
}

/// The `.minisig` URL of an artifact URL. The query string is kept.
#[must_use]
pub fn signature_url(artifact_url: &Url) -> Url {
    let mut url = artifact_url.clone();
    let path = format!("{}.minisig", url.path());
    url.set_path(&path);
    url
}
