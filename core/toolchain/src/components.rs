//! Install configurations for Zig and ZLS.

use reqwest::Url;
use semver::Version;

use zigx_minisign::PublicKey;

use crate::error::{Error, Result};
use crate::install::{CanonicalSource, InstallConfig, Mirrors};
use crate::platform::Platform;

/// Public key that signs Zig release and nightly artifacts.
pub const ZIG_MINISIGN_KEY: &str = "RWSGOq2NVecA2UPNdBUZykf1CCb147pkmdtYxgb3Ti+JO/wCYvhbAb/U";

/// Public key that signs ZLS artifacts.
pub const ZLS_MINISIGN_KEY: &str = "RWR+9B91GBZ0zOjh6Lr17+zKf5BoSuFvrx2xSeDE57uIYvnKBGmMjOex";

pub const ZIG_DOWNLOAD_URL: &str = "https://ziglang.org/download/";
pub const ZIG_BUILDS_URL: &str = "https://ziglang.org/builds/";
pub const ZLS_DOWNLOAD_URL: &str = "https://builds.zigtools.org/";
pub const COMMUNITY_MIRRORS_URL: &str = "https://ziglang.org/download/community-mirrors.txt";

/// First Zig release whose artifacts are named `zig-<arch>-<os>-<version>`.
const ARCH_FIRST_ZIG: Version = Version::new(0, 14, 1);

/// Zig archive name. Releases before 0.14.1 put the OS first.
#[must_use]
pub fn zig_artifact_name(version: &Version, platform: Platform) -> String {
    let (arch, os) = (platform.arch.as_str(), platform.os.as_str());
    let triple = if *version >= ARCH_FIRST_ZIG {
        format!("{arch}-{os}")
    } else {
        format!("{os}-{arch}")
    };
    format!("zig-{triple}-{version}{}", platform.archive_extension())
}

/// ZLS archive name.
#[must_use]
pub fn zls_artifact_name(version: &Version, platform: Platform) -> String {
    format!(
        "zls-{}-{version}{}",
        platform.zig_name(),
        platform.archive_extension()
    )
}

/// Download endpoints of both components.
#[derive(Debug, Clone)]
pub struct ComponentUrls {
    pub zig_download: Url,
    pub zig_builds: Url,
    pub zls_download: Url,
    /// `None` disables the community mirror list.
    pub mirror_list: Option<Url>,
}

impl ComponentUrls {
    /// The official download hosts and community mirror list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a built-in URL fails to parse.
    pub fn official() -> Result<Self> {
        Ok(Self {
            zig_download: parse_url(ZIG_DOWNLOAD_URL)?,
            zig_builds: parse_url(ZIG_BUILDS_URL)?,
            zls_download: parse_url(ZLS_DOWNLOAD_URL)?,
            mirror_list: Some(parse_url(COMMUNITY_MIRRORS_URL)?),
        })
    }
}

/// Keys trusted for each component's artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentKeys {
    pub zig: PublicKey,
    pub zls: PublicKey,
}

impl ComponentKeys {
    /// The release signing keys.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Minisign`] if a built-in key is malformed.
    pub fn official() -> Result<Self> {
        Ok(Self {
            zig: ZIG_MINISIGN_KEY.parse()?,
            zls: ZLS_MINISIGN_KEY.parse()?,
        })
    }
}

pub(crate) fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| Error::config(format!("`{raw}` is not a URL: {e}")))
}

/// Parses the mirrors from the settings.
///
/// # Errors
///
/// Returns [`Error::Config`] for an entry that is not a URL.
pub fn parse_mirrors(raw: &[String]) -> Result<Vec<Url>> {
    raw.iter().map(|m| parse_url(m)).collect()
}

/// Install configuration for Zig.
#[must_use]
pub fn zig_config(
    urls: &ComponentUrls,
    keys: &ComponentKeys,
    mirrors: Vec<Url>,
    max_installed: usize,
) -> InstallConfig {
    InstallConfig {
        title: "Zig".to_string(),
        exe_name: "zig".to_string(),
        version_args: vec!["version".to_string()],
        minisign_key: keys.zig.clone(),
        canonical: CanonicalSource {
            release_base: urls.zig_download.clone(),
            nightly_base: urls.zig_builds.clone(),
            versioned_release_dirs: true,
        },
        mirrors: Mirrors {
            fixed: mirrors,
            list_url: urls.mirror_list.clone(),
        },
        artifact_name: zig_artifact_name,
        strip_components: 1,
        max_installed,
    }
}

/// Install configuration for ZLS. ZLS is only published on its own host.
#[must_use]
pub fn zls_config(urls: &ComponentUrls, keys: &ComponentKeys, max_installed: usize) -> InstallConfig {
    InstallConfig {
        title: "ZLS".to_string(),
        exe_name: "zls".to_string(),
        version_args: vec!["--version".to_string()],
        minisign_key: keys.zls.clone(),
        canonical: CanonicalSource {
            release_base: urls.zls_download.clone(),
            nightly_base: urls.zls_download.clone(),
            versioned_release_dirs: false,
        },
        mirrors: Mirrors::default(),
        artifact_name: zls_artifact_name,
        strip_components: 0,
        max_installed,
    }
}
