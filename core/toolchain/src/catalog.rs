//! Release catalog: Zig version manifests and the ZLS compatibility API.
//!
//! The canonical index at `ziglang.org` lists tagged releases plus the
//! current `master` nightly. Supplementary indexes (the Mach nominated
//! versions by default) add community-curated versions. Both share the same
//! JSON shape:
//!
//! ```json
//! {
//!   "0.13.0": {
//!     "notes": "https://ziglang.org/download/0.13.0/release-notes.html",
//!     "x86_64-linux": { "tarball": "...", "shasum": "...", "size": "47082308" }
//!   },
//!   "master": { "version": "0.14.0-dev.1+abc", "x86_64-linux": { ... } }
//! }
//! ```
//!
//! Every successful fetch is stored as a snapshot in the [`StateStore`]; an
//! unreachable source falls back to its snapshot regardless of age.

use std::sync::Arc;

use reqwest::{Client, Url};
use semver::{Version, VersionReq};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::download::fetch_json;
use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::state::StateStore;

/// Canonical Zig release index.
pub const ZIG_INDEX_URL: &str = "https://ziglang.org/download/index.json";

/// Mach nominated Zig versions.
pub const MACH_INDEX_URL: &str = "https://machengine.org/zig/index.json";

/// Base URL of the ZLS release API.
pub const ZLS_API_URL: &str = "https://releases.zigtools.org/";

/// Snapshot purpose under which the latest stable version is cached.
pub const LATEST_STABLE_PURPOSE: &str = "zig-latest-stable";

/// Release stream a version belongs to. Declaration order is sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseChannel {
    Stable,
    Nightly,
    /// Versions nominated by a supplementary index.
    Nominated,
}

/// One installable version for the host platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionRecord {
    /// Human label such as `master` or `2024.11.0-mach`.
    pub name: Option<String>,
    pub version: Version,
    pub download_url: String,
    pub shasum: String,
    pub size: Option<u64>,
    pub notes: Option<String>,
    pub channel: ReleaseChannel,
    /// The entry the source marks as the head of its channel.
    pub latest_of_channel: bool,
}

impl VersionRecord {
    /// Applies metadata from a supplementary record for the same version.
    fn overlay(&mut self, other: VersionRecord) {
        // A "latest" alias never replaces a concrete label.
        if !other.latest_of_channel || self.name.is_none() {
            self.name = other.name.or(self.name.take());
        }
        self.notes = other.notes.or(self.notes.take());
        if self.channel == other.channel {
            self.latest_of_channel |= other.latest_of_channel;
        }
    }
}

/// How entries of an index are classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Tagged releases are stable, pre-releases nightly, `master` is latest.
    Canonical,
    /// Every entry is nominated; keys ending in `latest` head the channel.
    Nominated,
}

/// A manifest endpoint.
#[derive(Debug, Clone)]
pub struct IndexSource {
    pub url: Url,
    /// Snapshot key in the state store.
    pub purpose: String,
    pub kind: SourceKind,
}

impl IndexSource {
    #[must_use]
    pub fn canonical(url: Url) -> Self {
        Self {
            url,
            purpose: "zig-index".to_string(),
            kind: SourceKind::Canonical,
        }
    }

    #[must_use]
    pub fn nominated(url: Url, purpose: impl Into<String>) -> Self {
        Self {
            url,
            purpose: purpose.into(),
            kind: SourceKind::Nominated,
        }
    }
}

/// Parses one index document into records for `platform`.
///
/// Entries without an artifact for `platform` or with an unparsable version
/// are skipped.
///
/// # Errors
///
/// Returns [`Error::Format`] if the document is not a JSON object.
pub fn parse_index(body: &Value, kind: SourceKind, platform: Platform) -> Result<Vec<VersionRecord>> {
    let entries = body
        .as_object()
        .ok_or_else(|| Error::format("version index", "expected a JSON object"))?;
    let host = platform.zig_name();

    let mut records = Vec::new();
    for (key, entry) in entries {
        let Some(artifact) = entry.get(&host) else {
            continue;
        };
        let (Some(tarball), Some(shasum)) = (
            artifact.get("tarball").and_then(Value::as_str),
            artifact.get("shasum").and_then(Value::as_str),
        ) else {
            debug!(key, "index entry has an incomplete artifact");
            continue;
        };
        let raw_version = entry.get("version").and_then(Value::as_str).unwrap_or(key);
        let Ok(version) = Version::parse(raw_version) else {
            debug!(key, raw_version, "skipping index entry with invalid version");
            continue;
        };
        let size = match artifact.get("size") {
            Some(Value::String(s)) => s.parse().ok(),
            Some(Value::Number(n)) => n.as_u64(),
            _ => None,
        };

        let (channel, latest_of_channel, name) = match kind {
            SourceKind::Canonical => {
                let channel = if version.pre.is_empty() {
                    ReleaseChannel::Stable
                } else {
                    ReleaseChannel::Nightly
                };
                let name = (key != raw_version).then(|| key.clone());
                (channel, key == "master", name)
            }
            SourceKind::Nominated => (
                ReleaseChannel::Nominated,
                key.ends_with("latest"),
                Some(key.clone()),
            ),
        };

        records.push(VersionRecord {
            name,
            version,
            download_url: tarball.to_string(),
            shasum: shasum.to_string(),
            size,
            notes: entry.get("notes").and_then(Value::as_str).map(str::to_string),
            channel,
            latest_of_channel,
        });
    }
    Ok(records)
}

/// Merges `extra` into `records` by version, overlaying metadata on duplicates.
pub fn merge_records(records: &mut Vec<VersionRecord>, extra: Vec<VersionRecord>) {
    for record in extra {
        if let Some(existing) = records.iter_mut().find(|r| r.version == record.version) {
            existing.overlay(record);
        } else {
            records.push(record);
        }
    }
}

/// Orders records by channel, then latest-of-channel, then descending version.
pub fn sort_records(records: &mut [VersionRecord]) {
    records.sort_by(|a, b| {
        a.channel
            .cmp(&b.channel)
            .then(b.latest_of_channel.cmp(&a.latest_of_channel))
            .then_with(|| b.version.cmp(&a.version))
    });
}

/// Fetches and merges the configured indexes.
#[derive(Debug, Clone)]
pub struct ReleaseCatalog {
    client: Client,
    sources: Vec<IndexSource>,
    platform: Platform,
    state: Arc<StateStore>,
}

impl ReleaseCatalog {
    #[must_use]
    pub fn new(
        client: Client,
        sources: Vec<IndexSource>,
        platform: Platform,
        state: Arc<StateStore>,
    ) -> Self {
        Self {
            client,
            sources,
            platform,
            state,
        }
    }

    /// All versions available for the host, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if no source is reachable and none has a
    /// snapshot, or [`Error::Cancelled`].
    pub async fn fetch_versions(&self, cancel: &CancellationToken) -> Result<Vec<VersionRecord>> {
        let mut records: Vec<VersionRecord> = Vec::new();
        let mut any_source = false;

        for source in &self.sources {
            let Some(parsed) = self.load_source(source, cancel).await? else {
                continue;
            };
            any_source = true;
            merge_records(&mut records, parsed);
        }

        if !any_source {
            let url = self
                .sources
                .first()
                .map_or_else(|| "<no sources>".to_string(), |s| s.url.to_string());
            return Err(Error::network(
                url,
                "no version index reachable and no cached snapshot",
            ));
        }
        sort_records(&mut records);
        Ok(records)
    }

    async fn load_source(
        &self,
        source: &IndexSource,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<VersionRecord>>> {
        match fetch_json(&self.client, &source.url, cancel).await {
            Ok(body) => match parse_index(&body, source.kind, self.platform) {
                Ok(records) => {
                    self.state.store_snapshot(&source.purpose, body);
                    return Ok(Some(records));
                }
                Err(e) => warn!(url = %source.url, error = %e, "version index is malformed"),
            },
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => warn!(url = %source.url, error = %e, "version index unreachable"),
        }

        let Some(snapshot) = self.state.snapshot(&source.purpose) else {
            return Ok(None);
        };
        info!(purpose = %source.purpose, "using cached version index");
        match parse_index(&snapshot.body, source.kind, self.platform) {
            Ok(records) => Ok(Some(records)),
            Err(e) => {
                warn!(purpose = %source.purpose, error = %e, "cached version index is malformed");
                Ok(None)
            }
        }
    }

    /// The newest stable release.
    ///
    /// # Errors
    ///
    /// Propagates [`ReleaseCatalog::fetch_versions`] errors.
    pub async fn latest_stable(&self, cancel: &CancellationToken) -> Result<Option<VersionRecord>> {
        let records = self.fetch_versions(cancel).await?;
        Ok(records
            .into_iter()
            .filter(|r| r.channel == ReleaseChannel::Stable)
            .max_by(|a, b| a.version.cmp(&b.version)))
    }

    /// The record for exactly `version`.
    ///
    /// # Errors
    ///
    /// Propagates [`ReleaseCatalog::fetch_versions`] errors.
    pub async fn find(
        &self,
        version: &Version,
        cancel: &CancellationToken,
    ) -> Result<Option<VersionRecord>> {
        let records = self.fetch_versions(cancel).await?;
        Ok(records.into_iter().find(|r| &r.version == version))
    }

    /// The current `master` nightly, if the canonical index lists one.
    ///
    /// # Errors
    ///
    /// Propagates [`ReleaseCatalog::fetch_versions`] errors.
    pub async fn latest_nightly(&self, cancel: &CancellationToken) -> Result<Option<VersionRecord>> {
        let records = self.fetch_versions(cancel).await?;
        Ok(records
            .into_iter()
            .find(|r| r.channel == ReleaseChannel::Nightly && r.latest_of_channel))
    }

    /// The highest listed version matching `req`.
    ///
    /// # Errors
    ///
    /// Propagates [`ReleaseCatalog::fetch_versions`] errors.
    pub async fn max_satisfying(
        &self,
        req: &VersionReq,
        cancel: &CancellationToken,
    ) -> Result<Option<Version>> {
        let records = self.fetch_versions(cancel).await?;
        Ok(records
            .into_iter()
            .map(|r| r.version)
            .filter(|v| req.matches(v))
            .max())
    }
}

/// Picks the ZLS build that matches a Zig version.
#[derive(Debug, Clone)]
pub struct ZlsVersionSelector {
    client: Client,
    api_base: Url,
    state: Arc<StateStore>,
}

impl ZlsVersionSelector {
    #[must_use]
    pub fn new(client: Client, api_base: Url, state: Arc<StateStore>) -> Self {
        Self {
            client,
            api_base,
            state,
        }
    }

    /// The ZLS version compatible with `zig_version`, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] when the API is unreachable and no answer
    /// for this Zig version is cached, and [`Error::Format`] for an
    /// unexpected response.
    pub async fn select(
        &self,
        zig_version: &Version,
        cancel: &CancellationToken,
    ) -> Result<Option<Version>> {
        let mut url = self
            .api_base
            .join("v1/zls/select-version")
            .map_err(|e| Error::config(format!("invalid ZLS API URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("zig_version", &zig_version.to_string())
            .append_pair("compatibility", "only-runtime");
        let purpose = format!("zls-select-version:{zig_version}");

        let body = match fetch_json(&self.client, &url, cancel).await {
            Ok(body) => {
                self.state.store_snapshot(&purpose, body.clone());
                body
            }
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                warn!(%url, error = %e, "ZLS release API unreachable");
                self.state.snapshot(&purpose).map(|s| s.body).ok_or(e)?
            }
        };

        if body.get("code").is_some() {
            let message = body.get("message").and_then(Value::as_str).unwrap_or("unknown");
            info!(%zig_version, message, "no compatible ZLS build");
            return Ok(None);
        }
        let raw = body
            .get("version")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::format("ZLS select-version response", "missing `version`"))?;
        Version::parse(raw)
            .map(Some)
            .map_err(|e| Error::format("ZLS version", e))
    }
}
