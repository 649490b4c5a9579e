//! Error types for toolchain management.
//!
//! [`Error`] is the crate-wide error. Installs report [`InstallError`], which
//! is `Clone` so that every caller joined on a single in-flight install can
//! receive the same outcome.

use std::fmt;
use std::path::PathBuf;

use semver::Version;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced while resolving, fetching, installing or running toolchains.
#[derive(Debug, Error)]
pub enum Error {
    /// A manifest, version string or other document could not be parsed.
    #[error("malformed {what}: {message}")]
    Format {
        /// What was being parsed.
        what: String,
        /// Description of the problem.
        message: String,
    },

    /// A minisign key or signature file could not be parsed.
    #[error("malformed minisign data: {0}")]
    Minisign(#[from] zigx_minisign::FormatError),

    /// A remote source could not be reached or answered with an error status.
    #[error("request to {url} failed: {message}")]
    Network {
        /// The URL that was requested.
        url: String,
        /// Description of the failure.
        message: String,
    },

    /// A signature or post-install version check did not match.
    #[error("verification failed: {message}")]
    Verification {
        /// Description of the mismatch.
        message: String,
    },

    /// An install failed after every source was tried.
    #[error(transparent)]
    Install(#[from] InstallError),

    /// A user-supplied path, version or setting is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid value.
        message: String,
    },

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// A subprocess could not be run or misbehaved.
    #[error("{program}: {message}")]
    Process {
        /// The executable that was run.
        program: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// Filesystem error.
    #[error("{context}")]
    Io {
        /// Description of the operation that failed.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn format(what: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::Format {
            what: what.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn network(url: impl fmt::Display, message: impl fmt::Display) -> Self {
        Error::Network {
            url: url.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Returns `true` for failures caused by an unreachable remote source.
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network { .. })
    }
}

/// A terminal install failure, naming every source and step that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to install {title} {version}: {failure}")]
pub struct InstallError {
    /// Display name of the component (`Zig`, `ZLS`).
    pub title: String,
    /// The version that was requested.
    pub version: Version,
    /// Why the install failed.
    pub failure: InstallFailure,
}

impl InstallError {
    /// Returns `true` if the install stopped because it was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.failure, InstallFailure::Cancelled)
    }
}

/// The cause carried by an [`InstallError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallFailure {
    /// The caller cancelled the install.
    Cancelled,
    /// A local step failed before any source could be tried.
    Local {
        /// The step that failed.
        step: InstallStep,
        /// Description of the failure.
        message: String,
    },
    /// Every mirror and the canonical source failed.
    Exhausted(Vec<AttemptFailure>),
}

impl fmt::Display for InstallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallFailure::Cancelled => f.write_str("cancelled"),
            InstallFailure::Local { step, message } => write!(f, "{step} failed: {message}"),
            InstallFailure::Exhausted(attempts) => {
                write!(f, "all {} sources failed", attempts.len())?;
                for attempt in attempts {
                    write!(f, "\n  - {attempt}")?;
                }
                Ok(())
            }
        }
    }
}

/// One failed attempt against one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    /// The artifact URL that was tried.
    pub source: String,
    /// The step that failed.
    pub step: InstallStep,
    /// Description of the failure.
    pub message: String,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.source, self.step, self.message)
    }
}

/// Steps of an install attempt, used to name where a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallStep {
    /// Creating the install directories.
    Prepare,
    /// Fetching the `.minisig` file.
    FetchSignature,
    /// Downloading the artifact.
    Download,
    /// Checking the minisign signature.
    VerifySignature,
    /// Unpacking the archive.
    Extract,
    /// Setting executable permission bits.
    Permissions,
    /// Running the installed executable's version query.
    ValidateVersion,
    /// Moving the staged tree into place.
    Finalize,
}

impl fmt::Display for InstallStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstallStep::Prepare => "prepare",
            InstallStep::FetchSignature => "signature fetch",
            InstallStep::Download => "download",
            InstallStep::VerifySignature => "signature verification",
            InstallStep::Extract => "extraction",
            InstallStep::Permissions => "permission fix-up",
            InstallStep::ValidateVersion => "version validation",
            InstallStep::Finalize => "finalize",
        };
        f.write_str(name)
    }
}
