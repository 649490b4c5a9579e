//! Host platform detection.
//!
//! Zig release manifests key their artifacts by `<arch>-<os>` (for example
//! `x86_64-linux` or `aarch64-macos`). [`Platform`] maps the host onto that
//! naming and knows the archive and executable conventions for each OS.
//!
//! ## Supported Platforms
//!
//! - Linux, macOS, Windows, FreeBSD and NetBSD
//! - `x86_64`, `aarch64`, `x86`, `armv7a`, `riscv64`, `powerpc64le`, `loongarch64`

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Operating systems with published Zig builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Linux,
    Macos,
    Windows,
    FreeBsd,
    NetBsd,
}

impl Os {
    /// Name used in Zig artifact names.
    #[must_use = "returns the OS string without side effects"]
    pub fn as_str(self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::Macos => "macos",
            Os::Windows => "windows",
            Os::FreeBsd => "freebsd",
            Os::NetBsd => "netbsd",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "linux" => Some(Os::Linux),
            "macos" => Some(Os::Macos),
            "windows" => Some(Os::Windows),
            "freebsd" => Some(Os::FreeBsd),
            "netbsd" => Some(Os::NetBsd),
            _ => None,
        }
    }
}

/// CPU architectures with published Zig builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
    Aarch64,
    X86,
    Armv7a,
    Riscv64,
    Powerpc64le,
    Loongarch64,
}

impl Arch {
    /// Name used in Zig artifact names.
    #[must_use = "returns the architecture string without side effects"]
    pub fn as_str(self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
            Arch::X86 => "x86",
            Arch::Armv7a => "armv7a",
            Arch::Riscv64 => "riscv64",
            Arch::Powerpc64le => "powerpc64le",
            Arch::Loongarch64 => "loongarch64",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "x86_64" => Some(Arch::X86_64),
            "aarch64" => Some(Arch::Aarch64),
            "x86" => Some(Arch::X86),
            "armv7a" | "arm" => Some(Arch::Armv7a),
            "riscv64" => Some(Arch::Riscv64),
            "powerpc64le" | "powerpc64" => Some(Arch::Powerpc64le),
            "loongarch64" => Some(Arch::Loongarch64),
            _ => None,
        }
    }
}

/// An OS and architecture pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    #[must_use]
    pub const fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Detects the host platform.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if there are no Zig builds for the host.
    pub fn detect() -> Result<Self> {
        let os = Os::from_name(std::env::consts::OS);
        let arch = Arch::from_name(std::env::consts::ARCH);
        match (os, arch) {
            (Some(os), Some(arch)) => Ok(Self { os, arch }),
            _ => Err(Error::config(format!(
                "unsupported platform: {} on {}",
                std::env::consts::OS,
                std::env::consts::ARCH
            ))),
        }
    }

    /// Manifest key for this platform, e.g. `x86_64-linux`.
    #[must_use = "returns the platform key without side effects"]
    pub fn zig_name(self) -> String {
        format!("{}-{}", self.arch.as_str(), self.os.as_str())
    }

    /// Returns `.exe` on Windows and an empty string elsewhere.
    #[must_use = "returns the extension string without side effects"]
    pub fn executable_extension(self) -> &'static str {
        if self.is_windows() { ".exe" } else { "" }
    }

    /// Returns `.zip` on Windows and `.tar.xz` elsewhere.
    #[must_use = "returns the extension string without side effects"]
    pub fn archive_extension(self) -> &'static str {
        if self.is_windows() { ".zip" } else { ".tar.xz" }
    }

    /// Returns the executable file name for `exe_name` on this platform.
    #[must_use]
    pub fn executable_name(self, exe_name: &str) -> String {
        format!("{exe_name}{}", self.executable_extension())
    }

    #[must_use = "returns platform check result without side effects"]
    pub fn is_windows(self) -> bool {
        self.os == Os::Windows
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.arch.as_str(), self.os.as_str())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (arch, os) = s
            .split_once('-')
            .ok_or_else(|| Error::config(format!("invalid platform `{s}`, expected <arch>-<os>")))?;
        match (Arch::from_name(arch), Os::from_name(os)) {
            (Some(arch), Some(os)) => Ok(Self { os, arch }),
            _ => Err(Error::config(format!("unsupported platform `{s}`"))),
        }
    }
}
