//! Platform detection and plugin protocol versions
//!
//! Plugin archives and binaries are named after the platform they were
//! built for, using Go's `GOOS`/`GOARCH` vocabulary (`darwin`, `amd64`, ...),
//! and after the plugin API ("protocol") version they speak, written `x5.0`.
//!
//! # Examples
//!
//! ```
//! use packer_proxy_init::{detect_platform, ApiVersion};
//!
//! let platform = detect_platform("5.0".parse().unwrap());
//! println!("Platform: {}", platform); // "linux_amd64", "darwin_arm64", ...
//!
//! let host: ApiVersion = "5.0".parse().unwrap();
//! assert!(ApiVersion::new(5, Some(0)).is_compatible_with(&host));
//! assert!(!ApiVersion::new(4, None).is_compatible_with(&host));
//! ```

use crate::{Error, Result};
use std::env;
use std::fmt;
use std::str::FromStr;

/// Plugin API version spoken by the build tool this crate provisions for
pub const HOST_API_VERSION: &str = "5.0";

/// Plugin API (protocol) version
///
/// The minor part is optional so that names written as `x5` stay exactly as
/// published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: Option<u32>,
}

impl ApiVersion {
    pub fn new(major: u32, minor: Option<u32>) -> Self {
        Self { major, minor }
    }

    /// Form used inside file names, e.g. `x5.0`
    pub fn tag(&self) -> String {
        format!("x{}", self)
    }

    /// Can a plugin speaking `self` be loaded by a host speaking `host`?
    ///
    /// Majors must match; a plugin minor may not exceed the host's.
    pub fn is_compatible_with(&self, host: &ApiVersion) -> bool {
        if self.major != host.major {
            return false;
        }
        match (self.minor, host.minor) {
            (Some(plugin), Some(host)) => plugin <= host,
            _ => true,
        }
    }
}

impl Default for ApiVersion {
    fn default() -> Self {
        Self::new(5, Some(0))
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.minor {
            Some(minor) => write!(f, "{}.{}", self.major, minor),
            None => write!(f, "{}", self.major),
        }
    }
}

impl FromStr for ApiVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix('x').unwrap_or(trimmed);
        let invalid = || Error::Parse(format!("invalid plugin API version '{}'", s));

        let (major, minor) = match digits.split_once('.') {
            Some((major, minor)) => (major, Some(minor)),
            None => (digits, None),
        };
        let major = major.parse::<u32>().map_err(|_| invalid())?;
        let minor = minor
            .map(|m| m.parse::<u32>().map_err(|_| invalid()))
            .transpose()?;

        Ok(Self { major, minor })
    }
}

/// What an installed binary must match to be usable on this host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
    pub api_version: ApiVersion,
    /// Executable extension (`.exe` on Windows, empty elsewhere)
    pub ext: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>, api_version: ApiVersion) -> Self {
        let os = os.into();
        let ext = if os == "windows" { ".exe" } else { "" }.to_string();
        Self {
            os,
            arch: arch.into(),
            api_version,
            ext,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.os, self.arch)
    }
}

/// Detect the current platform in release-artifact vocabulary
pub fn detect_platform(api_version: ApiVersion) -> Platform {
    Platform::new(go_os(env::consts::OS), go_arch(env::consts::ARCH), api_version)
}

/// Map a Rust target OS name to its Go equivalent
pub fn go_os(os: &str) -> String {
    match os {
        "macos" => "darwin".to_string(),
        other => other.to_string(),
    }
}

/// Map a Rust target architecture name to its Go equivalent
pub fn go_arch(arch: &str) -> String {
    match arch {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        "powerpc64" => "ppc64",
        "powerpc" => "ppc",
        other => other,
    }
    .to_string()
}
