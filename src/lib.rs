//! packer-proxy-init - Installs Packer plugins through release mirrors and
//! GitHub artifact proxies
//!
//! Build hosts that cannot reach GitHub or the official release site still
//! need the plugins their templates declare. This crate resolves each
//! `required_plugins` entry against an ordered chain of sources, downloads the
//! release archive, verifies it against the published checksums, and installs
//! the plugin binary where the build tool looks for it:
//!
//! - Ordered getter chain with fallthrough on network and constraint failures
//! - Exact-version pinning for proxies that cannot list releases
//! - SHA-256 verification of every archive before anything is written
//! - Atomic installs with a checksum file next to each binary
//!
//! # Examples
//!
//! ```no_run
//! use packer_proxy_init::{detect_platform, manifest, Config, Installer};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = Config::load(None)?;
//! config.validate()?;
//!
//! let requirements = manifest::load_requirements(Path::new("."))?;
//! let installer = Installer::new(
//!     config.install_options()?,
//!     detect_platform(config.api_version()?),
//!     config.getter_chain()?,
//! );
//!
//! let report = installer.install_all(&requirements);
//! println!("{} installed", report.installed().count());
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`requirement`] - Plugin identifiers and version constraints
//! - [`getter`] - Sources that list, download and checksum releases
//! - [`resolver`] - Pick the version to install
//! - [`checksum`] - Checksum manifests and digest verification
//! - [`installer`] - Fetch, verify and install; find existing installations
//! - [`manifest`] - Read `required_plugins` from build templates
//! - [`bootstrap`] - Copy pre-staged plugins into the plugin directory
//! - [`platform`] - Platform detection and plugin API versions
//! - [`config`] - Settings from file, environment and flags
//! - [`error`] - Error types and result handling

pub mod bootstrap;
pub mod checksum;
pub mod config;
pub mod error;
pub mod getter;
pub mod installer;
pub mod manifest;
pub mod platform;
pub mod requirement;
pub mod resolver;

pub use checksum::{ChecksumAlgorithm, ChecksumFileEntry, ChecksumManifest};
pub use config::Config;
pub use error::{Error, Result};
pub use getter::{GetOptions, Getter, GetterChain, Release, RequestKind};
pub use installer::{
    list_installations, InstallFailure, InstallOptions, InstallOutcome, Installation, Installer,
    RunReport, Stage,
};
pub use platform::{detect_platform, ApiVersion, Platform};
pub use requirement::{PluginRequirement, PluginSource, VersionConstraints};
pub use resolver::{find_matching_version, resolve_version};
