//! Sources that can list, download and checksum plugin releases
//!
//! A [`Getter`] answers three kinds of request for a plugin requirement:
//! the release list, the release archive for one platform, and the checksum
//! manifest for one version. Getters are tried in order through a
//! [`GetterChain`]; a recoverable error from one hands the request to the
//! next.
//!
//! # Examples
//!
//! ```no_run
//! use packer_proxy_init::getter::{
//!     GetOptions, GetterChain, GithubProxyGetter, HttpClient, ReleasesGetter, RequestKind,
//! };
//! use packer_proxy_init::{detect_platform, ApiVersion, PluginRequirement};
//!
//! let http = HttpClient::new(None).unwrap();
//! let mut chain = GetterChain::new();
//! chain.push(Box::new(ReleasesGetter::new("releases", "https://releases.example/", http.clone())));
//! chain.push(Box::new(GithubProxyGetter::new(
//!     "github-proxy",
//!     "https://artifactory.example/GITHUB",
//!     http,
//! )));
//!
//! let req = PluginRequirement::parse("acme/packer-plugin-foo", "= 1.2.3").unwrap();
//! let platform = detect_platform(ApiVersion::default());
//! let opts = GetOptions::new(&req, &platform, None);
//! for getter in chain.iter() {
//!     if let Ok(body) = getter.get(RequestKind::Releases, &opts) {
//!         println!("{} answered", getter.name());
//!     }
//! }
//! ```

pub mod github_proxy;
pub mod http;
pub mod policy;
pub mod releases;

pub use github_proxy::GithubProxyGetter;
pub use http::HttpClient;
pub use policy::{ArtifactName, GithubFamilyPolicy, NamingPolicy};
pub use releases::ReleasesGetter;

use crate::checksum::{ChecksumAlgorithm, ChecksumFileEntry};
use crate::platform::Platform;
use crate::requirement::PluginRequirement;
use crate::{Error, Result};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;

/// What a caller wants from a getter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// JSON list of [`Release`]
    Releases,
    /// The raw zip archive for the requested version and platform
    Artifact,
    /// JSON list of [`ChecksumFileEntry`] for the requested version
    Checksums(ChecksumAlgorithm),
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Releases => f.write_str("releases"),
            RequestKind::Artifact => f.write_str("artifact"),
            RequestKind::Checksums(alg) => write!(f, "{} checksums", alg),
        }
    }
}

/// Everything a getter needs to build its URLs
#[derive(Debug, Clone, Copy)]
pub struct GetOptions<'a> {
    pub requirement: &'a PluginRequirement,
    pub platform: &'a Platform,
    /// Version picked by the resolver; unset while listing releases
    pub version: Option<&'a Version>,
}

impl<'a> GetOptions<'a> {
    pub fn new(
        requirement: &'a PluginRequirement,
        platform: &'a Platform,
        version: Option<&'a Version>,
    ) -> Self {
        Self {
            requirement,
            platform,
            version,
        }
    }

    pub fn version(&self) -> Result<&'a Version> {
        self.version.ok_or_else(|| {
            Error::Other(format!(
                "no version selected for {}",
                self.requirement.identifier()
            ))
        })
    }

    /// Selected version without a leading `v`
    pub fn version_string(&self) -> Result<String> {
        Ok(self.version()?.to_string())
    }

    /// Selected version as a release tag, e.g. `v1.2.3`
    pub fn version_tag(&self) -> Result<String> {
        Ok(format!("v{}", self.version()?))
    }

    /// Archive name the installer expects for the selected version
    pub fn expected_archive_name(&self) -> Result<String> {
        Ok(policy::archive_name(
            &self.requirement.filename_prefix(),
            &self.version_string()?,
            self.platform,
        ))
    }

    pub fn checksum_manifest_name(&self, algorithm: ChecksumAlgorithm) -> Result<String> {
        Ok(policy::checksum_manifest_name(
            &self.requirement.filename_prefix(),
            &self.version_string()?,
            algorithm,
        ))
    }
}

/// One entry of a release list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub version: String,
}

impl Release {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

/// Encode a release list the way getters return it
pub fn releases_stream(releases: &[Release]) -> Result<Box<dyn Read + Send>> {
    Ok(Box::new(std::io::Cursor::new(serde_json::to_vec(releases)?)))
}

/// Decode the JSON a getter returns for [`RequestKind::Releases`]
pub fn parse_releases<R: Read>(reader: R) -> Result<Vec<Release>> {
    serde_json::from_reader(reader)
        .map_err(|e| Error::Parse(format!("invalid release list: {}", e)))
}

/// A source of plugin releases
pub trait Getter: Send + Sync {
    /// Short name used in logs and error reports
    fn name(&self) -> &str;

    /// Serve one request as a fully downloaded body
    ///
    /// Failures while talking to the source, including a body cut short, are
    /// [`crate::Error::Transport`] naming the URL.
    fn get(&self, kind: RequestKind, opts: &GetOptions<'_>) -> Result<Box<dyn Read + Send>>;

    /// Naming rules for the artifacts this getter serves
    fn policy(&self) -> &dyn NamingPolicy;

    fn init(&self, req: &PluginRequirement, entry: &mut ChecksumFileEntry) -> Result<()> {
        self.policy().init(req, entry)
    }

    fn validate(
        &self,
        opts: &GetOptions<'_>,
        expected_version: &str,
        install: &Platform,
        entry: &ChecksumFileEntry,
    ) -> Result<()> {
        self.policy().validate(opts, expected_version, install, entry)
    }

    fn expected_file_name(
        &self,
        req: &PluginRequirement,
        version: &str,
        entry: &ChecksumFileEntry,
        archive_name: &str,
    ) -> String {
        self.policy()
            .expected_file_name(req, version, entry, archive_name)
    }
}

/// Getters in the order they are consulted
#[derive(Default)]
pub struct GetterChain {
    getters: Vec<Box<dyn Getter>>,
}

impl GetterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, getter: Box<dyn Getter>) {
        self.getters.push(getter);
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Getter> {
        self.getters.iter().map(|g| g.as_ref())
    }

    pub fn len(&self) -> usize {
        self.getters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.getters.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.getters.iter().map(|g| g.name()).collect()
    }
}

impl fmt::Debug for GetterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
