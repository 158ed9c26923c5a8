//! Plugin installation and on-disk discovery
//!
//! For each requirement the installer walks a fixed sequence of stages:
//! look for an existing installation, resolve a version, fetch the archive,
//! verify it against the published checksums, and write the binary.
//! Installed binaries live under
//! `<plugin dir>/<host>/<owner>/<name>/` next to a `<binary>_SHA256SUM` file;
//! a binary without a matching checksum file is not considered installed.
//!
//! # Examples
//!
//! ```no_run
//! use packer_proxy_init::getter::{GetterChain, GithubProxyGetter, HttpClient};
//! use packer_proxy_init::{detect_platform, ApiVersion, InstallOptions, Installer, PluginRequirement};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut chain = GetterChain::new();
//! chain.push(Box::new(GithubProxyGetter::new(
//!     "github-proxy",
//!     "https://artifactory.example/GITHUB",
//!     HttpClient::new(None)?,
//! )));
//!
//! let options = InstallOptions::new("/home/me/.config/packer/plugins");
//! let installer = Installer::new(options, detect_platform(ApiVersion::default()), chain);
//!
//! let req = PluginRequirement::parse("acme/packer-plugin-foo", "= 1.2.3")?;
//! let report = installer.install_all(&[req]);
//! std::process::exit(report.exit_code());
//! # }
//! ```

use crate::checksum::{
    parse_checksum_entries, verify_digest, ChecksumAlgorithm, ChecksumFileEntry, ChecksumManifest,
};
use crate::getter::{ArtifactName, GetOptions, Getter, GetterChain, RequestKind};
use crate::platform::Platform;
use crate::requirement::{parse_version_lenient, PluginRequirement};
use crate::resolver::resolve_version;
use crate::{Error, Result};
use semver::Version;
use std::fmt;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

/// Algorithm of the checksum file stored next to each installed binary
pub const SIDECAR_ALGORITHM: ChecksumAlgorithm = ChecksumAlgorithm::Sha256;

/// A plugin binary found on disk with a matching checksum file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installation {
    pub binary_path: PathBuf,
    pub version: Version,
    /// Digest of the binary, as recorded in its checksum file
    pub checksum: String,
}

#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Reinstall even when a matching installation exists
    pub force: bool,
    pub plugin_directory: PathBuf,
    /// Digest algorithms every download is verified with
    pub checksum_algorithms: Vec<ChecksumAlgorithm>,
}

impl InstallOptions {
    pub fn new(plugin_directory: impl Into<PathBuf>) -> Self {
        Self {
            force: false,
            plugin_directory: plugin_directory.into(),
            checksum_algorithms: vec![ChecksumAlgorithm::Sha256],
        }
    }
}

/// Where a requirement is in its installation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CheckExisting,
    Resolve,
    Fetch,
    Verify,
    Install,
    Done,
    Skip,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::CheckExisting => "check-existing",
            Stage::Resolve => "resolve",
            Stage::Fetch => "fetch",
            Stage::Verify => "verify",
            Stage::Install => "install",
            Stage::Done => "done",
            Stage::Skip => "skip",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum InstallOutcome {
    /// Matching installations already existed
    Skipped(Vec<Installation>),
    Installed {
        installation: Installation,
        /// Name of the getter that served the archive
        source: String,
    },
}

/// Why one requirement could not be installed
#[derive(Debug)]
pub struct InstallFailure {
    pub identifier: String,
    pub stage: Stage,
    pub error: Error,
}

impl fmt::Display for InstallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} failed: {}",
            self.identifier, self.stage, self.error
        )
    }
}

impl std::error::Error for InstallFailure {}

/// Results of one run over every requirement, in declaration order
#[derive(Debug, Default)]
pub struct RunReport {
    pub results: Vec<(String, std::result::Result<InstallOutcome, InstallFailure>)>,
}

impl RunReport {
    pub fn installed(&self) -> impl Iterator<Item = &Installation> {
        self.results.iter().filter_map(|(_, result)| match result {
            Ok(InstallOutcome::Installed { installation, .. }) => Some(installation),
            _ => None,
        })
    }

    pub fn skipped_count(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, result)| matches!(result, Ok(InstallOutcome::Skipped(_))))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &InstallFailure> {
        self.results.iter().filter_map(|(_, result)| result.as_ref().err())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn exit_code(&self) -> i32 {
        if self.has_failures() {
            1
        } else {
            0
        }
    }
}

/// Archive that passed verification, with the binary pulled out of it
struct VerifiedArtifact {
    source: String,
    binary_name: String,
    binary: Vec<u8>,
}

pub struct Installer {
    options: InstallOptions,
    platform: Platform,
    getters: GetterChain,
}

impl Installer {
    pub fn new(options: InstallOptions, platform: Platform, getters: GetterChain) -> Self {
        Self {
            options,
            platform,
            getters,
        }
    }

    pub fn options(&self) -> &InstallOptions {
        &self.options
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn list_installations(&self, req: &PluginRequirement) -> Result<Vec<Installation>> {
        list_installations(&self.options.plugin_directory, req, &self.platform)
    }

    /// Install every requirement; one failure does not stop the others
    pub fn install_all(&self, requirements: &[PluginRequirement]) -> RunReport {
        let mut report = RunReport::default();

        for req in requirements {
            let result = self.install(req);
            match &result {
                Ok(InstallOutcome::Installed { installation, source }) => {
                    tracing::info!(
                        source = %source,
                        "Installed plugin {} {} in {:?}",
                        req.identifier(),
                        installation.version,
                        installation.binary_path
                    );
                }
                Ok(InstallOutcome::Skipped(existing)) => {
                    let versions: Vec<String> =
                        existing.iter().map(|i| i.version.to_string()).collect();
                    tracing::info!(
                        "Plugin {} already installed ({})",
                        req.identifier(),
                        versions.join(", ")
                    );
                }
                Err(failure) => {
                    tracing::error!(stage = %failure.stage, "{}", failure);
                }
            }
            report.results.push((req.identifier(), result));
        }

        report
    }

    /// Run one requirement through every stage
    pub fn install(
        &self,
        req: &PluginRequirement,
    ) -> std::result::Result<InstallOutcome, InstallFailure> {
        let plugin = req.identifier();
        let fail = |stage: Stage, error: Error| InstallFailure {
            identifier: plugin.clone(),
            stage,
            error,
        };

        tracing::debug!(plugin = %plugin, stage = %Stage::CheckExisting, "looking for installed binaries");
        let existing = self
            .list_installations(req)
            .map_err(|e| fail(Stage::CheckExisting, e))?;
        if !existing.is_empty() && !self.options.force {
            tracing::debug!(plugin = %plugin, stage = %Stage::Skip, count = existing.len(), "nothing to do");
            return Ok(InstallOutcome::Skipped(existing));
        }

        tracing::debug!(plugin = %plugin, stage = %Stage::Resolve, constraints = %req.constraints, "resolving version");
        let version = resolve_version(req, &self.getters, &self.platform)
            .map_err(|e| fail(Stage::Resolve, e))?;

        let artifact = self
            .fetch_verified(req, &version)
            .map_err(|(stage, e)| fail(stage, e))?;

        tracing::debug!(plugin = %plugin, stage = %Stage::Install, binary = %artifact.binary_name, "writing binary");
        let installation = self
            .write_binary(req, &version, &artifact)
            .map_err(|e| fail(Stage::Install, e))?;

        tracing::debug!(plugin = %plugin, stage = %Stage::Done, "installed");
        Ok(InstallOutcome::Installed {
            installation,
            source: artifact.source,
        })
    }

    /// Requirement preferences first, then any remaining configured algorithm
    fn verification_algorithms(&self, req: &PluginRequirement) -> Vec<ChecksumAlgorithm> {
        let configured = &self.options.checksum_algorithms;
        let mut algorithms: Vec<ChecksumAlgorithm> = req
            .checksum_algorithms
            .iter()
            .copied()
            .filter(|alg| configured.contains(alg))
            .collect();
        for alg in configured {
            if !algorithms.contains(alg) {
                algorithms.push(*alg);
            }
        }
        algorithms
    }

    /// Ask each getter in turn for a verified artifact
    ///
    /// Recoverable errors move on to the next getter; anything else ends the
    /// requirement.
    fn fetch_verified(
        &self,
        req: &PluginRequirement,
        version: &Version,
    ) -> std::result::Result<VerifiedArtifact, (Stage, Error)> {
        let algorithms = self.verification_algorithms(req);
        if algorithms.is_empty() {
            return Err((
                Stage::Verify,
                Error::Verification("no checksum algorithm configured".to_string()),
            ));
        }

        let mut attempts = Vec::new();
        for getter in self.getters.iter() {
            match self.attempt(getter, req, version, &algorithms) {
                Ok(artifact) => return Ok(artifact),
                Err((stage, e)) if e.is_recoverable() => {
                    tracing::warn!(
                        plugin = %req.identifier(),
                        source = getter.name(),
                        stage = %stage,
                        "{}, trying next source",
                        e
                    );
                    attempts.push(format!("{}: {}", getter.name(), e));
                }
                Err(fatal) => return Err(fatal),
            }
        }

        Err((
            Stage::Fetch,
            Error::ChainExhausted {
                what: format!("{} v{}", req.identifier(), version),
                attempts,
            },
        ))
    }

    fn attempt(
        &self,
        getter: &dyn Getter,
        req: &PluginRequirement,
        version: &Version,
        algorithms: &[ChecksumAlgorithm],
    ) -> std::result::Result<VerifiedArtifact, (Stage, Error)> {
        let opts = GetOptions::new(req, &self.platform, Some(version));
        let version_string = version.to_string();
        let archive_name = opts
            .expected_archive_name()
            .map_err(|e| (Stage::Fetch, e))?;

        tracing::debug!(source = getter.name(), stage = %Stage::Fetch, archive = %archive_name, "downloading");
        let archive = getter
            .get(RequestKind::Artifact, &opts)
            .and_then(|mut body| {
                let mut archive = Vec::new();
                body.read_to_end(&mut archive)?;
                Ok(archive)
            })
            .map_err(|e| (Stage::Fetch, e))?;

        let verify = |e: Error| (Stage::Verify, e);
        let mut entry: Option<ChecksumFileEntry> = None;

        for &algorithm in algorithms {
            tracing::debug!(source = getter.name(), stage = %Stage::Verify, %algorithm, "checking digest");
            let entries = getter
                .get(RequestKind::Checksums(algorithm), &opts)
                .and_then(parse_checksum_entries)
                .map_err(verify)?;
            let manifest = ChecksumManifest::from_entries(entries).map_err(verify)?;
            let expected = manifest.digest_for(&archive_name).map_err(verify)?;

            let mut checked = ChecksumFileEntry::new(archive_name.clone(), expected);
            getter.init(req, &mut checked).map_err(verify)?;
            getter
                .validate(&opts, &version_string, &self.platform, &checked)
                .map_err(verify)?;
            verify_digest(&archive_name, &archive, expected, algorithm).map_err(verify)?;

            entry.get_or_insert(checked);
        }

        let entry = entry.ok_or_else(|| {
            verify(Error::Verification(format!(
                "{} was not checked against any manifest",
                archive_name
            )))
        })?;
        let binary_name = getter.expected_file_name(req, &version_string, &entry, &archive_name);
        let binary = extract_binary(&archive, &binary_name).map_err(verify)?;

        Ok(VerifiedArtifact {
            source: getter.name().to_string(),
            binary_name,
            binary,
        })
    }

    fn write_binary(
        &self,
        req: &PluginRequirement,
        version: &Version,
        artifact: &VerifiedArtifact,
    ) -> Result<Installation> {
        let dir = self
            .options
            .plugin_directory
            .join(req.source.install_subdir());
        fs::create_dir_all(&dir)?;

        let binary_path = write_atomic(&dir, &artifact.binary_name, &artifact.binary, 0o755)?;

        let checksum = SIDECAR_ALGORITHM.digest(&artifact.binary);
        let sidecar_name = format!("{}{}", artifact.binary_name, SIDECAR_ALGORITHM.sidecar_suffix());
        write_atomic(&dir, &sidecar_name, checksum.as_bytes(), 0o644)?;

        Ok(Installation {
            binary_path,
            version: version.clone(),
            checksum,
        })
    }
}

/// Pull `binary_name` out of a zip archive held in memory
pub fn extract_binary(archive: &[u8], binary_name: &str) -> Result<Vec<u8>> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))?;
    let mut file = match zip.by_name(binary_name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(Error::Verification(format!(
                "archive does not contain {}",
                binary_name
            )))
        }
        Err(e) => return Err(e.into()),
    };

    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    Ok(data)
}

/// Write `data` to `dir/name` through a temporary file in the same directory
fn write_atomic(dir: &Path, name: &str, data: &[u8], mode: u32) -> Result<PathBuf> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    let path = dir.join(name);
    tmp.persist(&path).map_err(|e| Error::Io(e.error))?;
    Ok(path)
}

/// Installed binaries of `req` usable on `platform`, lowest version first
///
/// Binaries with a missing or mismatching checksum file are ignored.
pub fn list_installations(
    plugin_directory: &Path,
    req: &PluginRequirement,
    platform: &Platform,
) -> Result<Vec<Installation>> {
    let dir = plugin_directory.join(req.source.install_subdir());
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let prefix = req.filename_prefix();
    let sidecar_suffix = SIDECAR_ALGORITHM.sidecar_suffix();
    let mut found = Vec::new();

    for entry in fs::read_dir(&dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !file_name.starts_with(&prefix) || file_name.ends_with(sidecar_suffix) {
            continue;
        }
        if !platform.ext.is_empty() && !file_name.ends_with(&platform.ext) {
            continue;
        }

        let artifact = match ArtifactName::parse(&prefix, file_name) {
            Ok(artifact) => artifact,
            Err(e) => {
                tracing::debug!(file = file_name, error = %e, "ignoring file");
                continue;
            }
        };
        if artifact.os != platform.os
            || artifact.arch != platform.arch
            || !artifact.api_version.is_compatible_with(&platform.api_version)
        {
            continue;
        }
        let version = match parse_version_lenient(artifact.version()) {
            Ok((version, _)) => version,
            Err(_) => continue,
        };
        if !req.constraints.check(&version) {
            continue;
        }

        let sidecar = dir.join(format!("{}{}", file_name, sidecar_suffix));
        let expected = match fs::read_to_string(&sidecar) {
            Ok(contents) => contents
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_ascii_lowercase(),
            Err(_) => {
                tracing::debug!(file = file_name, "no checksum file, not treated as installed");
                continue;
            }
        };
        let actual = SIDECAR_ALGORITHM.digest_file(&path)?;
        if actual != expected {
            tracing::warn!(file = file_name, "checksum file does not match binary, ignoring");
            continue;
        }

        found.push(Installation {
            binary_path: path.clone(),
            version,
            checksum: actual,
        });
    }

    found.sort_by(|a, b| a.version.cmp(&b.version));
    Ok(found)
}
