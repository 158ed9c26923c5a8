//! File naming shared by the GitHub-release family of sources
//!
//! Archives are published as
//! `packer-plugin-<name>_v<version>_x<api>_<os>_<arch>.zip`; the binary inside
//! (and the installed copy) drops `.zip` and gains the platform's executable
//! extension. Checksum manifests are `packer-plugin-<name>_v<version>_SHA256SUMS`.

use crate::checksum::{ChecksumAlgorithm, ChecksumFileEntry};
use crate::getter::GetOptions;
use crate::platform::{ApiVersion, Platform};
use crate::requirement::PluginRequirement;
use crate::{Error, Result};

/// Decoded `v<version>_x<api>_<os>_<arch>` part of an artifact file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    /// Version as written in the name, including the leading `v`
    pub bin_version: String,
    pub api_version: ApiVersion,
    pub os: String,
    pub arch: String,
}

impl ArtifactName {
    /// Decode `filename` (an archive, binary, or bare stem) for a plugin
    /// whose files start with `prefix`
    pub fn parse(prefix: &str, filename: &str) -> Result<Self> {
        let invalid = |why: &str| {
            Error::Parse(format!("unexpected artifact name '{}': {}", filename, why))
        };

        let rest = filename
            .strip_prefix(prefix)
            .ok_or_else(|| invalid(&format!("expected prefix '{}'", prefix)))?;
        let stem = rest
            .strip_suffix(".zip")
            .or_else(|| rest.strip_suffix(".exe"))
            .unwrap_or(rest);

        let parts: Vec<&str> = stem.split('_').collect();
        let [bin_version, api, os, arch] = parts.as_slice() else {
            return Err(invalid("expected v<version>_x<api>_<os>_<arch>"));
        };

        if !bin_version.starts_with('v') || bin_version.len() < 2 {
            return Err(invalid("version must start with 'v'"));
        }
        if !api.starts_with('x') {
            return Err(invalid("API version must start with 'x'"));
        }
        if os.is_empty() || arch.is_empty() {
            return Err(invalid("missing platform"));
        }

        Ok(Self {
            bin_version: bin_version.to_string(),
            api_version: api.parse()?,
            os: os.to_string(),
            arch: arch.to_string(),
        })
    }

    /// Version without the leading `v`
    pub fn version(&self) -> &str {
        &self.bin_version[1..]
    }
}

/// `prefix` + `v<version>_x<api>_<os>_<arch>.zip`
pub fn archive_name(prefix: &str, version: &str, platform: &Platform) -> String {
    format!(
        "{}v{}_{}_{}_{}.zip",
        prefix,
        version,
        platform.api_version.tag(),
        platform.os,
        platform.arch
    )
}

/// Name of the published checksum manifest for one version
pub fn checksum_manifest_name(prefix: &str, version: &str, algorithm: ChecksumAlgorithm) -> String {
    format!("{}v{}_{}", prefix, version, algorithm.manifest_suffix())
}

/// Name of the installed binary for a decoded artifact
pub fn binary_name(prefix: &str, artifact: &ArtifactName) -> String {
    let ext = if artifact.os == "windows" { ".exe" } else { "" };
    format!(
        "{}{}_{}_{}_{}{}",
        prefix,
        artifact.bin_version,
        artifact.api_version.tag(),
        artifact.os,
        artifact.arch,
        ext
    )
}

/// How a source names, decodes and validates its artifacts
pub trait NamingPolicy: Send + Sync {
    /// Decode the entry's file name into its parts
    fn init(&self, req: &PluginRequirement, entry: &mut ChecksumFileEntry) -> Result<()>;

    /// Check that a decoded entry is installable on `install`
    fn validate(
        &self,
        opts: &GetOptions<'_>,
        expected_version: &str,
        install: &Platform,
        entry: &ChecksumFileEntry,
    ) -> Result<()>;

    /// File name the extracted binary is stored under
    fn expected_file_name(
        &self,
        req: &PluginRequirement,
        version: &str,
        entry: &ChecksumFileEntry,
        archive_name: &str,
    ) -> String;
}

/// Naming used by GitHub releases and everything that mirrors them
#[derive(Debug, Clone, Copy, Default)]
pub struct GithubFamilyPolicy;

impl NamingPolicy for GithubFamilyPolicy {
    fn init(&self, req: &PluginRequirement, entry: &mut ChecksumFileEntry) -> Result<()> {
        if !entry.filename.ends_with(".zip") {
            return Err(Error::Parse(format!(
                "checksum entry '{}' is not a zip archive",
                entry.filename
            )));
        }
        entry.artifact = Some(ArtifactName::parse(&req.filename_prefix(), &entry.filename)?);
        Ok(())
    }

    fn validate(
        &self,
        opts: &GetOptions<'_>,
        expected_version: &str,
        install: &Platform,
        entry: &ChecksumFileEntry,
    ) -> Result<()> {
        let artifact = match &entry.artifact {
            Some(artifact) => artifact.clone(),
            None => ArtifactName::parse(&opts.requirement.filename_prefix(), &entry.filename)?,
        };

        if artifact.version() != expected_version {
            return Err(Error::Verification(format!(
                "{}: wrong version {}, expected v{}",
                entry.filename, artifact.bin_version, expected_version
            )));
        }
        if artifact.os != install.os || artifact.arch != install.arch {
            return Err(Error::Verification(format!(
                "{}: built for {}_{}, this host is {}",
                entry.filename, artifact.os, artifact.arch, install
            )));
        }
        if !artifact.api_version.is_compatible_with(&install.api_version) {
            return Err(Error::Verification(format!(
                "{}: plugin API {} is incompatible with {}",
                entry.filename,
                artifact.api_version.tag(),
                install.api_version.tag()
            )));
        }
        Ok(())
    }

    fn expected_file_name(
        &self,
        req: &PluginRequirement,
        version: &str,
        entry: &ChecksumFileEntry,
        archive_name: &str,
    ) -> String {
        match &entry.artifact {
            Some(artifact) => {
                let artifact = ArtifactName {
                    bin_version: format!("v{}", version),
                    ..artifact.clone()
                };
                binary_name(&req.filename_prefix(), &artifact)
            }
            None => archive_name.trim_end_matches(".zip").to_string(),
        }
    }
}
