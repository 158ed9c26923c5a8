//! Plugin requirements: identifiers and version constraints
//!
//! A requirement is what a build manifest declares for one plugin: where it
//! comes from (`github.com/acme/foo`, or the repository form
//! `acme/packer-plugin-foo`) and which versions are acceptable.
//!
//! Constraints follow the build tool's syntax rather than Cargo's: a bare
//! version is an exact pin, `~>` is the pessimistic operator, and compound
//! constraints are comma separated.
//!
//! # Examples
//!
//! ```
//! use packer_proxy_init::{PluginRequirement, VersionConstraints};
//!
//! let req = PluginRequirement::parse("acme/packer-plugin-foo", "= 1.2.3").unwrap();
//! assert_eq!(req.source.to_string(), "github.com/acme/foo");
//! assert_eq!(req.constraints.exact_version().unwrap(), "1.2.3");
//!
//! let range = VersionConstraints::parse(">= 1.0, < 2.0").unwrap();
//! assert!(range.exact_version().is_err());
//! ```

use crate::checksum::ChecksumAlgorithm;
use crate::{Error, Result};
use semver::{Prerelease, Version};
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;

/// Prefix every plugin repository and binary carries
pub const PLUGIN_NAME_PREFIX: &str = "packer-plugin-";

const DEFAULT_HOST: &str = "github.com";

/// Characters that make a constraint string a range rather than a pin
const RANGE_OPERATORS: &[char] = &['>', ',', '<', '~', '!'];

/// Parsed plugin identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PluginSource {
    pub host: String,
    pub owner: String,
    /// Plugin name without the `packer-plugin-` prefix
    pub name: String,
}

impl PluginSource {
    pub fn parse(identifier: &str) -> Result<Self> {
        let trimmed = identifier.trim().trim_matches('/');
        let parts: Vec<&str> = trimmed.split('/').collect();

        let (host, owner, repo) = match parts.as_slice() {
            [owner, repo] => (DEFAULT_HOST, *owner, *repo),
            [host, owner, repo] => (*host, *owner, *repo),
            _ => {
                return Err(Error::Parse(format!(
                    "invalid plugin source '{}': expected [host/]owner/name",
                    identifier
                )))
            }
        };

        for part in [host, owner, repo] {
            if part.is_empty() || !part.chars().all(is_source_char) {
                return Err(Error::Parse(format!(
                    "invalid plugin source '{}': bad component '{}'",
                    identifier, part
                )));
            }
        }

        let name = repo.strip_prefix(PLUGIN_NAME_PREFIX).unwrap_or(repo);
        if name.is_empty() {
            return Err(Error::Parse(format!(
                "invalid plugin source '{}': missing plugin name",
                identifier
            )));
        }

        Ok(Self {
            host: host.to_lowercase(),
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    /// Repository path on the source host, e.g. `acme/packer-plugin-foo`
    pub fn real_relative_path(&self) -> String {
        format!("{}/{}", self.owner, self.repo_name())
    }

    pub fn repo_name(&self) -> String {
        format!("{}{}", PLUGIN_NAME_PREFIX, self.name)
    }

    /// Prefix shared by every archive, manifest and binary of this plugin
    pub fn filename_prefix(&self) -> String {
        format!("{}{}_", PLUGIN_NAME_PREFIX, self.name)
    }

    /// Directory, relative to the plugin directory, holding installed binaries
    pub fn install_subdir(&self) -> PathBuf {
        PathBuf::from(&self.host).join(&self.owner).join(&self.name)
    }
}

impl fmt::Display for PluginSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.host, self.owner, self.name)
    }
}

fn is_source_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    /// `~>`: at least this version, only the last given segment may grow
    Pessimistic,
}

/// A single `op version` clause
#[derive(Debug, Clone)]
pub struct Constraint {
    pub op: Op,
    pub version: Version,
    /// Number of numeric segments the author wrote (`~> 1.2` has two)
    segments: usize,
    original: String,
}

impl Constraint {
    pub fn parse(input: &str) -> Result<Self> {
        let original = input.trim();
        const OPS: &[(&str, Op)] = &[
            ("~>", Op::Pessimistic),
            (">=", Op::Ge),
            ("<=", Op::Le),
            ("!=", Op::Ne),
            (">", Op::Gt),
            ("<", Op::Lt),
            ("=", Op::Eq),
        ];

        let (op, rest) = OPS
            .iter()
            .find_map(|(prefix, op)| original.strip_prefix(prefix).map(|rest| (*op, rest)))
            .unwrap_or((Op::Eq, original));

        let (version, segments) = parse_version_lenient(rest.trim()).map_err(|e| {
            Error::Constraint(format!("invalid version constraint '{}': {}", original, e))
        })?;

        Ok(Self {
            op,
            version,
            segments,
            original: original.to_string(),
        })
    }

    pub fn matches(&self, candidate: &Version) -> bool {
        // Prereleases only match constraints that name a prerelease of the
        // same release.
        if !candidate.pre.is_empty() {
            if self.version.pre.is_empty() {
                return false;
            }
            let same_release = (candidate.major, candidate.minor, candidate.patch)
                == (self.version.major, self.version.minor, self.version.patch);
            if !same_release {
                return false;
            }
        }

        let ord = precedence(candidate).cmp(&precedence(&self.version));
        match self.op {
            Op::Eq => ord == Ordering::Equal,
            Op::Ne => ord != Ordering::Equal,
            Op::Gt => ord == Ordering::Greater,
            Op::Ge => ord != Ordering::Less,
            Op::Lt => ord == Ordering::Less,
            Op::Le => ord != Ordering::Greater,
            Op::Pessimistic => {
                if ord == Ordering::Less {
                    return false;
                }
                let fixed = [self.version.major, self.version.minor, self.version.patch];
                let have = [candidate.major, candidate.minor, candidate.patch];
                let locked = self.segments.saturating_sub(1);
                fixed[..locked] == have[..locked]
            }
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

fn precedence(v: &Version) -> (u64, u64, u64, &Prerelease) {
    (v.major, v.minor, v.patch, &v.pre)
}

/// Parse `v1.2`, `1.2.3`, `1.2.3-beta.1` and friends
///
/// Missing numeric segments are zero-padded. Returns the version together
/// with the number of segments that were written.
pub fn parse_version_lenient(input: &str) -> Result<(Version, usize)> {
    let trimmed = input.trim();
    let without_v = trimmed.strip_prefix('v').unwrap_or(trimmed);
    let core_end = without_v.find(['-', '+']).unwrap_or(without_v.len());
    let (core, suffix) = without_v.split_at(core_end);

    let segments = core.split('.').count();
    if core.is_empty() || segments > 3 {
        return Err(Error::Parse(format!("invalid version '{}'", input)));
    }

    let mut normalized = core.to_string();
    for _ in segments..3 {
        normalized.push_str(".0");
    }
    normalized.push_str(suffix);

    let version = Version::parse(&normalized)
        .map_err(|e| Error::Parse(format!("invalid version '{}': {}", input, e)))?;
    Ok((version, segments))
}

/// Every constraint declared for a plugin; all must hold
#[derive(Debug, Clone, Default)]
pub struct VersionConstraints(Vec<Constraint>);

impl VersionConstraints {
    /// Parse a comma separated constraint list. An empty string means any
    /// version.
    pub fn parse(input: &str) -> Result<Self> {
        input
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(Constraint::parse)
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.0.iter()
    }

    pub fn check(&self, version: &Version) -> bool {
        self.0.iter().all(|c| c.matches(version))
    }

    /// Reduce the constraints to one literal version, refusing anything that
    /// describes a range.
    ///
    /// Works on the canonical string form: a leading `=` and whitespace are
    /// stripped, and any range operator or comma rejects the constraint.
    pub fn exact_version(&self) -> Result<String> {
        if self.0.is_empty() {
            return Err(Error::Constraint(
                "proxy getter requires an exact version constraint".to_string(),
            ));
        }

        let constraint_str = self.to_string();
        if constraint_str.contains(RANGE_OPERATORS) {
            return Err(Error::Constraint(format!(
                "proxy getter requires an exact version, found: {}",
                constraint_str
            )));
        }

        let exact = constraint_str
            .trim()
            .strip_prefix('=')
            .unwrap_or(constraint_str.trim())
            .trim();
        if exact.is_empty() {
            return Err(Error::Constraint(format!(
                "could not determine exact version from constraint: {}",
                constraint_str
            )));
        }

        Ok(exact.to_string())
    }
}

impl fmt::Display for VersionConstraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        f.write_str(&joined.join(","))
    }
}

/// One plugin declared by the build manifest
#[derive(Debug, Clone)]
pub struct PluginRequirement {
    /// Local name the manifest uses for the plugin (e.g. `amazon`)
    pub accessor: String,
    pub source: PluginSource,
    pub constraints: VersionConstraints,
    /// Digest algorithms in order of preference
    pub checksum_algorithms: Vec<ChecksumAlgorithm>,
}

impl PluginRequirement {
    pub fn new(
        accessor: impl Into<String>,
        source: PluginSource,
        constraints: VersionConstraints,
    ) -> Self {
        Self {
            accessor: accessor.into(),
            source,
            constraints,
            checksum_algorithms: vec![ChecksumAlgorithm::Sha256],
        }
    }

    /// Build a requirement from an identifier and a constraint string
    pub fn parse(identifier: &str, constraints: &str) -> Result<Self> {
        let source = PluginSource::parse(identifier)?;
        let constraints = VersionConstraints::parse(constraints)?;
        Ok(Self::new(source.name.clone(), source, constraints))
    }

    pub fn with_checksum_algorithms(mut self, algorithms: Vec<ChecksumAlgorithm>) -> Self {
        self.checksum_algorithms = algorithms;
        self
    }

    pub fn identifier(&self) -> String {
        self.source.to_string()
    }

    pub fn filename_prefix(&self) -> String {
        self.source.filename_prefix()
    }
}
