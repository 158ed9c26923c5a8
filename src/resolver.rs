//! Version selection for plugin requirements
//!
//! Exact pins need no network round-trip. Anything else asks the getter chain
//! for a release list, taking the first non-empty answer, and picks the
//! highest listed version satisfying every constraint.
//!
//! # Examples
//!
//! ```
//! use packer_proxy_init::getter::Release;
//! use packer_proxy_init::{find_matching_version, VersionConstraints};
//!
//! let releases = vec![Release::new("1.0.0"), Release::new("1.4.2"), Release::new("2.0.0")];
//! let constraints = VersionConstraints::parse("~> 1.0").unwrap();
//! let version = find_matching_version(&releases, &constraints).unwrap();
//! assert_eq!(version.to_string(), "1.4.2");
//! ```

use crate::getter::{parse_releases, GetOptions, GetterChain, Release, RequestKind};
use crate::platform::Platform;
use crate::requirement::{parse_version_lenient, PluginRequirement, VersionConstraints};
use crate::{Error, Result};
use semver::Version;

/// Pick the version to install for `req`
pub fn resolve_version(
    req: &PluginRequirement,
    chain: &GetterChain,
    platform: &Platform,
) -> Result<Version> {
    if let Ok(exact) = req.constraints.exact_version() {
        let (version, _) = parse_version_lenient(&exact)?;
        tracing::debug!(plugin = %req.identifier(), %version, "pinned version");
        return Ok(version);
    }

    let opts = GetOptions::new(req, platform, None);
    let mut attempts = Vec::new();

    for getter in chain.iter() {
        let listed = getter
            .get(RequestKind::Releases, &opts)
            .and_then(parse_releases);
        match listed {
            Ok(releases) if !releases.is_empty() => {
                tracing::debug!(
                    plugin = %req.identifier(),
                    source = getter.name(),
                    count = releases.len(),
                    "release list"
                );
                return find_matching_version(&releases, &req.constraints).map_err(|e| {
                    Error::Constraint(format!("{} (listed by {})", e, getter.name()))
                });
            }
            Ok(_) => attempts.push(format!("{}: no releases listed", getter.name())),
            Err(e) => {
                tracing::debug!(source = getter.name(), error = %e, "release listing failed");
                attempts.push(format!("{}: {}", getter.name(), e));
            }
        }
    }

    Err(Error::ChainExhausted {
        what: format!("no releases found for {}", req.identifier()),
        attempts,
    })
}

/// Highest release satisfying `constraints`
///
/// Unparseable release versions are skipped.
pub fn find_matching_version(
    releases: &[Release],
    constraints: &VersionConstraints,
) -> Result<Version> {
    releases
        .iter()
        .filter_map(|release| match parse_version_lenient(&release.version) {
            Ok((version, _)) => Some(version),
            Err(e) => {
                tracing::debug!(version = %release.version, error = %e, "skipping release");
                None
            }
        })
        .filter(|version| constraints.check(version))
        .max()
        .ok_or_else(|| {
            let available: Vec<&str> = releases.iter().map(|r| r.version.as_str()).collect();
            Error::Constraint(format!(
                "no version satisfies constraints '{}' (available: {})",
                constraints,
                available.join(", ")
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::getter::{releases_stream, GithubFamilyPolicy, Getter, NamingPolicy};
    use crate::platform::ApiVersion;
    use std::io::Read;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Answers release listings from memory and counts calls
    struct StaticGetter {
        name: &'static str,
        releases: Option<Vec<&'static str>>,
        calls: Arc<AtomicUsize>,
    }

    impl StaticGetter {
        fn boxed(name: &'static str, releases: Option<Vec<&'static str>>) -> (Box<dyn Getter>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let getter = Self {
                name,
                releases,
                calls: calls.clone(),
            };
            (Box::new(getter), calls)
        }
    }

    impl Getter for StaticGetter {
        fn name(&self) -> &str {
            self.name
        }

        fn get(&self, _kind: RequestKind, _opts: &GetOptions<'_>) -> Result<Box<dyn Read + Send>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.releases {
                Some(list) => {
                    let releases: Vec<Release> = list.iter().map(|v| Release::new(*v)).collect();
                    releases_stream(&releases)
                }
                None => Err(Error::Transport {
                    url: format!("mem://{}", self.name),
                    reason: "connection refused".to_string(),
                }),
            }
        }

        fn policy(&self) -> &dyn NamingPolicy {
            &GithubFamilyPolicy
        }
    }

    fn platform() -> Platform {
        Platform::new("linux", "amd64", ApiVersion::default())
    }

    fn releases(versions: &[&str]) -> Vec<Release> {
        versions.iter().map(|v| Release::new(*v)).collect()
    }

    // ============================================================================
    // find_matching_version tests
    // ============================================================================

    #[test]
    fn test_find_matching_version_highest_selected() {
        let list = releases(&["1.0.0", "1.5.0", "1.2.0", "2.0.0"]);
        let c = VersionConstraints::parse(">= 1.0, < 2.0").unwrap();
        assert_eq!(find_matching_version(&list, &c).unwrap(), Version::new(1, 5, 0));
    }

    #[test]
    fn test_find_matching_version_skips_garbage_and_prereleases() {
        let list = releases(&["nightly", "v1.1.0", "1.2.0-beta.1"]);
        let c = VersionConstraints::parse(">= 1.0").unwrap();
        assert_eq!(find_matching_version(&list, &c).unwrap(), Version::new(1, 1, 0));
    }

    #[test]
    fn test_find_matching_version_no_match() {
        let list = releases(&["0.9.0", "0.9.1"]);
        let c = VersionConstraints::parse(">= 1.0").unwrap();
        let err = find_matching_version(&list, &c).unwrap_err();
        assert!(err.to_string().contains("no version satisfies constraints"));
        assert!(err.to_string().contains("0.9.1"));
    }

    // ============================================================================
    // resolve_version tests
    // ============================================================================

    #[test]
    fn test_exact_pin_skips_listing() {
        let (getter, calls) = StaticGetter::boxed("releases", Some(vec!["9.9.9"]));
        let mut chain = GetterChain::new();
        chain.push(getter);

        let req = PluginRequirement::parse("acme/packer-plugin-foo", "= 1.2").unwrap();
        let version = resolve_version(&req, &chain, &platform()).unwrap();
        assert_eq!(version, Version::new(1, 2, 0));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_first_non_empty_list_wins() {
        let (down, down_calls) = StaticGetter::boxed("down", None);
        let (empty, _) = StaticGetter::boxed("empty", Some(vec![]));
        let (mirror, _) = StaticGetter::boxed("mirror", Some(vec!["1.0.0", "1.3.0"]));
        let (never, never_calls) = StaticGetter::boxed("never", Some(vec!["1.9.0"]));
        let mut chain = GetterChain::new();
        chain.push(down);
        chain.push(empty);
        chain.push(mirror);
        chain.push(never);

        let req = PluginRequirement::parse("acme/packer-plugin-foo", ">= 1.0").unwrap();
        let version = resolve_version(&req, &chain, &platform()).unwrap();
        assert_eq!(version, Version::new(1, 3, 0));
        assert_eq!(down_calls.load(Ordering::SeqCst), 1);
        assert_eq!(never_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_no_releases_anywhere() {
        let (down, _) = StaticGetter::boxed("down", None);
        let (empty, _) = StaticGetter::boxed("empty", Some(vec![]));
        let mut chain = GetterChain::new();
        chain.push(down);
        chain.push(empty);

        let req = PluginRequirement::parse("acme/packer-plugin-foo", "~> 1.0").unwrap();
        let err = resolve_version(&req, &chain, &platform()).unwrap_err();
        assert!(matches!(err, Error::ChainExhausted { .. }));
        let msg = err.to_string();
        assert!(msg.contains("no releases found"));
        assert!(msg.contains("down: failed to get mem://down"));
        assert!(msg.contains("empty: no releases listed"));
    }

    #[test]
    fn test_listed_but_unsatisfiable() {
        let (mirror, _) = StaticGetter::boxed("mirror", Some(vec!["0.1.0"]));
        let mut chain = GetterChain::new();
        chain.push(mirror);

        let req = PluginRequirement::parse("acme/packer-plugin-foo", ">= 1.0").unwrap();
        let err = resolve_version(&req, &chain, &platform()).unwrap_err();
        assert!(matches!(err, Error::Constraint(_)));
        assert!(err.to_string().contains("listed by mirror"));
    }
}
