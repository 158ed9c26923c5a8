//! Getter for an official-releases style mirror
//!
//! Layout under the base URL:
//!
//! ```text
//! <base>/packer-plugin-foo/index.json
//! <base>/packer-plugin-foo/1.2.3/packer-plugin-foo_v1.2.3_x5.0_linux_amd64.zip
//! <base>/packer-plugin-foo/1.2.3/packer-plugin-foo_v1.2.3_SHA256SUMS
//! ```
//!
//! `index.json` carries a `versions` object keyed by version.

use super::{releases_stream, GetOptions, Getter, HttpClient, NamingPolicy, Release, RequestKind};
use super::policy::GithubFamilyPolicy;
use crate::checksum::transform_checksum_stream;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::{Cursor, Read};

#[derive(Debug, Deserialize)]
struct ReleaseIndex {
    versions: BTreeMap<String, serde_json::Value>,
}

pub struct ReleasesGetter {
    name: String,
    base_url: String,
    http: HttpClient,
    policy: GithubFamilyPolicy,
}

impl ReleasesGetter {
    /// `base_url` is normalized to end with `/`
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, http: HttpClient) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            name: name.into(),
            base_url,
            http,
            policy: GithubFamilyPolicy,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn plugin_url(&self, opts: &GetOptions<'_>) -> String {
        format!("{}{}", self.base_url, opts.requirement.source.repo_name())
    }

    fn list_releases(&self, opts: &GetOptions<'_>) -> Result<Vec<Release>> {
        let url = format!("{}/index.json", self.plugin_url(opts));
        let body = self.http.get_bytes(&url)?;
        let index: ReleaseIndex = serde_json::from_slice(&body)
            .map_err(|e| Error::Parse(format!("invalid release index at {}: {}", url, e)))?;
        Ok(index.versions.into_keys().map(Release::new).collect())
    }
}

impl Getter for ReleasesGetter {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, kind: RequestKind, opts: &GetOptions<'_>) -> Result<Box<dyn Read + Send>> {
        match kind {
            RequestKind::Releases => releases_stream(&self.list_releases(opts)?),
            RequestKind::Artifact => {
                let url = format!(
                    "{}/{}/{}",
                    self.plugin_url(opts),
                    opts.version_string()?,
                    opts.expected_archive_name()?
                );
                Ok(Box::new(Cursor::new(self.http.get_bytes(&url)?)))
            }
            RequestKind::Checksums(algorithm) => {
                let url = format!(
                    "{}/{}/{}",
                    self.plugin_url(opts),
                    opts.version_string()?,
                    opts.checksum_manifest_name(algorithm)?
                );
                transform_checksum_stream(self.http.get_bytes(&url)?.as_slice(), algorithm)
            }
        }
    }

    fn policy(&self) -> &dyn NamingPolicy {
        &self.policy
    }
}
