//! Getter for a generic artifact proxy fronting GitHub release downloads
//!
//! The proxy mirrors `https://github.com/<owner>/<repo>/releases/download/...`
//! under its own base URL, so artifacts live at
//! `<base>/<owner>/<repo>/releases/download/v<version>/<file>`. A proxy has no
//! release listing; it can only serve requirements pinned to one version.

use super::{releases_stream, GetOptions, Getter, HttpClient, NamingPolicy, Release, RequestKind};
use super::policy::GithubFamilyPolicy;
use crate::checksum::transform_checksum_stream;
use crate::{Error, Result};
use std::io::{Cursor, Read};

const GITHUB_HOST: &str = "github.com";

pub struct GithubProxyGetter {
    name: String,
    base_url: String,
    http: HttpClient,
    policy: GithubFamilyPolicy,
}

impl GithubProxyGetter {
    /// Trailing slashes on `base_url` are dropped
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, http: HttpClient) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            policy: GithubFamilyPolicy,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn repo_path(&self, opts: &GetOptions<'_>) -> Result<String> {
        let source = &opts.requirement.source;
        if source.host != GITHUB_HOST {
            return Err(Error::Unsupported(format!(
                "{} only proxies {} plugins, not {}",
                self.name, GITHUB_HOST, source
            )));
        }
        Ok(source.real_relative_path())
    }

    /// `<base>/<owner>/<repo>/releases/download/v<version>/<filename>`
    fn download_url(&self, opts: &GetOptions<'_>, filename: &str) -> Result<String> {
        Ok(format!(
            "{}/{}/releases/download/{}/{}",
            self.base_url,
            self.repo_path(opts)?,
            opts.version_tag()?,
            filename
        ))
    }
}

impl Getter for GithubProxyGetter {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, kind: RequestKind, opts: &GetOptions<'_>) -> Result<Box<dyn Read + Send>> {
        match kind {
            RequestKind::Releases => {
                self.repo_path(opts)?;
                let exact = opts.requirement.constraints.exact_version()?;
                releases_stream(&[Release::new(exact)])
            }
            RequestKind::Artifact => {
                let url = self.download_url(opts, &opts.expected_archive_name()?)?;
                Ok(Box::new(Cursor::new(self.http.get_bytes(&url)?)))
            }
            RequestKind::Checksums(algorithm) => {
                let url = self.download_url(opts, &opts.checksum_manifest_name(algorithm)?)?;
                transform_checksum_stream(self.http.get_bytes(&url)?.as_slice(), algorithm)
            }
        }
    }

    fn policy(&self) -> &dyn NamingPolicy {
        &self.policy
    }
}
