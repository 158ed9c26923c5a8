//! Settings for sources and installation
//!
//! Settings come from four layers, each overriding the previous one:
//! built-in defaults, a TOML file, environment variables, then command-line
//! flags (applied by the caller before [`Config::validate`]).
//!
//! ```toml
//! [sources]
//! releases_url = "https://releases.hashicorp.com/"
//! github_url = "https://artifacts.my.org/artifactory/GITHUB"
//!
//! [install]
//! plugin_directory = "~/.config/packer/plugins"
//! checksum_algorithms = ["sha256"]
//! request_timeout_seconds = 60
//! ```
//!
//! # Examples
//!
//! ```
//! use packer_proxy_init::Config;
//!
//! let mut config = Config::from_toml_str(r#"
//!     [sources]
//!     github_url = "https://artifacts.example/GITHUB"
//! "#).unwrap();
//! config.validate().unwrap();
//!
//! assert_eq!(config.sources.releases_url, "https://releases.hashicorp.com/");
//! assert_eq!(config.getter_chain().unwrap().names(), vec!["releases", "github-proxy"]);
//! ```

use crate::checksum::ChecksumAlgorithm;
use crate::getter::{GetterChain, GithubProxyGetter, HttpClient, ReleasesGetter};
use crate::installer::InstallOptions;
use crate::platform::{ApiVersion, HOST_API_VERSION};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG: &str = "PKR_INIT_CONFIG";
pub const ENV_RELEASES_SOURCE: &str = "PKR_INIT_RELEASES_SOURCE";
pub const ENV_GITHUB_SOURCE: &str = "PKR_INIT_GITHUB_SOURCE";
pub const ENV_PLUGIN_PATH: &str = "PACKER_PLUGIN_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub install: InstallConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Official-releases style mirror, tried first
    #[serde(default = "default_releases_url")]
    pub releases_url: String,

    /// Artifact proxy in front of GitHub release downloads (required)
    #[serde(default)]
    pub github_url: Option<String>,
}

fn default_releases_url() -> String {
    "https://releases.hashicorp.com/".to_string()
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            releases_url: default_releases_url(),
            github_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Where plugins are installed (default `~/.config/packer/plugins`)
    #[serde(default)]
    pub plugin_directory: Option<String>,

    /// Plugins baked into the image, copied into the plugin directory first
    #[serde(default)]
    pub prestaged_directory: Option<String>,

    /// Copy the pre-staged directory before installing
    #[serde(default)]
    pub copy_prestaged: bool,

    #[serde(default)]
    pub force: bool,

    #[serde(default = "default_checksum_algorithms")]
    pub checksum_algorithms: Vec<ChecksumAlgorithm>,

    /// Plugin API version of the build tool, as written in file names
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_checksum_algorithms() -> Vec<ChecksumAlgorithm> {
    vec![ChecksumAlgorithm::Sha256]
}

fn default_api_version() -> String {
    HOST_API_VERSION.to_string()
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            plugin_directory: None,
            prestaged_directory: None,
            copy_prestaged: false,
            force: false,
            checksum_algorithms: default_checksum_algorithms(),
            api_version: default_api_version(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl Config {
    /// Config file consulted when none is given explicitly
    ///
    /// Uses PKR_INIT_CONFIG if set, otherwise
    /// `~/.config/packer-proxy-init/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(ENV_CONFIG) {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }
        dirs::home_dir().map(|home| {
            home.join(".config")
                .join("packer-proxy-init")
                .join("config.toml")
        })
    }

    /// Load defaults, then the config file, then environment overrides
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Other(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment overrides; empty values are ignored
    ///
    /// Setting PACKER_PLUGIN_PATH also turns on copying of pre-staged plugins.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(url) = lookup(ENV_RELEASES_SOURCE) {
            self.sources.releases_url = url;
        }
        if let Some(url) = lookup(ENV_GITHUB_SOURCE) {
            self.sources.github_url = Some(url);
        }
        if let Some(dir) = lookup(ENV_PLUGIN_PATH) {
            self.install.plugin_directory = Some(dir);
            self.install.copy_prestaged = true;
        }
    }

    /// Check and normalize source URLs and install settings
    pub fn validate(&mut self) -> Result<()> {
        let github_url = self
            .sources
            .github_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                Error::Other(format!(
                    "github-source is required (set --github-source or {})",
                    ENV_GITHUB_SOURCE
                ))
            })?;
        url::Url::parse(github_url)?;

        url::Url::parse(&self.sources.releases_url)?;
        if !self.sources.releases_url.ends_with('/') {
            self.sources.releases_url.push('/');
        }

        self.validate_install()
    }

    /// Checks that only concern local installation state
    pub fn validate_install(&self) -> Result<()> {
        if self.install.checksum_algorithms.is_empty() {
            return Err(Error::Other(
                "at least one checksum algorithm must be configured".to_string(),
            ));
        }
        self.api_version()?;
        Ok(())
    }

    pub fn api_version(&self) -> Result<ApiVersion> {
        self.install.api_version.parse()
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        match self.install.request_timeout_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Plugin directory with `~` expanded
    pub fn plugin_directory(&self) -> Result<PathBuf> {
        match &self.install.plugin_directory {
            Some(dir) => expand_path(dir),
            None => default_plugin_directory(),
        }
    }

    /// Pre-staged plugin directory with `~` expanded
    pub fn prestaged_directory(&self) -> Result<PathBuf> {
        match &self.install.prestaged_directory {
            Some(dir) => expand_path(dir),
            None => default_plugin_directory(),
        }
    }

    pub fn install_options(&self) -> Result<InstallOptions> {
        Ok(InstallOptions {
            force: self.install.force,
            plugin_directory: self.plugin_directory()?,
            checksum_algorithms: self.install.checksum_algorithms.clone(),
        })
    }

    /// Releases mirror first, then the GitHub proxy
    pub fn getter_chain(&self) -> Result<GetterChain> {
        let http = HttpClient::new(self.request_timeout())?;
        let mut chain = GetterChain::new();

        chain.push(Box::new(ReleasesGetter::new(
            "releases",
            self.sources.releases_url.clone(),
            http.clone(),
        )));
        if let Some(github_url) = &self.sources.github_url {
            chain.push(Box::new(GithubProxyGetter::new(
                "github-proxy",
                github_url.clone(),
                http,
            )));
        }

        Ok(chain)
    }
}

/// `~/.config/packer/plugins`
pub fn default_plugin_directory() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| Error::Other("Could not find home directory".to_string()))?;
    Ok(home.join(".config").join("packer").join("plugins"))
}

fn expand_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path)
        .map_err(|e| Error::Other(format!("Cannot expand path '{}': {}", path, e)))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sources.releases_url, "https://releases.hashicorp.com/");
        assert!(config.sources.github_url.is_none());
        assert!(!config.install.force);
        assert_eq!(config.install.checksum_algorithms, vec![ChecksumAlgorithm::Sha256]);
        assert_eq!(config.api_version().unwrap(), ApiVersion::new(5, Some(0)));
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_parse_full_file() {
        let config = Config::from_toml_str(
            r#"
            [sources]
            releases_url = "https://mirror.example/releases"
            github_url = "https://artifacts.example/GITHUB"

            [install]
            plugin_directory = "/opt/packer/plugins"
            force = true
            api_version = "5"
            request_timeout_seconds = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.sources.releases_url, "https://mirror.example/releases");
        assert_eq!(config.plugin_directory().unwrap(), PathBuf::from("/opt/packer/plugins"));
        assert!(config.install.force);
        assert_eq!(config.api_version().unwrap().tag(), "x5");
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn test_unknown_algorithm_is_rejected() {
        let result = Config::from_toml_str("[install]\nchecksum_algorithms = [\"md5\"]\n");
        assert!(matches!(result, Err(Error::TomlDe(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(env(&[
            (ENV_RELEASES_SOURCE, "https://mirror.example/"),
            (ENV_GITHUB_SOURCE, "https://artifacts.example/GITHUB"),
            (ENV_PLUGIN_PATH, "/tmp/plugins"),
        ]));

        assert_eq!(config.sources.releases_url, "https://mirror.example/");
        assert_eq!(config.sources.github_url.as_deref(), Some("https://artifacts.example/GITHUB"));
        assert_eq!(config.plugin_directory().unwrap(), PathBuf::from("/tmp/plugins"));
        assert!(config.install.copy_prestaged);
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_env(env(&[(ENV_GITHUB_SOURCE, ""), (ENV_PLUGIN_PATH, "")]));
        assert!(config.sources.github_url.is_none());
        assert!(!config.install.copy_prestaged);
    }

    #[test]
    fn test_validate_requires_github_source() {
        let mut config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("github-source is required"));
    }

    #[test]
    fn test_validate_normalizes_releases_url() {
        let mut config = Config::default();
        config.sources.releases_url = "https://mirror.example/releases".to_string();
        config.sources.github_url = Some("https://artifacts.example/GITHUB".to_string());
        config.validate().unwrap();
        assert_eq!(config.sources.releases_url, "https://mirror.example/releases/");
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        let mut config = Config::default();
        config.sources.github_url = Some("not a url".to_string());
        assert!(matches!(config.validate(), Err(Error::Url(_))));
    }

    #[test]
    fn test_getter_chain_order() {
        let mut config = Config::default();
        config.sources.github_url = Some("https://artifacts.example/GITHUB".to_string());
        let chain = config.getter_chain().unwrap();
        assert_eq!(chain.names(), vec!["releases", "github-proxy"]);
    }

    #[test]
    fn test_load_explicit_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[install]\nforce = true\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert!(config.install.force);

        assert!(Config::from_file(&temp_dir.path().join("missing.toml")).is_err());
    }
}
