//! Checksum manifests and digest verification
//!
//! Release pages publish one manifest per version, in the classic
//! `sha256sum` layout:
//!
//! ```text
//! 6f3c...e1  packer-plugin-foo_v1.2.3_x5.0_linux_amd64.zip
//! 9ab0...42  packer-plugin-foo_v1.2.3_x5.0_darwin_arm64.zip
//! ```
//!
//! Getters pass the raw body through [`transform_checksum_stream`], which
//! re-encodes it as a JSON list of [`ChecksumFileEntry`] so that every source
//! hands the installer the same shape.
//!
//! # Examples
//!
//! ```
//! use packer_proxy_init::checksum::{parse_checksum_manifest, ChecksumAlgorithm, ChecksumManifest};
//!
//! let digest = ChecksumAlgorithm::Sha256.digest(b"plugin");
//! let body = format!("{}  plugin.zip\n", digest);
//! let entries = parse_checksum_manifest(body.as_bytes(), ChecksumAlgorithm::Sha256).unwrap();
//! let manifest = ChecksumManifest::from_entries(entries).unwrap();
//! assert_eq!(manifest.digest_for("plugin.zip").unwrap(), digest);
//! assert!(manifest.digest_for("other.zip").is_err());
//! ```

use crate::getter::policy::ArtifactName;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::Path;
use std::str::FromStr;

/// Digest algorithms a release manifest can be published for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    Sha256,
}

impl ChecksumAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha256 => "sha256",
        }
    }

    /// Suffix of the per-release manifest, e.g. `SHA256SUMS`
    pub fn manifest_suffix(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha256 => "SHA256SUMS",
        }
    }

    /// Suffix of the file stored next to an installed binary
    pub fn sidecar_suffix(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha256 => "_SHA256SUM",
        }
    }

    /// Digest length in bytes
    pub fn digest_len(&self) -> usize {
        match self {
            ChecksumAlgorithm::Sha256 => 32,
        }
    }

    /// Lowercase hex digest of `data`
    pub fn digest(&self, data: &[u8]) -> String {
        match self {
            ChecksumAlgorithm::Sha256 => format!("{:x}", Sha256::digest(data)),
        }
    }

    /// Lowercase hex digest of a file, read in chunks
    pub fn digest_file<P: AsRef<Path>>(&self, path: P) -> Result<String> {
        let mut file = File::open(path.as_ref())?;
        match self {
            ChecksumAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                let mut buffer = vec![0; 8192];
                loop {
                    let bytes_read = file.read(&mut buffer)?;
                    if bytes_read == 0 {
                        break;
                    }
                    hasher.update(&buffer[..bytes_read]);
                }
                Ok(format!("{:x}", hasher.finalize()))
            }
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" => Ok(ChecksumAlgorithm::Sha256),
            other => Err(Error::Parse(format!(
                "unsupported checksum algorithm '{}'",
                other
            ))),
        }
    }
}

/// One `(filename, digest)` record of a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecksumFileEntry {
    pub filename: String,
    pub checksum: String,
    /// Decoded filename, filled in by a getter's `init`
    #[serde(skip)]
    pub artifact: Option<ArtifactName>,
}

impl ChecksumFileEntry {
    pub fn new(filename: impl Into<String>, checksum: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            checksum: checksum.into(),
            artifact: None,
        }
    }
}

/// Parse a raw `digest  filename` manifest
///
/// Blank lines are ignored and any run of whitespace separates the two
/// fields. A leading `*` on the filename (binary mode marker) is dropped.
pub fn parse_checksum_manifest<R: Read>(
    body: R,
    algorithm: ChecksumAlgorithm,
) -> Result<Vec<ChecksumFileEntry>> {
    let mut entries = Vec::new();

    for (index, line) in BufReader::new(body).lines().enumerate() {
        let line = line?;
        let line_no = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        let [digest, filename] = fields.as_slice() else {
            return Err(Error::Parse(format!(
                "checksum manifest line {}: expected 'digest filename', got '{}'",
                line_no, trimmed
            )));
        };

        let decoded = hex::decode(digest).map_err(|e| {
            Error::Parse(format!(
                "checksum manifest line {}: invalid {} digest '{}': {}",
                line_no, algorithm, digest, e
            ))
        })?;
        if decoded.len() != algorithm.digest_len() {
            return Err(Error::Parse(format!(
                "checksum manifest line {}: {} digest must be {} bytes, got {}",
                line_no,
                algorithm,
                algorithm.digest_len(),
                decoded.len()
            )));
        }

        let filename: &str = filename;
        let filename = filename.strip_prefix('*').unwrap_or(filename);
        entries.push(ChecksumFileEntry::new(filename, digest.to_ascii_lowercase()));
    }

    Ok(entries)
}

/// Re-encode a raw manifest body as a JSON list of entries
pub fn transform_checksum_stream<R: Read>(
    body: R,
    algorithm: ChecksumAlgorithm,
) -> Result<Box<dyn Read + Send>> {
    let entries = parse_checksum_manifest(body, algorithm)?;
    let json = serde_json::to_vec(&entries)?;
    Ok(Box::new(Cursor::new(json)))
}

/// Decode the JSON produced by [`transform_checksum_stream`]
pub fn parse_checksum_entries<R: Read>(reader: R) -> Result<Vec<ChecksumFileEntry>> {
    Ok(serde_json::from_reader(reader)?)
}

/// Filename to digest lookup over one manifest
#[derive(Debug, Clone, Default)]
pub struct ChecksumManifest {
    entries: BTreeMap<String, String>,
}

impl ChecksumManifest {
    pub fn from_entries(entries: Vec<ChecksumFileEntry>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for entry in entries {
            let digest = entry.checksum.to_ascii_lowercase();
            if let Some(existing) = map.get(&entry.filename) {
                if existing != &digest {
                    return Err(Error::Parse(format!(
                        "checksum manifest lists conflicting digests for {}",
                        entry.filename
                    )));
                }
            }
            map.insert(entry.filename, digest);
        }
        Ok(Self { entries: map })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Digest listed for `filename`; a missing entry fails verification
    pub fn digest_for(&self, filename: &str) -> Result<&str> {
        self.entries
            .get(filename)
            .map(String::as_str)
            .ok_or_else(|| {
                Error::Verification(format!("no checksum entry for {}", filename))
            })
    }

    /// Check `data` against the digest listed for `filename`
    pub fn verify(
        &self,
        filename: &str,
        data: &[u8],
        algorithm: ChecksumAlgorithm,
    ) -> Result<String> {
        let expected = self.digest_for(filename)?;
        verify_digest(filename, data, expected, algorithm)
    }
}

/// Compare the digest of `data` with `expected` (case-insensitive)
pub fn verify_digest(
    label: &str,
    data: &[u8],
    expected: &str,
    algorithm: ChecksumAlgorithm,
) -> Result<String> {
    if expected.is_empty() {
        return Err(Error::Verification(format!("empty checksum for {}", label)));
    }

    let computed = algorithm.digest(data);
    if computed.eq_ignore_ascii_case(expected) {
        Ok(computed)
    } else {
        Err(Error::Verification(format!(
            "{} checksum mismatch for {}\nExpected: {}\nComputed: {}",
            algorithm, label, expected, computed
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST_A: &str = "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f";
    const DIGEST_B: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_sha256_known_values() {
        assert_eq!(ChecksumAlgorithm::Sha256.digest(b"Hello, World!"), DIGEST_A);
        assert_eq!(ChecksumAlgorithm::Sha256.digest(b""), DIGEST_B);
    }

    #[test]
    fn test_digest_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("hello.txt");
        std::fs::write(&path, "Hello, World!").unwrap();

        assert_eq!(ChecksumAlgorithm::Sha256.digest_file(&path).unwrap(), DIGEST_A);
        assert!(ChecksumAlgorithm::Sha256
            .digest_file(temp_dir.path().join("missing"))
            .is_err());
    }

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!("SHA256".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Sha256);
        assert!("md5".parse::<ChecksumAlgorithm>().is_err());
    }

    #[test]
    fn test_parse_manifest_literal_digests() {
        let body = format!(
            "{}  packer-plugin-foo_v1.2.3_x5.0_linux_amd64.zip\n{} packer-plugin-foo_v1.2.3_x5.0_darwin_arm64.zip\n",
            DIGEST_A, DIGEST_B
        );
        let entries = parse_checksum_manifest(body.as_bytes(), ChecksumAlgorithm::Sha256).unwrap();
        assert_eq!(entries.len(), 2);

        let manifest = ChecksumManifest::from_entries(entries).unwrap();
        assert_eq!(
            manifest
                .digest_for("packer-plugin-foo_v1.2.3_x5.0_linux_amd64.zip")
                .unwrap(),
            DIGEST_A
        );
        assert_eq!(
            manifest
                .digest_for("packer-plugin-foo_v1.2.3_x5.0_darwin_arm64.zip")
                .unwrap(),
            DIGEST_B
        );
    }

    #[test]
    fn test_parse_manifest_tolerates_whitespace_and_blank_lines() {
        let body = format!("\n   \n{}\t\t  a.zip  \n\n{}   *b.zip\n", DIGEST_A, DIGEST_B);
        let entries = parse_checksum_manifest(body.as_bytes(), ChecksumAlgorithm::Sha256).unwrap();
        assert_eq!(
            entries,
            vec![
                ChecksumFileEntry::new("a.zip", DIGEST_A),
                ChecksumFileEntry::new("b.zip", DIGEST_B),
            ]
        );
    }

    #[test]
    fn test_parse_manifest_bad_record_names_line() {
        let body = format!("{}  a.zip\nnot-a-record\n", DIGEST_A);
        let err = parse_checksum_manifest(body.as_bytes(), ChecksumAlgorithm::Sha256).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_manifest_rejects_short_or_non_hex_digest() {
        let short = parse_checksum_manifest("abcd  a.zip".as_bytes(), ChecksumAlgorithm::Sha256);
        assert!(short.unwrap_err().to_string().contains("must be 32 bytes"));

        let not_hex = format!("{}  a.zip", "z".repeat(64));
        let err = parse_checksum_manifest(not_hex.as_bytes(), ChecksumAlgorithm::Sha256);
        assert!(err.unwrap_err().to_string().contains("invalid sha256 digest"));
    }

    #[test]
    fn test_missing_entry_is_verification_failure() {
        let manifest =
            ChecksumManifest::from_entries(vec![ChecksumFileEntry::new("a.zip", DIGEST_A)]).unwrap();
        let err = manifest.digest_for("b.zip").unwrap_err();
        assert!(matches!(err, Error::Verification(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_conflicting_duplicate_entries() {
        let result = ChecksumManifest::from_entries(vec![
            ChecksumFileEntry::new("a.zip", DIGEST_A),
            ChecksumFileEntry::new("a.zip", DIGEST_B),
        ]);
        assert!(result.is_err());

        let same = ChecksumManifest::from_entries(vec![
            ChecksumFileEntry::new("a.zip", DIGEST_A),
            ChecksumFileEntry::new("a.zip", DIGEST_A.to_uppercase()),
        ])
        .unwrap();
        assert_eq!(same.len(), 1);
    }

    #[test]
    fn test_transform_round_trips_through_json() {
        let body = format!("{}  a.zip\n", DIGEST_A);
        let transformed =
            transform_checksum_stream(body.as_bytes(), ChecksumAlgorithm::Sha256).unwrap();
        let entries = parse_checksum_entries(transformed).unwrap();
        assert_eq!(entries, vec![ChecksumFileEntry::new("a.zip", DIGEST_A)]);
        assert!(entries[0].artifact.is_none());
    }

    #[test]
    fn test_verify_case_insensitive() {
        let manifest = ChecksumManifest::from_entries(vec![ChecksumFileEntry::new(
            "hello.zip",
            DIGEST_A.to_uppercase(),
        )])
        .unwrap();
        let digest = manifest
            .verify("hello.zip", b"Hello, World!", ChecksumAlgorithm::Sha256)
            .unwrap();
        assert_eq!(digest, DIGEST_A);
    }

    #[test]
    fn test_verify_mismatch() {
        let err = verify_digest("a.zip", b"tampered", DIGEST_A, ChecksumAlgorithm::Sha256)
            .unwrap_err();
        assert!(matches!(err, Error::Verification(_)));
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_verify_empty_expected() {
        let err = verify_digest("a.zip", b"x", "", ChecksumAlgorithm::Sha256).unwrap_err();
        assert!(err.to_string().contains("empty checksum"));
    }
}
