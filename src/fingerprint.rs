//! Project fingerprinting.
//!
//! A fingerprint is the SHA-256 over the path-sorted `(path, content hash)`
//! pairs of the selected files, followed by the SHA-256 of the serialized
//! configuration subset that influences selection, analysis or diagnosis.
//! Timestamps, traversal order and unrelated settings never enter it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

use crate::config::{AnalysisSettings, DoctorConfig};
use crate::select::IgnoreSet;

/// Bumped whenever a check changes behavior.
pub const ANALYZER_VERSION: &str = "sophidoc-analyzer/2";

/// SHA-256 of a file's raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::from_digest(&Sha256::digest(bytes))
    }

    /// Wrap a finished SHA-256 digest.
    pub(crate) fn from_digest(digest: &[u8]) -> Self {
        let mut out = [0u8; 32];
        out.copy_from_slice(digest);
        Self(out)
    }

    pub fn to_hex(&self) -> String {
        to_hex(&self.0)
    }
}

/// Identity of one selected file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub path: String,
    pub hash: ContentHash,
}

/// Opaque project identity; 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub const LEN: usize = 64;

    /// Accept only well-formed fingerprints (used for cache file names).
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() == Self::LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, for logs and reports.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Configuration subset that takes part in the fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FingerprintConfig {
    pub analyzer_version: String,
    /// In evaluation order, defaults included.
    pub ignore_rules: Vec<String>,
    pub max_file_size: u64,
    pub max_total_size: u64,
    pub static_analysis: bool,
    /// Thresholds only matter while analysis runs.
    pub analysis: Option<AnalysisSettings>,
    /// Provider id and model.
    pub provider: String,
    pub project_description: String,
}

impl FingerprintConfig {
    pub fn new(
        config: &DoctorConfig,
        rules: &IgnoreSet,
        provider: &str,
        project_description: &str,
    ) -> Self {
        Self {
            analyzer_version: ANALYZER_VERSION.to_string(),
            ignore_rules: rules.patterns().into_iter().map(str::to_string).collect(),
            max_file_size: config.selection.max_file_size,
            max_total_size: config.selection.max_total_size,
            static_analysis: config.analysis.enabled,
            analysis: config.analysis.enabled.then(|| config.analysis.clone()),
            provider: provider.to_string(),
            project_description: project_description.trim().to_string(),
        }
    }

    fn digest(&self) -> ContentHash {
        // Struct field order is fixed, so the JSON form is stable.
        let serialized = serde_json::to_vec(self).unwrap_or_default();
        ContentHash::from_bytes(&serialized)
    }
}

/// Compute the project fingerprint.
pub fn compute(digests: &[FileDigest], config: &FingerprintConfig) -> Fingerprint {
    let mut sorted: Vec<&FileDigest> = digests.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    let mut hasher = Sha256::new();
    for d in sorted {
        hasher.update(d.path.as_bytes());
        hasher.update([0u8]);
        hasher.update(d.hash.0);
        hasher.update([b'\n']);
    }
    hasher.update(b"--config--");
    hasher.update(config.digest().0);

    Fingerprint(to_hex(&hasher.finalize()))
}

fn to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{:02x}", b);
    }
    s
}
