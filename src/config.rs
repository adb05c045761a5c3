//! Configuration schema for sophidoc.
//!
//! Configuration is read once from YAML, merged with defaults, then wrapped in
//! an `Arc` and treated as immutable for the rest of the run.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::select::IgnoreSet;

/// Config file names searched in the working directory.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &["sophidoc.yaml", ".sophidoc.yaml"];

pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;
pub const DEFAULT_MAX_TOTAL_SIZE: u64 = 10 * 1024 * 1024;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DoctorConfig {
    pub provider: ProviderSettings,
    pub selection: SelectionSettings,
    pub analysis: AnalysisSettings,
    pub cache: CacheSettings,
    pub payload: PayloadSettings,
    /// Where to write the Markdown report, if anywhere.
    pub output: Option<PathBuf>,
}

/// Diagnosis provider settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// "gemini", "openai" or "anthropic"
    pub default: String,
    /// Model override; each provider has its own default.
    pub model: Option<String>,
    /// Endpoint override, mostly for proxies and tests.
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub max_output_tokens: u32,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            default: "gemini".to_string(),
            model: None,
            base_url: None,
            timeout_secs: 120,
            max_retries: 2,
            retry_backoff_ms: 1000,
            max_output_tokens: 4000,
        }
    }
}

/// File selection settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SelectionSettings {
    /// Glob patterns appended after the built-in ignore rules.
    pub ignore: Vec<String>,
    pub max_file_size: u64,
    pub max_total_size: u64,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            ignore: Vec::new(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_total_size: DEFAULT_MAX_TOTAL_SIZE,
        }
    }
}

/// Static analysis settings and thresholds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub enabled: bool,
    /// Function length (lines) above which a suggestion is raised.
    pub max_function_lines: usize,
    /// Function length above which the finding becomes a warning.
    pub critical_function_lines: usize,
    pub max_parameters: usize,
    /// File length above which a suggestion is raised; twice this is a warning.
    pub max_file_lines: usize,
    pub max_findings_per_file: usize,
    /// Functions per file above which a suggestion is raised.
    pub max_functions_per_file: usize,
    pub require_docstrings: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_function_lines: 50,
            critical_function_lines: 100,
            max_parameters: 5,
            max_file_lines: 500,
            max_findings_per_file: 50,
            max_functions_per_file: 10,
            require_docstrings: true,
        }
    }
}

/// Result cache settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_hours: u64,
    pub max_entries: usize,
    pub max_bytes: u64,
    /// Defaults to the platform cache directory.
    pub dir: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_hours: 24,
            max_entries: 100,
            max_bytes: 64 * 1024 * 1024,
            dir: None,
        }
    }
}

impl CacheSettings {
    /// Configured directory, or `<platform cache dir>/results`.
    pub fn resolve_dir(&self) -> Option<PathBuf> {
        self.dir.clone().or_else(|| {
            ProjectDirs::from("", "", "sophidoc").map(|dirs| dirs.cache_dir().join("results"))
        })
    }
}

/// Bounds on what is sent to the diagnosis provider.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PayloadSettings {
    pub max_bytes: usize,
    pub max_excerpt_bytes: usize,
    pub max_findings: usize,
}

impl Default for PayloadSettings {
    fn default() -> Self {
        Self {
            max_bytes: 256 * 1024,
            max_excerpt_bytes: 16 * 1024,
            max_findings: 200,
        }
    }
}

impl DoctorConfig {
    /// Parse a configuration from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: DoctorConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load from `explicit`, else the first discovered file, else defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            let config = Self::parse_file(path)
                .map_err(|e| anyhow::anyhow!("reading config {}: {}", path.display(), e))?;
            return Ok((config, Some(path.to_path_buf())));
        }
        match discover() {
            Some(path) => {
                let config = Self::parse_file(&path)
                    .map_err(|e| anyhow::anyhow!("reading config {}: {}", path.display(), e))?;
                Ok((config, Some(path)))
            }
            None => Ok((Self::default(), None)),
        }
    }

    /// Serialize back to YAML (for `sophidoc config`).
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Compile the ignore rules for this configuration.
    pub fn ignore_set(&self) -> Result<IgnoreSet, crate::select::SelectionError> {
        IgnoreSet::new(&self.selection.ignore)
    }
}

/// Find a config file in the working directory, then the user config dir.
fn discover() -> Option<PathBuf> {
    for name in DEFAULT_CONFIG_NAMES {
        let path = PathBuf::from(name);
        if path.exists() {
            return Some(path);
        }
    }
    ProjectDirs::from("", "", "sophidoc")
        .map(|dirs| dirs.config_dir().join("config.yaml"))
        .filter(|p| p.exists())
}

/// Validate a configuration.
pub fn validate(config: &DoctorConfig) -> anyhow::Result<()> {
    if config.selection.max_file_size == 0 {
        anyhow::bail!("selection.max_file_size must be greater than zero");
    }
    if config.selection.max_total_size < config.selection.max_file_size {
        anyhow::bail!(
            "selection.max_total_size ({}) is smaller than selection.max_file_size ({})",
            config.selection.max_total_size,
            config.selection.max_file_size
        );
    }
    config.ignore_set()?;

    let a = &config.analysis;
    if a.max_function_lines == 0 || a.critical_function_lines < a.max_function_lines {
        anyhow::bail!(
            "analysis.critical_function_lines must be >= analysis.max_function_lines (> 0)"
        );
    }
    if a.max_file_lines == 0 || a.max_findings_per_file == 0 || a.max_functions_per_file == 0 {
        anyhow::bail!("analysis limits must be greater than zero");
    }

    if config.cache.max_entries == 0 {
        anyhow::bail!("cache.max_entries must be greater than zero");
    }
    if config.provider.timeout_secs == 0 {
        anyhow::bail!("provider.timeout_secs must be greater than zero");
    }
    if config.payload.max_excerpt_bytes > config.payload.max_bytes {
        anyhow::bail!("payload.max_excerpt_bytes cannot exceed payload.max_bytes");
    }
    Ok(())
}
