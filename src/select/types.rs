//! Core types produced by file selection.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Languages the analyzer knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Other,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Other => "other",
        }
    }

    /// Map a file extension (without the dot) to a language.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "py" | "pyw" => Language::Python,
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Language::TypeScript,
            _ => Language::Other,
        }
    }

    /// Detect the language of a path from its extension.
    pub fn detect<P: AsRef<Path>>(path: P) -> Self {
        path.as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(Language::from_extension)
            .unwrap_or(Language::Other)
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A file eligible for analysis. Content is not loaded here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFile {
    /// Path relative to the project root, `/`-separated.
    pub path: String,
    pub abs_path: PathBuf,
    pub language: Language,
    pub size: u64,
    /// Binary files are counted and fingerprinted but never analyzed.
    pub is_binary: bool,
}

/// Why a path was left out of the selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// Directory matched an ignore rule; nothing below it was visited.
    IgnoredDirectory { pattern: String },
    IgnoredByRule { pattern: String },
    TooLarge { size: u64, limit: u64 },
    TotalSizeExceeded { limit: u64 },
    NotRegularFile,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::IgnoredDirectory { pattern } => {
                write!(f, "ignored directory (rule {:?})", pattern)
            }
            SkipReason::IgnoredByRule { pattern } => write!(f, "ignored (rule {:?})", pattern),
            SkipReason::TooLarge { size, limit } => {
                write!(f, "too large ({:.1}KB > {:.1}KB)", kb(*size), kb(*limit))
            }
            SkipReason::TotalSizeExceeded { limit } => {
                write!(f, "total size limit reached ({:.1}KB)", kb(*limit))
            }
            SkipReason::NotRegularFile => write!(f, "not a regular file"),
        }
    }
}

fn kb(bytes: u64) -> f64 {
    bytes as f64 / 1024.0
}

/// A recorded exclusion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    pub path: String,
    pub reason: SkipReason,
}

impl Exclusion {
    /// Size limits skip files; rule-based exclusions are not counted as skipped.
    pub fn counts_as_skipped(&self) -> bool {
        matches!(
            self.reason,
            SkipReason::TooLarge { .. } | SkipReason::TotalSizeExceeded { .. }
        )
    }
}

/// A single file or directory that could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAccessWarning {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for FileAccessWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Output of a selection pass.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Sorted by `path`.
    pub files: Vec<ProjectFile>,
    pub excluded: Vec<Exclusion>,
    pub warnings: Vec<FileAccessWarning>,
}

impl Selection {
    /// Number of files skipped by size limits.
    pub fn skipped_count(&self) -> usize {
        self.excluded.iter().filter(|e| e.counts_as_skipped()).count()
    }

    /// Total bytes of all selected files.
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_extension() {
        assert_eq!(Language::from_extension("py"), Language::Python);
        assert_eq!(Language::from_extension("PY"), Language::Python);
        assert_eq!(Language::from_extension("jsx"), Language::JavaScript);
        assert_eq!(Language::from_extension("mjs"), Language::JavaScript);
        assert_eq!(Language::from_extension("tsx"), Language::TypeScript);
        assert_eq!(Language::from_extension("go"), Language::Other);
        assert_eq!(Language::detect("src/app.ts"), Language::TypeScript);
        assert_eq!(Language::detect("Makefile"), Language::Other);
    }

    #[test]
    fn test_skip_reason_display() {
        let reason = SkipReason::TooLarge {
            size: 2048,
            limit: 1024,
        };
        assert!(reason.to_string().starts_with("too large"));
    }
}
