//! Core types for static analysis results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::select::{Exclusion, FileAccessWarning, Language};

/// Severity levels for findings, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Suggestion,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::Warning => write!(f, "warning"),
            Severity::Suggestion => write!(f, "suggestion"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "warning" => Ok(Severity::Warning),
            "suggestion" => Ok(Severity::Suggestion),
            _ => Err(format!("unknown severity: {}", s)),
        }
    }
}

/// Check identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    // Generic
    TodoMarker,
    HollowTodo,
    LongFile,
    HighFunctionCount,
    Unanalyzable,
    FindingsTruncated,
    // Python
    BareExcept,
    MutableDefault,
    LongFunction,
    TooManyParameters,
    MissingDocstring,
    // JavaScript / TypeScript
    LooseEquality,
    ConsoleDebug,
    DebuggerStatement,
    VarDeclaration,
    UnusedVariable,
    UnhandledPromise,
    AwaitOutsideTry,
    ExplicitAny,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::TodoMarker => "todo_marker",
            Category::HollowTodo => "hollow_todo",
            Category::LongFile => "long_file",
            Category::HighFunctionCount => "high_function_count",
            Category::Unanalyzable => "unanalyzable",
            Category::FindingsTruncated => "findings_truncated",
            Category::BareExcept => "bare_except",
            Category::MutableDefault => "mutable_default",
            Category::LongFunction => "long_function",
            Category::TooManyParameters => "too_many_parameters",
            Category::MissingDocstring => "missing_docstring",
            Category::LooseEquality => "loose_equality",
            Category::ConsoleDebug => "console_debug",
            Category::DebuggerStatement => "debugger_statement",
            Category::VarDeclaration => "var_declaration",
            Category::UnusedVariable => "unused_variable",
            Category::UnhandledPromise => "unhandled_promise",
            Category::AwaitOutsideTry => "await_outside_try",
            Category::ExplicitAny => "explicit_any",
        }
    }

    /// Fixed severity of the check. Length checks compute their own.
    pub fn default_severity(&self) -> Severity {
        match self {
            Category::BareExcept
            | Category::MutableDefault
            | Category::HollowTodo
            | Category::Unanalyzable
            | Category::LooseEquality
            | Category::DebuggerStatement
            | Category::UnhandledPromise => Severity::Warning,
            _ => Severity::Suggestion,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single static-analysis observation about a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub severity: Severity,
    pub category: Category,
    pub message: String,
}

impl Finding {
    /// Finding with the check's fixed severity.
    pub fn new(file: &str, line: Option<usize>, category: Category, message: String) -> Self {
        Self {
            file: file.to_string(),
            line,
            severity: category.default_severity(),
            category,
            message,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Order within a file: file-level findings first, then by line, check id
    /// and message.
    pub fn sort_key(&self) -> (usize, &'static str, &str) {
        (self.line.unwrap_or(0), self.category.as_str(), &self.message)
    }
}

/// Structural facts: how many functions and classes a file, or every file
/// of a language, defines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Structure {
    pub files: usize,
    pub functions: usize,
    pub classes: usize,
}

impl Structure {
    /// Functions plus twice the classes.
    pub fn complexity_score(&self) -> usize {
        self.functions + 2 * self.classes
    }

    pub fn is_empty(&self) -> bool {
        self.functions == 0 && self.classes == 0
    }
}

impl std::fmt::Display for Structure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} functions, {} classes (complexity score {})",
            self.functions,
            self.classes,
            self.complexity_score()
        )
    }
}

impl std::ops::AddAssign for Structure {
    fn add_assign(&mut self, other: Self) {
        self.files += other.files;
        self.functions += other.functions;
        self.classes += other.classes;
    }
}

/// Aggregated result of one selection + analysis pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    /// Sorted by file path, then `Finding::sort_key`.
    pub findings: Vec<Finding>,
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub binary_files: usize,
    pub total_bytes: u64,
    #[serde(default)]
    pub lines_of_code: BTreeMap<Language, usize>,
    /// Per language, only for languages with an analyzer.
    #[serde(default)]
    pub structure: BTreeMap<Language, Structure>,
    #[serde(default)]
    pub static_analysis: bool,
    #[serde(default)]
    pub excluded: Vec<Exclusion>,
    #[serde(default)]
    pub warnings: Vec<FileAccessWarning>,
}

impl AnalysisSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_lines(&self) -> usize {
        self.lines_of_code.values().sum()
    }

    /// Structural facts summed over every language.
    pub fn total_structure(&self) -> Structure {
        let mut total = Structure::default();
        for s in self.structure.values() {
            total += *s;
        }
        total
    }

    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    /// Findings attached to one file, in order.
    pub fn findings_for<'a>(&'a self, file: &'a str) -> impl Iterator<Item = &'a Finding> + 'a {
        self.findings.iter().filter(move |f| f.file == file)
    }

    pub fn has_critical(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Critical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_roundtrip_str() {
        for s in [Severity::Critical, Severity::Warning, Severity::Suggestion] {
            assert_eq!(s.to_string().parse::<Severity>().unwrap(), s);
        }
        assert!("fatal".parse::<Severity>().is_err());
    }

    #[test]
    fn test_finding_uses_fixed_severity() {
        let f = Finding::new("a.py", Some(3), Category::BareExcept, "bare".to_string());
        assert_eq!(f.severity, Severity::Warning);
        let f = Finding::new("a.py", Some(3), Category::TodoMarker, "todo".to_string());
        assert_eq!(f.severity, Severity::Suggestion);
    }

    #[test]
    fn test_category_serializes_snake_case() {
        let json = serde_json::to_string(&Category::AwaitOutsideTry).unwrap();
        assert_eq!(json, "\"await_outside_try\"");
    }

    #[test]
    fn test_structure_totals_and_score() {
        let mut summary = AnalysisSummary::new();
        summary.structure.insert(
            Language::Python,
            Structure {
                files: 2,
                functions: 5,
                classes: 1,
            },
        );
        summary.structure.insert(
            Language::JavaScript,
            Structure {
                files: 1,
                functions: 3,
                classes: 0,
            },
        );
        let total = summary.total_structure();
        assert_eq!(total.files, 3);
        assert_eq!(total.functions, 8);
        assert_eq!(total.classes, 1);
        assert_eq!(total.complexity_score(), 10);
        assert_eq!(total.to_string(), "8 functions, 1 classes (complexity score 10)");
    }

    #[test]
    fn test_file_level_findings_sort_first() {
        let a = Finding::new("a.py", None, Category::LongFile, "long".to_string());
        let b = Finding::new("a.py", Some(1), Category::BareExcept, "bare".to_string());
        assert!(a.sort_key() < b.sort_key());
    }
}
