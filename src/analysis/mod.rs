//! Shallow static analysis.
//!
//! Each selected file is read once through the bounded reader, which yields
//! both the content and its hash. The content is decoded, masked by a
//! single-pass lexer for its language family, and run through the generic
//! checks plus the language's own analyzer. Content is dropped as soon as
//! the file's findings are produced.
//!
//! # Adding a New Language
//!
//! 1. Create a new module in `src/analysis/languages/`
//! 2. Implement `LanguageAnalyzer` for it
//! 3. Register the analyzer in `languages/mod.rs`

mod generic;
mod languages;
pub mod mask;
mod traits;
mod types;

pub use generic::is_hollow_marker;
pub use languages::{
    get_analyzer, register_analyzers, registered_languages, JavaScriptAnalyzer, PythonAnalyzer,
    TypeScriptAnalyzer,
};
pub use traits::{LanguageAnalyzer, SourceText};
pub use types::{AnalysisSummary, Category, Finding, Severity, Structure};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::AnalysisSettings;
use crate::fingerprint::FileDigest;
use crate::select::{FileAccessWarning, Language, ProjectFile, Selection};
use crate::source::{self, SourceError};

/// Findings and structural facts for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileAnalysis {
    pub findings: Vec<Finding>,
    /// `None` when no analyzer handles the language or the file is not text.
    pub structure: Option<Structure>,
}

/// Analyze one file's content.
///
/// `path` is only used to label findings. Findings are sorted and capped at
/// `settings.max_findings_per_file`.
pub fn analyze_source(
    path: &str,
    bytes: &[u8],
    language: Language,
    settings: &AnalysisSettings,
) -> FileAnalysis {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            return FileAnalysis {
                findings: vec![Finding::new(
                    path,
                    None,
                    Category::Unanalyzable,
                    format!("not valid UTF-8 (first bad byte at offset {})", e.valid_up_to()),
                )],
                structure: None,
            };
        }
    };
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let analyzer = get_analyzer(language);
    let source = SourceText::new(path, text, analyzer.map(|a| a.syntax()));

    let mut findings = Vec::new();
    generic::check(&source, settings, &mut findings);
    let structure = analyzer.map(|analyzer| {
        analyzer.check(&source, settings, &mut findings);
        let structure = analyzer.structure(&source);
        generic::check_function_count(path, &structure, settings, &mut findings);
        structure
    });
    FileAnalysis {
        findings: finalize(path, findings, settings.max_findings_per_file),
        structure,
    }
}

/// Sort, dedupe and cap one file's findings.
///
/// When capped, the most severe findings are kept and one extra
/// `findings_truncated` note is appended.
fn finalize(path: &str, mut findings: Vec<Finding>, cap: usize) -> Vec<Finding> {
    findings.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    findings.dedup();

    if findings.len() <= cap {
        return findings;
    }

    let dropped = findings.len() - cap;
    findings.sort_by(|a, b| {
        a.severity
            .cmp(&b.severity)
            .then_with(|| a.sort_key().cmp(&b.sort_key()))
    });
    findings.truncate(cap);
    findings.push(Finding::new(
        path,
        None,
        Category::FindingsTruncated,
        format!("{} more findings in this file were not reported", dropped),
    ));
    findings.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    findings
}

/// Non-blank line count.
fn count_lines(bytes: &[u8]) -> usize {
    String::from_utf8_lossy(bytes)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .count()
}

/// What happened to one selected file.
#[derive(Debug)]
pub enum FileOutcome {
    Analyzed {
        digest: FileDigest,
        analysis: FileAnalysis,
        lines: usize,
    },
    /// Binary, or analysis disabled.
    Hashed(FileDigest),
    /// The file vanished or changed under us; it leaves the effective set.
    Unreadable(FileAccessWarning),
}

/// Read, hash and analyze one file. `read_limit` guards against growth since
/// selection.
pub fn analyze_file(file: &ProjectFile, settings: &AnalysisSettings, read_limit: u64) -> FileOutcome {
    if file.is_binary || !settings.enabled {
        return hash_file(file);
    }

    let loaded = match source::read_bounded(&file.abs_path, read_limit) {
        Ok(loaded) => loaded,
        Err(e) => return unreadable(file, e),
    };
    let analysis = analyze_source(&file.path, &loaded.bytes, file.language, settings);
    debug!(path = %file.path, findings = analysis.findings.len(), "analyzed");

    FileOutcome::Analyzed {
        digest: FileDigest {
            path: file.path.clone(),
            hash: loaded.hash,
        },
        analysis,
        lines: count_lines(&loaded.bytes),
    }
}

fn hash_file(file: &ProjectFile) -> FileOutcome {
    match source::hash_file(&file.abs_path) {
        Ok(hash) => FileOutcome::Hashed(FileDigest {
            path: file.path.clone(),
            hash,
        }),
        Err(e) => unreadable(file, SourceError::Io(e)),
    }
}

fn unreadable(file: &ProjectFile, err: SourceError) -> FileOutcome {
    warn!(path = %file.path, error = %err, "file could not be read");
    FileOutcome::Unreadable(FileAccessWarning {
        path: file.path.clone(),
        message: err.to_string(),
    })
}

/// Analyze all files in parallel. Outcomes are in selection order.
pub fn analyze_files(
    files: &[ProjectFile],
    settings: &AnalysisSettings,
    read_limit: u64,
) -> Vec<FileOutcome> {
    files
        .par_iter()
        .map(|file| analyze_file(file, settings, read_limit))
        .collect()
}

/// Fold a selection and its per-file outcomes into a summary.
///
/// Also returns the digests of every file that stayed in the effective set,
/// in selection order.
pub fn summarize(
    selection: Selection,
    outcomes: Vec<FileOutcome>,
    static_analysis: bool,
) -> (AnalysisSummary, Vec<FileDigest>) {
    let mut summary = AnalysisSummary {
        files_skipped: selection.skipped_count(),
        static_analysis,
        ..AnalysisSummary::new()
    };
    let mut digests = Vec::with_capacity(outcomes.len());
    let mut warnings = selection.warnings;

    for (file, outcome) in selection.files.iter().zip(outcomes) {
        match outcome {
            FileOutcome::Analyzed {
                digest,
                analysis,
                lines,
            } => {
                *summary.lines_of_code.entry(file.language).or_default() += lines;
                if let Some(structure) = analysis.structure {
                    *summary.structure.entry(file.language).or_default() += structure;
                }
                summary.findings.extend(analysis.findings);
                digests.push(digest);
            }
            FileOutcome::Hashed(digest) => digests.push(digest),
            FileOutcome::Unreadable(warning) => {
                warnings.push(warning);
                continue;
            }
        }
        summary.files_scanned += 1;
        summary.total_bytes += file.size;
        if file.is_binary {
            summary.binary_files += 1;
        }
    }

    warnings.sort_by(|a, b| a.path.cmp(&b.path));
    summary.warnings = warnings;
    summary.excluded = selection.excluded;
    (summary, digests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::select::{Exclusion, SkipReason};
    use tempfile::TempDir;

    #[test]
    fn test_invalid_utf8_is_unanalyzable() {
        let analysis = analyze_source(
            "bad.py",
            b"x = 1\n\xff\xfe\n",
            Language::Python,
            &AnalysisSettings::default(),
        );
        assert_eq!(analysis.structure, None);
        let findings = analysis.findings;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category, Category::Unanalyzable);
        assert_eq!(findings[0].severity, Severity::Warning);
        assert!(findings[0].message.contains("offset 6"));
    }

    #[test]
    fn test_other_language_gets_generic_checks() {
        let analysis = analyze_source(
            "notes.txt",
            b"TODO\nx == y\n",
            Language::Other,
            &AnalysisSettings::default(),
        );
        assert_eq!(analysis.structure, None);
        assert_eq!(analysis.findings.len(), 1);
        assert_eq!(analysis.findings[0].category, Category::HollowTodo);
    }

    #[test]
    fn test_output_sorted_and_pure() {
        let src = b"def f(a=[]):\n    try:\n        pass\n    except:\n        pass\n# TODO: implement this\n";
        let settings = AnalysisSettings::default();
        let first = analyze_source("m.py", src, Language::Python, &settings);
        let second = analyze_source("m.py", src, Language::Python, &settings);
        assert_eq!(first, second);
        let first = first.findings;

        let keys: Vec<_> = first.iter().map(|f| f.sort_key()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(first.last().map(|f| f.line), Some(Some(6)));
    }

    #[test]
    fn test_findings_are_capped() {
        let settings = AnalysisSettings {
            max_findings_per_file: 3,
            ..Default::default()
        };
        let mut src = String::from("if (a == b) {}\n");
        src.push_str(&"console.log(1);\n".repeat(10));
        let findings =
            analyze_source("a.js", src.as_bytes(), Language::JavaScript, &settings).findings;

        assert_eq!(findings.len(), 4);
        assert_eq!(findings[0].category, Category::FindingsTruncated);
        assert!(findings[0].message.starts_with("8 more"));
        // The warning survives the cap.
        assert!(findings.iter().any(|f| f.category == Category::LooseEquality));
    }

    #[test]
    fn test_high_function_count_from_structure() {
        let settings = AnalysisSettings {
            max_functions_per_file: 2,
            ..Default::default()
        };
        let src = "const a = () => 1;\nconst b = () => 2;\nfunction c() { return 3; }\nclass D {}\n";
        let analysis = analyze_source("f.js", src.as_bytes(), Language::JavaScript, &settings);

        assert_eq!(
            analysis.structure,
            Some(Structure {
                files: 1,
                functions: 3,
                classes: 1,
            })
        );
        let flagged: Vec<_> = analysis
            .findings
            .iter()
            .filter(|f| f.category == Category::HighFunctionCount)
            .collect();
        assert_eq!(flagged.len(), 1);
        assert!(flagged[0].message.contains("(3, max 2)"));
    }

    #[test]
    fn test_summarize_keeps_selection_order() {
        let temp = TempDir::new().unwrap();
        let write = |name: &str, content: &[u8]| {
            let path = temp.path().join(name);
            std::fs::write(&path, content).unwrap();
            ProjectFile {
                path: name.to_string(),
                abs_path: path,
                language: Language::detect(name),
                size: content.len() as u64,
                is_binary: content.contains(&0),
            }
        };
        let files = vec![
            write("a.py", b"try:\n    x()\nexcept:\n    pass\n"),
            write("b.bin", b"\x00\x01"),
            write("c.js", b"var x = 1;\nuse(x);\n"),
        ];
        let gone = ProjectFile {
            path: "d.py".to_string(),
            abs_path: temp.path().join("d.py"),
            language: Language::Python,
            size: 4,
            is_binary: false,
        };
        let mut all = files.clone();
        all.push(gone);

        let selection = Selection {
            files: all,
            excluded: vec![Exclusion {
                path: "huge.py".to_string(),
                reason: SkipReason::TooLarge { size: 10, limit: 5 },
            }],
            warnings: Vec::new(),
        };
        let settings = AnalysisSettings::default();
        let outcomes = analyze_files(&selection.files, &settings, 1024);
        let (summary, digests) = summarize(selection, outcomes, true);

        let paths: Vec<&str> = digests.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["a.py", "b.bin", "c.js"]);
        assert_eq!(summary.files_scanned, 3);
        assert_eq!(summary.files_skipped, 1);
        assert_eq!(summary.binary_files, 1);
        assert_eq!(summary.warnings.len(), 1);
        assert_eq!(summary.warnings[0].path, "d.py");
        assert_eq!(summary.lines_of_code.get(&Language::Python), Some(&4));
        assert_eq!(summary.lines_of_code.get(&Language::JavaScript), Some(&2));
        assert_eq!(summary.structure.get(&Language::Python).map(|s| s.files), Some(1));
        assert_eq!(summary.structure.get(&Language::JavaScript).map(|s| s.files), Some(1));
        assert_eq!(summary.structure.get(&Language::Other), None);

        let files_with_findings: Vec<&str> =
            summary.findings.iter().map(|f| f.file.as_str()).collect();
        assert_eq!(files_with_findings, vec!["a.py", "c.js"]);
    }

    #[test]
    fn test_disabled_analysis_only_hashes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.py");
        std::fs::write(&path, "try:\n    x()\nexcept:\n    pass\n").unwrap();
        let file = ProjectFile {
            path: "a.py".to_string(),
            abs_path: path,
            language: Language::Python,
            size: 30,
            is_binary: false,
        };
        let settings = AnalysisSettings {
            enabled: false,
            ..Default::default()
        };
        assert!(matches!(
            analyze_file(&file, &settings, 1024),
            FileOutcome::Hashed(_)
        ));
    }
}
