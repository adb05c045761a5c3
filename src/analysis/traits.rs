//! Core traits for language analysis.

use crate::config::AnalysisSettings;
use crate::select::Language;

use super::mask::{MaskedLine, Syntax};
use super::{Finding, Structure};

/// A decoded source file ready for checks.
///
/// `lines` and `masked` are index-aligned: `masked[i]` is the code/comment
/// split of `lines[i]`. Files without a known comment syntax have no mask.
pub struct SourceText<'a> {
    /// Path relative to the project root (used in findings).
    pub path: &'a str,
    pub lines: Vec<&'a str>,
    pub masked: Option<Vec<MaskedLine>>,
}

impl<'a> SourceText<'a> {
    pub fn new(path: &'a str, text: &'a str, syntax: Option<Syntax>) -> Self {
        Self {
            path,
            lines: text.lines().collect(),
            masked: syntax.map(|s| super::mask::mask(text, s)),
        }
    }

    /// Masked lines, or an empty slice when no lexer ran.
    pub fn code(&self) -> &[MaskedLine] {
        self.masked.as_deref().unwrap_or(&[])
    }
}

/// Language-specific analyzer trait.
///
/// Implementations are stateless and shared across rayon workers.
pub trait LanguageAnalyzer: Send + Sync {
    fn language(&self) -> Language;

    /// Comment and string syntax used to mask the source.
    fn syntax(&self) -> Syntax;

    /// Append findings for `source` to `out`.
    fn check(&self, source: &SourceText<'_>, settings: &AnalysisSettings, out: &mut Vec<Finding>);

    /// Count the functions and classes `source` defines.
    fn structure(&self, source: &SourceText<'_>) -> Structure;
}
