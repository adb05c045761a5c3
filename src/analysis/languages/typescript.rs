//! TypeScript checks: everything JavaScript gets, plus explicit `any`.

use lazy_static::lazy_static;
use regex::Regex;

use super::javascript::{check_script, script_structure};
use crate::analysis::mask::Syntax;
use crate::analysis::{Category, Finding, LanguageAnalyzer, SourceText, Structure};
use crate::config::AnalysisSettings;
use crate::select::Language;

lazy_static! {
    static ref EXPLICIT_ANY: Regex =
        Regex::new(r"(?::\s*any\b|<any>|\bas\s+any\b|\bany\s*\[\s*\])").unwrap();
}

/// TypeScript language analyzer.
pub struct TypeScriptAnalyzer;

impl TypeScriptAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TypeScriptAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageAnalyzer for TypeScriptAnalyzer {
    fn language(&self) -> Language {
        Language::TypeScript
    }

    fn syntax(&self) -> Syntax {
        Syntax::CLike
    }

    fn check(&self, source: &SourceText<'_>, settings: &AnalysisSettings, out: &mut Vec<Finding>) {
        check_script(source, settings, out);

        for (idx, line) in source.code().iter().enumerate() {
            if EXPLICIT_ANY.is_match(&line.code) {
                out.push(Finding::new(
                    source.path,
                    Some(idx + 1),
                    Category::ExplicitAny,
                    "explicit `any` disables type checking here".to_string(),
                ));
            }
        }
    }

    fn structure(&self, source: &SourceText<'_>) -> Structure {
        script_structure(source)
    }
}
