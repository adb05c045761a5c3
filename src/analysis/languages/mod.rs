//! Language-specific analyzer implementations.

mod javascript;
mod python;
mod typescript;

pub use javascript::JavaScriptAnalyzer;
pub use python::PythonAnalyzer;
pub use typescript::TypeScriptAnalyzer;

use super::LanguageAnalyzer;
use crate::select::Language;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, Ordering};

/// Static storage for JavaScript analyzer.
static JAVASCRIPT_ANALYZER: OnceCell<JavaScriptAnalyzer> = OnceCell::new();

/// Static storage for Python analyzer.
static PYTHON_ANALYZER: OnceCell<PythonAnalyzer> = OnceCell::new();

/// Static storage for TypeScript analyzer.
static TYPESCRIPT_ANALYZER: OnceCell<TypeScriptAnalyzer> = OnceCell::new();

static REGISTERED: AtomicBool = AtomicBool::new(false);

/// Register all available language analyzers. Idempotent.
pub fn register_analyzers() {
    if REGISTERED.swap(true, Ordering::SeqCst) {
        return;
    }

    JAVASCRIPT_ANALYZER.get_or_init(JavaScriptAnalyzer::new);
    PYTHON_ANALYZER.get_or_init(PythonAnalyzer::new);
    TYPESCRIPT_ANALYZER.get_or_init(TypeScriptAnalyzer::new);
}

/// Get the analyzer for a language, if it has one.
///
/// Files in other languages still get the generic checks.
pub fn get_analyzer(language: Language) -> Option<&'static dyn LanguageAnalyzer> {
    match language {
        Language::Python => Some(PYTHON_ANALYZER.get_or_init(PythonAnalyzer::new)),
        Language::JavaScript => Some(JAVASCRIPT_ANALYZER.get_or_init(JavaScriptAnalyzer::new)),
        Language::TypeScript => Some(TYPESCRIPT_ANALYZER.get_or_init(TypeScriptAnalyzer::new)),
        Language::Other => None,
    }
}

/// Languages with a dedicated analyzer.
pub fn registered_languages() -> Vec<Language> {
    vec![Language::Python, Language::JavaScript, Language::TypeScript]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_known_languages() {
        register_analyzers();
        for lang in registered_languages() {
            let analyzer = get_analyzer(lang).unwrap();
            assert_eq!(analyzer.language(), lang);
        }
        assert!(get_analyzer(Language::Other).is_none());
    }
}
