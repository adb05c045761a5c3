//! Checks that apply to every language.
//!
//! - Work markers (`TODO`, `FIXME`, `XXX`, `HACK`) left in comments. Markers
//!   with specific context are suggestions; markers without context
//!   (`// TODO`, `# FIXME: fix this`) are flagged as hollow warnings.
//! - Overly long files.
//! - Files defining more functions than `max_functions_per_file`.

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::AnalysisSettings;

use super::{Category, Finding, Severity, SourceText, Structure};

lazy_static! {
    /// Work marker, optional `(owner)`, optional colon, then the text.
    static ref TODO_PATTERN: Regex =
        Regex::new(r"\b(TODO|FIXME|XXX|HACK)\b(?:\([^)]*\))?\s*:?\s*(.*)").unwrap();

    /// Generic placeholder text that carries no information.
    static ref HOLLOW_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)^(implement|finish|complete|add|write)(\s+(this|here|later|it|the))?(\s+(function|method|code|logic|feature|implementation))?$").unwrap(),
        Regex::new(r"(?i)^fix(\s+(this|here|it|later|the))?(\s+(bug|issue|error|problem))?$").unwrap(),
        Regex::new(r"(?i)^handle(\s+(this|here|it|the))?(\s+(error|case|exception))?$").unwrap(),
        Regex::new(r"(?i)^do\s+(this|something|later)$").unwrap(),
        Regex::new(r"(?i)^fill\s*(this\s*)?in(\s+(later|here))?$").unwrap(),
        Regex::new(r"(?i)^(placeholder|stub|tbd|wip|later)$").unwrap(),
        Regex::new(r"(?i)^not\s+implemented(\s+yet)?$").unwrap(),
        Regex::new(r"(?i)^needs?\s+(implementation|work|to\s+be\s+done)$").unwrap(),
        Regex::new(r"(?i)^(change|update|refactor|cleanup|clean\s+up|remove|delete)\s+(this|me|here|later)$").unwrap(),
    ];

    /// A quoted string whose content mentions a marker.
    static ref MARKER_IN_STRING: Regex =
        Regex::new(r#"["'`][^"'`]*\b(?:TODO|FIXME|XXX|HACK)\b[^"'`]*["'`]"#).unwrap();
}

/// Run the generic checks.
pub fn check(source: &SourceText<'_>, settings: &AnalysisSettings, out: &mut Vec<Finding>) {
    check_work_markers(source, out);
    check_file_length(source, settings, out);
}

/// Check if marker text lacks meaningful context.
pub fn is_hollow_marker(content: &str) -> bool {
    let trimmed = content.trim().trim_end_matches(['.', '!']);
    trimmed.is_empty() || HOLLOW_PATTERNS.iter().any(|p| p.is_match(trimmed))
}

fn check_work_markers(source: &SourceText<'_>, out: &mut Vec<Finding>) {
    for (idx, raw) in source.lines.iter().enumerate() {
        // With a lexer, only comment text is searched. Without one, skip
        // lines where the marker sits inside a quoted string.
        let text: &str = match &source.masked {
            Some(masked) => masked[idx].comment.as_str(),
            None if MARKER_IN_STRING.is_match(raw) => continue,
            None => raw,
        };

        let Some(caps) = TODO_PATTERN.captures(text) else {
            continue;
        };
        let marker = caps.get(1).map(|m| m.as_str()).unwrap_or("TODO");
        let content = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");

        let finding = if is_hollow_marker(content) {
            let msg = if content.is_empty() {
                format!("{} marker without context", marker)
            } else {
                format!("{} with hollow context: {:?}", marker, content)
            };
            Finding::new(source.path, Some(idx + 1), Category::HollowTodo, msg)
        } else {
            Finding::new(
                source.path,
                Some(idx + 1),
                Category::TodoMarker,
                format!("unresolved {}: {}", marker, truncate(content, 80)),
            )
        };
        out.push(finding);
    }
}

fn check_file_length(source: &SourceText<'_>, settings: &AnalysisSettings, out: &mut Vec<Finding>) {
    let count = source.lines.len();
    if count <= settings.max_file_lines {
        return;
    }
    let severity = if count > settings.max_file_lines * 2 {
        Severity::Warning
    } else {
        Severity::Suggestion
    };
    out.push(
        Finding::new(
            source.path,
            None,
            Category::LongFile,
            format!(
                "file has {} lines, exceeds maximum of {}",
                count, settings.max_file_lines
            ),
        )
        .with_severity(severity),
    );
}

/// Flag a file whose analyzer counted too many functions.
pub fn check_function_count(
    path: &str,
    structure: &Structure,
    settings: &AnalysisSettings,
    out: &mut Vec<Finding>,
) {
    if structure.functions <= settings.max_functions_per_file {
        return;
    }
    out.push(Finding::new(
        path,
        None,
        Category::HighFunctionCount,
        format!(
            "high function count ({}, max {}); consider splitting this file",
            structure.functions, settings.max_functions_per_file
        ),
    ));
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut t: String = s.chars().take(max_chars).collect();
    t.push('…');
    t
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::mask::{mask, Syntax};

    fn source<'a>(text: &'a str, syntax: Option<Syntax>) -> SourceText<'a> {
        SourceText {
            path: "f",
            lines: text.lines().collect(),
            masked: syntax.map(|s| mask(text, s)),
        }
    }

    #[test]
    fn test_is_hollow_marker() {
        assert!(is_hollow_marker(""));
        assert!(is_hollow_marker("implement this"));
        assert!(is_hollow_marker("Implement this function"));
        assert!(is_hollow_marker("fix this."));
        assert!(is_hollow_marker("TBD"));
        assert!(is_hollow_marker("not implemented yet"));
        assert!(is_hollow_marker("clean up later"));

        assert!(!is_hollow_marker("Use io_uring for zero-copy when kernel >= 5.19"));
        assert!(!is_hollow_marker("Optimize query performance per #1234"));
        assert!(!is_hollow_marker("Add retry logic with exponential backoff"));
        assert!(!is_hollow_marker("Implement caching for database queries"));
    }

    #[test]
    fn test_markers_in_comments_only() {
        let text = "x = 1  # TODO: implement this\ns = \"TODO: not a comment\"\n# FIXME(bob): handle unicode paths on Windows\n";
        let src = source(text, Some(Syntax::Hash));
        let mut out = Vec::new();
        check(&src, &AnalysisSettings::default(), &mut out);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].line, Some(1));
        assert_eq!(out[0].category, Category::HollowTodo);
        assert_eq!(out[0].severity, Severity::Warning);
        assert_eq!(out[1].line, Some(3));
        assert_eq!(out[1].category, Category::TodoMarker);
        assert!(out[1].message.contains("handle unicode paths"));
    }

    #[test]
    fn test_markers_without_lexer_skip_strings() {
        let text = "msg = \"TODO: implement this\"\nTODO\n";
        let src = source(text, None);
        let mut out = Vec::new();
        check(&src, &AnalysisSettings::default(), &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].line, Some(2));
        assert_eq!(out[0].message, "TODO marker without context");
    }

    #[test]
    fn test_lowercase_words_are_not_markers() {
        let text = "# the todo list widget\n";
        let src = source(text, Some(Syntax::Hash));
        let mut out = Vec::new();
        check(&src, &AnalysisSettings::default(), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_file_length_severity_scales() {
        let settings = AnalysisSettings {
            max_file_lines: 10,
            ..Default::default()
        };
        let medium = "x\n".repeat(15);
        let long = "x\n".repeat(25);

        let mut out = Vec::new();
        check(&source(&medium, None), &settings, &mut out);
        assert_eq!(out[0].category, Category::LongFile);
        assert_eq!(out[0].severity, Severity::Suggestion);
        assert_eq!(out[0].line, None);

        let mut out = Vec::new();
        check(&source(&long, None), &settings, &mut out);
        assert_eq!(out[0].severity, Severity::Warning);
    }

    #[test]
    fn test_function_count_threshold() {
        let settings = AnalysisSettings::default();
        let mut structure = Structure {
            files: 1,
            functions: settings.max_functions_per_file,
            classes: 0,
        };
        let mut out = Vec::new();
        check_function_count("a.js", &structure, &settings, &mut out);
        assert!(out.is_empty());

        structure.functions += 1;
        check_function_count("a.js", &structure, &settings, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].category, Category::HighFunctionCount);
        assert_eq!(out[0].severity, Severity::Suggestion);
        assert_eq!(out[0].line, None);
        assert!(out[0].message.starts_with("high function count (11"));
    }
}
