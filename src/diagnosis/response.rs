//! Splitting a provider's Markdown answer into categories.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    /// `### Critical Issues`, `**Critical Issues:**`, with or without emoji.
    static ref HEADING: Regex =
        Regex::new(r"^\s*(?:#{1,6}\s*(.+?)\s*#*\s*$|\*\*(.+?)\*\*:?\s*$)").unwrap();
    static ref BULLET: Regex = Regex::new(r"^\s*(?:[-*+•]|\d+[.)])\s+(.*)$").unwrap();
}

/// A diagnosis, split into the three categories the prompt asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisResult {
    /// One-sentence health summary.
    pub headline: String,
    pub critical_issues: Vec<String>,
    pub overlooked: Vec<String>,
    pub suggestions: Vec<String>,
    /// The provider's full answer.
    pub raw: String,
}

impl DiagnosisResult {
    pub fn from_text(text: &str) -> Self {
        parse_sections(text)
    }

    pub fn is_empty(&self) -> bool {
        self.critical_issues.is_empty() && self.overlooked.is_empty() && self.suggestions.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Critical,
    Overlooked,
    Suggestions,
}

fn classify_heading(title: &str) -> Option<Section> {
    let t = title.to_lowercase();
    if t.contains("critical") {
        Some(Section::Critical)
    } else if t.contains("forget") || t.contains("overlook") || t.contains("missing") {
        Some(Section::Overlooked)
    } else if t.contains("suggest") || t.contains("improve") {
        Some(Section::Suggestions)
    } else {
        None
    }
}

/// Split Markdown text into headline and categorized items.
///
/// Sections start at headings whose title names a category. Within a
/// section, each bullet (or each paragraph, if there are no bullets) is one
/// item; continuation lines are folded into the preceding item.
pub fn parse_sections(text: &str) -> DiagnosisResult {
    let mut result = DiagnosisResult {
        raw: text.to_string(),
        ..Default::default()
    };
    let mut section = Section::Preamble;
    let mut current: Option<String> = None;

    for line in text.lines() {
        if let Some(caps) = HEADING.captures(line) {
            let title = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            if let Some(next) = classify_heading(title) {
                flush(&mut result, section, &mut current);
                section = next;
                continue;
            }
            if section == Section::Preamble {
                // A title heading before the sections; not the headline.
                continue;
            }
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            if section != Section::Preamble {
                flush(&mut result, section, &mut current);
            }
            continue;
        }

        if section == Section::Preamble {
            if result.headline.is_empty() {
                result.headline = strip_emphasis(trimmed).to_string();
            }
            continue;
        }

        if let Some(caps) = BULLET.captures(line) {
            flush(&mut result, section, &mut current);
            current = Some(caps[1].trim().to_string());
        } else {
            match current.as_mut() {
                Some(item) => {
                    item.push(' ');
                    item.push_str(trimmed);
                }
                None => current = Some(trimmed.to_string()),
            }
        }
    }
    flush(&mut result, section, &mut current);
    result
}

fn flush(result: &mut DiagnosisResult, section: Section, current: &mut Option<String>) {
    let Some(item) = current.take() else {
        return;
    };
    let item = item.trim().to_string();
    if item.is_empty() {
        return;
    }
    match section {
        Section::Critical => result.critical_issues.push(item),
        Section::Overlooked => result.overlooked.push(item),
        Section::Suggestions => result.suggestions.push(item),
        Section::Preamble => {}
    }
}

/// `**text**` -> `text`; partial emphasis is left alone.
fn strip_emphasis(s: &str) -> &str {
    s.strip_prefix("**")
        .and_then(|rest| rest.strip_suffix("**"))
        .filter(|inner| !inner.contains("**"))
        .map_or(s, str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANSWER: &str = "\
# Project Diagnosis

Overall this is a healthy small API with a couple of sharp edges.

### 🚨 Critical Issues
- **Bare except** in `app/db.py` swallows `KeyboardInterrupt`.
- Hard-coded secret in `settings.py`
  that is committed to git.

### 🤔 Things You Might Be Forgetting
* A README.md explaining setup.

### ✨ Suggestions for Improvement
1. Split `handlers.py` into modules.
2. Add type hints.
";

    #[test]
    fn test_parse_sections() {
        let result = parse_sections(ANSWER);
        assert_eq!(
            result.headline,
            "Overall this is a healthy small API with a couple of sharp edges."
        );
        assert_eq!(result.critical_issues.len(), 2);
        assert!(result.critical_issues[0].starts_with("**Bare except** in"));
        assert_eq!(
            result.critical_issues[1],
            "Hard-coded secret in `settings.py` that is committed to git."
        );
        assert_eq!(result.overlooked, vec!["A README.md explaining setup."]);
        assert_eq!(
            result.suggestions,
            vec!["Split `handlers.py` into modules.", "Add type hints."]
        );
        assert_eq!(result.raw, ANSWER);
    }

    #[test]
    fn test_bold_headings_and_paragraphs() {
        let text = "Looks fine.\n\n**Critical Issues:**\nNone found in the code you shared.\n\n**Suggestions for Improvement:**\n- Add tests\n";
        let result = parse_sections(text);
        assert_eq!(result.headline, "Looks fine.");
        assert_eq!(result.critical_issues, vec!["None found in the code you shared."]);
        assert_eq!(result.suggestions, vec!["Add tests"]);
        assert!(result.overlooked.is_empty());
    }

    #[test]
    fn test_unstructured_text_keeps_raw() {
        let result = parse_sections("The model answered without any headings.");
        assert!(result.is_empty());
        assert_eq!(result.headline, "The model answered without any headings.");
        assert_eq!(result.raw, "The model answered without any headings.");
    }
}
