//! Python checks.
//!
//! Works on masked lines, so nothing inside strings or comments is examined.
//! Function extents come from indentation: a function ends at the first
//! non-blank line indented at or left of its `def`.

use lazy_static::lazy_static;
use regex::Regex;

use crate::analysis::mask::{MaskedLine, Syntax};
use crate::analysis::{Category, Finding, LanguageAnalyzer, Severity, SourceText, Structure};
use crate::config::AnalysisSettings;
use crate::select::Language;

/// A `def` header longer than this is not parsed.
const MAX_HEADER_LINES: usize = 30;

lazy_static! {
    static ref BARE_EXCEPT: Regex = Regex::new(r"^\s*except\s*:").unwrap();
    static ref DEF_START: Regex =
        Regex::new(r"^(\s*)(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap();
    static ref CLASS_START: Regex = Regex::new(r"^\s*class\s+[A-Za-z_][A-Za-z0-9_]*\s*[(:]").unwrap();
    static ref MUTABLE_DEFAULT: Regex =
        Regex::new(r"^(\[|\{|list\s*\(|dict\s*\(|set\s*\(|defaultdict\s*\()").unwrap();
    static ref DOCSTRING_START: Regex = Regex::new(r#"^[rRuUbBfF]{0,2}("|')"#).unwrap();
}

/// Python language analyzer.
pub struct PythonAnalyzer;

impl PythonAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PythonAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageAnalyzer for PythonAnalyzer {
    fn language(&self) -> Language {
        Language::Python
    }

    fn syntax(&self) -> Syntax {
        Syntax::Hash
    }

    fn check(&self, source: &SourceText<'_>, settings: &AnalysisSettings, out: &mut Vec<Finding>) {
        let code = source.code();
        let mut open: Vec<OpenFunction> = Vec::new();
        let mut prev_nonblank = 0usize;
        let mut i = 0;

        while i < code.len() {
            let line = &code[i];
            if line.is_blank() {
                i += 1;
                continue;
            }

            if !line.continued {
                let indent = indent_of(&line.code);
                while open.last().is_some_and(|f| indent <= f.indent) {
                    if let Some(func) = open.pop() {
                        check_length(source.path, &func, prev_nonblank, settings, out);
                    }
                }

                if BARE_EXCEPT.is_match(&line.code) {
                    out.push(Finding::new(
                        source.path,
                        Some(i + 1),
                        Category::BareExcept,
                        "bare `except:` catches every exception, including KeyboardInterrupt and SystemExit"
                            .to_string(),
                    ));
                }

                if let Some(caps) = DEF_START.captures(&line.code) {
                    let name = caps[2].to_string();
                    let body_start = caps.get(0).map(|m| m.end()).unwrap_or(0);
                    if let Some(header) = parse_header(code, i, body_start) {
                        check_signature(source.path, i, &name, &header.params, settings, out);
                        if !header.inline_body {
                            if settings.require_docstrings && !name.starts_with('_') {
                                check_docstring(source.path, code, i, header.end, &name, out);
                            }
                            open.push(OpenFunction {
                                name,
                                indent,
                                start: i,
                            });
                        }
                        prev_nonblank = header.end;
                        i = header.end + 1;
                        continue;
                    }
                }
            }

            prev_nonblank = i;
            i += 1;
        }

        while let Some(func) = open.pop() {
            check_length(source.path, &func, prev_nonblank, settings, out);
        }
    }

    fn structure(&self, source: &SourceText<'_>) -> Structure {
        let mut structure = Structure {
            files: 1,
            ..Structure::default()
        };
        for line in source.code().iter().filter(|l| !l.continued) {
            if DEF_START.is_match(&line.code) {
                structure.functions += 1;
            } else if CLASS_START.is_match(&line.code) {
                structure.classes += 1;
            }
        }
        structure
    }
}

struct OpenFunction {
    name: String,
    indent: usize,
    start: usize,
}

#[derive(Debug)]
struct Header {
    params: Vec<String>,
    /// Line holding the closing `:`.
    end: usize,
    /// `def f(): return 1`
    inline_body: bool,
}

fn indent_of(code: &str) -> usize {
    code.len() - code.trim_start().len()
}

/// Parse a `def` header starting just after its opening parenthesis.
fn parse_header(code: &[MaskedLine], start: usize, offset: usize) -> Option<Header> {
    let mut depth = 1usize;
    let mut params = String::new();
    let mut closed = false;

    let last = (start + MAX_HEADER_LINES).min(code.len());
    for (idx, line) in code.iter().enumerate().take(last).skip(start) {
        let text = if idx == start {
            line.code.get(offset..)?
        } else {
            params.push(' ');
            line.code.as_str()
        };

        for (pos, c) in text.char_indices() {
            match c {
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 && !closed {
                        closed = true;
                        continue;
                    }
                }
                ':' if closed && depth == 0 => {
                    let rest = &text[pos + 1..];
                    return Some(Header {
                        params: split_params(&params),
                        end: idx,
                        inline_body: !rest.trim().is_empty(),
                    });
                }
                _ => {}
            }
            if !closed {
                params.push(c);
            }
        }
    }
    None
}

/// Split a parameter list on top-level commas.
fn split_params(params: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in params.chars() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                out.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    out.push(current.trim().to_string());
    out.retain(|p| !p.is_empty());
    out
}

fn param_name(param: &str) -> &str {
    let end = param.find([':', '=']).unwrap_or(param.len());
    param[..end].trim().trim_start_matches('*').trim()
}

fn check_signature(
    path: &str,
    line: usize,
    name: &str,
    params: &[String],
    settings: &AnalysisSettings,
    out: &mut Vec<Finding>,
) {
    let counted = params
        .iter()
        .map(|p| param_name(p))
        .filter(|n| !n.is_empty() && *n != "/" && *n != "self" && *n != "cls")
        .count();
    if counted > settings.max_parameters {
        out.push(Finding::new(
            path,
            Some(line + 1),
            Category::TooManyParameters,
            format!(
                "function `{}` takes {} parameters (max {})",
                name, counted, settings.max_parameters
            ),
        ));
    }

    for param in params {
        let Some(eq) = param.find('=') else {
            continue;
        };
        if MUTABLE_DEFAULT.is_match(param[eq + 1..].trim_start()) {
            out.push(Finding::new(
                path,
                Some(line + 1),
                Category::MutableDefault,
                format!(
                    "parameter `{}` of `{}` has a mutable default; it is shared between calls",
                    param_name(param),
                    name
                ),
            ));
        }
    }
}

fn check_docstring(
    path: &str,
    code: &[MaskedLine],
    def_line: usize,
    header_end: usize,
    name: &str,
    out: &mut Vec<Finding>,
) {
    let first = code
        .iter()
        .skip(header_end + 1)
        .find(|l| !l.is_blank());
    if let Some(first) = first {
        if !DOCSTRING_START.is_match(first.code.trim_start()) {
            out.push(Finding::new(
                path,
                Some(def_line + 1),
                Category::MissingDocstring,
                format!("function `{}` has no docstring", name),
            ));
        }
    }
}

fn check_length(
    path: &str,
    func: &OpenFunction,
    last_line: usize,
    settings: &AnalysisSettings,
    out: &mut Vec<Finding>,
) {
    let length = last_line.saturating_sub(func.start) + 1;
    if length <= settings.max_function_lines {
        return;
    }
    let severity = if length > settings.critical_function_lines {
        Severity::Warning
    } else {
        Severity::Suggestion
    };
    out.push(
        Finding::new(
            path,
            Some(func.start + 1),
            Category::LongFunction,
            format!(
                "function `{}` is {} lines long (max {})",
                func.name, length, settings.max_function_lines
            ),
        )
        .with_severity(severity),
    );
}
