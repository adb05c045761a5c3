//! JavaScript checks, shared with TypeScript.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

use crate::analysis::mask::{MaskedLine, Syntax};
use crate::analysis::{Category, Finding, LanguageAnalyzer, SourceText, Structure};
use crate::config::AnalysisSettings;
use crate::select::Language;

/// Longest promise chain, in lines, searched for a rejection handler.
const PROMISE_WINDOW: usize = 6;

lazy_static! {
    static ref CONSOLE_DEBUG: Regex =
        Regex::new(r"\bconsole\s*\.\s*(log|debug|trace|dir)\s*\(").unwrap();
    static ref DEBUGGER: Regex = Regex::new(r"(?:^|[^\w$.])debugger\s*(?:;|$)").unwrap();
    static ref VAR_DECL: Regex = Regex::new(r"(?:^|[^\w$.])var\s+[A-Za-z_$]").unwrap();
    static ref DECLARATION: Regex =
        Regex::new(r"(?:^|[^\w$.])(?:const|let|var)\s+([A-Za-z_$][\w$]*)").unwrap();
    static ref FUNCTION_KEYWORD: Regex = Regex::new(r"(?:^|[^\w$.])function\b").unwrap();
    static ref ARROW: Regex = Regex::new(r"=>").unwrap();
    static ref CLASS_DECL: Regex = Regex::new(r"(?:^|[^\w$.])class\s+[A-Za-z_$]").unwrap();
    static ref EXPORTED: Regex = Regex::new(r"^\s*export\b").unwrap();
    static ref IDENT: Regex = Regex::new(r"[A-Za-z_$][\w$]*").unwrap();
    static ref THEN_CALL: Regex = Regex::new(r"\.\s*then\s*\(").unwrap();
    static ref PROMISE_HANDLED: Regex = Regex::new(r"\.\s*(?:catch|finally)\s*\(").unwrap();
    static ref CHAIN_OWNED: Regex =
        Regex::new(r"^(?:return|yield|const|let|var)\b|\bawait\b").unwrap();
}

/// JavaScript language analyzer.
pub struct JavaScriptAnalyzer;

impl JavaScriptAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JavaScriptAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageAnalyzer for JavaScriptAnalyzer {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn syntax(&self) -> Syntax {
        Syntax::CLike
    }

    fn check(&self, source: &SourceText<'_>, settings: &AnalysisSettings, out: &mut Vec<Finding>) {
        check_script(source, settings, out);
    }

    fn structure(&self, source: &SourceText<'_>) -> Structure {
        script_structure(source)
    }
}

/// `function` declarations and expressions plus arrow functions, and
/// `class` declarations. Methods are not counted.
pub(super) fn script_structure(source: &SourceText<'_>) -> Structure {
    let mut structure = Structure {
        files: 1,
        ..Structure::default()
    };
    for line in source.code() {
        let code = line.code.as_str();
        structure.functions += FUNCTION_KEYWORD.find_iter(code).count();
        structure.functions += ARROW.find_iter(code).count();
        structure.classes += CLASS_DECL.find_iter(code).count();
    }
    structure
}

/// Checks common to JavaScript and TypeScript.
pub(super) fn check_script(
    source: &SourceText<'_>,
    _settings: &AnalysisSettings,
    out: &mut Vec<Finding>,
) {
    let code = source.code();
    let path = source.path;

    for (idx, line) in code.iter().enumerate() {
        let text = line.code.as_str();
        let lineno = Some(idx + 1);

        if let Some(op) = find_loose_equality(text) {
            out.push(Finding::new(
                path,
                lineno,
                Category::LooseEquality,
                format!("loose equality `{}`; use `{}=`", op, op),
            ));
        }
        if let Some(caps) = CONSOLE_DEBUG.captures(text) {
            out.push(Finding::new(
                path,
                lineno,
                Category::ConsoleDebug,
                format!("`console.{}` call left in code", &caps[1]),
            ));
        }
        if DEBUGGER.is_match(text) {
            out.push(Finding::new(
                path,
                lineno,
                Category::DebuggerStatement,
                "`debugger` statement left in code".to_string(),
            ));
        }
        if VAR_DECL.is_match(text) {
            out.push(Finding::new(
                path,
                lineno,
                Category::VarDeclaration,
                "`var` declaration; prefer `let` or `const`".to_string(),
            ));
        }
    }

    check_unused(source, out);
    check_promise_chains(path, code, out);
    check_awaits(path, code, out);
}

/// First `==` or `!=` on the line, unless it compares with `null`.
fn find_loose_equality(code: &str) -> Option<&'static str> {
    let bytes = code.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        let op = match (bytes[i], bytes[i + 1]) {
            (b'=', b'=') => "==",
            (b'!', b'=') => "!=",
            _ => {
                i += 1;
                continue;
            }
        };
        if bytes.get(i + 2) == Some(&b'=') {
            i += 3;
            continue;
        }
        // `x == null` is the idiomatic null-or-undefined test.
        if !compares_with_null(&code[..i], &code[i + 2..]) {
            return Some(op);
        }
        i += 2;
    }
    None
}

fn compares_with_null(before: &str, after: &str) -> bool {
    let after = after.trim_start();
    let rhs = after.starts_with("null")
        && !after[4..].chars().next().is_some_and(is_ident_char);
    let before = before.trim_end();
    let lhs = before.ends_with("null")
        && !before[..before.len() - 4]
            .chars()
            .next_back()
            .is_some_and(is_ident_char);
    rhs || lhs
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Local bindings whose name never appears again in the file.
///
/// Counting runs over the raw text, so a mention inside a template literal
/// or a comment counts as a use.
fn check_unused(source: &SourceText<'_>, out: &mut Vec<Finding>) {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for line in &source.lines {
        for m in IDENT.find_iter(line) {
            *counts.entry(m.as_str()).or_default() += 1;
        }
    }

    for (idx, line) in source.code().iter().enumerate() {
        if EXPORTED.is_match(&line.code) {
            continue;
        }
        for caps in DECLARATION.captures_iter(&line.code) {
            let name = &caps[1];
            if name.starts_with('_') {
                continue;
            }
            if counts.get(name).copied().unwrap_or(0) <= 1 {
                out.push(Finding::new(
                    source.path,
                    Some(idx + 1),
                    Category::UnusedVariable,
                    format!("`{}` is declared but never used", name),
                ));
            }
        }
    }
}

/// `.then(` chains with no rejection handler close by.
fn check_promise_chains(path: &str, code: &[MaskedLine], out: &mut Vec<Finding>) {
    let mut in_chain = false;
    let mut head = "";

    for (idx, line) in code.iter().enumerate() {
        let trimmed = line.code.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !trimmed.starts_with('.') {
            in_chain = false;
            head = trimmed;
        }
        if in_chain || !THEN_CALL.is_match(trimmed) {
            continue;
        }
        in_chain = true;

        // Returned, awaited or stored chains are the caller's to handle.
        if CHAIN_OWNED.is_match(head) {
            continue;
        }
        if !chain_handled(code, idx) {
            out.push(Finding::new(
                path,
                Some(idx + 1),
                Category::UnhandledPromise,
                "promise chain has `.then()` without `.catch()`; rejections go unhandled"
                    .to_string(),
            ));
        }
    }
}

/// Look for a rejection handler in the rest of the statement.
fn chain_handled(code: &[MaskedLine], start: usize) -> bool {
    let mut balance = 0i64;
    let end = (start + PROMISE_WINDOW).min(code.len());
    for j in start..end {
        let text = code[j].code.trim();
        if PROMISE_HANDLED.is_match(text) {
            return true;
        }
        balance += bracket_balance(text);
        let continues = code
            .get(j + 1)
            .is_some_and(|next| next.code.trim_start().starts_with('.'));
        if balance <= 0 && (text.ends_with(';') || !continues) {
            return false;
        }
    }
    false
}

fn bracket_balance(text: &str) -> i64 {
    text.chars().fold(0, |acc, c| match c {
        '(' | '[' | '{' => acc + 1,
        ')' | ']' | '}' => acc - 1,
        _ => acc,
    })
}

/// `await` expressions outside any `try` block.
fn check_awaits(path: &str, code: &[MaskedLine], out: &mut Vec<Finding>) {
    let mut depth = 0usize;
    let mut try_blocks: Vec<usize> = Vec::new();
    let mut pending_try = false;

    for (idx, line) in code.iter().enumerate() {
        let mut flagged = false;
        let chained_catch = PROMISE_HANDLED.is_match(&line.code);
        let mut word = String::new();

        // Trailing space flushes the last word.
        for c in line.code.chars().chain(std::iter::once(' ')) {
            if is_ident_char(c) {
                word.push(c);
                continue;
            }
            match word.as_str() {
                "try" => pending_try = true,
                "await" if try_blocks.is_empty() && !chained_catch && !flagged => {
                    flagged = true;
                    out.push(Finding::new(
                        path,
                        Some(idx + 1),
                        Category::AwaitOutsideTry,
                        "`await` outside try/catch; a rejection propagates unhandled".to_string(),
                    ));
                }
                _ => {}
            }
            word.clear();

            match c {
                '{' => {
                    depth += 1;
                    if pending_try {
                        try_blocks.push(depth);
                        pending_try = false;
                    }
                }
                '}' => {
                    if try_blocks.last() == Some(&depth) {
                        try_blocks.pop();
                    }
                    depth = depth.saturating_sub(1);
                }
                _ => {}
            }
        }
    }
}
