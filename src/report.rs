//! Output formatting for sophidoc results.
//!
//! Supports three output formats:
//! - Markdown: the report file written with `--output`
//! - Pretty: colored terminal output for human readability
//! - JSON: structured output for programmatic consumption

use chrono::{DateTime, Local, Utc};
use colored::*;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::analysis::{AnalysisSummary, Finding, Severity};
use crate::cache::CacheStats;
use crate::diagnosis::DiagnosisResult;
use crate::pipeline::{RunOutcome, ScanOutput};

/// Findings shown in the terminal before the rest are elided.
const MAX_PRETTY_FINDINGS: usize = 25;

// =============================================================================
// Markdown
// =============================================================================

/// Render the Markdown report for a run.
pub fn render_markdown(outcome: &RunOutcome) -> String {
    let mut out = String::new();
    let title = if outcome.cache_hit {
        "# sophidoc - Diagnosis Report (Cached)"
    } else {
        "# sophidoc - Diagnosis Report"
    };
    let summary = &outcome.summary;

    let _ = writeln!(out, "{}\n", title);
    let _ = writeln!(out, "**Project:** {}", display_description(&outcome.description));
    let _ = writeln!(out, "**Path:** {}", outcome.root.display());
    let _ = writeln!(out, "**Provider:** {}", outcome.provider);
    let _ = writeln!(out, "**Generated:** {}", format_timestamp(outcome.generated_at));
    let _ = writeln!(out, "**Files Processed:** {}", summary.files_scanned);
    let _ = writeln!(out, "**Total Size:** {}", format_kb(summary.total_bytes));
    if summary.static_analysis && !summary.structure.is_empty() {
        let _ = writeln!(out, "**Structure:** {}", summary.total_structure());
    }
    let _ = writeln!(out, "**Fingerprint:** `{}`\n", outcome.fingerprint.short());
    out.push_str("---\n\n");

    out.push_str(outcome.diagnosis.raw.trim_end());
    out.push_str("\n\n");

    if summary.static_analysis && !summary.findings.is_empty() {
        out.push_str("---\n\n## Static Analysis Findings\n\n");
        let _ = writeln!(out, "{}\n", severity_counts(summary));
        out.push_str("| Severity | Check | Location | Message |\n");
        out.push_str("|---|---|---|---|\n");
        for f in &summary.findings {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} |",
                f.severity,
                f.category,
                location(f),
                f.message.replace('|', "\\|")
            );
        }
        out.push('\n');
    }

    if !summary.warnings.is_empty() {
        out.push_str("## Unreadable Files\n\n");
        for w in &summary.warnings {
            let _ = writeln!(out, "- `{}`: {}", w.path, w.message);
        }
        out.push('\n');
    }

    out
}

/// Write the Markdown report to `path`.
pub fn write_markdown(path: &Path, outcome: &RunOutcome) -> anyhow::Result<()> {
    fs::write(path, render_markdown(outcome))
        .map_err(|e| anyhow::anyhow!("could not save the report to {}: {}", path.display(), e))
}

// =============================================================================
// JSON
// =============================================================================

#[derive(Serialize)]
struct JsonReport<'a, T: Serialize> {
    version: &'static str,
    #[serde(flatten)]
    body: &'a T,
}

fn to_json<T: Serialize>(body: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(&JsonReport {
        version: env!("CARGO_PKG_VERSION"),
        body,
    })?)
}

/// Write a run in JSON format.
pub fn write_json(outcome: &RunOutcome) -> anyhow::Result<()> {
    println!("{}", to_json(outcome)?);
    Ok(())
}

#[derive(Serialize)]
struct JsonScan<'a> {
    root: &'a Path,
    files: Vec<&'a str>,
    summary: &'a AnalysisSummary,
}

/// Write a scan (no diagnosis) in JSON format.
pub fn write_scan_json(scan: &ScanOutput) -> anyhow::Result<()> {
    let body = JsonScan {
        root: &scan.root,
        files: scan.files.iter().map(|f| f.path.as_str()).collect(),
        summary: &scan.summary,
    };
    println!("{}", to_json(&body)?);
    Ok(())
}

// =============================================================================
// Pretty
// =============================================================================

fn write_header() {
    println!();
    print!("  ");
    print!("{}", "sophidoc".cyan().bold());
    println!(" v{}", env!("CARGO_PKG_VERSION"));
    println!();
}

/// Write a run in pretty (human-readable) format.
pub fn write_pretty(outcome: &RunOutcome) {
    write_header();

    print!("  {}", "Project:  ".dimmed());
    println!("{}", display_description(&outcome.description));
    print!("  {}", "Path:     ".dimmed());
    println!("{}", outcome.root.display());
    print!("  {}", "Provider: ".dimmed());
    print!("{}", outcome.provider);
    if outcome.cache_hit {
        print!("  {}", "(cached)".green());
    }
    println!();
    write_inventory(&outcome.summary);
    println!();

    write_findings(&outcome.summary);
    write_diagnosis(&outcome.diagnosis);
}

/// Write a scan in pretty format.
pub fn write_scan_pretty(scan: &ScanOutput, show_files: bool) {
    write_header();
    print!("  {}", "Path:     ".dimmed());
    println!("{}", scan.root.display());
    write_inventory(&scan.summary);
    println!();

    if show_files {
        println!("  {} ({}):", "Files".bold(), scan.files.len());
        for f in &scan.files {
            print!("    {:<12}", f.language.as_str().dimmed());
            print!("{}", f.path.blue());
            println!("  {}", format_kb(f.size).dimmed());
        }
        println!();
        if !scan.summary.excluded.is_empty() {
            println!("  {} ({}):", "Excluded".dimmed(), scan.summary.excluded.len());
            for e in &scan.summary.excluded {
                println!("    {}  {}", e.path, e.reason.to_string().dimmed());
            }
            println!();
        }
    }

    write_findings(&scan.summary);
}

fn write_inventory(summary: &AnalysisSummary) {
    print!("  {}", "Files:    ".dimmed());
    print!(
        "{} scanned, {} skipped, {}",
        summary.files_scanned,
        summary.files_skipped,
        format_kb(summary.total_bytes)
    );
    if summary.binary_files > 0 {
        print!(" ({} binary)", summary.binary_files);
    }
    println!();

    if !summary.lines_of_code.is_empty() {
        let per_lang: Vec<String> = summary
            .lines_of_code
            .iter()
            .map(|(lang, n)| format!("{} {}", lang, n))
            .collect();
        print!("  {}", "Lines:    ".dimmed());
        println!("{}", per_lang.join(", "));
    }

    for (lang, structure) in &summary.structure {
        print!("  {}", "Structure:".dimmed());
        println!(" {} {}", lang, structure);
    }

    for w in &summary.warnings {
        println!("  {} {}", "unreadable:".yellow(), w);
    }
}

fn write_findings(summary: &AnalysisSummary) {
    if !summary.static_analysis {
        println!("  {}", "Static analysis disabled".dimmed());
        println!();
        return;
    }
    if summary.findings.is_empty() {
        println!("  {}", "✓ No static analysis findings".green());
        println!();
        return;
    }

    println!(
        "  {} ({}): {}",
        "Findings".bold(),
        summary.findings.len(),
        severity_counts(summary).dimmed()
    );
    println!();

    for f in summary.findings.iter().take(MAX_PRETTY_FINDINGS) {
        write_severity_tag(f.severity);
        print!("   ");
        print!("{:<20}", f.category.as_str().dimmed());
        print!("{}", f.file.blue());
        if let Some(line) = f.line {
            print!("{}", format!(":{}", line).dimmed());
        }
        println!();
        println!("            {}", f.message);
    }
    if summary.findings.len() > MAX_PRETTY_FINDINGS {
        println!(
            "    {}",
            format!(
                "... {} more (use --json for the full list)",
                summary.findings.len() - MAX_PRETTY_FINDINGS
            )
            .dimmed()
        );
    }
    println!();
}

fn write_severity_tag(severity: Severity) {
    match severity {
        Severity::Critical => print!("    {} ", "CRIT".red()),
        Severity::Warning => print!("    {} ", "WARN".yellow()),
        Severity::Suggestion => print!("    {} ", "HINT".blue()),
    }
}

fn write_diagnosis(diagnosis: &DiagnosisResult) {
    println!("  {}", "--- Diagnosis Report ---".green().bold());
    println!();

    // Answers that don't follow the requested layout are shown verbatim.
    if diagnosis.is_empty() {
        for line in diagnosis.raw.lines() {
            println!("  {}", line);
        }
        println!();
        println!("  {}", "--- End of Report ---".green().bold());
        return;
    }

    if !diagnosis.headline.is_empty() {
        println!("  {}", diagnosis.headline.bold());
        println!();
    }
    write_section("Critical Issues", &diagnosis.critical_issues, Color::Red);
    write_section("What You Might Have Forgotten", &diagnosis.overlooked, Color::Yellow);
    write_section("Suggestions for Improvement", &diagnosis.suggestions, Color::Cyan);
    println!("  {}", "--- End of Report ---".green().bold());
}

fn write_section(title: &str, items: &[String], color: Color) {
    if items.is_empty() {
        return;
    }
    println!("  {}", title.color(color).bold());
    for item in items {
        println!("    • {}", item);
    }
    println!();
}

/// Write cache statistics.
pub fn write_cache_stats(stats: &CacheStats) {
    print!("  {}", "Directory: ".dimmed());
    println!("{}", stats.dir.display());
    print!("  {}", "Entries:   ".dimmed());
    println!(
        "{} ({} expired, {} unreadable)",
        stats.entries, stats.expired, stats.unreadable
    );
    print!("  {}", "Size:      ".dimmed());
    println!("{}", format_kb(stats.total_bytes));
}

// =============================================================================
// Helpers
// =============================================================================

fn display_description(description: &str) -> &str {
    let d = description.trim();
    if d.is_empty() {
        "(unspecified)"
    } else {
        d
    }
}

fn location(f: &Finding) -> String {
    match f.line {
        Some(line) => format!("{}:{}", f.file, line),
        None => f.file.clone(),
    }
}

fn severity_counts(summary: &AnalysisSummary) -> String {
    format!(
        "{} critical, {} warnings, {} suggestions",
        summary.count_by_severity(Severity::Critical),
        summary.count_by_severity(Severity::Warning),
        summary.count_by_severity(Severity::Suggestion)
    )
}

/// `12345` -> `"12.1KB"`
pub fn format_kb(bytes: u64) -> String {
    format!("{:.1}KB", bytes as f64 / 1024.0)
}

/// Local wall-clock time for a millisecond Unix timestamp.
pub fn format_timestamp(ms: u64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(ms as i64) {
        Some(t) => t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Category, Structure};
    use crate::diagnosis::ProviderIdentity;
    use crate::select::Language;
    use crate::fingerprint::Fingerprint;
    use std::path::PathBuf;

    fn outcome(cache_hit: bool) -> RunOutcome {
        let summary = AnalysisSummary {
            files_scanned: 3,
            total_bytes: 2048,
            static_analysis: true,
            findings: vec![Finding::new(
                "app/db.py",
                Some(12),
                Category::BareExcept,
                "bare `except:` catches everything | even SystemExit".to_string(),
            )],
            ..Default::default()
        };
        RunOutcome {
            root: PathBuf::from("/work/shop"),
            description: "Flask API".to_string(),
            fingerprint: Fingerprint::parse(&"ab".repeat(32)).unwrap(),
            provider: ProviderIdentity::new("openai", "gpt-4-turbo-preview"),
            cache_hit,
            generated_at: 1_700_000_000_000,
            summary,
            diagnosis: DiagnosisResult::from_text(
                "Mostly healthy.\n\n## Critical Issues\n- Secrets committed in config.py\n",
            ),
        }
    }

    #[test]
    fn test_markdown_header_fields() {
        let md = render_markdown(&outcome(false));
        assert!(md.starts_with("# sophidoc - Diagnosis Report\n"));
        assert!(md.contains("**Project:** Flask API\n"));
        assert!(md.contains("**Path:** /work/shop\n"));
        assert!(md.contains("**Provider:** openai/gpt-4-turbo-preview\n"));
        assert!(md.contains("**Files Processed:** 3\n"));
        assert!(md.contains("**Total Size:** 2.0KB\n"));
        assert!(md.contains("- Secrets committed in config.py"));
        assert!(!md.contains("**Structure:**"));
    }

    #[test]
    fn test_markdown_structure_totals() {
        let mut o = outcome(false);
        o.summary.structure.insert(
            Language::Python,
            Structure {
                files: 2,
                functions: 5,
                classes: 1,
            },
        );
        o.summary.structure.insert(
            Language::TypeScript,
            Structure {
                files: 1,
                functions: 2,
                classes: 0,
            },
        );
        let md = render_markdown(&o);
        assert!(md.contains("**Structure:** 7 functions, 1 classes (complexity score 9)\n"));
    }

    #[test]
    fn test_markdown_marks_cached_and_escapes_tables() {
        let md = render_markdown(&outcome(true));
        assert!(md.starts_with("# sophidoc - Diagnosis Report (Cached)\n"));
        assert!(md.contains("| warning | bare_except | app/db.py:12 |"));
        assert!(md.contains("everything \\| even SystemExit"));
        assert!(md.contains("0 critical, 1 warnings, 0 suggestions"));
    }

    #[test]
    fn test_markdown_without_findings_section() {
        let mut o = outcome(false);
        o.summary.findings.clear();
        o.description = "  ".to_string();
        let md = render_markdown(&o);
        assert!(!md.contains("Static Analysis Findings"));
        assert!(md.contains("**Project:** (unspecified)"));
    }

    #[test]
    fn test_json_report_is_flat() {
        let json: serde_json::Value =
            serde_json::from_str(&to_json(&outcome(false)).unwrap()).unwrap();
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(json["cache_hit"], false);
        assert_eq!(json["fingerprint"], "ab".repeat(32));
        assert_eq!(json["summary"]["findings"][0]["category"], "bare_except");
        assert_eq!(json["diagnosis"]["critical_issues"][0], "Secrets committed in config.py");
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_kb(0), "0.0KB");
        assert_eq!(format_kb(1536), "1.5KB");
        assert_eq!(format_timestamp(1_700_000_000_000).len(), 19);
    }
}
