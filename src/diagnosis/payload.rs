//! Size-bounded payload for the diagnosis request.
//!
//! The payload is the static-analysis summary followed by leading excerpts of
//! the project's text files, in selection order, until the byte budget runs
//! out. Its length never exceeds `PayloadSettings::max_bytes`.

use std::fmt::Write as _;
use tracing::debug;

use crate::analysis::{AnalysisSummary, Severity};
use crate::config::PayloadSettings;
use crate::select::ProjectFile;
use crate::source;

/// Smallest excerpt worth sending.
const MIN_EXCERPT_BYTES: usize = 256;

const TRUNCATED_MARKER: &str = "\n[... truncated ...]\n";

/// A built payload plus what had to be left out.
#[derive(Debug, Clone, Default)]
pub struct Payload {
    pub text: String,
    pub excerpts: usize,
    pub truncated_files: usize,
    pub omitted_files: usize,
}

/// Text that refuses to grow past a fixed limit.
struct Budget {
    buf: String,
    limit: usize,
}

impl Budget {
    fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.buf.len())
    }

    fn push(&mut self, s: &str) -> bool {
        if s.len() > self.remaining() {
            return false;
        }
        self.buf.push_str(s);
        true
    }
}

/// Build the payload for `summary` and the files of the effective set.
pub fn build_payload(
    summary: &AnalysisSummary,
    files: &[ProjectFile],
    settings: &PayloadSettings,
) -> Payload {
    let mut budget = Budget {
        buf: String::new(),
        limit: settings.max_bytes,
    };
    let mut payload = Payload::default();

    push_summary(&mut budget, summary, settings.max_findings);
    budget.push("Project Files & Content:\n---\n");

    let text_files: Vec<&ProjectFile> = files.iter().filter(|f| !f.is_binary).collect();
    for (idx, file) in text_files.iter().enumerate() {
        let header = format!("--- Filename: {} ---\n", file.path);
        // Room for the header, the trailing newline and a truncation marker.
        let overhead = header.len() + 1 + TRUNCATED_MARKER.len();
        let room = budget.remaining().saturating_sub(overhead);
        let want = settings.max_excerpt_bytes.min(file.size as usize);
        if room < want.min(MIN_EXCERPT_BYTES) {
            payload.omitted_files = text_files.len() - idx;
            break;
        }

        let excerpt = match source::read_excerpt(&file.abs_path, want.min(room)) {
            Ok(read) => read,
            Err(e) => {
                debug!(path = %file.path, error = %e, "excerpt skipped");
                continue;
            }
        };
        // Fewer raw bytes than were selected means the file was cut.
        let mut truncated = excerpt.truncated || (excerpt.raw_len as u64) < file.size;
        let mut text = excerpt.text;
        // Each invalid byte decodes to a three-byte U+FFFD.
        if text.len() > room {
            text.truncate(floor_char_boundary(&text, room));
            truncated = true;
        }

        let mut block = header;
        block.push_str(&text);
        block.push_str(if truncated { TRUNCATED_MARKER } else { "\n" });
        if !budget.push(&block) {
            payload.omitted_files = text_files.len() - idx;
            break;
        }
        if truncated {
            payload.truncated_files += 1;
        }
        payload.excerpts += 1;
    }

    if payload.omitted_files > 0 {
        let note = format!("\n({} more files omitted)\n", payload.omitted_files);
        budget.push(&note);
    }

    payload.text = budget.buf;
    payload
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn push_summary(budget: &mut Budget, summary: &AnalysisSummary, max_findings: usize) {
    let mut head = String::new();
    let _ = writeln!(head, "## Static Analysis Summary");
    let _ = writeln!(head, "- Total Lines of Code: {}", summary.total_lines());
    let _ = writeln!(head, "- Files Scanned: {}", summary.files_scanned);
    let _ = writeln!(head, "- Files Skipped (size limits): {}", summary.files_skipped);
    let _ = writeln!(head, "- Binary Files: {}", summary.binary_files);
    if summary.static_analysis {
        let _ = writeln!(
            head,
            "- Issues Found: {} ({} critical, {} warnings, {} suggestions)",
            summary.findings.len(),
            summary.count_by_severity(Severity::Critical),
            summary.count_by_severity(Severity::Warning),
            summary.count_by_severity(Severity::Suggestion),
        );
        for (language, structure) in &summary.structure {
            let _ = writeln!(head, "- Structure ({}): {}", language, structure);
        }
    } else {
        let _ = writeln!(head, "- Static analysis: disabled");
    }
    head.push('\n');
    if !budget.push(&head) {
        return;
    }

    if summary.findings.is_empty() {
        return;
    }
    budget.push("Findings:\n");

    // Most severe first, so a tight budget keeps what matters.
    let mut ordered: Vec<_> = summary.findings.iter().collect();
    ordered.sort_by_key(|f| f.severity);

    let mut shown = 0;
    for finding in ordered.iter().take(max_findings) {
        let location = match finding.line {
            Some(line) => format!("{}:{}", finding.file, line),
            None => finding.file.clone(),
        };
        let entry = format!(
            "- {} [{}] {}: {}\n",
            location, finding.severity, finding.category, finding.message
        );
        // Keep room for the "more" note.
        if entry.len() + 64 > budget.remaining() {
            break;
        }
        budget.push(&entry);
        shown += 1;
    }
    if shown < ordered.len() {
        budget.push(&format!("... and {} more findings\n", ordered.len() - shown));
    }
    budget.push("\n");
}
