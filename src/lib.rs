//! sophidoc - AI project doctor.
//!
//! sophidoc inspects a local project directory, runs shallow static checks
//! over its source files, and hands a bounded summary to an AI diagnosis
//! provider. Diagnoses are cached per project state.
//!
//! # Architecture
//!
//! - `select`: deterministic walk with ignore rules and size limits
//! - `analysis`: per-language static checks (Python, JavaScript, TypeScript)
//! - `fingerprint`: stable identity of the selected files and active config
//! - `cache`: file-based result cache keyed by fingerprint
//! - `diagnosis`: provider trait, payload builder and the three back ends
//! - `pipeline`: select → analyze → fingerprint → cache → diagnose
//! - `config`, `report`, `cli`: YAML configuration, output, command line
//!
//! # Adding a New Language
//!
//! See `src/analysis/languages/` for examples. Implement `LanguageAnalyzer`
//! and register it in `languages/mod.rs`.

pub mod analysis;
pub mod cache;
pub mod cli;
pub mod config;
pub mod diagnosis;
pub mod fingerprint;
pub mod pipeline;
pub mod report;
pub mod select;
pub mod source;

pub use analysis::{
    register_analyzers, AnalysisSummary, Category, Finding, LanguageAnalyzer, Severity, Structure,
};
pub use cache::{CacheEntry, ResultCache};
pub use config::DoctorConfig;
pub use diagnosis::{DiagnosisProvider, DiagnosisResult, ProviderKind};
pub use fingerprint::Fingerprint;
pub use pipeline::{CancelToken, Pipeline, PipelineError, RunOutcome, ScanOutput, Stage};
pub use select::{FileSelector, IgnoreSet, ProjectFile};

/// Initialize all subsystems.
///
/// Call this once at startup.
pub fn init() {
    register_analyzers();
}
