//! File discovery and selection.

mod rules;
mod types;
mod walker;

pub use rules::{
    IgnoreRule, IgnoreSet, RuleOrigin, RuleScope, DEFAULT_IGNORE_DIRS, DEFAULT_IGNORE_FILES,
};
pub use types::{Exclusion, FileAccessWarning, Language, ProjectFile, Selection, SkipReason};
pub use walker::{FileSelector, BINARY_SAMPLE_SIZE};

use std::path::PathBuf;
use thiserror::Error;

/// Fatal selection errors. Anything scoped to a single entry is a warning instead.
#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("project path {0:?} does not exist")]
    RootNotFound(PathBuf),
    #[error("project path {0:?} is not a directory")]
    NotADirectory(PathBuf),
    #[error("cannot access project path {path:?}: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid ignore pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },
}
