//! Ignore rules applied during the project walk.
//!
//! Rules are glob patterns evaluated in a fixed order: the built-in defaults
//! first, then user patterns. The first rule that matches decides, and its
//! pattern is recorded as the exclusion reason.

use globset::{GlobBuilder, GlobMatcher};

use super::SelectionError;

/// Dependency and build directories that are never walked.
pub const DEFAULT_IGNORE_DIRS: &[&str] = &[
    ".git",
    "__pycache__",
    "node_modules",
    ".vscode",
    ".idea",
    "venv",
    "env",
    "dist",
    "build",
];

/// Compiled artifacts and scratch files.
pub const DEFAULT_IGNORE_FILES: &[&str] = &[
    "*.pyc", "*.pyo", "*.o", "*.so", "*.dll", "*.exe", ".DS_Store", "*.log", "*.tmp",
];

/// Which entries a rule can match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleScope {
    DirectoryOnly,
    Any,
}

/// Where a rule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOrigin {
    Default,
    User,
}

/// A single compiled glob rule.
#[derive(Debug, Clone)]
pub struct IgnoreRule {
    pattern: String,
    scope: RuleScope,
    origin: RuleOrigin,
    matcher: GlobMatcher,
}

impl IgnoreRule {
    pub fn new(pattern: &str, scope: RuleScope, origin: RuleOrigin) -> Result<Self, SelectionError> {
        // `*` must not cross `/` so that "*.log" only matches names and
        // "docs/*" only matches direct children.
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| SelectionError::InvalidPattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            pattern: pattern.to_string(),
            scope,
            origin,
            matcher: glob.compile_matcher(),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn origin(&self) -> RuleOrigin {
        self.origin
    }

    /// Match against the relative path and the entry's own name.
    pub fn matches(&self, rel_path: &str, name: &str, is_dir: bool) -> bool {
        if self.scope == RuleScope::DirectoryOnly && !is_dir {
            return false;
        }
        self.matcher.is_match(name) || self.matcher.is_match(rel_path)
    }
}

/// Ordered rule list.
#[derive(Debug, Clone)]
pub struct IgnoreSet {
    rules: Vec<IgnoreRule>,
}

impl IgnoreSet {
    /// Build the default rules followed by `user_patterns`, in order.
    pub fn new<S: AsRef<str>>(user_patterns: &[S]) -> Result<Self, SelectionError> {
        let mut rules = Vec::new();
        for dir in DEFAULT_IGNORE_DIRS {
            rules.push(IgnoreRule::new(dir, RuleScope::DirectoryOnly, RuleOrigin::Default)?);
        }
        for file in DEFAULT_IGNORE_FILES {
            rules.push(IgnoreRule::new(file, RuleScope::Any, RuleOrigin::Default)?);
        }
        for pattern in user_patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            // "docs/" reads as "the docs directory"
            let (pattern, scope) = match pattern.strip_suffix('/') {
                Some(dir) => (dir, RuleScope::DirectoryOnly),
                None => (pattern, RuleScope::Any),
            };
            rules.push(IgnoreRule::new(pattern, scope, RuleOrigin::User)?);
        }
        Ok(Self { rules })
    }

    /// First matching rule, if any.
    pub fn first_match(&self, rel_path: &str, name: &str, is_dir: bool) -> Option<&IgnoreRule> {
        self.rules.iter().find(|r| r.matches(rel_path, name, is_dir))
    }

    /// Patterns in evaluation order.
    pub fn patterns(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.pattern()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
