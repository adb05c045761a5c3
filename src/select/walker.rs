//! Deterministic project walk.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{
    Exclusion, FileAccessWarning, IgnoreSet, Language, ProjectFile, Selection, SelectionError,
    SkipReason,
};

/// Bytes sniffed for NUL when deciding whether a file is binary.
pub const BINARY_SAMPLE_SIZE: usize = 8000;

/// Walks a project root and produces the ordered set of eligible files.
pub struct FileSelector {
    root: PathBuf,
    rules: IgnoreSet,
    max_file_size: u64,
    max_total_size: u64,
}

impl FileSelector {
    pub fn new<P: AsRef<Path>>(root: P, rules: IgnoreSet, max_file_size: u64) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            rules,
            max_file_size,
            max_total_size: u64::MAX,
        }
    }

    /// Cap the cumulative size of selected files.
    pub fn max_total_size(mut self, limit: u64) -> Self {
        self.max_total_size = limit;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the tree.
    ///
    /// Only an invalid root is fatal. Unreadable entries become warnings.
    pub fn select(&self) -> Result<Selection, SelectionError> {
        let metadata = std::fs::metadata(&self.root).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SelectionError::RootNotFound(self.root.clone())
            } else {
                SelectionError::RootUnreadable {
                    path: self.root.clone(),
                    source: e,
                }
            }
        })?;
        if !metadata.is_dir() {
            return Err(SelectionError::NotADirectory(self.root.clone()));
        }

        let mut selection = Selection::default();
        let mut candidates = Vec::new();

        let mut walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .min_depth(1)
            .into_iter();

        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map(|p| self.relative(p))
                        .unwrap_or_else(|| "<unknown>".to_string());
                    warn!(path = %path, error = %e, "skipping unreadable entry");
                    selection.warnings.push(FileAccessWarning {
                        path,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            let rel = self.relative(entry.path());
            let name = entry.file_name().to_string_lossy().to_string();
            let file_type = entry.file_type();

            if file_type.is_dir() {
                if let Some(rule) = self.rules.first_match(&rel, &name, true) {
                    debug!(path = %rel, rule = rule.pattern(), "ignoring directory");
                    selection.excluded.push(Exclusion {
                        path: rel,
                        reason: SkipReason::IgnoredDirectory {
                            pattern: rule.pattern().to_string(),
                        },
                    });
                    walker.skip_current_dir();
                }
                continue;
            }

            if let Some(rule) = self.rules.first_match(&rel, &name, false) {
                selection.excluded.push(Exclusion {
                    path: rel,
                    reason: SkipReason::IgnoredByRule {
                        pattern: rule.pattern().to_string(),
                    },
                });
                continue;
            }

            // Symlinks are resolved for files only; directories behind links are
            // never walked.
            let metadata = match std::fs::metadata(entry.path()) {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %rel, error = %e, "cannot stat file");
                    selection.warnings.push(FileAccessWarning {
                        path: rel,
                        message: e.to_string(),
                    });
                    continue;
                }
            };
            if !metadata.is_file() {
                selection.excluded.push(Exclusion {
                    path: rel,
                    reason: SkipReason::NotRegularFile,
                });
                continue;
            }

            let size = metadata.len();
            if size > self.max_file_size {
                selection.excluded.push(Exclusion {
                    path: rel,
                    reason: SkipReason::TooLarge {
                        size,
                        limit: self.max_file_size,
                    },
                });
                continue;
            }

            let is_binary = match sniff_binary(entry.path()) {
                Ok(b) => b,
                Err(e) => {
                    warn!(path = %rel, error = %e, "cannot read file");
                    selection.warnings.push(FileAccessWarning {
                        path: rel,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            candidates.push(ProjectFile {
                language: Language::detect(&rel),
                path: rel,
                abs_path: entry.path().to_path_buf(),
                size,
                is_binary,
            });
        }

        // Sorting by the relative path string makes the total-size cut (and the
        // fingerprint) independent of how the filesystem orders siblings.
        candidates.sort_by(|a, b| a.path.cmp(&b.path));

        let mut total: u64 = 0;
        for file in candidates {
            if total.saturating_add(file.size) > self.max_total_size {
                selection.excluded.push(Exclusion {
                    path: file.path,
                    reason: SkipReason::TotalSizeExceeded {
                        limit: self.max_total_size,
                    },
                });
                continue;
            }
            total += file.size;
            selection.files.push(file);
        }

        selection.excluded.sort_by(|a, b| a.path.cmp(&b.path));
        selection.warnings.sort_by(|a, b| a.path.cmp(&b.path));

        debug!(
            selected = selection.files.len(),
            excluded = selection.excluded.len(),
            warnings = selection.warnings.len(),
            "selection complete"
        );

        Ok(selection)
    }

    fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Binary files carry a NUL byte near the start.
fn sniff_binary(path: &Path) -> std::io::Result<bool> {
    let file = File::open(path)?;
    let mut sample = Vec::with_capacity(BINARY_SAMPLE_SIZE);
    file.take(BINARY_SAMPLE_SIZE as u64).read_to_end(&mut sample)?;
    Ok(sample.contains(&0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    fn selector(root: &Path, user: &[&str], max: u64) -> FileSelector {
        FileSelector::new(root, IgnoreSet::new(user).unwrap(), max)
    }

    #[test]
    fn test_select_sorted_and_deterministic() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/b.py", b"print(1)\n");
        write(temp.path(), "src/a.py", b"print(2)\n");
        write(temp.path(), "README.md", b"# readme\n");
        write(temp.path(), "app.js", b"let x = 1;\n");

        let first = selector(temp.path(), &[], 1024).select().unwrap();
        let second = selector(temp.path(), &[], 1024).select().unwrap();

        let paths: Vec<_> = first.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["README.md", "app.js", "src/a.py", "src/b.py"]);
        assert_eq!(first.files, second.files);
        assert_eq!(first.files[1].language, Language::JavaScript);
        assert_eq!(first.files[2].language, Language::Python);
    }

    #[test]
    fn test_ignored_directories_recorded_once() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "node_modules/lib/index.js", b"x");
        write(temp.path(), "node_modules/other.js", b"x");
        write(temp.path(), "main.py", b"x");

        let selection = selector(temp.path(), &[], 1024).select().unwrap();
        assert_eq!(selection.files.len(), 1);
        assert_eq!(selection.excluded.len(), 1);
        assert_eq!(selection.excluded[0].path, "node_modules");
        assert!(matches!(
            selection.excluded[0].reason,
            SkipReason::IgnoredDirectory { .. }
        ));
    }

    #[test]
    fn test_user_and_default_file_rules() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "app.log", b"log");
        write(temp.path(), "notes.md", b"notes");
        write(temp.path(), "main.py", b"x = 1\n");

        let selection = selector(temp.path(), &["*.md"], 1024).select().unwrap();
        assert_eq!(selection.files.len(), 1);
        let reasons: Vec<_> = selection
            .excluded
            .iter()
            .map(|e| (e.path.as_str(), e.reason.clone()))
            .collect();
        assert_eq!(
            reasons,
            vec![
                (
                    "app.log",
                    SkipReason::IgnoredByRule {
                        pattern: "*.log".to_string()
                    }
                ),
                (
                    "notes.md",
                    SkipReason::IgnoredByRule {
                        pattern: "*.md".to_string()
                    }
                ),
            ]
        );
        assert_eq!(selection.skipped_count(), 0);
    }

    #[test]
    fn test_too_large_excluded_and_counted() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "big.py", &vec![b'a'; 200]);
        write(temp.path(), "small.py", b"x = 1\n");

        let selection = selector(temp.path(), &[], 100).select().unwrap();
        assert_eq!(selection.files.len(), 1);
        assert_eq!(selection.files[0].path, "small.py");
        assert_eq!(
            selection.excluded[0].reason,
            SkipReason::TooLarge {
                size: 200,
                limit: 100
            }
        );
        assert_eq!(selection.skipped_count(), 1);
    }

    #[test]
    fn test_total_size_limit_in_path_order() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.py", &vec![b'a'; 60]);
        write(temp.path(), "b.py", &vec![b'b'; 60]);
        write(temp.path(), "c.py", &vec![b'c'; 30]);

        let selection = selector(temp.path(), &[], 100)
            .max_total_size(100)
            .select()
            .unwrap();
        let paths: Vec<_> = selection.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.py", "c.py"]);
        assert_eq!(selection.excluded[0].path, "b.py");
        assert!(matches!(
            selection.excluded[0].reason,
            SkipReason::TotalSizeExceeded { limit: 100 }
        ));
        assert_eq!(selection.total_bytes(), 90);
    }

    #[test]
    fn test_binary_files_kept_but_flagged() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "image.png", &[0x89, b'P', b'N', b'G', 0, 0, 1]);
        write(temp.path(), "main.py", b"x = 1\n");

        let selection = selector(temp.path(), &[], 1024).select().unwrap();
        assert_eq!(selection.files.len(), 2);
        assert!(selection.files[0].is_binary);
        assert!(!selection.files[1].is_binary);
    }

    #[test]
    fn test_root_errors() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing");
        let err = selector(&missing, &[], 1024).select().unwrap_err();
        assert!(matches!(err, SelectionError::RootNotFound(_)));

        let file = temp.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();
        let err = selector(&file, &[], 1024).select().unwrap_err();
        assert!(matches!(err, SelectionError::NotADirectory(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_broken_symlink_is_a_warning() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "main.py", b"x = 1\n");
        std::os::unix::fs::symlink(temp.path().join("nowhere"), temp.path().join("dangling.py"))
            .unwrap();

        let selection = selector(temp.path(), &[], 1024).select().unwrap();
        assert_eq!(selection.files.len(), 1);
        assert_eq!(selection.warnings.len(), 1);
        assert_eq!(selection.warnings[0].path, "dangling.py");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_not_walked() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "real/mod.py", b"x = 1\n");
        std::os::unix::fs::symlink(temp.path().join("real"), temp.path().join("link")).unwrap();

        let selection = selector(temp.path(), &[], 1024).select().unwrap();
        let paths: Vec<_> = selection.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["real/mod.py"]);
        assert_eq!(selection.excluded[0].path, "link");
        assert_eq!(selection.excluded[0].reason, SkipReason::NotRegularFile);
    }
}
