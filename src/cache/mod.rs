//! Content-addressed result cache.
//!
//! One JSON file per fingerprint (`<fingerprint>.json`) in the cache
//! directory. Writes go to a temporary file in the same directory which is
//! then renamed over the entry, so readers see the old entry or the new one,
//! never a partial one.
//!
//! Staleness is by age (TTL): expired entries read as misses but stay on disk
//! until purged, evicted or overwritten. Capacity is bounded by entry count
//! and total bytes; the least recently used entries go first.

mod entry;
mod locks;

pub use entry::{now_ms, CacheEntry, CACHE_FORMAT_VERSION};

use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::PoisonError;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::analysis::AnalysisSummary;
use crate::config::CacheSettings;
use crate::diagnosis::DiagnosisResult;
use crate::fingerprint::Fingerprint;
use entry::EntryHeader;
use locks::LockTable;

/// Errors while writing or clearing the cache. Bad entries on lookup are
/// misses, not errors.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("no cache directory could be determined")]
    NoDirectory,
}

fn io_error(path: &Path, source: io::Error) -> CacheError {
    CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Counters for `sophidoc cache stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub dir: PathBuf,
    pub entries: usize,
    pub expired: usize,
    pub unreadable: usize,
    pub total_bytes: u64,
}

/// One entry file found on disk.
struct Listed {
    fingerprint: Fingerprint,
    path: PathBuf,
    size: u64,
    /// None when the file cannot be parsed.
    header: Option<EntryHeader>,
}

/// File-based cache of (summary, diagnosis) pairs keyed by fingerprint.
#[derive(Debug)]
pub struct ResultCache {
    dir: PathBuf,
    ttl: Duration,
    max_entries: usize,
    max_bytes: u64,
    locks: LockTable,
}

impl ResultCache {
    /// Open (creating if needed) a cache in `dir` with default capacity.
    pub fn open<P: Into<PathBuf>>(dir: P, ttl: Duration) -> Result<Self, CacheError> {
        let defaults = CacheSettings::default();
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        Ok(Self {
            dir,
            ttl,
            max_entries: defaults.max_entries,
            max_bytes: defaults.max_bytes,
            locks: LockTable::default(),
        })
    }

    pub fn with_capacity(mut self, max_entries: usize, max_bytes: u64) -> Self {
        self.max_entries = max_entries.max(1);
        self.max_bytes = max_bytes;
        self
    }

    pub fn from_settings(settings: &CacheSettings) -> Result<Self, CacheError> {
        let dir = settings.resolve_dir().ok_or(CacheError::NoDirectory)?;
        Ok(Self::open(dir, Duration::from_secs(settings.ttl_hours * 3600))?
            .with_capacity(settings.max_entries, settings.max_bytes))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{}.json", fingerprint.as_str()))
    }

    fn is_expired(&self, created_at: u64, now: u64) -> bool {
        now.saturating_sub(created_at) as u128 >= self.ttl.as_millis()
    }

    /// Fresh entry for `fingerprint`, if any. A hit refreshes its
    /// last-accessed time.
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        let lock = self.locks.get(fingerprint.as_str());
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let path = self.entry_path(fingerprint);

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable cache entry removed");
                let _ = fs::remove_file(&path);
                return None;
            }
        };

        let Some(mut entry) = parse_entry(&bytes, fingerprint) else {
            warn!(fingerprint = %fingerprint.short(), "corrupt cache entry removed");
            let _ = fs::remove_file(&path);
            return None;
        };

        let now = now_ms();
        if self.is_expired(entry.created_at, now) {
            debug!(fingerprint = %fingerprint.short(), age = ?entry.age(now), "cache entry expired");
            return None;
        }

        entry.last_accessed = now;
        if let Err(e) = self.write_atomic(&path, &entry) {
            warn!(error = %e, "failed to refresh cache entry access time");
        }
        debug!(fingerprint = %fingerprint.short(), "cache hit");
        Some(entry)
    }

    /// Write the entry for `fingerprint`, replacing any previous one, then
    /// evict down to capacity.
    pub fn store(
        &self,
        fingerprint: &Fingerprint,
        summary: AnalysisSummary,
        diagnosis: DiagnosisResult,
    ) -> Result<CacheEntry, CacheError> {
        let entry = CacheEntry::new(fingerprint.clone(), summary, diagnosis, now_ms());
        {
            let lock = self.locks.get(fingerprint.as_str());
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.write_atomic(&self.entry_path(fingerprint), &entry)?;
        }
        debug!(fingerprint = %fingerprint.short(), "cache entry stored");

        let evicted = self.evict(fingerprint);
        if evicted > 0 {
            debug!(evicted, "evicted least recently used cache entries");
        }
        Ok(entry)
    }

    /// Remove every expired or unreadable entry.
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        let now = now_ms();
        let mut removed = 0;
        for item in self.list()? {
            let stale = match &item.header {
                Some(h) => self.is_expired(h.created_at, now),
                None => true,
            };
            if stale && self.remove_locked(&item)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove every entry. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for item in self.list()? {
            if self.remove_locked(&item)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let now = now_ms();
        let mut stats = CacheStats {
            dir: self.dir.clone(),
            ..Default::default()
        };
        for item in self.list()? {
            stats.entries += 1;
            stats.total_bytes += item.size;
            match &item.header {
                Some(h) if self.is_expired(h.created_at, now) => stats.expired += 1,
                Some(_) => {}
                None => stats.unreadable += 1,
            }
        }
        Ok(stats)
    }

    fn write_atomic(&self, path: &Path, entry: &CacheEntry) -> Result<(), CacheError> {
        let data = serde_json::to_vec(entry)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".entry-")
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(|e| io_error(&self.dir, e))?;
        tmp.write_all(&data).map_err(|e| io_error(tmp.path(), e))?;
        tmp.as_file().sync_all().map_err(|e| io_error(path, e))?;
        tmp.persist(path).map_err(|e| io_error(path, e.error))?;
        Ok(())
    }

    /// Every well-named entry file in the directory.
    fn list(&self) -> Result<Vec<Listed>, CacheError> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.dir, e)),
        };

        let mut out = Vec::new();
        for dirent in read_dir.flatten() {
            let name = dirent.file_name();
            let Some(fingerprint) = name
                .to_str()
                .and_then(|n| n.strip_suffix(".json"))
                .and_then(Fingerprint::parse)
            else {
                continue;
            };
            let path = dirent.path();
            let size = dirent.metadata().map(|m| m.len()).unwrap_or(0);
            let header = fs::read(&path)
                .ok()
                .and_then(|b| serde_json::from_slice::<EntryHeader>(&b).ok())
                .filter(|h| h.version == CACHE_FORMAT_VERSION && h.fingerprint == fingerprint);
            out.push(Listed {
                fingerprint,
                path,
                size,
                header,
            });
        }
        Ok(out)
    }

    /// Remove one listed entry under its lock. False if it was already gone.
    fn remove_locked(&self, item: &Listed) -> Result<bool, CacheError> {
        let lock = self.locks.get(item.fingerprint.as_str());
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        match fs::remove_file(&item.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&item.path, e)),
        }
    }

    /// Evict least recently used entries until within capacity. `keep` is
    /// never evicted and entries whose lock is busy are skipped.
    fn evict(&self, keep: &Fingerprint) -> usize {
        let mut listed = match self.list() {
            Ok(listed) => listed,
            Err(e) => {
                warn!(error = %e, "cache eviction skipped");
                return 0;
            }
        };
        let mut count = listed.len();
        let mut bytes: u64 = listed.iter().map(|l| l.size).sum();
        if count <= self.max_entries && bytes <= self.max_bytes {
            return 0;
        }

        // Unreadable entries sort first.
        listed.sort_by_key(|l| l.header.as_ref().map_or(0, |h| h.last_accessed));

        let mut evicted = 0;
        for item in &listed {
            if count <= self.max_entries && bytes <= self.max_bytes {
                break;
            }
            if &item.fingerprint == keep {
                continue;
            }
            let lock = self.locks.get(item.fingerprint.as_str());
            let Ok(_guard) = lock.try_lock() else {
                debug!(fingerprint = %item.fingerprint.short(), "busy cache entry not evicted");
                continue;
            };
            match fs::remove_file(&item.path) {
                Ok(()) => evicted += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %item.path.display(), error = %e, "failed to evict cache entry");
                    continue;
                }
            }
            count -= 1;
            bytes = bytes.saturating_sub(item.size);
        }
        evicted
    }
}

fn parse_entry(bytes: &[u8], fingerprint: &Fingerprint) -> Option<CacheEntry> {
    serde_json::from_slice::<CacheEntry>(bytes)
        .ok()
        .filter(|e| e.version == CACHE_FORMAT_VERSION && &e.fingerprint == fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Category, Finding};
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn fp(c: char) -> Fingerprint {
        Fingerprint::parse(&c.to_string().repeat(Fingerprint::LEN)).unwrap()
    }

    fn summary(files: usize) -> AnalysisSummary {
        AnalysisSummary {
            files_scanned: files,
            findings: vec![Finding::new(
                "app.py",
                Some(3),
                Category::BareExcept,
                "bare except".to_string(),
            )],
            static_analysis: true,
            ..Default::default()
        }
    }

    fn diagnosis(text: &str) -> DiagnosisResult {
        DiagnosisResult::from_text(text)
    }

    fn open(temp: &TempDir) -> ResultCache {
        ResultCache::open(temp.path().join("cache"), Duration::from_secs(3600)).unwrap()
    }

    fn pause() {
        thread::sleep(Duration::from_millis(10));
    }

    #[test]
    fn test_store_then_lookup() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp);
        let key = fp('a');

        assert!(cache.lookup(&key).is_none());
        let stored = cache.store(&key, summary(3), diagnosis("Healthy.")).unwrap();
        let found = cache.lookup(&key).unwrap();

        assert_eq!(found.summary, stored.summary);
        assert_eq!(found.diagnosis, stored.diagnosis);
        assert_eq!(found.created_at, stored.created_at);
        assert!(found.last_accessed >= stored.last_accessed);
        assert!(cache.entry_path(&key).exists());
    }

    #[test]
    fn test_expired_entry_is_absent_but_kept() {
        let temp = TempDir::new().unwrap();
        let key = fp('b');
        open(&temp).store(&key, summary(1), diagnosis("x")).unwrap();

        let stale = ResultCache::open(temp.path().join("cache"), Duration::ZERO).unwrap();
        assert!(stale.lookup(&key).is_none());
        assert!(stale.entry_path(&key).exists());
        assert_eq!(stale.stats().unwrap().expired, 1);

        assert_eq!(stale.purge_expired().unwrap(), 1);
        assert!(!stale.entry_path(&key).exists());
    }

    #[test]
    fn test_store_replaces_entry() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp);
        let key = fp('c');

        cache.store(&key, summary(1), diagnosis("first")).unwrap();
        cache.store(&key, summary(2), diagnosis("second")).unwrap();

        let found = cache.lookup(&key).unwrap();
        assert_eq!(found.summary.files_scanned, 2);
        assert_eq!(found.diagnosis.raw, "second");
        assert_eq!(cache.stats().unwrap().entries, 1);
    }

    #[test]
    fn test_corrupt_entry_is_miss_and_removed() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp);
        let key = fp('d');
        let path = cache.entry_path(&key);

        fs::write(&path, b"{ not json").unwrap();
        assert!(cache.lookup(&key).is_none());
        assert!(!path.exists());

        cache.store(&key, summary(1), diagnosis("ok")).unwrap();
        assert!(cache.lookup(&key).is_some());
    }

    #[test]
    fn test_entry_under_wrong_name_is_miss() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp);
        cache.store(&fp('e'), summary(1), diagnosis("e")).unwrap();
        fs::copy(cache.entry_path(&fp('e')), cache.entry_path(&fp('f'))).unwrap();

        assert!(cache.lookup(&fp('f')).is_none());
        assert!(!cache.entry_path(&fp('f')).exists());
    }

    #[test]
    fn test_lru_eviction_by_count() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp).with_capacity(2, u64::MAX);

        cache.store(&fp('1'), summary(1), diagnosis("1")).unwrap();
        pause();
        cache.store(&fp('2'), summary(2), diagnosis("2")).unwrap();
        pause();
        assert!(cache.lookup(&fp('1')).is_some());
        pause();
        cache.store(&fp('3'), summary(3), diagnosis("3")).unwrap();

        assert!(cache.entry_path(&fp('1')).exists());
        assert!(!cache.entry_path(&fp('2')).exists());
        assert!(cache.entry_path(&fp('3')).exists());
    }

    #[test]
    fn test_new_entry_survives_byte_limit() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp).with_capacity(100, 1);

        cache.store(&fp('a'), summary(1), diagnosis("a")).unwrap();
        pause();
        cache.store(&fp('b'), summary(1), diagnosis("b")).unwrap();

        assert!(!cache.entry_path(&fp('a')).exists());
        assert!(cache.entry_path(&fp('b')).exists());
    }

    #[test]
    fn test_busy_entry_not_evicted() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp).with_capacity(1, u64::MAX);

        cache.store(&fp('a'), summary(1), diagnosis("a")).unwrap();
        let lock = cache.locks.get(fp('a').as_str());
        let held = lock.lock().unwrap();
        cache.store(&fp('b'), summary(1), diagnosis("b")).unwrap();
        drop(held);

        assert!(cache.entry_path(&fp('a')).exists());
        assert!(cache.entry_path(&fp('b')).exists());
    }

    #[test]
    fn test_clear() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp);
        for c in ['a', 'b', 'c'] {
            cache.store(&fp(c), summary(1), diagnosis("x")).unwrap();
        }
        fs::write(cache.dir().join("README"), "not an entry").unwrap();

        assert_eq!(cache.clear().unwrap(), 3);
        assert_eq!(cache.stats().unwrap().entries, 0);
        assert!(cache.dir().join("README").exists());
    }

    #[test]
    fn test_concurrent_stores_leave_one_valid_entry() {
        let temp = TempDir::new().unwrap();
        let cache = Arc::new(open(&temp));
        let key = fp('9');

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let key = key.clone();
                thread::spawn(move || {
                    cache
                        .store(&key, summary(i), diagnosis(&format!("run {}", i)))
                        .unwrap();
                    cache.lookup(&key).is_some()
                })
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap());
        }

        let stats = cache.stats().unwrap();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.unreadable, 0);
        assert!(cache.lookup(&key).is_some());
    }
}
