//! On-disk cache entry format.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::analysis::AnalysisSummary;
use crate::diagnosis::DiagnosisResult;
use crate::fingerprint::Fingerprint;

/// Bumped whenever the entry layout changes; older entries read as misses.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// A cached (summary, diagnosis) pair for one fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub version: u32,
    pub fingerprint: Fingerprint,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    /// Updated on every hit; drives LRU eviction.
    pub last_accessed: u64,
    pub summary: AnalysisSummary,
    pub diagnosis: DiagnosisResult,
}

impl CacheEntry {
    pub fn new(
        fingerprint: Fingerprint,
        summary: AnalysisSummary,
        diagnosis: DiagnosisResult,
        now: u64,
    ) -> Self {
        Self {
            version: CACHE_FORMAT_VERSION,
            fingerprint,
            created_at: now,
            last_accessed: now,
            summary,
            diagnosis,
        }
    }

    pub fn age(&self, now: u64) -> Duration {
        Duration::from_millis(now.saturating_sub(self.created_at))
    }
}

/// The bookkeeping fields of an entry, read without the payload.
#[derive(Debug, Deserialize)]
pub(super) struct EntryHeader {
    pub version: u32,
    pub fingerprint: Fingerprint,
    pub created_at: u64,
    pub last_accessed: u64,
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}
