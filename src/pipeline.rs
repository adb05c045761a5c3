//! Pipeline orchestration.
//!
//! One run moves through
//! `Selecting → Analyzing → Fingerprinting → CacheCheck`, then either
//! finishes on a cache hit or continues with
//! `RequestingDiagnosis → Storing → Done`.
//!
//! Blocking work (walking, hashing, analysis, cache I/O) runs on tokio's
//! blocking pool. The cancel token is checked between stages and raced
//! against the diagnosis call. No cache lock is held while the provider
//! is working.

use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::analysis::{self, AnalysisSummary};
use crate::cache::{now_ms, ResultCache};
use crate::config::DoctorConfig;
use crate::diagnosis::{
    build_payload, build_request, DiagnosisError, DiagnosisProvider, DiagnosisRequest,
    DiagnosisResult, ProviderIdentity,
};
use crate::fingerprint::{self, FileDigest, Fingerprint, FingerprintConfig};
use crate::select::{FileSelector, IgnoreSet, ProjectFile, SelectionError};

/// Pipeline states, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Selecting,
    Analyzing,
    Fingerprinting,
    CacheCheck,
    RequestingDiagnosis,
    Storing,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Selecting => "selecting files",
            Stage::Analyzing => "analyzing",
            Stage::Fingerprinting => "fingerprinting",
            Stage::CacheCheck => "checking cache",
            Stage::RequestingDiagnosis => "requesting diagnosis",
            Stage::Storing => "storing result",
            Stage::Done => "done",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Run-level failures.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error("diagnosis failed for {} after {attempts} attempt(s): {source}", .fingerprint.short())]
    Diagnosis {
        fingerprint: Fingerprint,
        attempts: u32,
        #[source]
        source: DiagnosisError,
    },
    #[error("cancelled while {stage}")]
    Cancelled { stage: Stage },
    #[error("background task failed while {stage}: {message}")]
    Task { stage: Stage, message: String },
}

/// Cooperative cancellation shared between the CLI and a run.
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.sender.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // The sender lives as long as `self`.
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Selection and analysis of one project, without a diagnosis.
#[derive(Debug, Clone)]
pub struct ScanOutput {
    pub root: PathBuf,
    /// The effective file set: selected and successfully read.
    pub files: Vec<ProjectFile>,
    pub digests: Vec<FileDigest>,
    pub summary: AnalysisSummary,
}

/// Result of a full run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub root: PathBuf,
    pub description: String,
    pub fingerprint: Fingerprint,
    pub provider: ProviderIdentity,
    pub cache_hit: bool,
    /// When the diagnosis was produced, in ms since the Unix epoch. For a
    /// cache hit this is the entry's creation time.
    pub generated_at: u64,
    pub summary: AnalysisSummary,
    pub diagnosis: DiagnosisResult,
}

type StageHook = Box<dyn Fn(Stage) + Send + Sync>;

/// Drives one project through selection, analysis, caching and diagnosis.
pub struct Pipeline {
    config: Arc<DoctorConfig>,
    provider: Arc<dyn DiagnosisProvider>,
    cache: Option<Arc<ResultCache>>,
    on_stage: Option<StageHook>,
}

impl Pipeline {
    pub fn new(
        config: Arc<DoctorConfig>,
        provider: Arc<dyn DiagnosisProvider>,
        cache: Option<ResultCache>,
    ) -> Self {
        Self {
            config,
            provider,
            cache: cache.map(Arc::new),
            on_stage: None,
        }
    }

    /// Call `hook` on every stage transition (used for progress display).
    pub fn with_stage_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(Stage) + Send + Sync + 'static,
    {
        self.on_stage = Some(Box::new(hook));
        self
    }

    pub fn config(&self) -> &DoctorConfig {
        &self.config
    }

    fn enter(&self, stage: Stage, cancel: &CancelToken) -> Result<(), PipelineError> {
        enter_stage(self.on_stage.as_ref(), stage, cancel)
    }

    /// Enter `Done`. A finished run is never reported as cancelled.
    fn finish(&self) {
        debug!(stage = %Stage::Done, "pipeline stage");
        if let Some(hook) = &self.on_stage {
            hook(Stage::Done);
        }
    }

    /// Select and analyze `root` without contacting the provider.
    pub async fn scan(&self, root: &Path) -> Result<ScanOutput, PipelineError> {
        let (scan, _) =
            select_and_analyze(&self.config, root, &CancelToken::new(), self.on_stage.as_ref())
                .await?;
        Ok(scan)
    }

    /// Full run: reuse a cached diagnosis when the project is unchanged,
    /// otherwise request a new one and cache it.
    pub async fn run(
        &self,
        root: &Path,
        description: &str,
        cancel: &CancelToken,
    ) -> Result<RunOutcome, PipelineError> {
        let (scan, ignore) =
            select_and_analyze(&self.config, root, cancel, self.on_stage.as_ref()).await?;

        self.enter(Stage::Fingerprinting, cancel)?;
        let provider = self.provider.identity();
        let fp_config =
            FingerprintConfig::new(&self.config, &ignore, &provider.to_string(), description);
        let fingerprint = fingerprint::compute(&scan.digests, &fp_config);
        info!(fingerprint = %fingerprint.short(), files = scan.digests.len(), "project fingerprinted");

        if let Some(cache) = &self.cache {
            self.enter(Stage::CacheCheck, cancel)?;
            let cache = Arc::clone(cache);
            let key = fingerprint.clone();
            let hit = blocking(Stage::CacheCheck, move || cache.lookup(&key)).await?;
            if let Some(entry) = hit {
                info!(fingerprint = %fingerprint.short(), "using cached diagnosis");
                self.finish();
                return Ok(RunOutcome {
                    root: scan.root,
                    description: description.to_string(),
                    fingerprint,
                    provider,
                    cache_hit: true,
                    generated_at: entry.created_at,
                    summary: entry.summary,
                    diagnosis: entry.diagnosis,
                });
            }
        }

        self.enter(Stage::RequestingDiagnosis, cancel)?;
        let request = self.prepare_request(&scan, description).await?;
        let diagnosis = self.diagnose(&request, &fingerprint, cancel).await?;
        let generated_at = now_ms();

        if let Some(cache) = &self.cache {
            self.enter(Stage::Storing, cancel)?;
            let cache = Arc::clone(cache);
            let key = fingerprint.clone();
            let summary = scan.summary.clone();
            let result = diagnosis.clone();
            match blocking(Stage::Storing, move || cache.store(&key, summary, result)).await? {
                Ok(_) => debug!(fingerprint = %fingerprint.short(), "diagnosis cached"),
                Err(e) => warn!(error = %e, "failed to cache diagnosis"),
            }
        }

        self.finish();
        Ok(RunOutcome {
            root: scan.root,
            description: description.to_string(),
            fingerprint,
            provider,
            cache_hit: false,
            generated_at,
            summary: scan.summary,
            diagnosis,
        })
    }

    async fn prepare_request(
        &self,
        scan: &ScanOutput,
        description: &str,
    ) -> Result<DiagnosisRequest, PipelineError> {
        let summary = scan.summary.clone();
        let files = scan.files.clone();
        let settings = self.config.payload.clone();
        let payload = blocking(Stage::RequestingDiagnosis, move || {
            build_payload(&summary, &files, &settings)
        })
        .await?;
        debug!(
            bytes = payload.text.len(),
            excerpts = payload.excerpts,
            truncated = payload.truncated_files,
            omitted = payload.omitted_files,
            "payload built"
        );
        Ok(build_request(
            description,
            &payload.text,
            self.config.provider.max_output_tokens,
        ))
    }

    /// Call the provider under a timeout, retrying transient failures with
    /// linear backoff.
    async fn diagnose(
        &self,
        request: &DiagnosisRequest,
        fingerprint: &Fingerprint,
        cancel: &CancelToken,
    ) -> Result<DiagnosisResult, PipelineError> {
        let settings = &self.config.provider;
        let timeout = Duration::from_secs(settings.timeout_secs);
        let cancelled = || PipelineError::Cancelled {
            stage: Stage::RequestingDiagnosis,
        };
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let call = tokio::time::timeout(timeout, self.provider.diagnose(request));
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(cancelled()),
                r = call => r.unwrap_or(Err(DiagnosisError::Timeout(timeout))),
            };

            match result {
                Ok(diagnosis) => {
                    info!(attempts, provider = %self.provider.identity(), "diagnosis received");
                    return Ok(diagnosis);
                }
                Err(e) if e.is_retryable() && attempts <= settings.max_retries => {
                    let delay = Duration::from_millis(settings.retry_backoff_ms * attempts as u64);
                    warn!(attempt = attempts, error = %e, ?delay, "diagnosis failed, retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(cancelled()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(source) => {
                    return Err(PipelineError::Diagnosis {
                        fingerprint: fingerprint.clone(),
                        attempts,
                        source,
                    })
                }
            }
        }
    }
}

/// Select and analyze `root` without a provider.
pub async fn scan_project(
    config: &DoctorConfig,
    root: &Path,
    cancel: &CancelToken,
) -> Result<ScanOutput, PipelineError> {
    let (scan, _) = select_and_analyze(config, root, cancel, None).await?;
    Ok(scan)
}

fn enter_stage(
    hook: Option<&StageHook>,
    stage: Stage,
    cancel: &CancelToken,
) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        info!(%stage, "run cancelled");
        return Err(PipelineError::Cancelled { stage });
    }
    debug!(%stage, "pipeline stage");
    if let Some(hook) = hook {
        hook(stage);
    }
    Ok(())
}

async fn select_and_analyze(
    config: &DoctorConfig,
    root: &Path,
    cancel: &CancelToken,
    hook: Option<&StageHook>,
) -> Result<(ScanOutput, IgnoreSet), PipelineError> {
    enter_stage(hook, Stage::Selecting, cancel)?;
    let ignore = config.ignore_set()?;
    let selector = FileSelector::new(root, ignore.clone(), config.selection.max_file_size)
        .max_total_size(config.selection.max_total_size);
    let selection = blocking(Stage::Selecting, move || selector.select()).await??;
    info!(
        files = selection.files.len(),
        excluded = selection.excluded.len(),
        warnings = selection.warnings.len(),
        "selection complete"
    );
    if selection.files.is_empty() {
        warn!(root = %root.display(), "no eligible files found");
    }

    let enabled = config.analysis.enabled;
    if enabled {
        enter_stage(hook, Stage::Analyzing, cancel)?;
    } else {
        debug!("static analysis disabled; hashing only");
    }
    let settings = config.analysis.clone();
    let read_limit = config.selection.max_file_size;
    let (mut files, summary, digests) = blocking(Stage::Analyzing, move || {
        let outcomes = analysis::analyze_files(&selection.files, &settings, read_limit);
        let files = selection.files.clone();
        let (summary, digests) = analysis::summarize(selection, outcomes, enabled);
        (files, summary, digests)
    })
    .await?;

    let effective: HashSet<&str> = digests.iter().map(|d| d.path.as_str()).collect();
    files.retain(|f| effective.contains(f.path.as_str()));
    debug!(
        findings = summary.findings.len(),
        lines = summary.total_lines(),
        "analysis complete"
    );

    Ok((
        ScanOutput {
            root: root.to_path_buf(),
            files,
            digests,
            summary,
        },
        ignore,
    ))
}

/// Run `f` on the blocking pool.
async fn blocking<T, F>(stage: Stage, f: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::Task {
            stage,
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Fails `failures` times with a retryable error, then succeeds.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        error: fn() -> DiagnosisError,
    }

    #[async_trait]
    impl DiagnosisProvider for Flaky {
        fn identity(&self) -> ProviderIdentity {
            ProviderIdentity::new("stub", "flaky")
        }

        async fn diagnose(&self, _: &DiagnosisRequest) -> Result<DiagnosisResult, DiagnosisError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err((self.error)())
            } else {
                Ok(DiagnosisResult::from_text("## Critical Issues\n- none"))
            }
        }
    }

    fn flaky(failures: u32, error: fn() -> DiagnosisError) -> Arc<Flaky> {
        Arc::new(Flaky {
            failures,
            calls: AtomicU32::new(0),
            error,
        })
    }

    fn project() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("main.py"), "def main():\n    return 1\n").unwrap();
        temp
    }

    fn fast_config(max_retries: u32) -> Arc<DoctorConfig> {
        let mut config = DoctorConfig::default();
        config.provider.max_retries = max_retries;
        config.provider.retry_backoff_ms = 1;
        Arc::new(config)
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let project = project();
        let provider = flaky(2, || DiagnosisError::RateLimited("slow down".to_string()));
        let pipeline = Pipeline::new(fast_config(2), provider.clone(), None);

        let outcome = pipeline
            .run(project.path(), "cli", &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert!(!outcome.cache_hit);
        assert_eq!(outcome.diagnosis.critical_issues, vec!["none"]);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let project = project();
        let provider = flaky(5, || DiagnosisError::Http {
            status: 503,
            body: "unavailable".to_string(),
        });
        let pipeline = Pipeline::new(fast_config(1), provider.clone(), None);

        let err = pipeline
            .run(project.path(), "", &CancelToken::new())
            .await
            .unwrap_err();
        match err {
            PipelineError::Diagnosis { attempts, source, .. } => {
                assert_eq!(attempts, 2);
                assert!(matches!(source, DiagnosisError::Http { status: 503, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let project = project();
        let provider = flaky(5, || DiagnosisError::Auth("bad key".to_string()));
        let pipeline = Pipeline::new(fast_config(3), provider.clone(), None);

        let err = pipeline
            .run(project.path(), "", &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Diagnosis { attempts: 1, .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let project = project();
        let provider = flaky(0, || DiagnosisError::Auth(String::new()));
        let pipeline = Pipeline::new(fast_config(0), provider.clone(), None);
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = pipeline.run(project.path(), "", &cancel).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Cancelled {
                stage: Stage::Selecting
            }
        ));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stage_sequence_without_cache() {
        let project = project();
        let stages = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&stages);
        let pipeline = Pipeline::new(fast_config(0), flaky(0, || DiagnosisError::Auth(String::new())), None)
            .with_stage_hook(move |s| seen.lock().unwrap().push(s));

        pipeline
            .run(project.path(), "", &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(
            *stages.lock().unwrap(),
            vec![
                Stage::Selecting,
                Stage::Analyzing,
                Stage::Fingerprinting,
                Stage::RequestingDiagnosis,
                Stage::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_scan_missing_root() {
        let temp = TempDir::new().unwrap();
        let pipeline = Pipeline::new(fast_config(0), flaky(0, || DiagnosisError::Auth(String::new())), None);
        let err = pipeline.scan(&temp.path().join("missing")).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Selection(SelectionError::RootNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_token_wakes_waiters() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        token.cancel();
        handle.await.unwrap();
        assert!(token.is_cancelled());
    }
}
