//! Command-line interface for sophidoc.

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::cache::ResultCache;
use crate::config::{self, DoctorConfig};
use crate::diagnosis::{build_provider, DiagnosisError, ProviderKind};
use crate::pipeline::{self, CancelToken, Pipeline, PipelineError};
use crate::report;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;
pub const EXIT_CANCELLED: i32 = 130;

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "SOPHIDOC_LOG";

/// AI project doctor - scan a project and get a diagnosis.
///
/// sophidoc walks a project directory, runs shallow static checks over its
/// Python, JavaScript and TypeScript files, and sends a bounded summary to
/// an AI provider (Gemini, OpenAI or Anthropic). Diagnoses are cached per
/// project state, so rerunning on an unchanged project costs nothing.
#[derive(Parser)]
#[command(name = "sophidoc")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a config file (default: sophidoc.yaml, then the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print debug logs to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a project and ask an AI provider for a diagnosis
    #[command(visible_alias = "run")]
    Diagnose(DiagnoseArgs),
    /// Select and analyze files without contacting a provider
    Scan(ScanArgs),
    /// Show the effective configuration
    Config(ConfigArgs),
    /// Inspect or clear the result cache
    Cache(CacheArgs),
}

/// File selection overrides shared by `diagnose` and `scan`.
#[derive(Args, Clone, Default)]
pub struct SelectionArgs {
    /// A file or directory pattern to ignore (e.g. 'docs', '*.log'). Repeatable.
    #[arg(short, long = "ignore", value_name = "PATTERN")]
    pub ignore: Vec<String>,

    /// Maximum size of a single file in bytes
    #[arg(long)]
    pub max_file_size: Option<u64>,

    /// Maximum total size of selected files in bytes
    #[arg(long)]
    pub max_total_size: Option<u64>,

    /// Disable static analysis
    #[arg(long)]
    pub no_static_analysis: bool,
}

/// Arguments for the diagnose command.
#[derive(Parser)]
pub struct DiagnoseArgs {
    /// Project directory to analyze
    pub path: PathBuf,

    /// Short description of the project (e.g. 'Python Flask API')
    #[arg(short = 't', long = "type", default_value = "")]
    pub description: String,

    /// AI provider: gemini, openai or anthropic (default: from config)
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Model override for the provider
    #[arg(short, long)]
    pub model: Option<String>,

    /// Save the report as a Markdown file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Do not print the report to the terminal
    #[arg(short, long)]
    pub quiet: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    /// Disable the result cache
    #[arg(long)]
    pub no_cache: bool,

    #[command(flatten)]
    pub selection: SelectionArgs,
}

/// Arguments for the scan command.
#[derive(Parser)]
pub struct ScanArgs {
    /// Project directory to scan
    pub path: PathBuf,

    /// List selected and excluded files
    #[arg(long)]
    pub files: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub selection: SelectionArgs,
}

/// Arguments for the config command.
#[derive(Parser)]
pub struct ConfigArgs {
    /// Only check that the configuration is valid
    #[arg(long)]
    pub check: bool,
}

/// Arguments for the cache command.
#[derive(Parser)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Subcommand, Clone, Copy)]
pub enum CacheAction {
    /// Show entry counts and size
    Stats,
    /// Remove every entry
    Clear,
    /// Remove expired and unreadable entries
    Purge,
}

/// Install the stderr `tracing` subscriber.
///
/// `SOPHIDOC_LOG` takes precedence; otherwise only warnings are shown, or
/// debug output with `--verbose`.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "sophidoc=debug" } else { "sophidoc=warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Load, override and validate the configuration.
fn load_config(explicit: Option<&Path>) -> anyhow::Result<DoctorConfig> {
    let (config, found) = DoctorConfig::load(explicit)?;
    if let Some(path) = found {
        tracing::debug!(path = %path.display(), "loaded config");
    }
    Ok(config)
}

fn apply_selection(config: &mut DoctorConfig, args: &SelectionArgs) {
    config.selection.ignore.extend(args.ignore.iter().cloned());
    if let Some(size) = args.max_file_size {
        config.selection.max_file_size = size;
    }
    if let Some(size) = args.max_total_size {
        config.selection.max_total_size = size;
    }
    if args.no_static_analysis {
        config.analysis.enabled = false;
    }
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

fn resolve_root(path: &Path) -> Result<PathBuf, i32> {
    path.canonicalize().map_err(|e| {
        eprintln!("Error: cannot access path {:?}: {}", path, e);
        EXIT_ERROR
    })
}

fn spinner(hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
}

fn exit_code(err: &PipelineError) -> i32 {
    match err {
        PipelineError::Cancelled { .. } => EXIT_CANCELLED,
        PipelineError::Selection(_) => EXIT_ERROR,
        PipelineError::Diagnosis { .. } | PipelineError::Task { .. } => EXIT_FAILED,
    }
}

/// Run the diagnose command.
pub fn run_diagnose(args: &DiagnoseArgs, config_path: Option<&Path>) -> anyhow::Result<i32> {
    let mut config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };
    apply_selection(&mut config, &args.selection);
    if args.no_cache {
        config.cache.enabled = false;
    }
    if let Some(model) = &args.model {
        config.provider.model = Some(model.clone());
    }
    if let Err(e) = config::validate(&config) {
        eprintln!("Error: invalid configuration: {}", e);
        return Ok(EXIT_ERROR);
    }

    let provider_name = args.provider.as_deref().unwrap_or(&config.provider.default);
    let kind: ProviderKind = match provider_name.parse() {
        Ok(k) => k,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let root = match resolve_root(&args.path) {
        Ok(p) => p,
        Err(code) => return Ok(code),
    };

    let provider = match build_provider(kind, &config.provider) {
        Ok(p) => p,
        Err(e @ DiagnosisError::MissingApiKey(_)) => {
            eprintln!("Error: {}", e);
            eprintln!("Or choose another provider with --provider");
            return Ok(EXIT_ERROR);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let cache = if config.cache.enabled {
        match ResultCache::from_settings(&config.cache) {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!(error = %e, "result cache unavailable, continuing without it");
                None
            }
        }
    } else {
        None
    };

    let output = args.output.clone().or_else(|| config.output.clone());
    let config = Arc::new(config);
    let pb = spinner(args.quiet || args.json);
    let progress = pb.clone();
    let pipeline = Pipeline::new(Arc::clone(&config), provider, cache)
        .with_stage_hook(move |stage| progress.set_message(format!("{}...", stage)));

    let cancel = CancelToken::new();
    let result = runtime()?.block_on(async {
        cancel_on_ctrl_c(cancel.clone());
        pipeline.run(&root, &args.description, &cancel).await
    });
    pb.finish_and_clear();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(exit_code(&e));
        }
    };

    if args.json {
        report::write_json(&outcome)?;
    } else if !args.quiet {
        report::write_pretty(&outcome);
    }

    if let Some(path) = output {
        match report::write_markdown(&path, &outcome) {
            Ok(()) => eprintln!("Report saved to {}", path.display()),
            Err(e) => {
                eprintln!("Error: {}", e);
                return Ok(EXIT_FAILED);
            }
        }
    }

    Ok(EXIT_SUCCESS)
}

/// Run the scan command.
pub fn run_scan(args: &ScanArgs, config_path: Option<&Path>) -> anyhow::Result<i32> {
    let mut config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };
    apply_selection(&mut config, &args.selection);
    if let Err(e) = config::validate(&config) {
        eprintln!("Error: invalid configuration: {}", e);
        return Ok(EXIT_ERROR);
    }

    let root = match resolve_root(&args.path) {
        Ok(p) => p,
        Err(code) => return Ok(code),
    };

    let cancel = CancelToken::new();
    let result = runtime()?.block_on(async {
        cancel_on_ctrl_c(cancel.clone());
        pipeline::scan_project(&config, &root, &cancel).await
    });
    let scan = match result {
        Ok(scan) => scan,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(exit_code(&e));
        }
    };

    if args.json {
        report::write_scan_json(&scan)?;
    } else {
        report::write_scan_pretty(&scan, args.files);
    }
    Ok(EXIT_SUCCESS)
}

/// Run the config command.
pub fn run_config(args: &ConfigArgs, config_path: Option<&Path>) -> anyhow::Result<i32> {
    let (config, found) = match DoctorConfig::load(config_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };
    if let Err(e) = config::validate(&config) {
        eprintln!("Error: invalid configuration: {}", e);
        return Ok(EXIT_ERROR);
    }
    if args.check {
        println!("Configuration is valid");
        return Ok(EXIT_SUCCESS);
    }

    match &found {
        Some(path) => println!("# Loaded from {}", path.display()),
        None => println!("# No config file found; showing defaults"),
    }
    for kind in ProviderKind::ALL {
        let status = if std::env::var(kind.api_key_var()).is_ok() {
            "set"
        } else {
            "not set"
        };
        println!(
            "# {}: {} ({} {})",
            kind,
            kind.identity(&config.provider).model,
            kind.api_key_var(),
            status
        );
    }
    print!("{}", config.to_yaml()?);
    Ok(EXIT_SUCCESS)
}

/// Run the cache command.
pub fn run_cache(args: &CacheArgs, config_path: Option<&Path>) -> anyhow::Result<i32> {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };
    let cache = match ResultCache::from_settings(&config.cache) {
        Ok(cache) => cache,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    match args.action {
        CacheAction::Stats => report::write_cache_stats(&cache.stats()?),
        CacheAction::Clear => println!("Removed {} cache entries", cache.clear()?),
        CacheAction::Purge => println!("Removed {} expired entries", cache.purge_expired()?),
    }
    Ok(EXIT_SUCCESS)
}
