use clap::{Parser, ValueEnum};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::ai::{ChatCompletionsJudge, ClaudeCliJudge, Judge};
use crate::config::{AnalysisConfig, ConfigError};
use crate::error::AppError;
use crate::ledger::Ledger;
use crate::orchestrator::{Orchestrator, RunOptions, RunSummary};
use crate::references::load_references;
use crate::report::{report_path, Report};
use crate::sources::load_issues;
use crate::verdict::{EvaluationContext, KeywordStrategy, LlmStrategy, Method, VerdictProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// OpenAI-compatible chat-completions endpoint
    Http,
    /// Local claude CLI
    Claude,
}

#[derive(Debug, Parser)]
#[command(name = "issuebench")]
#[command(author, version, about = "Find tracker issues that make good programming exercises", long_about = None)]
pub struct Cli {
    /// Issue file or crawler output directory
    #[arg(short, long)]
    pub input: PathBuf,

    /// Base name for the report file
    #[arg(short, long, default_value = "suitable_programming_issues")]
    pub output: PathBuf,

    /// Analysis method
    #[arg(short, long, value_enum, default_value_t = Method::Keyword)]
    pub method: Method,

    /// Directory of reference examples for the LLM prompt
    #[arg(short, long)]
    pub reference: Option<PathBuf>,

    /// Re-evaluate issues already in the ledger
    #[arg(long)]
    pub force: bool,

    /// Maximum evaluations in flight
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// JSON config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Ledger file (default: <output>.ledger.jsonl)
    #[arg(long)]
    pub ledger: Option<PathBuf>,

    /// Stop the run after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// LLM backend for the llm and hybrid methods
    #[arg(long, value_enum, default_value_t = Backend::Http)]
    pub backend: Backend,

    /// Model name (overrides the config file)
    #[arg(long)]
    pub model: Option<String>,

    /// Custom command to run instead of the claude CLI (claude backend)
    #[arg(long)]
    pub command: Option<String>,

    /// API key for the http backend
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL for the http backend (overrides the config file)
    #[arg(long, env = "LLM_BASE_URL")]
    pub base_url: Option<String>,
}

impl Cli {
    fn ledger_path(&self) -> PathBuf {
        self.ledger.clone().unwrap_or_else(|| {
            let mut name = OsString::from(self.output.with_extension("").as_os_str());
            name.push(".ledger.jsonl");
            PathBuf::from(name)
        })
    }

    /// Config file values with command-line overrides applied.
    fn analysis_config(&self) -> Result<AnalysisConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::load(path)?,
            None => AnalysisConfig::default(),
        };
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(model) = &self.model {
            config.llm.model.clone_from(model);
        }
        if let Some(base_url) = &self.base_url {
            config.llm.base_url.clone_from(base_url);
        }
        config.validate()?;
        Ok(config)
    }

    fn build_judge(&self, config: &AnalysisConfig) -> Result<Arc<dyn Judge>, AppError> {
        let timeout = Duration::from_secs(config.llm.request_timeout_secs);
        let judge: Arc<dyn Judge> = match self.backend {
            Backend::Http => {
                let api_key = self.api_key.as_deref().filter(|k| !k.trim().is_empty()).ok_or_else(|| {
                    ConfigError::MissingCredentials(format!(
                        "--method {} with the http backend needs --api-key or LLM_API_KEY",
                        self.method
                    ))
                })?;
                let judge = ChatCompletionsJudge::new(&config.llm.base_url, api_key, &config.llm.model, timeout)
                    .map_err(|e| AppError::config(e.to_string()))?;
                Arc::new(judge)
            }
            Backend::Claude => {
                let judge = match &self.command {
                    Some(command) => ClaudeCliJudge::with_command(command, timeout),
                    None => ClaudeCliJudge::new(&config.llm.model, timeout),
                }
                .map_err(|e| AppError::config(e.to_string()))?;
                Arc::new(judge)
            }
        };
        Ok(judge)
    }

    fn build_provider(&self, config: &AnalysisConfig) -> Result<VerdictProvider, AppError> {
        let keyword = || -> Result<KeywordStrategy, AppError> {
            Ok(KeywordStrategy::new(
                Arc::new(config.suitability_rule_set()?),
                config.scoring.clone(),
            ))
        };
        let llm = || -> Result<LlmStrategy, AppError> {
            Ok(LlmStrategy::new(
                self.build_judge(config)?,
                config.retry.clone(),
                config.llm.clone(),
            ))
        };
        Ok(match self.method {
            Method::Keyword => VerdictProvider::Keyword(keyword()?),
            Method::Llm => VerdictProvider::Llm(llm()?),
            Method::Hybrid => VerdictProvider::Hybrid {
                keyword: keyword()?,
                llm: llm()?,
            },
        })
    }
}

/// Resolves when the user presses Ctrl-C or `timeout` elapses.
async fn shutdown_signal(timeout: Option<Duration>) {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            // No signal handler available; only the timeout can stop the run.
            std::future::pending::<()>().await;
        }
        log::warn!("[cli] Interrupted, finishing up");
    };
    let deadline = async {
        match timeout {
            Some(limit) => {
                tokio::time::sleep(limit).await;
                log::warn!("[cli] Run timeout of {limit:?} reached");
            }
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        () = ctrl_c => {}
        () = deadline => {}
    }
}

fn print_summary(summary: &RunSummary, report: &Report, path: &Path) {
    println!();
    println!("Saved analysis results to {}", path.display());
    println!("  Method: {}", summary.method);
    println!("  Total issues: {}", report.metadata.total_issues);
    println!("  Suitable issues: {}", report.metadata.suitable_issues);
    println!("  Updated in this run: {}", report.metadata.updated_issues);
    println!(
        "  This run: {} evaluated, {} reused, {} unresolved, {} LLM calls",
        summary.evaluated, summary.skipped, summary.unresolved, summary.llm_calls
    );
    for unresolved in &report.metadata.unresolved {
        println!("  Unresolved #{}: {}", unresolved.issue_id, unresolved.error);
    }
    if summary.interrupted {
        println!("  Run was interrupted; rerun to finish the remaining issues.");
    }
}

/// Run the CLI: load issues, evaluate them, and write the report.
///
/// Unresolved issues do not make the run fail; only configuration and
/// storage errors do.
pub fn run(cli: Cli) -> Result<(), AppError> {
    if !cli.input.exists() {
        return Err(ConfigError::MissingInput(cli.input.clone()).into());
    }
    let config = cli.analysis_config()?;
    let provider = cli.build_provider(&config)?;
    let category_rules = Arc::new(config.category_rule_set()?);

    let references = match (&cli.reference, cli.method.uses_llm()) {
        (Some(dir), true) => load_references(dir, config.llm.max_reference_chars),
        _ => Vec::new(),
    };

    let issues = load_issues(&cli.input)?;
    if issues.is_empty() {
        println!("No issues found in {}", cli.input.display());
        return Ok(());
    }
    println!("Found {} issues in {}", issues.len(), cli.input.display());

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;

    let mut ledger = Ledger::load(&cli.ledger_path())?;
    let orchestrator = Orchestrator::new(
        Arc::new(provider),
        category_rules,
        config.scoring.clone(),
        EvaluationContext { references },
        RunOptions {
            force_refresh: cli.force,
            concurrency: config.concurrency,
        },
    );

    let timeout = cli.timeout_secs.map(Duration::from_secs);
    let summary = runtime.block_on(orchestrator.run(issues, &mut ledger, shutdown_signal(timeout)))?;

    let path = report_path(&cli.output, cli.method);
    let mut report = summary.to_report();
    match Report::load(&path) {
        Ok(Some(previous)) => report.merge_previous(previous),
        Ok(None) => {}
        Err(e) => log::warn!("[cli] Ignoring unreadable previous report {}: {e}", path.display()),
    }
    report.save(&path)?;

    print_summary(&summary, &report, &path);
    Ok(())
}
