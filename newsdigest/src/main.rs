/*
newsdigest - main.rs
One run: load config and run state, discover new feeds, fetch every feed, assemble
the digest, translate, render, deliver (email or file), then record the run timestamp.
*/

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use clap::Parser;
use common::{Config, RunStateStore};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use newsdigest::delivery::{deliver_and_commit, DigestSink, HtmlFile, LogAttachment, Mailer};
use newsdigest::discovery::run_discovery;
use newsdigest::ingestion::HttpFeedClient;
use newsdigest::llm::remote::RemoteLlmProvider;
use newsdigest::llm::translator::Translator;
use newsdigest::llm::LlmProvider;
use newsdigest::pipeline::{run_digest, DigestRun, Fatal, RunOptions, RunReport, StageExt};

#[derive(Parser, Debug)]
#[command(name = "newsdigest", about = "Fetch RSS/Atom feeds and deliver a categorized digest")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the run state file from the config
    #[arg(long, value_name = "FILE")]
    state: Option<PathBuf>,

    /// Keep every fetched article, ignoring --days and the last run time
    #[arg(long)]
    force: bool,

    /// Keep articles published in the last N days instead of since the last run
    #[arg(long, value_name = "N")]
    days: Option<u32>,

    /// Write the digest to a file instead of sending it
    #[arg(long)]
    dry_run: bool,

    /// Output file for --dry-run
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

struct RunSummary {
    articles: usize,
    categories: usize,
    failures: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let config = load_config(args.config.as_deref()).await;
    init_tracing(
        &args.log_level,
        config.as_ref().ok().and_then(|c| c.log_file.as_deref()),
    )?;
    let config = match config {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("failed to load configuration: {:#}", e);
            return Err(e);
        }
    };

    match execute(&args, &config).await {
        Ok(summary) => {
            println!(
                "Status: success | articles: {} | categories: {} | failed feeds: {}",
                summary.articles, summary.categories, summary.failures
            );
            Ok(())
        }
        Err(fatal) => {
            error!(stage = fatal.stage, "fatal error: {:#}", fatal.error);
            notify_failure(&config, args.dry_run, &fatal).await;
            Err(fatal.error)
        }
    }
}

/// Resolve config paths the usual way: `config.default.toml` merged with
/// either `--config` or `./config.toml`.
async fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let default_path = PathBuf::from("config.default.toml");

    let override_path = match explicit {
        Some(p) if !p.exists() => anyhow::bail!("Config file not found: {}", p.display()),
        Some(p) => Some(p.to_path_buf()),
        None => {
            let p = PathBuf::from("config.toml");
            if p.exists() {
                Some(p)
            } else {
                None
            }
        }
    };

    Config::load_with_defaults(
        if default_path.exists() { Some(&default_path) } else { None },
        override_path.as_deref(),
    )
    .await
}

fn init_tracing(level: &str, log_file: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

async fn execute(args: &Args, config: &Config) -> Result<RunSummary, Fatal> {
    let store = RunStateStore::new(
        args.state
            .clone()
            .unwrap_or_else(|| PathBuf::from(config.state_path())),
    );
    let state = store.load().await.stage("state")?;
    info!(path = %store.path().display(), last_execution = ?state.read(), "run state loaded");

    config.validate().stage("configuration")?;

    // Fail on missing mail settings before spending time on the network.
    let sink: Box<dyn DigestSink> = if args.dry_run {
        let path = args
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(config.output_path()));
        Box::new(HtmlFile::new(path))
    } else {
        let email = config
            .email
            .as_ref()
            .context("an [email] section is required unless --dry-run is set")
            .stage("configuration")?;
        Box::new(Mailer::from_config(email).stage("configuration")?)
    };

    let client = HttpFeedClient::new().stage("ingestion")?;

    let mut config = config.clone();
    let config_target = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    run_discovery(&client, &mut config, &config_target).await;

    let options = RunOptions {
        force: args.force,
        days: args.days,
    };
    let DigestRun {
        mut digest,
        report,
        next_state,
    } = run_digest(&config, &options, state, &client, Utc::now())
        .await
        .stage("configuration")?;

    log_report(&report);

    if !digest.is_empty() {
        match create_llm_provider(&config) {
            Ok(Some(provider)) => {
                Translator::new(provider)
                    .translate_digest(&mut digest, config.target_language())
                    .await;
            }
            Ok(None) => info!("Translation disabled"),
            Err(e) => warn!("Translation disabled: {:#}", e),
        }
    }

    deliver_and_commit(&digest, sink.as_ref(), Local::now(), &store, &next_state).await?;

    Ok(RunSummary {
        articles: digest.total_articles(),
        categories: digest.total_categories(),
        failures: report.failures.len(),
    })
}

fn log_report(report: &RunReport) {
    for failure in &report.failures {
        warn!(
            source = %failure.source_name,
            url = %failure.url,
            kind = %failure.kind,
            "feed failed: {}",
            failure.message
        );
    }
    info!(
        policy = %report.policy,
        sources = report.sources,
        failed = report.failures.len(),
        fetched = report.fetched_entries,
        skipped = report.skipped_entries,
        duplicates = report.duplicates_removed,
        filtered_out = report.filtered_out,
        capped_out = report.capped_out,
        "ingestion finished"
    );
}

/// Create the translation provider from config. `Ok(None)` means translation
/// is switched off.
fn create_llm_provider(config: &Config) -> Result<Option<Arc<dyn LlmProvider>>> {
    let Some(llm_config) = config.llm.as_ref() else {
        return Ok(None);
    };

    let adapter = llm_config.adapter.as_deref().unwrap_or("none");
    match adapter {
        "none" => Ok(None),
        "remote" => {
            let remote_config = llm_config
                .remote
                .as_ref()
                .context("Remote adapter selected but no [llm.remote] config found")?;

            let api_key_env = remote_config
                .api_key_env
                .as_deref()
                .context("Missing api_key_env in remote config")?;
            let api_key = std::env::var(api_key_env)
                .with_context(|| format!("LLM API key env var '{}' not set", api_key_env))?;

            let model = remote_config
                .model
                .clone()
                .unwrap_or_else(|| "gpt-4o-mini".to_string());
            let api_url = remote_config
                .api_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string());

            info!(model = %model, "translation provider initialized");
            let provider: Arc<dyn LlmProvider> = Arc::new(
                RemoteLlmProvider::new(api_url, api_key, model).with_defaults(
                    remote_config.timeout_seconds.unwrap_or(30),
                    remote_config.max_tokens.unwrap_or(500),
                    0.3,
                ),
            );
            Ok(Some(provider))
        }
        _ => anyhow::bail!("Unknown LLM adapter type: {}", adapter),
    }
}

/// Best-effort failure email, with the log file attached when configured.
/// Never masks the original error.
async fn notify_failure(config: &Config, dry_run: bool, fatal: &Fatal) {
    if dry_run {
        return;
    }
    let Some(email) = config.email.as_ref() else {
        return;
    };

    let log = match config.log_file.as_deref() {
        Some(path) => LogAttachment::read(Path::new(path)).await,
        None => None,
    };

    let result: Result<()> = async {
        let mailer = Mailer::from_config(email)?;
        let message = mailer.error_message(fatal.stage, &format!("{:#}", fatal.error), log)?;
        mailer.send(message).await
    }
    .await;

    match result {
        Ok(()) => info!(to = %email.recipient, "error notification sent"),
        Err(e) => error!("failed to send error notification: {:#}", e),
    }
}
