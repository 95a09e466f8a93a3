use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tagsmith::config::{AppConfig, CliConfig, FileConfig};
use tagsmith::engine::{
    AccountRuntime, BatchProcessor, CycleEngine, EngineSettings, FailureTracker,
    ProcessorSettings,
};
use tagsmith::gallery::{GalleryApi, GalleryClient};
use tagsmith::health::{run_health_server, HealthState};
use tagsmith::scheduler::{run_scheduler, CycleSchedule};
use tagsmith::tagmodel::{RemoteTagModel, TagModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Run one cycle and exit.
    Single,
    /// Run cycles until no untagged assets remain.
    Continuous,
    /// Sleep until the next cron fire, then drain the backlog.
    Scheduler,
    /// Serve health endpoints without processing anything.
    HealthOnly,
}

#[derive(Parser, Debug)]
#[clap(version)]
struct CliArgs {
    /// Path to a TOML config file.
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// How to run once started.
    #[clap(long, value_enum, default_value_t = Mode::Single)]
    pub mode: Mode,

    /// Stop continuous mode after this many cycles.
    #[clap(long)]
    pub max_cycles: Option<u32>,

    /// Gallery base URL (single-account setup; config file accounts win).
    #[clap(long)]
    pub base_url: Option<String>,

    /// Gallery API key for --base-url.
    #[clap(long)]
    pub api_key: Option<String>,

    /// Base URL of the tag inference service.
    #[clap(long)]
    pub model_url: Option<String>,

    /// Minimum prediction confidence to apply a tag.
    #[clap(long)]
    pub confidence_threshold: Option<f32>,

    /// Assets fetched per account per cycle.
    #[clap(long)]
    pub batch_size: Option<usize>,

    /// Directory for failure and progress state files.
    #[clap(long)]
    pub state_dir: Option<PathBuf>,

    /// The port for the health server.
    #[clap(long)]
    pub health_port: Option<u16>,

    /// Ping every account and exit.
    #[clap(long)]
    pub test_connection: bool,

    /// Print the failure store for every account and exit.
    #[clap(long)]
    pub show_failures: bool,

    /// Clear the failure store for every account and exit.
    #[clap(long)]
    pub reset_failures: bool,

    /// Clear the failure record of one asset and exit.
    #[clap(long, value_name = "ASSET_ID")]
    pub reset_failure: Option<String>,

    /// Print cumulative progress counters and exit.
    #[clap(long)]
    pub progress_status: bool,

    /// Zero the cumulative progress counters and exit.
    #[clap(long)]
    pub reset_progress: bool,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            model_url: self.model_url.clone(),
            confidence_threshold: self.confidence_threshold,
            batch_size: self.batch_size,
            state_dir: self.state_dir.clone(),
            health_port: self.health_port,
        }
    }

    fn has_operator_command(&self) -> bool {
        self.test_connection
            || self.show_failures
            || self.reset_failures
            || self.reset_failure.is_some()
            || self.progress_status
            || self.reset_progress
    }
}

fn build_engine(config: &AppConfig) -> Result<CycleEngine> {
    let model: Arc<dyn TagModel> = Arc::new(RemoteTagModel::new(
        &config.model_url,
        config.request_timeout_sec,
        config.retry.clone(),
    )?);

    let mut accounts = Vec::with_capacity(config.accounts.len());
    for settings in &config.accounts {
        let client = GalleryClient::new(
            &settings.base_url,
            &settings.api_key,
            config.request_timeout_sec,
            config.retry.clone(),
        )
        .with_context(|| format!("Failed to build client for account {:?}", settings.name))?;
        let api: Arc<dyn GalleryApi> = Arc::new(client);
        accounts.push(AccountRuntime::new(
            settings.name.clone(),
            api,
            config.tag_cache_ttl,
            config.failures_path(&settings.name),
            config.failure_ceiling,
        ));
    }

    let processor = BatchProcessor::new(
        model,
        ProcessorSettings {
            confidence_threshold: config.confidence_threshold,
            processed_tag: config.processed_tag.clone(),
            tag_blacklist: config
                .tag_blacklist
                .iter()
                .map(|t| tagsmith::engine::normalize_tag_name(t))
                .collect(),
        },
    );

    Ok(CycleEngine::new(
        accounts,
        processor,
        EngineSettings {
            batch_size: config.batch_size,
            cycle_delay: config.cycle_delay,
        },
        config.progress_path(),
    ))
}

async fn run_operator_command(args: &CliArgs, config: &AppConfig) -> Result<()> {
    if args.test_connection {
        let engine = build_engine(config)?;
        let results = engine.test_connections().await;
        let mut all_ok = true;
        for (name, result) in &results {
            match result {
                Ok(()) => println!("{}: ok", name),
                Err(e) => {
                    all_ok = false;
                    println!("{}: unreachable ({})", name, e);
                }
            }
        }
        if !all_ok {
            bail!("One or more accounts are unreachable");
        }
        return Ok(());
    }

    if args.show_failures {
        for account in &config.accounts {
            let tracker =
                FailureTracker::open(config.failures_path(&account.name), config.failure_ceiling);
            let summary = tracker.summary();
            println!(
                "Account {}: {} failed assets ({} permanent, {} retryable, ceiling {})",
                account.name,
                summary.total_failed_assets,
                summary.permanently_failed,
                summary.retry_candidates,
                summary.failure_ceiling
            );
            if !summary.permanent_sample.is_empty() {
                println!("  permanent sample: {}", summary.permanent_sample.join(", "));
            }
            for (asset_id, record) in tracker.failures() {
                let state = if record.permanent {
                    "permanent"
                } else {
                    "retryable"
                };
                println!(
                    "  {}: {} attempts, {}, last error at {}: {}",
                    asset_id, record.attempts, state, record.last_failed_at, record.last_error
                );
            }
        }
        return Ok(());
    }

    if args.reset_failures {
        for account in &config.accounts {
            let mut tracker =
                FailureTracker::open(config.failures_path(&account.name), config.failure_ceiling);
            let cleared = tracker.reset_all();
            println!("Account {}: cleared {} failure records", account.name, cleared);
        }
        return Ok(());
    }

    if let Some(asset_id) = &args.reset_failure {
        let mut found = false;
        for account in &config.accounts {
            let mut tracker =
                FailureTracker::open(config.failures_path(&account.name), config.failure_ceiling);
            if tracker.reset_one(asset_id) {
                found = true;
                println!("Account {}: cleared failure record for {}", account.name, asset_id);
            }
        }
        if !found {
            bail!("No failure record found for asset {:?}", asset_id);
        }
        return Ok(());
    }

    if args.progress_status {
        let engine = build_engine(config)?;
        let progress = engine.progress().await;
        println!("Assets processed:  {}", progress.assets_processed);
        println!("Tags assigned:     {}", progress.tags_assigned);
        println!("Failures recorded: {}", progress.failures_recorded);
        println!("Processing time:   {} ms", progress.processing_time_ms);
        match progress.updated_at {
            Some(at) => println!("Last updated:      {}", at),
            None => println!("Last updated:      never"),
        }
        return Ok(());
    }

    if args.reset_progress {
        let mut engine = build_engine(config)?;
        engine.reset_progress().await;
        println!("Progress counters reset");
        return Ok(());
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .ok();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    std::fs::create_dir_all(&config.state_dir)
        .with_context(|| format!("Failed to create state directory {:?}", config.state_dir))?;

    if cli_args.has_operator_command() {
        return run_operator_command(&cli_args, &config).await;
    }

    info!(
        "Starting in {:?} mode with {} account(s), batch size {}",
        cli_args.mode,
        config.accounts.len(),
        config.batch_size
    );

    let mut engine = build_engine(&config)?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received ctrl-c, shutting down");
            shutdown.cancel();
        }
    });

    let health_state = HealthState::new(engine.progress_handle(), engine.reachability_handle());
    let health_task = tokio::spawn(run_health_server(
        health_state,
        config.health_port,
        cancel.clone(),
    ));

    match cli_args.mode {
        Mode::Single => {
            let report = engine.run_cycle().await;
            info!(
                "Single cycle done: {} processed, {} failed",
                report.assets_processed, report.assets_failed
            );
        }
        Mode::Continuous => {
            engine.run_continuous(cli_args.max_cycles, &cancel).await;
        }
        Mode::Scheduler => {
            let schedule = CycleSchedule::parse(&config.cron_schedule)?;
            run_scheduler(&mut engine, &schedule, &cancel).await;
        }
        Mode::HealthOnly => {
            engine.test_connections().await;
            info!("Health-only mode, serving on port {}", config.health_port);
            cancel.cancelled().await;
        }
    }

    cancel.cancel();
    if let Err(e) = health_task.await? {
        error!("Health server error: {}", e);
    }
    Ok(())
}
