//! Orchestrator CLI entry point.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{Context, Result};
use tokio::sync::mpsc;
use tracing::info;

use orchestrator::cli::{Cli, Command, OutputFormat};
use orchestrator::{
    AdmissionQueue, AnthropicLlmAdapter, Config, HealthMonitor, LocalDocGenAdapter, MockLlmAdapter, Orchestrator,
    OrchestratorConfig, PipelineDriver, RateLimiter, Repository, Task, TaskStore, VectorAdapter, WorkerPool,
};

fn setup_logging(level: &str) -> Result<()> {
    let level = match level.to_uppercase().as_str() {
        "TRACE" => tracing::Level::TRACE,
        "DEBUG" => tracing::Level::DEBUG,
        "WARN" | "WARNING" => tracing::Level::WARN,
        "ERROR" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    Ok(())
}

/// Build every long-lived component the orchestrator needs from config,
/// opening the durable store and spawning its actor.
async fn build(config: Config) -> Result<(TaskStore, AdmissionQueue, PipelineDriver, Arc<WorkerPool>)> {
    std::fs::create_dir_all(&config.store.dsn).context("failed to create store directory")?;
    std::fs::create_dir_all(&config.paths.repo_root).context("failed to create repo root")?;
    std::fs::create_dir_all(&config.paths.vectorstore_root).context("failed to create vectorstore root")?;

    let raw_store = taskstore::Store::open(&config.store.dsn).context("failed to open task store")?;
    let store = TaskStore::spawn(raw_store);

    let vector = VectorAdapter::new(Arc::new(vectorindex::LocalVectorIndexAdapter::new(
        config.paths.vectorstore_root.clone(),
    )));

    let llm: Arc<dyn orchestrator::LlmAdapter> = if std::env::var(&config.llm.api_key_env).is_ok() {
        Arc::new(AnthropicLlmAdapter::from_config(&config.llm, &config.limits)?)
    } else {
        tracing::warn!(env = %config.llm.api_key_env, "no API key set, falling back to the mock LLM adapter");
        Arc::new(MockLlmAdapter)
    };
    let docgen = Arc::new(LocalDocGenAdapter::new(llm.clone()));

    let rate_limiter = Arc::new(RateLimiter::new(config.limits.rpm as usize, Duration::from_secs(60)));
    let pool = Arc::new(WorkerPool::new(&config.concurrency, config.retry.clone(), rate_limiter));
    let admission = AdmissionQueue::new(store.clone(), &(&config.concurrency).into());

    let driver = PipelineDriver::new(store.clone(), vector, llm, docgen, pool.clone(), admission.clone(), config);

    Ok((store, admission, driver, pool))
}

async fn run_serve(config: Config) -> Result<()> {
    let (store, admission, driver, _pool) = build(config).await?;

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("ctrl-c received");
        let _ = shutdown_tx.send(()).await;
    });

    let mut orchestrator = Orchestrator::new(OrchestratorConfig::default(), store, admission, driver);
    orchestrator.run(shutdown_rx).await
}

/// Deterministic stand-in for a real content digest over a repository
/// path; the scan stage hashes individual file contents on its own, so
/// this only needs to distinguish one submitted repository from another.
fn path_digest(path: &std::path::Path) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    path.to_string_lossy().hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

async fn run_submit(config: Config, name: String, path: PathBuf) -> Result<()> {
    let (store, _admission, _driver, _pool) = build(config).await?;

    let repo = Repository::new(name, path.to_string_lossy().to_string(), path_digest(&path));
    let repo_id = repo.id.clone();
    store.create_repository(repo).await?;

    let task = Task::new(repo_id, serde_json::json!({}));
    let task_id = task.id.clone();
    store.create_task(task).await?;

    println!("submitted task {task_id}");
    Ok(())
}

async fn run_status(config: Config, task_id: String, format: OutputFormat) -> Result<()> {
    let (store, _admission, _driver, _pool) = build(config).await?;
    let task = store
        .get_task(&task_id)
        .await?
        .ok_or_else(|| eyre::eyre!("no such task: {task_id}"))?;

    let progress = orchestrator::derive_progress(&task, 0);
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&progress)?),
        OutputFormat::Text => {
            println!("task:     {}", task.id);
            println!("status:   {}", task.status);
            println!("step:     {:?}", progress.step);
            println!("progress: {:.1}%", progress.percent);
            if let Some(file) = &progress.current_file {
                println!("file:     {file}");
            }
        }
    }
    Ok(())
}

async fn run_health(config: Config, format: OutputFormat) -> Result<()> {
    let (store, _admission, _driver, pool) = build(config).await?;
    let monitor = HealthMonitor::new(store, pool);
    let report = monitor.report().await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!("workers:  {}", report.worker_count);
            println!("running:  {}", report.running_count);
            println!("pending:  {}", report.pending_queue_depth);
            println!("est wait: {}s", report.estimated_wait_secs);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.log_level)?;

    let config = Config::load(cli.config.as_ref()).context("failed to load config")?;

    match cli.command {
        Command::Serve => run_serve(config).await,
        Command::Submit { name, path } => run_submit(config, name, path).await,
        Command::Status { task_id, format } => run_status(config, task_id, format).await,
        Command::Health { format } => run_health(config, format).await,
    }
}
