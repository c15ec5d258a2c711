//! Orchestrator configuration types and loading.
//!
//! A single [`Config`] struct with a `#[serde(default)]` sub-struct per
//! subsystem, loaded via a fallback chain: explicit `--config` path,
//! then a project-local YAML file, then a user config-directory YAML
//! file, then compiled-in defaults. Provider credentials are read from
//! the environment variable named by `LlmConfig::api_key_env`, never
//! embedded in the YAML itself.

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub concurrency: ConcurrencyConfig,
    pub limits: LimitsConfig,
    pub retry: RetryConfig,
    pub index: IndexConfig,
    pub doc: DocConfig,
    pub store: StoreConfig,
    pub paths: PathsConfig,
}

impl Config {
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".orchestrator.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("orchestrator").join("orchestrator.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,
    #[serde(rename = "base-url")]
    pub base_url: String,
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 4096,
        }
    }
}

/// `concurrency.*` — admission and worker pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    #[serde(rename = "global-running-tasks")]
    pub global_running_tasks: usize,
    #[serde(rename = "worker-count")]
    pub worker_count: usize,
    pub prefetch: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            global_running_tasks: 5,
            worker_count: 4,
            prefetch: 2,
        }
    }
}

/// `limits.*` — LLM call budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub rpm: u32,
    #[serde(rename = "request-timeout-ms")]
    pub request_timeout_ms: u64,
    #[serde(rename = "hard-timeout-ms")]
    pub hard_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            rpm: 60,
            request_timeout_ms: 30_000,
            hard_timeout_ms: 120_000,
        }
    }
}

/// `retry.*` — transient-error backoff policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,
    #[serde(rename = "base-ms")]
    pub base_ms: u64,
    #[serde(rename = "jitter-frac")]
    pub jitter_frac: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_ms: 500,
            jitter_frac: 0.2,
        }
    }
}

/// `index.*` — vector index adapter batching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    #[serde(rename = "batch-size")]
    pub batch_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { batch_size: 32 }
    }
}

/// `doc.*` — Document stage polling and failure policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocConfig {
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,
    #[serde(rename = "max-total-ms")]
    pub max_total_ms: u64,
    /// Open Question decision: a Document-stage failure fails the task
    /// by default; operators who'd rather keep a completed analysis
    /// without a README can flip this off.
    #[serde(rename = "fail-task-on-doc-error")]
    pub fail_task_on_doc_error: bool,
}

impl Default for DocConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            max_total_ms: 300_000,
            fail_task_on_doc_error: true,
        }
    }
}

/// `store.*` — persistence location and pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub dsn: String,
    #[serde(rename = "pool-size")]
    pub pool_size: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dsn: "./data/orchestrator".to_string(),
            pool_size: 4,
        }
    }
}

/// `paths.*` — filesystem roots for repository uploads and vector data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    #[serde(rename = "repo-root")]
    pub repo_root: PathBuf,
    #[serde(rename = "vectorstore-root")]
    pub vectorstore_root: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            repo_root: PathBuf::from("./data/repos"),
            vectorstore_root: PathBuf::from("./data/vectorstore"),
        }
    }
}

/// View of [`ConcurrencyConfig`] consumed by the admission queue.
pub struct AdmissionConfig {
    pub max_concurrent_tasks: usize,
    pub avg_task_duration_secs: u64,
}

impl From<&ConcurrencyConfig> for AdmissionConfig {
    fn from(c: &ConcurrencyConfig) -> Self {
        Self {
            max_concurrent_tasks: c.global_running_tasks,
            avg_task_duration_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_yaml() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.concurrency.worker_count, config.concurrency.worker_count);
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults_for_missing_sections() {
        let parsed: Config = serde_yaml::from_str("limits:\n  rpm: 120\n").unwrap();
        assert_eq!(parsed.limits.rpm, 120);
        assert_eq!(parsed.concurrency.worker_count, ConcurrencyConfig::default().worker_count);
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let config = Config::load(Some(&PathBuf::from("/nonexistent/orchestrator.yml")));
        assert!(config.is_err());
    }
}
