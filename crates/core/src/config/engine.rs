//! Engine configuration.
//!
//! Values come from an optional TOML file, then environment overrides,
//! then defaults for anything still unset.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::env::{expand_env, mask_endpoint, mask_password, parse_var};
use super::ConfigError;

/// Environment variable names.
pub mod vars {
    pub const CONFIG_FILE: &str = "TIMELINE_CONFIG";
    pub const CHAIN_ID: &str = "CHAIN_ID";
    pub const RPC_URL_ETHEREUM: &str = "RPC_URL_ETHEREUM";
    pub const RPC_URL: &str = "RPC_URL";
    pub const RPC_TIMEOUT_SECS: &str = "RPC_TIMEOUT_SECS";
    pub const DATABASE_URL: &str = "DATABASE_URL";
    pub const DATABASE_SCHEMA: &str = "DATABASE_SCHEMA";
    pub const DATABASE_MAX_CONNECTIONS: &str = "DATABASE_MAX_CONNECTIONS";
    pub const SEARCH_BLOCKS_BACK: &str = "SEARCH_BLOCKS_BACK";
    pub const PROBE_DELAY_MS: &str = "PROBE_DELAY_MS";
    pub const BATCH_SIZE: &str = "BATCH_SIZE";
    pub const MAX_WORKERS: &str = "MAX_WORKERS";
    pub const LOOP_INTERVAL: &str = "LOOP_INTERVAL";
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub chain: ChainSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    /// Block search parameters
    #[serde(default)]
    pub analysis: AnalysisSettings,

    /// Batch loop parameters
    #[serde(default)]
    pub runner: RunnerSettings,
}

/// RPC endpoint and network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSettings {
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    /// Archive-capable HTTP endpoint
    #[serde(default)]
    pub rpc_url: String,

    /// Upper bound on any single RPC call (seconds)
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_secs: u64,
}

fn default_chain_id() -> u64 {
    1
}
fn default_rpc_timeout() -> u64 {
    30
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            rpc_url: String::new(),
            rpc_timeout_secs: default_rpc_timeout(),
        }
    }
}

impl ChainSettings {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

/// Postgres connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default)]
    pub url: String,

    /// Schema holding both the indexer table and the analysis table
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Pool size floor. The pool never has fewer connections than workers.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_schema() -> String {
    "ponder".to_string()
}
fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            schema: default_schema(),
            max_connections: default_max_connections(),
        }
    }
}

/// Earliest-liquidatable-block search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Search window size in blocks
    #[serde(default = "default_search_blocks_back")]
    pub search_blocks_back: u64,

    /// Pause between consecutive probes (milliseconds)
    #[serde(default = "default_probe_delay")]
    pub probe_delay_ms: u64,
}

fn default_search_blocks_back() -> u64 {
    10_000
}
fn default_probe_delay() -> u64 {
    100
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            search_blocks_back: default_search_blocks_back(),
            probe_delay_ms: default_probe_delay(),
        }
    }
}

impl AnalysisSettings {
    pub fn probe_delay(&self) -> Duration {
        Duration::from_millis(self.probe_delay_ms)
    }
}

/// Batch loop timing and parallelism.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Sleep between batches (seconds)
    #[serde(default = "default_loop_interval")]
    pub loop_interval_secs: u64,
}

fn default_batch_size() -> usize {
    100
}
fn default_max_workers() -> usize {
    5
}
fn default_loop_interval() -> u64 {
    10
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_workers: default_max_workers(),
            loop_interval_secs: default_loop_interval(),
        }
    }
}

impl RunnerSettings {
    pub fn loop_interval(&self) -> Duration {
        Duration::from_secs(self.loop_interval_secs)
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file, expanding `${VAR}` references.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.expand_env_vars();
        Ok(config)
    }

    /// Resolve configuration from the process environment without validating.
    ///
    /// Reads the file named by `TIMELINE_CONFIG` if set, then applies
    /// environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(vars::CONFIG_FILE) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim())?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Resolve and validate everything the analysis loop needs.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Self::from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Expand environment variables in string values.
    pub fn expand_env_vars(&mut self) {
        self.chain.rpc_url = expand_env(&self.chain.rpc_url);
        self.database.url = expand_env(&self.database.url);
        self.database.schema = expand_env(&self.database.schema);
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = parse_var(vars::CHAIN_ID, lookup(vars::CHAIN_ID))? {
            self.chain.chain_id = v;
        }
        if let Some(url) = text(vars::RPC_URL_ETHEREUM).or_else(|| text(vars::RPC_URL)) {
            self.chain.rpc_url = url;
        }
        if let Some(v) = parse_var(vars::RPC_TIMEOUT_SECS, lookup(vars::RPC_TIMEOUT_SECS))? {
            self.chain.rpc_timeout_secs = v;
        }
        if let Some(url) = text(vars::DATABASE_URL) {
            self.database.url = url;
        }
        if let Some(schema) = text(vars::DATABASE_SCHEMA) {
            self.database.schema = schema;
        }
        if let Some(v) = parse_var(
            vars::DATABASE_MAX_CONNECTIONS,
            lookup(vars::DATABASE_MAX_CONNECTIONS),
        )? {
            self.database.max_connections = v;
        }
        if let Some(v) = parse_var(vars::SEARCH_BLOCKS_BACK, lookup(vars::SEARCH_BLOCKS_BACK))? {
            self.analysis.search_blocks_back = v;
        }
        if let Some(v) = parse_var(vars::PROBE_DELAY_MS, lookup(vars::PROBE_DELAY_MS))? {
            self.analysis.probe_delay_ms = v;
        }
        if let Some(v) = parse_var(vars::BATCH_SIZE, lookup(vars::BATCH_SIZE))? {
            self.runner.batch_size = v;
        }
        if let Some(v) = parse_var(vars::MAX_WORKERS, lookup(vars::MAX_WORKERS))? {
            self.runner.max_workers = v;
        }
        if let Some(v) = parse_var(vars::LOOP_INTERVAL, lookup(vars::LOOP_INTERVAL))? {
            self.runner.loop_interval_secs = v;
        }

        Ok(())
    }

    /// Reject configurations the engine cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain.rpc_url.trim().is_empty() {
            return Err(ConfigError::Missing(vars::RPC_URL_ETHEREUM));
        }
        self.validate_database()?;
        if self.chain.rpc_timeout_secs == 0 {
            return Err(ConfigError::Zero(vars::RPC_TIMEOUT_SECS));
        }
        if self.analysis.search_blocks_back == 0 {
            return Err(ConfigError::Zero(vars::SEARCH_BLOCKS_BACK));
        }
        if self.runner.batch_size == 0 {
            return Err(ConfigError::Zero(vars::BATCH_SIZE));
        }
        if self.runner.max_workers == 0 {
            return Err(ConfigError::Zero(vars::MAX_WORKERS));
        }
        Ok(())
    }

    /// Database-only checks, for commands that never touch the chain.
    pub fn validate_database(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Missing(vars::DATABASE_URL));
        }
        if self.database.schema.trim().is_empty() {
            return Err(ConfigError::Missing(vars::DATABASE_SCHEMA));
        }
        Ok(())
    }

    /// Connections to open: at least one per worker.
    pub fn pool_size(&self) -> u32 {
        let workers = u32::try_from(self.runner.max_workers).unwrap_or(u32::MAX);
        self.database.max_connections.max(workers).max(1)
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(
            chain_id = self.chain.chain_id,
            rpc_url = %mask_endpoint(&self.chain.rpc_url),
            rpc_timeout_secs = self.chain.rpc_timeout_secs,
            "Chain settings"
        );
        tracing::info!(
            url = %mask_password(&self.database.url),
            schema = %self.database.schema,
            pool_size = self.pool_size(),
            "Database settings"
        );
        tracing::info!(
            search_blocks_back = self.analysis.search_blocks_back,
            probe_delay_ms = self.analysis.probe_delay_ms,
            "Analysis settings"
        );
        tracing::info!(
            batch_size = self.runner.batch_size,
            max_workers = self.runner.max_workers,
            loop_interval_secs = self.runner.loop_interval_secs,
            "Runner settings"
        );
    }
}
