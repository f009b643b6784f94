use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Environment variable that overrides `postgres_url`
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Per-target levels layered over `log_level`
    #[serde(default)]
    pub log_targets: LogTargets,
    /// PostgreSQL connection URL for the ledger store
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Per-target log levels
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LogTargets {
    /// Level for `simple_bank` events. `None` follows `log_level`.
    pub simple_bank: Option<String>,
    /// sqlx logs every statement at info
    pub sqlx: String,
    /// Extra `target=level` directives, appended as given
    pub extra: Vec<String>,
}

impl Default for LogTargets {
    fn default() -> Self {
        Self {
            simple_bank: None,
            sqlx: "warn".to_string(),
            extra: Vec::new(),
        }
    }
}

/// Transaction isolation level applied to every store transaction
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
    /// Upper bound on any single row lock wait
    pub lock_timeout_ms: u64,
    pub isolation: IsolationLevel,
}

impl StoreConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout_ms: 5_000,
            lock_timeout_ms: 5_000,
            isolation: IsolationLevel::ReadCommitted,
        }
    }
}

/// Transfer engine configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Deadline applied by `TransferEngine::transfer`. `None` waits forever.
    pub transfer_timeout_ms: Option<u64>,
    /// Let a transfer drive the source balance below zero
    pub allow_overdraft: bool,
}

impl EngineConfig {
    pub fn transfer_timeout(&self) -> Option<Duration> {
        self.transfer_timeout_ms.map(Duration::from_millis)
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        let mut config = Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path))?;

        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            config.postgres_url = Some(url);
        }
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}
