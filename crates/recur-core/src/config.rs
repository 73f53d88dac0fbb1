//! Config - エンジン設定
//!
//! # 読み込み順
//! 1. 明示的に渡されたパス
//! 2. `RECUR_CONFIG` 環境変数
//! 3. カレントディレクトリの `recur.toml`
//! 4. どれも無ければ `EngineConfig::default()`
//!
//! 最後に `RECUR_TICK_INTERVAL_SECS` が tick 周期を上書きする。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_ENV: &str = "RECUR_CONFIG";
pub const TICK_INTERVAL_ENV: &str = "RECUR_TICK_INTERVAL_SECS";
pub const DEFAULT_CONFIG_FILE: &str = "recur.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub generation: GenerationConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_interval_secs: u64,

    /// Run the maintenance sweep every N ticks.
    pub maintenance_every_ticks: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 900,
            maintenance_every_ticks: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Cursor advances allowed per call: `max(safety_factor * count, safety_floor)`.
    pub safety_factor: u32,
    pub safety_floor: u32,
    pub max_conflict_retries: u32,
    pub max_generate_now: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            safety_factor: 10,
            safety_floor: 366,
            max_conflict_retries: 5,
            max_generate_now: 10,
        }
    }
}

impl GenerationConfig {
    pub fn advance_cap(&self, count: u32) -> u32 {
        self.safety_factor
            .saturating_mul(count)
            .max(self.safety_floor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { timeout_ms: 5000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.tick_interval_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store.timeout_ms)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&s).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve, parse, apply env overrides and validate.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let local = Path::new(DEFAULT_CONFIG_FILE);

        let mut cfg = if let Some(path) = explicit {
            Self::from_file(path)?
        } else if let Some(path) = env_path.as_deref() {
            Self::from_file(path)?
        } else if local.exists() {
            Self::from_file(local)?
        } else {
            Self::default()
        };

        cfg.apply_env_overrides(|name| std::env::var(name).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// `lookup` is injected so tests do not have to mutate the process env.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup(TICK_INTERVAL_ENV)
            && !v.trim().is_empty()
        {
            self.scheduler.tick_interval_secs =
                v.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                    name: TICK_INTERVAL_ENV,
                    value: v.clone(),
                })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.scheduler.tick_interval_secs == 0, "scheduler.tick_interval_secs must be > 0"),
            (self.scheduler.maintenance_every_ticks == 0, "scheduler.maintenance_every_ticks must be > 0"),
            (self.generation.safety_factor == 0, "generation.safety_factor must be > 0"),
            (self.generation.max_conflict_retries == 0, "generation.max_conflict_retries must be > 0"),
            (self.generation.max_generate_now == 0, "generation.max_generate_now must be > 0"),
            (self.store.timeout_ms == 0, "store.timeout_ms must be > 0"),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, msg)) => Err(ConfigError::Invalid((*msg).to_string())),
            None => Ok(()),
        }
    }
}
