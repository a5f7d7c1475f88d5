use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Invalid invocation. Surfaced before any side effect is attempted.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration")]
    Load(#[from] config::ConfigError),

    #[error("invalid API base URL '{0}'")]
    InvalidBaseUrl(String),

    #[error("per_page must be between 1 and 250, got {0}")]
    PerPageOutOfRange(u32),

    #[error("synthetic_count must be nonzero")]
    ZeroSyntheticCount,

    #[error("interval_secs must be nonzero")]
    ZeroInterval,
}

// ── Configuration ─────────────────────────────────────────────────────────────

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Data source configuration (live API and synthetic generator)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_vs_currency")]
    pub vs_currency: String,

    #[serde(default = "default_per_page")]
    pub per_page: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_synthetic_count")]
    pub synthetic_count: usize,

    /// Fixed RNG seed for the synthetic generator; unset means a fresh
    /// batch every run.
    #[serde(default)]
    pub synthetic_seed: Option<u64>,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Cadence of the `watch` loop.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_base_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}
fn default_vs_currency() -> String {
    "usd".to_string()
}
fn default_per_page() -> u32 {
    20
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    "coingecko-etl/0.1 (market data pipeline)".to_string()
}
fn default_synthetic_count() -> usize {
    10
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/crypto_data.duckdb")
}
fn default_true() -> bool {
    true
}
fn default_interval_secs() -> u64 {
    900
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from files + environment overrides, then validate.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("CRYPTO_ETL").separator("__"))
            .build()?;

        let app_cfg: AppConfig = cfg.try_deserialize()?;
        app_cfg.validate()?;
        Ok(app_cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if Url::parse(&self.source.base_url).is_err() {
            return Err(ConfigError::InvalidBaseUrl(self.source.base_url.clone()));
        }
        if self.source.per_page == 0 || self.source.per_page > 250 {
            return Err(ConfigError::PerPageOutOfRange(self.source.per_page));
        }
        if self.source.synthetic_count == 0 {
            return Err(ConfigError::ZeroSyntheticCount);
        }
        if self.pipeline.interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            storage: StorageConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            vs_currency: default_vs_currency(),
            per_page: default_per_page(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            synthetic_count: default_synthetic_count(),
            synthetic_seed: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            run_migrations: true,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn bad_base_url_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.source.base_url = "not a url".into();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn per_page_bounds() {
        let mut cfg = AppConfig::default();
        cfg.source.per_page = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::PerPageOutOfRange(0))
        ));
        cfg.source.per_page = 251;
        assert!(cfg.validate().is_err());
        cfg.source.per_page = 250;
        assert!(cfg.validate().is_ok());
    }
}
