use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the analysis deadline is spent across the two barrier stages.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeadlineBudget {
    /// Each stage gets the full deadline (the agent wait is re-armed).
    #[default]
    PerStage,
    /// Both stages share one deadline measured from submission.
    WholeTransaction,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Barrier deadline and record time-to-live, in seconds
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    /// Barrier poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub deadline_budget: DeadlineBudget,
    /// How often expired records are purged from the store (ms)
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

fn default_deadline_secs() -> u64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_sweep_interval_ms() -> u64 {
    1000
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            deadline_budget: DeadlineBudget::default(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl AnalysisConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Buffered messages per topic before slow subscribers start lagging
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    1024
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkersConfig {
    /// Worker names to register at startup (must exist in the catalog)
    #[serde(default = "default_enabled_workers")]
    pub enabled: Vec<String>,
    #[serde(default)]
    pub blacklist: BlacklistConfig,
    #[serde(default)]
    pub wallet_drain: WalletDrainConfig,
    #[serde(default)]
    pub fixed_delay: FixedDelayConfig,
}

fn default_enabled_workers() -> Vec<String> {
    vec![
        "malicious-address-sentinel".to_string(),
        "wallet-drain-sentinel".to_string(),
    ]
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_workers(),
            blacklist: BlacklistConfig::default(),
            wallet_drain: WalletDrainConfig::default(),
            fixed_delay: FixedDelayConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlacklistConfig {
    #[serde(default = "default_blacklist")]
    pub addresses: Vec<String>,
}

fn default_blacklist() -> Vec<String> {
    vec!["0xbad".to_string(), "0xmalicious".to_string()]
}

impl Default for BlacklistConfig {
    fn default() -> Self {
        Self {
            addresses: default_blacklist(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletDrainConfig {
    /// Fraction of the known balance above which a transfer is a drain
    #[serde(default = "default_drain_ratio")]
    pub drain_ratio: Decimal,
    /// Known native balances in wei, keyed by address
    #[serde(default)]
    pub balances: HashMap<String, Decimal>,
}

fn default_drain_ratio() -> Decimal {
    dec!(0.99)
}

impl Default for WalletDrainConfig {
    fn default() -> Self {
        Self {
            drain_ratio: default_drain_ratio(),
            balances: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixedDelayConfig {
    /// Simulated processing time for the fixed-delay sentinels (ms)
    #[serde(default = "default_fixed_delay_ms")]
    pub delay_ms: u64,
}

fn default_fixed_delay_ms() -> u64 {
    3000
}

impl Default for FixedDelayConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_fixed_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveKind {
    #[default]
    None,
    Jsonl,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub kind: ArchiveKind,
    /// Output file for the JSONL archive
    #[serde(default = "default_archive_path")]
    pub path: PathBuf,
    /// PostgreSQL connection URL for the postgres archive
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_archive_path() -> PathBuf {
    PathBuf::from("data/transactions.jsonl")
}

fn default_max_connections() -> u32 {
    5
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            kind: ArchiveKind::default(),
            path: default_archive_path(),
            database_url: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig::default(),
            dispatch: DispatchConfig::default(),
            workers: WorkersConfig::default(),
            archive: ArchiveConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("analysis.deadline_secs", 10)?
            .set_default("analysis.poll_interval_ms", 100)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("TXGUARD_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (TXGUARD_ANALYSIS__DEADLINE_SECS, etc.)
            .add_source(
                Environment::with_prefix("TXGUARD")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.analysis.deadline_secs == 0 {
            return Err(ConfigError::Message(
                "analysis.deadline_secs must be greater than zero".into(),
            ));
        }
        if self.analysis.poll_interval_ms == 0 {
            return Err(ConfigError::Message(
                "analysis.poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.analysis.sweep_interval_ms == 0 {
            return Err(ConfigError::Message(
                "analysis.sweep_interval_ms must be greater than zero".into(),
            ));
        }
        if self.dispatch.channel_capacity == 0 {
            return Err(ConfigError::Message(
                "dispatch.channel_capacity must be greater than zero".into(),
            ));
        }
        if self.archive.kind == ArchiveKind::Postgres && self.archive.database_url.is_none() {
            return Err(ConfigError::Message(
                "archive.database_url is required for the postgres archive".into(),
            ));
        }
        Ok(())
    }
}
