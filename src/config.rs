//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! signal threshold is a named policy knob with a default, so a partial
//! file is valid. Secrets (API keys, bot token) are referenced by env-var
//! name in the config and resolved at startup.

use anyhow::{Context, Result};
use chrono::{DateTime, Timelike, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::engine::lifecycle::LifecycleConfig;
use crate::retry::RetryPolicy;
use crate::signal::entry::EntryConfig;
use crate::signal::exit::ExitConfig;
use crate::signal::liquidity::LiquidityConfig;
use crate::signal::score::ScoreConfig;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub radar: RadarConfig,
    #[serde(default)]
    pub listings: ListingsConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub score: ScoreConfig,
    #[serde(default)]
    pub entry: EntryConfig,
    #[serde(default)]
    pub exit: ExitConfig,
    #[serde(default)]
    pub liquidity: LiquidityConfig,
    #[serde(default)]
    pub venues: VenuesConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub secrets: SecretsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RadarConfig {
    pub name: String,
    /// Poll interval during active hours.
    pub day_interval_secs: u64,
    /// Poll interval outside active hours.
    pub night_interval_secs: u64,
    /// Active hours are `[day_start_hour_utc, day_end_hour_utc)`.
    pub day_start_hour_utc: u32,
    pub day_end_hour_utc: u32,
    pub state_file: String,
    /// SQLite URL for the audit log. Empty disables it.
    pub audit_db_url: String,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            name: "RADAR-001".to_string(),
            day_interval_secs: 20 * 60,
            night_interval_secs: 60 * 60,
            day_start_hour_utc: 8,
            day_end_hour_utc: 23,
            state_file: "radar_state.json".to_string(),
            audit_db_url: "sqlite://radar_audit.db?mode=rwc".to_string(),
        }
    }
}

impl RadarConfig {
    /// Sleep between cycles: shorter during active UTC hours.
    pub fn poll_interval(&self, now: DateTime<Utc>) -> Duration {
        let hour = now.hour();
        let day = hour >= self.day_start_hour_utc && hour < self.day_end_hour_utc;
        if day {
            Duration::from_secs(self.day_interval_secs)
        } else {
            Duration::from_secs(self.night_interval_secs)
        }
    }
}

/// Listings polling and admission filters.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ListingsConfig {
    pub base_url: String,
    /// Rows requested per poll (newest listings first).
    pub limit: u32,
    pub max_age_days: i64,
    pub min_volume_usd: Decimal,
    /// Admit tokens that trip the unverified-token heuristics.
    pub allow_unverified: bool,
    /// A zero market cap combined with at least this much volume is suspicious.
    pub zero_mcap_volume_usd: Decimal,
    pub max_symbol_len: usize,
}

impl Default for ListingsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://pro-api.coinmarketcap.com".to_string(),
            limit: 200,
            max_age_days: 14,
            min_volume_usd: dec!(200000),
            allow_unverified: false,
            zero_mcap_volume_usd: dec!(500000),
            max_symbol_len: 11,
        }
    }
}

/// Which exchanges to probe, in preference order Binance → Bybit spot →
/// Bybit linear.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VenuesConfig {
    pub binance_enabled: bool,
    pub bybit_spot_enabled: bool,
    pub bybit_linear_enabled: bool,
    pub binance_base_url: String,
    pub bybit_base_url: String,
    pub timeout_secs: u64,
}

impl Default for VenuesConfig {
    fn default() -> Self {
        Self {
            binance_enabled: true,
            bybit_spot_enabled: true,
            bybit_linear_enabled: true,
            binance_base_url: "https://api.binance.com".to_string(),
            bybit_base_url: "https://api.bybit.com".to_string(),
            timeout_secs: 12,
        }
    }
}

/// Env-var names of secrets.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SecretsConfig {
    pub cmc_api_key_env: String,
    pub telegram_bot_token_env: String,
    pub telegram_chat_id_env: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            cmc_api_key_env: "CMC_API_KEY".to_string(),
            telegram_bot_token_env: "BOT_TOKEN".to_string(),
            telegram_chat_id_env: "CHAT_ID".to_string(),
        }
    }
}

/// Secrets resolved from the environment.
pub struct Secrets {
    pub cmc_api_key: SecretString,
    /// Bot token and chat id; `None` runs the notifier in log-only mode.
    pub telegram: Option<(SecretString, String)>,
}

impl Secrets {
    pub fn resolve(cfg: &SecretsConfig) -> Result<Self> {
        let cmc_api_key = SecretString::new(AppConfig::resolve_env(&cfg.cmc_api_key_env)?);

        let token = AppConfig::resolve_env(&cfg.telegram_bot_token_env).ok();
        let chat = AppConfig::resolve_env(&cfg.telegram_chat_id_env).ok();
        let telegram = match (token, chat) {
            (Some(token), Some(chat)) => Some((SecretString::new(token), chat)),
            _ => None,
        };

        Ok(Self { cmc_api_key, telegram })
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Resolve an environment variable name to its (non-empty) value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        let value = std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))?;
        let value = value.trim().to_string();
        if value.is_empty() {
            anyhow::bail!("Environment variable is empty: {env_name}");
        }
        Ok(value)
    }
}
