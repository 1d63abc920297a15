//! Protocol configuration
//!
//! Fee bounds, oracle trust windows and event delivery settings. Loaded from
//! TOML (`carousel_config.toml` by default), with a handful of environment
//! overrides for deployment.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Protocol configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Fee bounds enforced by the factory
    #[serde(default)]
    pub fees: FeeBounds,

    /// Oracle and sequencer trust windows for new controllers
    #[serde(default)]
    pub oracle: OracleSettings,

    /// Event fan-out and journal
    #[serde(default)]
    pub events: EventSettings,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            fees: FeeBounds::default(),
            oracle: OracleSettings::default(),
            events: EventSettings::default(),
        }
    }
}

impl ProtocolConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment or default path.
    ///
    /// Reads `.env` first. A missing or unreadable file falls back to
    /// defaults; env overrides apply either way.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let path = std::env::var("CAROUSEL_CONFIG_PATH")
            .unwrap_or_else(|_| "carousel_config.toml".to_string());

        let mut config = Self::load(&path).unwrap_or_else(|e| {
            tracing::debug!("Using default protocol config ({}): {}", path, e);
            Self::default()
        });
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_u64("CAROUSEL_GRACE_PERIOD_SECS") {
            self.oracle.grace_period_secs = v;
        }
        if let Some(v) = env_u64("CAROUSEL_PRICE_TIMEOUT_SECS") {
            self.oracle.price_timeout_secs = v;
        }
        if let Ok(path) = std::env::var("CAROUSEL_JOURNAL_PATH") {
            if !path.trim().is_empty() {
                self.events.journal_path = Some(path);
            }
        }
    }

    /// Save to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.fees.max_deposit_fee_bps > 10_000 {
            bail!(
                "fees.max_deposit_fee_bps {} exceeds 10000",
                self.fees.max_deposit_fee_bps
            );
        }
        if self.fees.max_withdrawal_fee_bps == 0 || self.fees.max_withdrawal_fee_bps > 10_000 {
            bail!(
                "fees.max_withdrawal_fee_bps must be in 1..=10000, got {}",
                self.fees.max_withdrawal_fee_bps
            );
        }
        if self.oracle.price_timeout_secs == 0 {
            bail!("oracle.price_timeout_secs must be positive");
        }
        if self.events.channel_capacity == 0 {
            bail!("events.channel_capacity must be positive");
        }
        Ok(())
    }
}

fn env_u64(key: &str) -> Option<u64> {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(key, value = %raw, "ignoring non-numeric override");
                None
            }
        },
        Err(_) => None,
    }
}

/// Fee bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeBounds {
    /// Carousel deposit fee cap (basis points)
    #[serde(default = "default_max_deposit_fee_bps")]
    pub max_deposit_fee_bps: u16,

    /// Minimum relayer fee paid per rollover (wei)
    #[serde(default = "default_min_relayer_fee")]
    pub min_relayer_fee: u64,

    /// Epoch withdrawal fee cap (basis points)
    #[serde(default = "default_max_withdrawal_fee_bps")]
    pub max_withdrawal_fee_bps: u16,
}

fn default_max_deposit_fee_bps() -> u16 {
    250
}
fn default_min_relayer_fee() -> u64 {
    10_000
}
fn default_max_withdrawal_fee_bps() -> u16 {
    10_000
}

impl Default for FeeBounds {
    fn default() -> Self {
        Self {
            max_deposit_fee_bps: default_max_deposit_fee_bps(),
            min_relayer_fee: default_min_relayer_fee(),
            max_withdrawal_fee_bps: default_max_withdrawal_fee_bps(),
        }
    }
}

/// Oracle trust windows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleSettings {
    /// Seconds after the sequencer comes back up before prices are trusted
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,

    /// Maximum age of a price round (seconds)
    #[serde(default = "default_price_timeout_secs")]
    pub price_timeout_secs: u64,
}

fn default_grace_period_secs() -> u64 {
    3_600
}
fn default_price_timeout_secs() -> u64 {
    86_400
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period_secs(),
            price_timeout_secs: default_price_timeout_secs(),
        }
    }
}

/// Event delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSettings {
    /// Broadcast channel capacity
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Events kept in memory for `recent_events`
    #[serde(default = "default_recent_capacity")]
    pub recent_capacity: usize,

    /// SQLite journal path (disabled when unset)
    #[serde(default)]
    pub journal_path: Option<String>,
}

fn default_channel_capacity() -> usize {
    1_024
}
fn default_recent_capacity() -> usize {
    512
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            recent_capacity: default_recent_capacity(),
            journal_path: None,
        }
    }
}
