// Copyright 2026 P2P Sampler Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration loading and resolution.
//!
//! Precedence, lowest first: built-in defaults, a TOML file
//! (`--config`, else `./p2p-sampler.toml` if present), CLI flags.

use anyhow::{bail, Context, Result};
use p2p_listings::{ListingQuery, TradeDirection, DEFAULT_REFERENCE_AMOUNT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "p2p-sampler.toml";

const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                                  AppleWebKit/537.36 (KHTML, like Gecko) \
                                  Chrome/120.0.0.0 Safari/537.36";

/// Complete sampler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Root directory for logs, screenshots, and both stores.
    pub storage_root: PathBuf,
    /// Notional amount of the Binance fiat used in rate derivation.
    pub reference_amount: f64,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    pub bybit: BybitSettings,
    pub binance: BinanceSettings,
    pub browser: BrowserSettings,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("pb2b"),
            reference_amount: DEFAULT_REFERENCE_AMOUNT,
            log_level: "info".to_string(),
            bybit: BybitSettings::default(),
            binance: BinanceSettings::default(),
            browser: BrowserSettings::default(),
        }
    }
}

/// Browser-rendered source settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BybitSettings {
    pub base_url: String,
    pub token: String,
    pub fiat: String,
    pub direction: TradeDirection,
    pub max_attempts: u32,
    /// Bound on navigation and on waiting for the listings table.
    pub page_timeout_secs: u64,
    /// Pause between timed-out attempts.
    pub retry_delay_secs: u64,
    /// Row-count sampling interval while the table settles.
    pub settle_interval_ms: u64,
    /// Upper bound on settling.
    pub settle_max_ms: u64,
}

impl Default for BybitSettings {
    fn default() -> Self {
        Self {
            base_url: "https://www.bybit.com/fiat/trade/otc".to_string(),
            token: "USDT".to_string(),
            fiat: "NGN".to_string(),
            direction: TradeDirection::Buy,
            max_attempts: 10,
            page_timeout_secs: 30,
            retry_delay_secs: 5,
            settle_interval_ms: 1000,
            settle_max_ms: 5000,
        }
    }
}

impl BybitSettings {
    pub fn query(&self) -> ListingQuery {
        ListingQuery::new(&self.token, &self.fiat, self.direction)
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// JSON API source settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinanceSettings {
    pub endpoint: String,
    pub origin: String,
    pub token: String,
    pub fiat: String,
    pub direction: TradeDirection,
    pub rows: u32,
    pub merchant_check: bool,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for BinanceSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://p2p.binance.com/bapi/c2c/v2/friendly/c2c/adv/search".to_string(),
            origin: "https://p2p.binance.com".to_string(),
            token: "USDT".to_string(),
            fiat: "XAF".to_string(),
            direction: TradeDirection::Buy,
            rows: 4,
            merchant_check: true,
            max_retries: 3,
            backoff_base_ms: 1000,
            request_timeout_secs: 30,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36"
                .to_string(),
        }
    }
}

impl BinanceSettings {
    pub fn query(&self) -> ListingQuery {
        ListingQuery::new(&self.token, &self.fiat, self.direction)
    }
}

/// Headless browser launch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub chromium_path: Option<PathBuf>,
    pub window_width: u32,
    pub window_height: u32,
    pub user_agent: String,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            chromium_path: None,
            window_width: 1920,
            window_height: 1080,
            user_agent: DESKTOP_USER_AGENT.to_string(),
        }
    }
}

impl SamplerConfig {
    /// Load from an explicit file, else `./p2p-sampler.toml`, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                if local.exists() {
                    Self::from_file(local)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reject settings that would make a run meaningless.
    pub fn validate(&self) -> Result<()> {
        if !self.reference_amount.is_finite() || self.reference_amount <= 0.0 {
            bail!("reference_amount must be positive, got {}", self.reference_amount);
        }
        if self.bybit.max_attempts == 0 {
            bail!("bybit.max_attempts must be at least 1");
        }
        if self.binance.rows == 0 {
            bail!("binance.rows must be at least 1");
        }
        for (name, value) in [
            ("bybit.token", &self.bybit.token),
            ("bybit.fiat", &self.bybit.fiat),
            ("binance.token", &self.binance.token),
            ("binance.fiat", &self.binance.fiat),
        ] {
            if value.trim().is_empty() {
                bail!("{name} must not be empty");
            }
        }
        url::Url::parse(&self.bybit.base_url)
            .with_context(|| format!("bybit.base_url is not a URL: {}", self.bybit.base_url))?;
        url::Url::parse(&self.binance.endpoint)
            .with_context(|| format!("binance.endpoint is not a URL: {}", self.binance.endpoint))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = SamplerConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.bybit.fiat, "NGN");
        assert_eq!(cfg.binance.fiat, "XAF");
        assert_eq!(cfg.bybit.max_attempts, 10);
        assert_eq!(cfg.binance.rows, 4);
        assert_eq!(cfg.reference_amount, 1000.0);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg = SamplerConfig::from_toml(
            r#"
            storage_root = "/var/lib/p2p"
            reference_amount = 500.0

            [bybit]
            fiat = "KES"
            direction = "sell"

            [binance]
            rows = 10
            "#,
        )
        .unwrap();

        assert_eq!(cfg.storage_root, PathBuf::from("/var/lib/p2p"));
        assert_eq!(cfg.reference_amount, 500.0);
        assert_eq!(cfg.bybit.fiat, "KES");
        assert_eq!(cfg.bybit.direction, TradeDirection::Sell);
        assert_eq!(cfg.bybit.token, "USDT");
        assert_eq!(cfg.binance.rows, 10);
        assert!(cfg.browser.headless);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = SamplerConfig::default();
        cfg.reference_amount = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = SamplerConfig::default();
        cfg.bybit.max_attempts = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = SamplerConfig::default();
        cfg.binance.fiat = " ".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = SamplerConfig::default();
        cfg.binance.endpoint = "not a url".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sampler.toml");
        std::fs::write(&path, "log_level = \"debug\"\n").unwrap();
        let cfg = SamplerConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.log_level, "debug");

        assert!(SamplerConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
