use crate::application::pricing::PriceList;
use clap::Args;
use miette::Diagnostic;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Tunables for one engine instance.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub sweep_interval: Duration,
    pub payment_ttl: chrono::Duration,
    pub processing_duration: chrono::Duration,
    /// Upper bound on concurrent user-profile fetches during bulk reads.
    pub fetch_concurrency: usize,
    pub prices: PriceList,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            payment_ttl: chrono::Duration::minutes(10),
            processing_duration: chrono::Duration::minutes(25),
            fetch_concurrency: 16,
            prices: PriceList::default(),
        }
    }
}

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    #[diagnostic(code(config::zero_value))]
    Zero(&'static str),
    #[error("failed to read price list {path}")]
    #[diagnostic(code(config::prices), help("expected a JSON object with every price field"))]
    Prices {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Command-line knobs for [`EngineConfig`].
#[derive(Args, Debug, Clone)]
pub struct EngineSettings {
    /// Seconds between reconciliation sweeps.
    #[arg(long, default_value_t = 60)]
    pub sweep_interval_secs: u64,

    /// Minutes a new payment stays pending before it expires.
    #[arg(long, default_value_t = 10)]
    pub payment_ttl_mins: i64,

    /// Minutes an onsite basket occupies its machine.
    #[arg(long, default_value_t = 25)]
    pub processing_mins: i64,

    /// Maximum concurrent user-profile lookups per bulk read.
    #[arg(long, default_value_t = 16)]
    pub fetch_concurrency: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            payment_ttl_mins: 10,
            processing_mins: 25,
            fetch_concurrency: 16,
        }
    }
}

impl EngineSettings {
    pub fn into_config(self, prices: PriceList) -> Result<EngineConfig, ConfigError> {
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Zero("sweep interval"));
        }
        if self.payment_ttl_mins <= 0 {
            return Err(ConfigError::Zero("payment ttl"));
        }
        if self.processing_mins <= 0 {
            return Err(ConfigError::Zero("processing duration"));
        }
        if self.fetch_concurrency == 0 {
            return Err(ConfigError::Zero("fetch concurrency"));
        }
        Ok(EngineConfig {
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            payment_ttl: chrono::Duration::minutes(self.payment_ttl_mins),
            processing_duration: chrono::Duration::minutes(self.processing_mins),
            fetch_concurrency: self.fetch_concurrency,
            prices,
        })
    }
}

/// Reads a JSON price list from disk.
pub fn load_prices(path: &Path) -> Result<PriceList, ConfigError> {
    let wrap = |source: Box<dyn std::error::Error + Send + Sync>| ConfigError::Prices {
        path: path.display().to_string(),
        source,
    };
    let raw = std::fs::read_to_string(path).map_err(|e| wrap(Box::new(e)))?;
    serde_json::from_str(&raw).map_err(|e| wrap(Box::new(e)))
}
