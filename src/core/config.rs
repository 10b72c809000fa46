use crate::core::catalog::DEFAULT_MODEL_FEE;
use crate::core::portfolio::{Portfolio, check_rate};
use crate::core::projection::{GrowthAssumptions, MonteCarloSettings};
use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

pub const DEFAULT_YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct YahooProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub yahoo: Option<YahooProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            yahoo: Some(YahooProviderConfig {
                base_url: DEFAULT_YAHOO_BASE_URL.to_string(),
            }),
        }
    }
}

impl ProvidersConfig {
    pub fn yahoo_base_url(&self) -> &str {
        self.yahoo
            .as_ref()
            .map_or(DEFAULT_YAHOO_BASE_URL, |p| &p.base_url)
    }
}

/// Engine settings, fixed for the lifetime of the process.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Standardized advisory fee charged by every model portfolio.
    pub model_fee: f64,
    pub lookback_years: u32,
    pub cache_ttl_secs: u64,
    pub projection_years: u32,
    pub monte_carlo: MonteCarloSettings,
    pub assumptions: GrowthAssumptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            model_fee: DEFAULT_MODEL_FEE,
            lookback_years: 10,
            cache_ttl_secs: 300,
            projection_years: 10,
            monte_carlo: MonteCarloSettings::default(),
            assumptions: GrowthAssumptions::default(),
        }
    }
}

impl EngineConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn validate(&self) -> Result<()> {
        check_rate("model_fee", self.model_fee, false)?;
        if self.lookback_years == 0 {
            bail!("engine.lookback_years must be positive");
        }
        if self.projection_years == 0 {
            bail!("engine.projection_years must be positive");
        }
        if self.monte_carlo.paths == 0 {
            bail!("engine.monte_carlo.paths must be positive");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub portfolios: Vec<Portfolio>,
    /// Default tax rate for portfolios that do not set their own.
    #[serde(default)]
    pub tax_rate: f64,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "foliofit", "foliofit")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_rate("tax_rate", self.tax_rate, true)?;
        self.engine.validate()
    }

    /// Configured portfolios with normalized tickers and the default tax
    /// rate filled in.
    pub fn resolved_portfolios(&self) -> Vec<Portfolio> {
        self.portfolios
            .iter()
            .map(|p| {
                let mut portfolio = p.normalized();
                portfolio.tax_rate.get_or_insert(self.tax_rate);
                portfolio
            })
            .collect()
    }

    pub fn portfolio(&self, name: Option<&str>) -> Result<Portfolio> {
        let portfolios = self.resolved_portfolios();
        let found = match name {
            Some(name) => portfolios
                .into_iter()
                .find(|p| p.name.eq_ignore_ascii_case(name.trim())),
            None => portfolios.into_iter().next(),
        };
        match (found, name) {
            (Some(portfolio), _) => Ok(portfolio),
            (None, Some(name)) => bail!("No portfolio named '{name}' in configuration"),
            (None, None) => bail!("No portfolios configured"),
        }
    }
}
