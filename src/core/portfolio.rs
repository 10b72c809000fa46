//! Caller supplied holdings and account metadata.

use crate::core::asset_class::AssetClass;
use crate::core::error::{EngineError, EngineResult};
use crate::core::market::normalize_ticker;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    #[default]
    Brokerage,
    #[serde(rename = "Roth IRA", alias = "RothIRA", alias = "roth_ira")]
    RothIra,
    #[serde(
        rename = "Traditional IRA",
        alias = "TraditionalIRA",
        alias = "traditional_ira"
    )]
    TraditionalIra,
}

impl Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                AccountType::Brokerage => "Brokerage",
                AccountType::RothIra => "Roth IRA",
                AccountType::TraditionalIra => "Traditional IRA",
            }
        )
    }
}

fn default_name() -> String {
    "Current".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    #[serde(default = "default_name")]
    pub name: String,
    /// Dollar value per ticker.
    pub holdings: BTreeMap<String, f64>,
    #[serde(default)]
    pub advisory_fee: f64,
    #[serde(default)]
    pub account_type: AccountType,
    /// Contribution (positive) or withdrawal (negative) per year.
    #[serde(default)]
    pub annual_cash_flow: f64,
    #[serde(default)]
    pub asset_class_overrides: HashMap<String, AssetClass>,
    /// Falls back to the configured default tax rate when absent.
    #[serde(default)]
    pub tax_rate: Option<f64>,
}

impl Portfolio {
    pub fn new(name: &str, holdings: BTreeMap<String, f64>) -> Self {
        Self {
            name: name.to_string(),
            holdings,
            advisory_fee: 0.0,
            account_type: AccountType::Brokerage,
            annual_cash_flow: 0.0,
            asset_class_overrides: HashMap::new(),
            tax_rate: None,
        }
    }

    pub fn total_value(&self) -> f64 {
        self.holdings.values().sum()
    }

    pub fn tax_rate(&self) -> f64 {
        self.tax_rate.unwrap_or(0.0)
    }

    /// Weight of each holding, `value / total_value`.
    pub fn weights(&self) -> BTreeMap<String, f64> {
        let total = self.total_value();
        if total <= 0.0 {
            return BTreeMap::new();
        }
        self.holdings
            .iter()
            .map(|(ticker, value)| (ticker.clone(), value / total))
            .collect()
    }

    /// Copy with trimmed, upper-cased tickers. Holdings that collapse onto
    /// the same ticker are summed.
    pub fn normalized(&self) -> Self {
        let mut holdings = BTreeMap::new();
        for (ticker, value) in &self.holdings {
            *holdings.entry(normalize_ticker(ticker)).or_insert(0.0) += value;
        }
        let asset_class_overrides = self
            .asset_class_overrides
            .iter()
            .map(|(ticker, class)| (normalize_ticker(ticker), *class))
            .collect();
        Self {
            holdings,
            asset_class_overrides,
            ..self.clone()
        }
    }

    /// Rejects malformed portfolios before any computation runs.
    pub fn validate(&self) -> EngineResult<()> {
        if self.holdings.is_empty() {
            return Err(EngineError::InvalidInput(format!(
                "portfolio '{}' has no holdings",
                self.name
            )));
        }
        for (ticker, value) in &self.holdings {
            if ticker.trim().is_empty() {
                return Err(EngineError::InvalidInput("empty ticker symbol".to_string()));
            }
            if !value.is_finite() || *value < 0.0 {
                return Err(EngineError::InvalidInput(format!(
                    "holding {ticker} has invalid dollar value {value}"
                )));
            }
        }
        let total = self.total_value();
        if total <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "portfolio '{}' total value must be positive, got {total}",
                self.name
            )));
        }
        check_rate("advisory_fee", self.advisory_fee, false)?;
        check_rate("tax_rate", self.tax_rate(), true)?;
        if !self.annual_cash_flow.is_finite() {
            return Err(EngineError::InvalidInput(
                "annual_cash_flow must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Rates live in `[0, 1)`, or `[0, 1]` when `inclusive`.
pub fn check_rate(label: &str, rate: f64, inclusive: bool) -> EngineResult<()> {
    let in_range = rate.is_finite() && rate >= 0.0 && (rate < 1.0 || (inclusive && rate == 1.0));
    if in_range {
        Ok(())
    } else {
        Err(EngineError::InvalidInput(format!(
            "{label} out of range: {rate}"
        )))
    }
}

/// Unions holdings across portfolios by ticker, summing dollar values.
///
/// The advisory fee becomes the value-weighted mean of the inputs and
/// overrides are merged with later portfolios winning.
pub fn combine(portfolios: &[Portfolio], tax_rate: f64) -> EngineResult<Portfolio> {
    if portfolios.is_empty() {
        return Err(EngineError::InvalidInput(
            "at least one portfolio is required".to_string(),
        ));
    }

    let mut holdings = BTreeMap::new();
    let mut overrides = HashMap::new();
    for portfolio in portfolios.iter().map(Portfolio::normalized) {
        for (ticker, value) in &portfolio.holdings {
            *holdings.entry(ticker.clone()).or_insert(0.0) += value;
        }
        overrides.extend(portfolio.asset_class_overrides);
    }

    let total: f64 = holdings.values().sum();
    let advisory_fee = if total > 0.0 {
        portfolios
            .iter()
            .map(|p| (p.total_value() / total) * p.advisory_fee)
            .sum()
    } else {
        0.0
    };

    Ok(Portfolio {
        name: "Aggregate".to_string(),
        holdings,
        advisory_fee,
        account_type: AccountType::Brokerage,
        annual_cash_flow: portfolios.iter().map(|p| p.annual_cash_flow).sum(),
        asset_class_overrides: overrides,
        tax_rate: Some(tax_rate),
    })
}
