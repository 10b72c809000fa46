//! Registry of the model portfolios recommendations are drawn from.

use crate::core::asset_class::AssetClass;
use crate::core::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::LazyLock;

pub const DEFAULT_MODEL_FEE: f64 = 0.0025;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum RiskRank {
    Conservative,
    ModeratelyConservative,
    Moderate,
    ModeratelyAggressive,
    Aggressive,
}

impl Display for RiskRank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                RiskRank::Conservative => "Conservative",
                RiskRank::ModeratelyConservative => "Moderately Conservative",
                RiskRank::Moderate => "Moderate",
                RiskRank::ModeratelyAggressive => "Moderately Aggressive",
                RiskRank::Aggressive => "Aggressive",
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPortfolio {
    pub name: String,
    pub risk_rank: RiskRank,
    /// Target weight per asset class, summing to 1.
    pub allocation: BTreeMap<AssetClass, f64>,
    pub advisory_fee: f64,
    /// Fund held for each asset class.
    pub constituents: BTreeMap<AssetClass, String>,
}

impl ModelPortfolio {
    pub fn allocation_vector(&self) -> [f64; 4] {
        AssetClass::AXES.map(|class| self.allocation.get(&class).copied().unwrap_or(0.0))
    }

    /// Target weight per constituent ticker, skipping empty sleeves.
    pub fn ticker_weights(&self) -> Vec<(String, AssetClass, f64)> {
        AssetClass::AXES
            .iter()
            .filter_map(|class| {
                let weight = self.allocation.get(class).copied().unwrap_or(0.0);
                let ticker = self.constituents.get(class)?;
                (weight > 0.0).then(|| (ticker.clone(), *class, weight))
            })
            .collect()
    }
}

/// Immutable, ordered from the least to the most aggressive model.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: Vec<ModelPortfolio>,
}

const MODEL_TABLE: [(RiskRank, [f64; 4]); 5] = [
    (RiskRank::Conservative, [0.20, 0.10, 0.65, 0.05]),
    (RiskRank::ModeratelyConservative, [0.30, 0.15, 0.50, 0.05]),
    (RiskRank::Moderate, [0.40, 0.20, 0.35, 0.05]),
    (RiskRank::ModeratelyAggressive, [0.50, 0.25, 0.20, 0.05]),
    (RiskRank::Aggressive, [0.60, 0.30, 0.05, 0.05]),
];

const CONSTITUENTS: [&str; 4] = ["VTI", "VXUS", "BND", "VNQ"];

static STANDARD: LazyLock<ModelCatalog> = LazyLock::new(|| ModelCatalog::new(DEFAULT_MODEL_FEE));

impl ModelCatalog {
    pub fn new(model_fee: f64) -> Self {
        let models = MODEL_TABLE
            .iter()
            .map(|(rank, weights)| ModelPortfolio {
                name: rank.to_string(),
                risk_rank: *rank,
                allocation: AssetClass::AXES.iter().copied().zip(*weights).collect(),
                advisory_fee: model_fee,
                constituents: AssetClass::AXES
                    .iter()
                    .copied()
                    .zip(CONSTITUENTS.map(String::from))
                    .collect(),
            })
            .collect();
        Self { models }
    }

    /// Catalog with the default standardized model fee.
    pub fn standard() -> &'static ModelCatalog {
        &STANDARD
    }

    pub fn all_models(&self) -> &[ModelPortfolio] {
        &self.models
    }

    pub fn by_name(&self, name: &str) -> EngineResult<&ModelPortfolio> {
        self.models
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| EngineError::NotFound(format!("model portfolio '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_order_and_weights() {
        let catalog = ModelCatalog::standard();
        let models = catalog.all_models();
        assert_eq!(models.len(), 5);
        assert!(models.windows(2).all(|w| w[0].risk_rank < w[1].risk_rank));
        for model in models {
            let sum: f64 = model.allocation.values().sum();
            assert!((sum - 1.0).abs() < 1e-9, "{} sums to {sum}", model.name);
            assert_eq!(model.advisory_fee, DEFAULT_MODEL_FEE);
        }
    }

    #[test]
    fn test_by_name() {
        let catalog = ModelCatalog::new(0.005);
        let model = catalog.by_name("moderate").unwrap();
        assert_eq!(model.risk_rank, RiskRank::Moderate);
        assert_eq!(model.advisory_fee, 0.005);
        assert_eq!(model.ticker_weights().len(), 4);

        let err = catalog.by_name("Reckless").unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
