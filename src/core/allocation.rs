//! Asset class allocation vectors and best-fit model selection.

use crate::core::asset_class::AssetClass;
use crate::core::catalog::{ModelCatalog, ModelPortfolio};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    /// Weight of total value per asset class, `Unknown` included.
    pub by_class: BTreeMap<AssetClass, f64>,
    pub unknown_weight: f64,
}

impl Allocation {
    /// Builds an allocation from `(class, dollar value)` pairs.
    pub fn from_values(values: impl IntoIterator<Item = (AssetClass, f64)>) -> Self {
        let mut dollars: BTreeMap<AssetClass, f64> = BTreeMap::new();
        for (class, value) in values {
            *dollars.entry(class).or_insert(0.0) += value;
        }
        let total: f64 = dollars.values().sum();
        let by_class: BTreeMap<AssetClass, f64> = if total > 0.0 {
            dollars
                .into_iter()
                .map(|(class, value)| (class, value / total))
                .collect()
        } else {
            BTreeMap::new()
        };
        let unknown_weight = by_class.get(&AssetClass::Unknown).copied().unwrap_or(0.0);
        Self {
            by_class,
            unknown_weight,
        }
    }

    pub fn weight(&self, class: AssetClass) -> f64 {
        self.by_class.get(&class).copied().unwrap_or(0.0)
    }

    /// Four-axis vector; unknown value contributes to no axis.
    pub fn vector(&self) -> [f64; 4] {
        AssetClass::AXES.map(|class| self.weight(class))
    }
}

/// Cosine of the angle between two vectors, 0 when either has zero norm.
pub fn cosine_similarity(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMatch {
    pub model: ModelPortfolio,
    pub similarity: f64,
}

/// Picks the most similar model, preferring the lower risk rank on ties.
///
/// Returns `None` when nothing scores above zero, e.g. a portfolio made up
/// of unclassified tickers only.
pub fn best_match(allocation: &Allocation, catalog: &ModelCatalog) -> Option<ModelMatch> {
    let vector = allocation.vector();
    let mut best: Option<(&ModelPortfolio, f64)> = None;
    for model in catalog.all_models() {
        let score = cosine_similarity(&vector, &model.allocation_vector());
        let better = match best {
            None => true,
            Some((current, best_score)) => {
                score > best_score || (score == best_score && model.risk_rank < current.risk_rank)
            }
        };
        if better {
            best = Some((model, score));
        }
    }

    best.filter(|(_, score)| *score > 0.0)
        .map(|(model, similarity)| ModelMatch {
            model: model.clone(),
            similarity,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::RiskRank;

    #[test]
    fn test_cosine_similarity_edges() {
        let zero = [0.0; 4];
        let a = [1.0, 0.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&zero, &a), 0.0);
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-12);
        assert_eq!(cosine_similarity(&a, &[0.0, 1.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_similarity_invariant_to_scaling() {
        let small = Allocation::from_values([
            (AssetClass::UsEquities, 600.0),
            (AssetClass::CoreFixedIncome, 400.0),
        ]);
        let large = Allocation::from_values([
            (AssetClass::UsEquities, 6_000_000.0),
            (AssetClass::CoreFixedIncome, 4_000_000.0),
        ]);
        let catalog = ModelCatalog::standard();
        let a = best_match(&small, catalog).unwrap();
        let b = best_match(&large, catalog).unwrap();
        assert_eq!(a.model.name, b.model.name);
        assert!((a.similarity - b.similarity).abs() < 1e-12);
    }

    #[test]
    fn test_exact_model_allocation_matches_itself() {
        let catalog = ModelCatalog::standard();
        for model in catalog.all_models() {
            let allocation = Allocation::from_values(
                model
                    .allocation
                    .iter()
                    .map(|(class, weight)| (*class, weight * 1000.0)),
            );
            let found = best_match(&allocation, catalog).unwrap();
            assert_eq!(found.model.name, model.name);
            assert!((found.similarity - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_deterministic_repeat() {
        let allocation = Allocation::from_values([
            (AssetClass::UsEquities, 1.0),
            (AssetClass::InternationalEquities, 1.0),
            (AssetClass::Unknown, 3.0),
        ]);
        let catalog = ModelCatalog::standard();
        let first = best_match(&allocation, catalog).unwrap();
        for _ in 0..10 {
            assert_eq!(best_match(&allocation, catalog).unwrap(), first);
        }
        assert!((allocation.unknown_weight - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_all_unknown_has_no_match() {
        let allocation = Allocation::from_values([(AssetClass::Unknown, 100.0)]);
        assert!(best_match(&allocation, ModelCatalog::standard()).is_none());
    }

    #[test]
    fn test_all_equity_prefers_aggressive() {
        let allocation = Allocation::from_values([(AssetClass::UsEquities, 100.0)]);
        let found = best_match(&allocation, ModelCatalog::standard()).unwrap();
        assert_eq!(found.model.risk_rank, RiskRank::Aggressive);
    }
}
