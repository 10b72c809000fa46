use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum AssetClass {
    #[serde(rename = "US Equities", alias = "us_equities")]
    UsEquities,
    #[serde(rename = "International Equities", alias = "international_equities")]
    InternationalEquities,
    #[serde(rename = "Core Fixed Income", alias = "core_fixed_income")]
    CoreFixedIncome,
    #[serde(rename = "Alternatives", alias = "alternatives")]
    Alternatives,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl AssetClass {
    /// Classes that span the allocation vector, in axis order.
    pub const AXES: [AssetClass; 4] = [
        AssetClass::UsEquities,
        AssetClass::InternationalEquities,
        AssetClass::CoreFixedIncome,
        AssetClass::Alternatives,
    ];

    /// Position on the allocation vector, `None` for `Unknown`.
    pub fn axis(&self) -> Option<usize> {
        Self::AXES.iter().position(|c| c == self)
    }

    pub fn name(&self) -> &'static str {
        match self {
            AssetClass::UsEquities => "US Equities",
            AssetClass::InternationalEquities => "International Equities",
            AssetClass::CoreFixedIncome => "Core Fixed Income",
            AssetClass::Alternatives => "Alternatives",
            AssetClass::Unknown => "Unknown",
        }
    }
}

impl Display for AssetClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for AssetClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "us equities" | "us equity" | "us" | "domestic equity" => Ok(AssetClass::UsEquities),
            "international equities" | "international equity" | "intl" | "international" => {
                Ok(AssetClass::InternationalEquities)
            }
            "core fixed income" | "fixed income" | "bonds" | "bond" | "debt" => {
                Ok(AssetClass::CoreFixedIncome)
            }
            "alternatives" | "alternative" | "alts" => Ok(AssetClass::Alternatives),
            "unknown" => Ok(AssetClass::Unknown),
            _ => Err(anyhow::anyhow!("Invalid asset class: {}", s)),
        }
    }
}
