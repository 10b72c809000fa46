//! Ticker to asset class resolution.
//!
//! Resolution runs an ordered chain of rules and stops at the first rule
//! that returns a class: per-portfolio overrides, a table of well-known
//! funds, then heuristics on the provider's category hint. Anything left
//! over resolves to [`AssetClass::Unknown`].

use crate::core::asset_class::AssetClass;
use crate::core::market::Quote;
use std::collections::HashMap;
use tracing::debug;

/// Inputs visible to every rule in the chain.
pub struct ClassificationContext<'a> {
    pub ticker: &'a str,
    pub quote: Option<&'a Quote>,
    pub overrides: &'a HashMap<String, AssetClass>,
}

pub trait ClassificationRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` passes the ticker to the next rule.
    fn classify(&self, ctx: &ClassificationContext<'_>) -> Option<AssetClass>;
}

pub struct OverrideRule;

impl ClassificationRule for OverrideRule {
    fn name(&self) -> &'static str {
        "override"
    }

    fn classify(&self, ctx: &ClassificationContext<'_>) -> Option<AssetClass> {
        ctx.overrides.get(ctx.ticker).copied()
    }
}

pub struct KnownTickerRule {
    table: HashMap<&'static str, AssetClass>,
}

impl KnownTickerRule {
    pub fn new() -> Self {
        let mut table = HashMap::new();
        for t in [
            "VTI", "VOO", "SPY", "IVV", "ITOT", "SCHB", "SCHX", "QQQ", "VUG", "VTV", "IWM", "VB",
            "VO", "IJH", "IJR", "RSP", "DIA", "VV", "SPLG",
        ] {
            table.insert(t, AssetClass::UsEquities);
        }
        for t in [
            "VXUS", "VEA", "VWO", "IXUS", "EFA", "IEFA", "IEMG", "EEM", "SCHF", "SCHE", "VEU",
            "ACWX", "VGK", "VPL", "SPDW",
        ] {
            table.insert(t, AssetClass::InternationalEquities);
        }
        for t in [
            "BND", "AGG", "BNDX", "SCHZ", "TLT", "IEF", "SHY", "VGIT", "VGSH", "VGLT", "BSV",
            "BIV", "BLV", "TIP", "VTIP", "MUB", "LQD", "IUSB", "SGOV", "BIL",
        ] {
            table.insert(t, AssetClass::CoreFixedIncome);
        }
        for t in [
            "VNQ", "VNQI", "REET", "SCHH", "GLD", "IAU", "SLV", "GLDM", "DBC", "PDBC", "GSG",
            "DBMF", "KMLM", "IBIT",
        ] {
            table.insert(t, AssetClass::Alternatives);
        }
        Self { table }
    }
}

impl Default for KnownTickerRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassificationRule for KnownTickerRule {
    fn name(&self) -> &'static str {
        "known_ticker"
    }

    fn classify(&self, ctx: &ClassificationContext<'_>) -> Option<AssetClass> {
        self.table.get(ctx.ticker).copied()
    }
}

/// Keyword heuristics over fund categories and instrument types.
pub struct CategoryHintRule;

const ALTERNATIVE_KEYWORDS: &[&str] = &[
    "real estate",
    "reit",
    "commodit",
    "gold",
    "precious metal",
    "alternative",
    "managed futures",
    "trading",
    "digital asset",
    "cryptocurrency",
];
const FIXED_INCOME_KEYWORDS: &[&str] = &[
    "bond",
    "treasury",
    "government",
    "muni",
    "income",
    "credit",
    "inflation",
    "ultrashort",
    "money market",
];
const INTERNATIONAL_KEYWORDS: &[&str] = &[
    "foreign",
    "international",
    "world",
    "global",
    "emerging",
    "europe",
    "pacific",
    "japan",
    "china",
    "india",
    "latin america",
    "diversified markets",
];
const US_EQUITY_KEYWORDS: &[&str] = &[
    "large blend",
    "large growth",
    "large value",
    "mid-cap",
    "mid cap",
    "small blend",
    "small growth",
    "small value",
    "technology",
    "health",
    "financial",
    "industrials",
    "utilities",
    "consumer",
    "communications",
    "energy",
];

impl ClassificationRule for CategoryHintRule {
    fn name(&self) -> &'static str {
        "category_hint"
    }

    fn classify(&self, ctx: &ClassificationContext<'_>) -> Option<AssetClass> {
        let hint = ctx.quote?.category_hint.as_deref()?.to_lowercase();
        let matches = |keywords: &[&str]| keywords.iter().any(|k| hint.contains(k));

        if matches(ALTERNATIVE_KEYWORDS) {
            Some(AssetClass::Alternatives)
        } else if matches(FIXED_INCOME_KEYWORDS) {
            Some(AssetClass::CoreFixedIncome)
        } else if matches(INTERNATIONAL_KEYWORDS) {
            Some(AssetClass::InternationalEquities)
        } else if matches(US_EQUITY_KEYWORDS) || hint == "equity" {
            // A bare "EQUITY" instrument type is an individual listed stock.
            Some(AssetClass::UsEquities)
        } else {
            None
        }
    }
}

pub struct AssetClassifier {
    rules: Vec<Box<dyn ClassificationRule>>,
}

impl AssetClassifier {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(OverrideRule),
                Box::new(KnownTickerRule::new()),
                Box::new(CategoryHintRule),
            ],
        }
    }

    /// Never fails: unresolved tickers degrade to `Unknown`.
    pub fn classify(
        &self,
        ticker: &str,
        quote: Option<&Quote>,
        overrides: &HashMap<String, AssetClass>,
    ) -> AssetClass {
        let ctx = ClassificationContext {
            ticker,
            quote,
            overrides,
        };
        for rule in &self.rules {
            if let Some(class) = rule.classify(&ctx) {
                debug!(ticker, rule = rule.name(), %class, "Classified ticker");
                return class;
            }
        }
        debug!(ticker, "No rule matched, classifying as Unknown");
        AssetClass::Unknown
    }
}

impl Default for AssetClassifier {
    fn default() -> Self {
        Self::new()
    }
}
