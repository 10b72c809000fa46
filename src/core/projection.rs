//! Forward projection of portfolio value with cash flows, taxes and fees.
//!
//! Each year runs the same sequence of steps, each feeding the next:
//! starting value, plus cash flow, plus growth, minus taxes, minus fees.
//! Growth is drawn per asset class from a normal distribution around the
//! configured expected return. The yearly portfolio rate is averaged over
//! `paths` seeded simulations and the steps run once on that mean rate, so
//! every reported row satisfies the step order on its own.

use crate::core::allocation::Allocation;
use crate::core::asset_class::AssetClass;
use crate::core::error::{EngineError, EngineResult};
use crate::core::fees;
use crate::core::portfolio::{AccountType, check_rate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassAssumption {
    pub expected_return: f64,
    pub volatility: f64,
}

impl ClassAssumption {
    pub const fn new(expected_return: f64, volatility: f64) -> Self {
        Self {
            expected_return,
            volatility,
        }
    }
}

/// Capital market assumptions per asset class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthAssumptions {
    pub us_equities: ClassAssumption,
    pub international_equities: ClassAssumption,
    pub core_fixed_income: ClassAssumption,
    pub alternatives: ClassAssumption,
}

impl Default for GrowthAssumptions {
    fn default() -> Self {
        Self {
            us_equities: ClassAssumption::new(0.07, 0.16),
            international_equities: ClassAssumption::new(0.065, 0.18),
            core_fixed_income: ClassAssumption::new(0.035, 0.05),
            alternatives: ClassAssumption::new(0.05, 0.15),
        }
    }
}

impl GrowthAssumptions {
    /// `None` for `Unknown`, which is projected with zero growth.
    pub fn for_class(&self, class: AssetClass) -> Option<ClassAssumption> {
        match class {
            AssetClass::UsEquities => Some(self.us_equities),
            AssetClass::InternationalEquities => Some(self.international_equities),
            AssetClass::CoreFixedIncome => Some(self.core_fixed_income),
            AssetClass::Alternatives => Some(self.alternatives),
            AssetClass::Unknown => None,
        }
    }

    pub fn weighted_expected_return(&self, allocation: &Allocation) -> f64 {
        AssetClass::AXES
            .iter()
            .filter_map(|class| {
                self.for_class(*class)
                    .map(|a| allocation.weight(*class) * a.expected_return)
            })
            .sum()
    }

    fn validate(&self) -> EngineResult<()> {
        for class in AssetClass::AXES {
            if let Some(a) = self.for_class(class)
                && (!a.expected_return.is_finite() || !a.volatility.is_finite() || a.volatility < 0.0)
            {
                return Err(EngineError::InvalidInput(format!(
                    "invalid growth assumption for {class}: {a:?}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloSettings {
    pub paths: usize,
    pub seed: u64,
}

impl Default for MonteCarloSettings {
    fn default() -> Self {
        Self {
            paths: 500,
            seed: 42,
        }
    }
}

/// Everything the projection needs about one account.
#[derive(Debug, Clone)]
pub struct ProjectionRequest {
    pub label: String,
    pub starting_value: f64,
    pub allocation: Allocation,
    pub annual_cash_flow: f64,
    pub account_type: AccountType,
    pub tax_rate: f64,
    /// Advisory fee plus fund expenses, as an annual rate.
    pub fee_rate: f64,
    pub years: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YearlyProjectionRow {
    pub year: u32,
    pub starting_value: f64,
    pub cash_flow: f64,
    pub growth: f64,
    pub taxes: f64,
    pub fees: f64,
    pub ending_value: f64,
    pub deferred_tax_liability: f64,
}

impl YearlyProjectionRow {
    fn accumulate(&mut self, other: &YearlyProjectionRow) {
        self.starting_value += other.starting_value;
        self.cash_flow += other.cash_flow;
        self.growth += other.growth;
        self.taxes += other.taxes;
        self.fees += other.fees;
        self.ending_value += other.ending_value;
        self.deferred_tax_liability += other.deferred_tax_liability;
    }

}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub label: String,
    pub account_type: Option<AccountType>,
    pub weighted_expected_return: f64,
    pub rows: Vec<YearlyProjectionRow>,
    pub final_value: f64,
    pub total_fees: f64,
    pub total_taxes: f64,
    pub total_cash_flows: f64,
    pub deferred_tax_liability: f64,
    pub paths: usize,
    pub seed: u64,
}

impl Projection {
    fn from_rows(
        label: String,
        account_type: Option<AccountType>,
        weighted_expected_return: f64,
        rows: Vec<YearlyProjectionRow>,
        settings: MonteCarloSettings,
    ) -> Self {
        let final_value = rows.last().map_or(0.0, |r| r.ending_value);
        let deferred_tax_liability = rows.last().map_or(0.0, |r| r.deferred_tax_liability);
        Self {
            label,
            account_type,
            weighted_expected_return,
            total_fees: rows.iter().map(|r| r.fees).sum(),
            total_taxes: rows.iter().map(|r| r.taxes).sum(),
            total_cash_flows: rows.iter().map(|r| r.cash_flow).sum(),
            final_value,
            deferred_tax_liability,
            rows,
            paths: settings.paths,
            seed: settings.seed,
        }
    }
}

pub fn project(
    request: &ProjectionRequest,
    assumptions: &GrowthAssumptions,
    settings: MonteCarloSettings,
) -> EngineResult<Projection> {
    if request.years == 0 {
        return Err(EngineError::InvalidInput(
            "projection years must be positive".to_string(),
        ));
    }
    if !request.starting_value.is_finite() || request.starting_value <= 0.0 {
        return Err(EngineError::InvalidInput(format!(
            "starting value must be positive, got {}",
            request.starting_value
        )));
    }
    if settings.paths == 0 {
        return Err(EngineError::InvalidInput(
            "monte carlo path count must be positive".to_string(),
        ));
    }
    if !request.annual_cash_flow.is_finite() {
        return Err(EngineError::InvalidInput(
            "annual cash flow must be finite".to_string(),
        ));
    }
    check_rate("tax_rate", request.tax_rate, true)?;
    assumptions.validate()?;
    let fee_drag = fees::annual_drag(request.fee_rate)?;

    let classes: Vec<(f64, ClassAssumption)> = AssetClass::AXES
        .iter()
        .filter_map(|class| {
            assumptions
                .for_class(*class)
                .map(|a| (request.allocation.weight(*class), a))
        })
        .collect();

    debug!(
        label = %request.label,
        paths = settings.paths,
        seed = settings.seed,
        "Running projection"
    );

    let mut mean_rates = vec![0.0; request.years as usize];
    for path in 0..settings.paths {
        let mut rng = StdRng::seed_from_u64(settings.seed.wrapping_add(path as u64));
        for rate in mean_rates.iter_mut() {
            *rate += sample_rate(&classes, &mut rng);
        }
    }
    let inv_paths = 1.0 / settings.paths as f64;
    mean_rates.iter_mut().for_each(|rate| *rate *= inv_paths);
    let rows = step_years(request, &mean_rates, fee_drag);

    Ok(Projection::from_rows(
        request.label.clone(),
        Some(request.account_type),
        assumptions.weighted_expected_return(&request.allocation),
        rows,
        settings,
    ))
}

/// Portfolio return for one simulated year.
///
/// One draw per asset class, always in axis order so the random stream
/// lines up across portfolios with the same seed.
fn sample_rate(classes: &[(f64, ClassAssumption)], rng: &mut StdRng) -> f64 {
    classes
        .iter()
        .map(|(weight, a)| {
            let z: f64 = rng.sample(StandardNormal);
            weight * (a.expected_return + a.volatility * z)
        })
        .sum()
}

fn step_years(request: &ProjectionRequest, rates: &[f64], fee_drag: f64) -> Vec<YearlyProjectionRow> {
    let mut rows = Vec::with_capacity(rates.len());
    let mut value = request.starting_value;
    let mut deferred_tax_liability = 0.0;

    for (year, rate) in (1..).zip(rates) {
        let starting_value = value;
        // A withdrawal can empty the account but not overdraw it.
        let cash_flow = request.annual_cash_flow.max(-starting_value);
        let after_cash_flow = starting_value + cash_flow;

        let growth = (after_cash_flow * rate).max(-after_cash_flow);

        let taxable_gain = growth.max(0.0) * request.tax_rate;
        let taxes = match request.account_type {
            AccountType::Brokerage => taxable_gain,
            AccountType::RothIra | AccountType::TraditionalIra => 0.0,
        };
        if request.account_type == AccountType::TraditionalIra {
            deferred_tax_liability += taxable_gain;
        }

        let after_taxes = after_cash_flow + growth - taxes;
        let fees = after_taxes * fee_drag;
        let ending_value = after_taxes - fees;

        rows.push(YearlyProjectionRow {
            year,
            starting_value,
            cash_flow,
            growth,
            taxes,
            fees,
            ending_value,
            deferred_tax_liability,
        });
        value = ending_value;
    }
    rows
}

/// Sums projections row by row, e.g. separately taxed accounts.
pub fn combine_projections(label: &str, projections: &[Projection]) -> Option<Projection> {
    let first = projections.first()?;
    let mut rows = first.rows.clone();
    for projection in &projections[1..] {
        for (total, row) in rows.iter_mut().zip(&projection.rows) {
            total.accumulate(row);
        }
    }

    let start_total: f64 = projections
        .iter()
        .filter_map(|p| p.rows.first().map(|r| r.starting_value))
        .sum();
    let weighted_expected_return = if start_total > 0.0 {
        projections
            .iter()
            .filter_map(|p| {
                p.rows
                    .first()
                    .map(|r| r.starting_value / start_total * p.weighted_expected_return)
            })
            .sum()
    } else {
        0.0
    };

    Some(Projection::from_rows(
        label.to_string(),
        None,
        weighted_expected_return,
        rows,
        MonteCarloSettings {
            paths: first.paths,
            seed: first.seed,
        },
    ))
}
