//! Realized return and risk statistics over a historical window.

use crate::core::error::{EngineError, EngineResult, GatewayError};
use crate::core::fees::{self, TRADING_DAYS_PER_YEAR};
use crate::core::market::{MarketDataGateway, PricePoint};
use chrono::NaiveDate;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Roughly two years of trading days.
pub const MIN_TRADING_DAYS: usize = 504;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub total_return: f64,
    pub annualized_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
}

/// Dates shared by every constituent; the authoritative analysis range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub trading_days: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPerformance {
    pub label: String,
    pub window: AnalysisWindow,
    /// Dates of the daily returns, one per cumulative value.
    pub dates: Vec<NaiveDate>,
    pub cumulative_with_fees: Vec<f64>,
    pub cumulative_without_fees: Vec<f64>,
    pub stats_with_fees: PerformanceStats,
    pub stats_without_fees: PerformanceStats,
    /// Price return of each constituent over the window.
    pub individual_returns: BTreeMap<String, f64>,
}

/// Portfolio level inputs for a historical run.
#[derive(Debug, Clone)]
pub struct HistoricalRequest {
    pub label: String,
    pub weights: BTreeMap<String, f64>,
    pub advisory_fee: f64,
    pub expense_ratios: HashMap<String, f64>,
    pub min_trading_days: usize,
}

/// Fetches every constituent's history concurrently and computes the
/// performance over the intersection of their dates.
pub async fn analyze_history(
    gateway: &dyn MarketDataGateway,
    request: &HistoricalRequest,
    start: NaiveDate,
    end: NaiveDate,
) -> EngineResult<HistoricalPerformance> {
    let tickers: Vec<&String> = request
        .weights
        .iter()
        .filter(|(_, w)| **w > 0.0)
        .map(|(t, _)| t)
        .collect();

    let fetches = tickers.iter().map(|ticker| async move {
        let result = gateway.get_history(ticker, start, end).await;
        ((*ticker).clone(), result)
    });

    let mut histories = BTreeMap::new();
    for (ticker, result) in join_all(fetches).await {
        match result {
            Ok(points) => {
                histories.insert(ticker, points);
            }
            Err(GatewayError::NoData(_)) => {
                return Err(EngineError::InsufficientData(format!(
                    "no price history for {ticker} between {start} and {end}"
                )));
            }
            Err(e) => return Err(e.into()),
        }
    }

    compute_performance(request, &histories)
}

pub fn compute_performance(
    request: &HistoricalRequest,
    histories: &BTreeMap<String, Vec<PricePoint>>,
) -> EngineResult<HistoricalPerformance> {
    let dates = intersect_dates(histories.values().map(Vec::as_slice));
    let min_days = request.min_trading_days.max(2);
    if dates.len() < min_days {
        return Err(EngineError::InsufficientData(format!(
            "{} shares {} trading days across constituents, need {}",
            request.label,
            dates.len(),
            min_days
        )));
    }
    let (Some(start), Some(end)) = (dates.first().copied(), dates.last().copied()) else {
        return Err(EngineError::InsufficientData(request.label.clone()));
    };
    for (ticker, points) in histories {
        if points.len() > dates.len() {
            debug!(
                ticker,
                available = points.len(),
                used = dates.len(),
                "Trimmed history to shared window"
            );
        }
    }

    let total_weight: f64 = histories
        .keys()
        .map(|t| request.weights.get(t).copied().unwrap_or(0.0))
        .sum();
    if total_weight <= 0.0 {
        return Err(EngineError::InvalidInput(format!(
            "{} has no weighted constituents",
            request.label
        )));
    }

    let mut gross_returns = vec![0.0; dates.len() - 1];
    let mut fee_multiplier = fees::daily_factor(request.advisory_fee)?;
    let mut individual_returns = BTreeMap::new();

    for (ticker, points) in histories {
        let weight = request.weights.get(ticker).copied().unwrap_or(0.0) / total_weight;
        let closes = align_closes(points, &dates);
        for (day, pair) in closes.windows(2).enumerate() {
            gross_returns[day] += weight * (pair[1] / pair[0] - 1.0);
        }
        if let (Some(first), Some(last)) = (closes.first(), closes.last()) {
            individual_returns.insert(ticker.clone(), last / first - 1.0);
        }
        if let Some(er) = request.expense_ratios.get(ticker).copied()
            && er > 0.0
        {
            match fees::daily_factor(er) {
                Ok(factor) => fee_multiplier *= factor.powf(weight),
                Err(_) => warn!(ticker, er, "Ignoring out of range expense ratio"),
            }
        }
    }

    let net_returns: Vec<f64> = gross_returns
        .iter()
        .map(|r| (1.0 + r) * fee_multiplier - 1.0)
        .collect();

    let cumulative_without_fees = cumulative_returns(&gross_returns);
    let cumulative_with_fees = cumulative_returns(&net_returns);

    Ok(HistoricalPerformance {
        label: request.label.clone(),
        window: AnalysisWindow {
            start,
            end,
            trading_days: dates.len(),
        },
        stats_with_fees: performance_stats(&net_returns, &cumulative_with_fees),
        stats_without_fees: performance_stats(&gross_returns, &cumulative_without_fees),
        dates: dates[1..].to_vec(),
        cumulative_with_fees,
        cumulative_without_fees,
        individual_returns,
    })
}

/// Dates present in every series. Each input must be sorted ascending.
pub fn intersect_dates<'a>(series: impl IntoIterator<Item = &'a [PricePoint]>) -> Vec<NaiveDate> {
    let mut series = series.into_iter();
    let Some(first) = series.next() else {
        return Vec::new();
    };
    let mut shared: Vec<NaiveDate> = first.iter().map(|p| p.date).collect();
    for points in series {
        let mut kept = Vec::with_capacity(shared.len().min(points.len()));
        let (mut i, mut j) = (0, 0);
        while i < shared.len() && j < points.len() {
            match shared[i].cmp(&points[j].date) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    kept.push(shared[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        shared = kept;
    }
    shared
}

/// Closes on `dates`, which must be a sorted subset of the series' dates.
fn align_closes(points: &[PricePoint], dates: &[NaiveDate]) -> Vec<f64> {
    let mut closes = Vec::with_capacity(dates.len());
    let mut j = 0;
    for date in dates {
        while j < points.len() && points[j].date < *date {
            j += 1;
        }
        if let Some(point) = points.get(j) {
            closes.push(point.adjusted_close);
        }
    }
    closes
}

/// Running product of `(1 + r)` minus one.
pub fn cumulative_returns(daily_returns: &[f64]) -> Vec<f64> {
    let mut wealth = 1.0;
    daily_returns
        .iter()
        .map(|r| {
            wealth *= 1.0 + r;
            wealth - 1.0
        })
        .collect()
}

pub fn performance_stats(daily_returns: &[f64], cumulative: &[f64]) -> PerformanceStats {
    let n = daily_returns.len();
    let total_return = cumulative.last().copied().unwrap_or(0.0);

    let annualized_return = match n {
        0 => 0.0,
        _ if total_return <= -1.0 => -1.0,
        _ => (1.0 + total_return).powf(TRADING_DAYS_PER_YEAR / n as f64) - 1.0,
    };

    let volatility = if n > 1 {
        let mean = daily_returns.iter().sum::<f64>() / n as f64;
        let variance =
            daily_returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        variance.sqrt() * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    let sharpe_ratio = if volatility > 0.0 && volatility.is_finite() {
        annualized_return / volatility
    } else {
        0.0
    };

    PerformanceStats {
        total_return,
        annualized_return,
        volatility,
        sharpe_ratio,
        max_drawdown: max_drawdown(cumulative),
    }
}

/// Worst `value / running_peak - 1` against $1 invested, in `[-1, 0]`.
pub fn max_drawdown(cumulative: &[f64]) -> f64 {
    let mut peak: f64 = 1.0;
    let mut worst: f64 = 0.0;
    for c in cumulative {
        let value = (1.0 + c).max(0.0);
        peak = peak.max(value);
        worst = worst.min(value / peak - 1.0);
    }
    worst.clamp(-1.0, 0.0)
}
