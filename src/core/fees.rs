//! Advisory fee arithmetic.
//!
//! Fees are modelled as a multiplicative drag deducted on every trading day.

use crate::core::error::{EngineError, EngineResult};

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Per-day multiplier for an annual fee rate, `(1 - rate)^(1/252)`.
pub fn daily_factor(annual_rate: f64) -> EngineResult<f64> {
    if !annual_rate.is_finite() || !(0.0..1.0).contains(&annual_rate) {
        return Err(EngineError::InvalidRate(annual_rate));
    }
    // ln_1p keeps precision for the small rates seen in practice.
    Ok(((-annual_rate).ln_1p() / TRADING_DAYS_PER_YEAR).exp())
}

/// Fraction of value removed over a full year of daily deductions.
pub fn annual_drag(annual_rate: f64) -> EngineResult<f64> {
    Ok(1.0 - daily_factor(annual_rate)?.powf(TRADING_DAYS_PER_YEAR))
}

/// Headline yearly cost, used for display and comparison only.
pub fn annual_fee_dollars(total_value: f64, annual_rate: f64) -> f64 {
    total_value * annual_rate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_rate_is_identity() {
        assert_eq!(daily_factor(0.0).unwrap(), 1.0);
        assert_eq!(annual_drag(0.0).unwrap(), 0.0);
    }

    #[test]
    fn test_daily_factor_strictly_decreasing() {
        let rates = [0.0001, 0.001, 0.0025, 0.01, 0.05, 0.1, 0.5, 0.9, 0.999];
        let factors: Vec<f64> = rates.iter().map(|r| daily_factor(*r).unwrap()).collect();
        assert!(factors.windows(2).all(|w| w[0] > w[1]));
        assert!(factors.iter().all(|f| *f > 0.0 && *f < 1.0));
    }

    #[test]
    fn test_annual_drag_matches_rate() {
        for rate in [0.001, 0.01, 0.1] {
            assert!((annual_drag(rate).unwrap() - rate).abs() < 1e-12);
        }
    }

    #[test]
    fn test_invalid_rates() {
        assert_eq!(daily_factor(1.0), Err(EngineError::InvalidRate(1.0)));
        assert!(daily_factor(-0.01).is_err());
        assert!(daily_factor(f64::NAN).is_err());
    }

    #[test]
    fn test_annual_fee_dollars() {
        assert_eq!(annual_fee_dollars(100_000.0, 0.01), 1000.0);
    }
}
