//! Market data abstractions and core types

use crate::core::error::GatewayError;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Current quote and instrument metadata for a ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub price: f64,
    pub name: Option<String>,
    /// Provider supplied hint used by the classifier, e.g. a fund category
    /// ("Foreign Large Blend") or an instrument type ("EQUITY").
    pub category_hint: Option<String>,
    pub dividend_yield: Option<f64>,
    pub expense_ratio: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub adjusted_close: f64,
}

#[async_trait]
pub trait MarketDataGateway: Send + Sync {
    async fn get_quote(&self, ticker: &str) -> Result<Quote, GatewayError>;

    /// Daily adjusted closes in `[start, end]`, ascending by date with one
    /// point per date.
    async fn get_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, GatewayError>;
}

/// Sorts by date, drops non-finite or non-positive closes and keeps the
/// last point seen for a repeated date.
pub fn normalize_history(mut points: Vec<PricePoint>) -> Vec<PricePoint> {
    points.retain(|p| p.adjusted_close.is_finite() && p.adjusted_close > 0.0);
    points.sort_by_key(|p| p.date);
    let mut normalized: Vec<PricePoint> = Vec::with_capacity(points.len());
    for point in points {
        match normalized.last_mut() {
            Some(last) if last.date == point.date => *last = point,
            _ => normalized.push(point),
        }
    }
    normalized
}

/// Upper-cases and trims a user supplied ticker.
pub fn normalize_ticker(ticker: &str) -> String {
    ticker.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(day: u32, close: f64) -> PricePoint {
        PricePoint {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            adjusted_close: close,
        }
    }

    #[test]
    fn test_normalize_history() {
        let raw = vec![
            point(3, 12.0),
            point(1, 10.0),
            point(2, f64::NAN),
            point(3, 12.5),
            point(4, 0.0),
        ];
        let normalized = normalize_history(raw);
        assert_eq!(normalized, vec![point(1, 10.0), point(3, 12.5)]);
    }

    #[test]
    fn test_normalize_ticker() {
        assert_eq!(normalize_ticker("  vti "), "VTI");
    }
}
