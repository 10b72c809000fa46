//! Error taxonomy for the analytics engine.

use thiserror::Error;

/// Failures surfaced by the market data gateway.
///
/// Results from the gateway are shared between coalesced waiters, so the
/// error has to be cheap to clone.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Unknown ticker: {0}")]
    UnknownTicker(String),

    #[error("No data for {0} in requested range")]
    NoData(String),

    #[error("Market data unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid rate: {0}")]
    InvalidRate(f64),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unknown ticker: {0}")]
    UnknownTicker(String),

    #[error("No data: {0}")]
    NoData(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("External service unavailable, try again later: {0}")]
    ExternalUnavailable(String),
}

impl From<GatewayError> for EngineError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::UnknownTicker(t) => EngineError::UnknownTicker(t),
            GatewayError::NoData(t) => EngineError::NoData(t),
            GatewayError::Unavailable(msg) => EngineError::ExternalUnavailable(msg),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
