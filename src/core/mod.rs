//! Core business logic abstractions

pub mod allocation;
pub mod analysis;
pub mod asset_class;
pub mod cache;
pub mod catalog;
pub mod classifier;
pub mod config;
pub mod error;
pub mod fees;
pub mod log;
pub mod market;
pub mod performance;
pub mod portfolio;
pub mod projection;

// Re-export main types for cleaner imports
pub use analysis::{AnalysisEngine, AnalysisResponse, TickerValidation};
pub use asset_class::AssetClass;
pub use error::{EngineError, EngineResult, GatewayError};
pub use market::{MarketDataGateway, PricePoint, Quote};
pub use portfolio::{AccountType, Portfolio};
