pub mod cli;
pub mod core;
pub mod providers;

pub use crate::core::config;

use crate::core::analysis::AnalysisEngine;
use crate::providers::{CachingGateway, YahooFinanceGateway};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

/// Commands that need a loaded configuration.
#[derive(Debug, Clone)]
pub enum AppCommand {
    Validate { tickers: Vec<String> },
    Models,
    Analyze { portfolio: Option<String> },
    Aggregate,
}

/// Builds the engine on top of the configured gateway, behind the shared
/// request coalescing cache.
pub fn build_engine(config: &config::AppConfig) -> Result<AnalysisEngine> {
    let base_url = config.providers.yahoo_base_url();
    debug!(base_url, "Using Yahoo Finance gateway");
    let gateway = YahooFinanceGateway::new(base_url)?;
    let gateway = CachingGateway::new(gateway, config.engine.cache_ttl());
    Ok(AnalysisEngine::new(Arc::new(gateway), config.engine.clone()))
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>, json: bool) -> Result<()> {
    info!("foliofit starting...");

    let config = match config_path {
        Some(path) => config::AppConfig::load_from_path(path)?,
        None => config::AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let engine = build_engine(&config)?;

    match command {
        AppCommand::Validate { tickers } => cli::validate::run(&engine, &tickers, json).await,
        AppCommand::Models => cli::models::run(engine.list_models(), json),
        AppCommand::Analyze { portfolio } => {
            let portfolio = config.portfolio(portfolio.as_deref())?;
            cli::analyze::run(&engine, &portfolio, json).await
        }
        AppCommand::Aggregate => {
            let portfolios = config.resolved_portfolios();
            if portfolios.is_empty() {
                anyhow::bail!("No portfolios configured");
            }
            cli::analyze::run_aggregate(&engine, &portfolios, config.tax_rate, json).await
        }
    }
}
