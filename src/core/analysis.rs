//! Request level orchestration: resolves holdings through the gateway and
//! runs the matcher, projection and historical engines for one response.

use crate::core::allocation::{Allocation, best_match};
use crate::core::asset_class::AssetClass;
use crate::core::catalog::{ModelCatalog, ModelPortfolio};
use crate::core::classifier::AssetClassifier;
use crate::core::config::EngineConfig;
use crate::core::error::{EngineError, EngineResult, GatewayError};
use crate::core::fees::annual_fee_dollars;
use crate::core::market::{MarketDataGateway, Quote, normalize_ticker};
use crate::core::performance::{
    HistoricalPerformance, HistoricalRequest, MIN_TRADING_DAYS, analyze_history,
};
use crate::core::portfolio::{Portfolio, check_rate, combine};
use crate::core::projection::{Projection, ProjectionRequest, combine_projections, project};
use chrono::{Months, NaiveDate, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerValidation {
    pub ticker: String,
    pub valid: bool,
    pub resolved_name: Option<String>,
    pub asset_class: Option<AssetClass>,
    pub price: Option<f64>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingDetail {
    pub ticker: String,
    pub name: Option<String>,
    pub asset_class: AssetClass,
    pub value: f64,
    pub weight: f64,
    pub expense_ratio: Option<f64>,
    pub dividend_yield: Option<f64>,
    /// Gateway failure for this ticker. The value still counts towards the
    /// total but the holding is unclassified unless overridden.
    pub degraded: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projections {
    pub current: Projection,
    pub model: Option<Projection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalComparison {
    pub current: HistoricalPerformance,
    pub model: Option<HistoricalPerformance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeAnalysis {
    pub current_advisory_fee: f64,
    pub current_expense_ratio: f64,
    pub current_annual_fee: f64,
    pub current_total_fees: f64,
    pub model_advisory_fee: Option<f64>,
    pub model_expense_ratio: Option<f64>,
    pub model_annual_fee: Option<f64>,
    pub model_total_fees: Option<f64>,
    pub annual_savings: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub portfolio: String,
    pub total_value: f64,
    pub current_allocation: Allocation,
    pub holdings: Vec<HoldingDetail>,
    /// `None` when no model scores above zero.
    pub matched_model: Option<ModelPortfolio>,
    pub similarity: f64,
    /// Matched model scaled to the current total value, dollars per ticker.
    pub model_holdings: BTreeMap<String, f64>,
    pub projections: Projections,
    pub historical_performance: HistoricalComparison,
    pub fee_analysis: FeeAnalysis,
}

impl AnalysisResponse {
    pub fn degraded(&self) -> impl Iterator<Item = &HoldingDetail> {
        self.holdings.iter().filter(|h| h.degraded.is_some())
    }
}

/// Quotes and classes for every ticker of a portfolio.
struct ResolvedHoldings {
    details: Vec<HoldingDetail>,
    classes: HashMap<String, AssetClass>,
    expense_ratios: HashMap<String, f64>,
}

impl ResolvedHoldings {
    fn allocation_of(&self, portfolio: &Portfolio) -> Allocation {
        Allocation::from_values(portfolio.holdings.iter().map(|(ticker, value)| {
            let class = self
                .classes
                .get(ticker)
                .copied()
                .unwrap_or(AssetClass::Unknown);
            (class, *value)
        }))
    }

    /// Value-weighted fund expense ratio; missing data counts as zero.
    fn expense_ratio_of(&self, portfolio: &Portfolio) -> f64 {
        portfolio
            .weights()
            .iter()
            .map(|(ticker, weight)| weight * self.expense_ratios.get(ticker).copied().unwrap_or(0.0))
            .sum()
    }
}

pub struct AnalysisEngine {
    gateway: Arc<dyn MarketDataGateway>,
    catalog: ModelCatalog,
    classifier: AssetClassifier,
    settings: EngineConfig,
    as_of: Option<NaiveDate>,
}

impl AnalysisEngine {
    pub fn new(gateway: Arc<dyn MarketDataGateway>, settings: EngineConfig) -> Self {
        Self {
            gateway,
            catalog: ModelCatalog::new(settings.model_fee),
            classifier: AssetClassifier::new(),
            settings,
            as_of: None,
        }
    }

    /// Pins the end of the historical window instead of using today.
    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn list_models(&self) -> &[ModelPortfolio] {
        self.catalog.all_models()
    }

    pub fn model(&self, name: &str) -> EngineResult<&ModelPortfolio> {
        self.catalog.by_name(name)
    }

    pub async fn validate_ticker(&self, ticker: &str) -> EngineResult<TickerValidation> {
        let ticker = normalize_ticker(ticker);
        if ticker.is_empty() {
            return Err(EngineError::InvalidInput("empty ticker symbol".to_string()));
        }

        match self.gateway.get_quote(&ticker).await {
            Ok(quote) => {
                let asset_class = self.classifier.classify(&ticker, Some(&quote), &HashMap::new());
                Ok(TickerValidation {
                    valid: true,
                    resolved_name: quote.name,
                    asset_class: Some(asset_class),
                    price: Some(quote.price),
                    reason: None,
                    ticker,
                })
            }
            Err(GatewayError::Unavailable(msg)) => Err(EngineError::ExternalUnavailable(msg)),
            Err(e) => {
                debug!(%ticker, error = %e, "Ticker did not validate");
                Ok(TickerValidation {
                    valid: false,
                    resolved_name: None,
                    asset_class: None,
                    price: None,
                    reason: Some(e.to_string()),
                    ticker,
                })
            }
        }
    }

    /// Validates every ticker concurrently, in input order.
    pub async fn validate_tickers(&self, tickers: &[String]) -> EngineResult<Vec<TickerValidation>> {
        if tickers.is_empty() {
            return Err(EngineError::InvalidInput("no tickers to validate".to_string()));
        }
        join_all(tickers.iter().map(|ticker| self.validate_ticker(ticker)))
            .await
            .into_iter()
            .collect()
    }

    pub async fn analyze(&self, portfolio: &Portfolio) -> EngineResult<AnalysisResponse> {
        let portfolio = portfolio.normalized();
        portfolio.validate()?;
        info!(portfolio = %portfolio.name, "Analyzing portfolio");
        self.run(&portfolio, std::slice::from_ref(&portfolio)).await
    }

    /// Unions holdings by ticker before matching and historical analysis,
    /// while every account is projected with its own tax treatment. Accounts
    /// holding nothing are skipped; only an empty union is rejected.
    pub async fn analyze_aggregate(
        &self,
        portfolios: &[Portfolio],
        tax_rate: f64,
    ) -> EngineResult<AnalysisResponse> {
        check_rate("tax_rate", tax_rate, true)?;
        let mut accounts = Vec::with_capacity(portfolios.len());
        for portfolio in portfolios {
            // Accounts without any value take no part in the aggregate.
            if portfolio.holdings.values().all(|value| *value == 0.0) {
                debug!(portfolio = %portfolio.name, "Skipping empty account");
                continue;
            }
            accounts.push(Portfolio {
                tax_rate: Some(tax_rate),
                ..portfolio.normalized()
            });
        }
        for account in &accounts {
            account.validate()?;
        }
        let combined = combine(&accounts, tax_rate)?;
        combined.validate()?;
        info!(accounts = accounts.len(), "Analyzing aggregate portfolio");
        self.run(&combined, &accounts).await
    }

    async fn run(&self, combined: &Portfolio, accounts: &[Portfolio]) -> EngineResult<AnalysisResponse> {
        let total_value = combined.total_value();
        let resolved = self.resolve_holdings(combined).await?;
        let allocation = resolved.allocation_of(combined);
        let current_expense_ratio = resolved.expense_ratio_of(combined);

        let matched = best_match(&allocation, &self.catalog);
        match &matched {
            Some(m) => info!(model = %m.model.name, similarity = m.similarity, "Matched model"),
            None => warn!(portfolio = %combined.name, "No model matches the allocation"),
        }

        let current_projection = self.project_accounts(combined, accounts, &resolved)?;

        let (end, start) = self.history_window();
        let current_history = HistoricalRequest {
            label: combined.name.clone(),
            weights: combined.weights(),
            advisory_fee: combined.advisory_fee,
            expense_ratios: resolved.expense_ratios.clone(),
            min_trading_days: MIN_TRADING_DAYS,
        };

        let Some(matched) = matched else {
            let current = analyze_history(self.gateway.as_ref(), &current_history, start, end).await?;
            let fee_analysis = fee_analysis(
                combined,
                current_expense_ratio,
                &current_projection,
                None,
            );
            return Ok(AnalysisResponse {
                portfolio: combined.name.clone(),
                total_value,
                current_allocation: allocation,
                holdings: resolved.details,
                matched_model: None,
                similarity: 0.0,
                model_holdings: BTreeMap::new(),
                projections: Projections {
                    current: current_projection,
                    model: None,
                },
                historical_performance: HistoricalComparison {
                    current,
                    model: None,
                },
                fee_analysis,
            });
        };

        let model = matched.model;
        let model_holdings: BTreeMap<String, f64> = model
            .ticker_weights()
            .into_iter()
            .map(|(ticker, _, weight)| (ticker, weight * total_value))
            .collect();
        let model_portfolio = Portfolio {
            name: model.name.clone(),
            holdings: model_holdings.clone(),
            advisory_fee: model.advisory_fee,
            account_type: combined.account_type,
            annual_cash_flow: combined.annual_cash_flow,
            asset_class_overrides: HashMap::new(),
            tax_rate: combined.tax_rate,
        };
        let model_expense_ratios = self.model_expense_ratios(&model).await?;
        let model_expense_ratio: f64 = model_portfolio
            .weights()
            .iter()
            .map(|(t, w)| w * model_expense_ratios.get(t).copied().unwrap_or(0.0))
            .sum();

        let model_allocation = Allocation::from_values(
            model
                .ticker_weights()
                .into_iter()
                .map(|(_, class, weight)| (class, weight * total_value)),
        );
        let model_projection =
            self.project_one(&model_portfolio, model_allocation, model_expense_ratio)?;

        let model_history = HistoricalRequest {
            label: model.name.clone(),
            weights: model_portfolio.weights(),
            advisory_fee: model.advisory_fee,
            expense_ratios: model_expense_ratios,
            min_trading_days: MIN_TRADING_DAYS,
        };
        let (current, model_performance) = tokio::join!(
            analyze_history(self.gateway.as_ref(), &current_history, start, end),
            analyze_history(self.gateway.as_ref(), &model_history, start, end),
        );

        let fee_analysis = fee_analysis(
            combined,
            current_expense_ratio,
            &current_projection,
            Some((&model_portfolio, model_expense_ratio, &model_projection)),
        );

        Ok(AnalysisResponse {
            portfolio: combined.name.clone(),
            total_value,
            current_allocation: allocation,
            holdings: resolved.details,
            matched_model: Some(model),
            similarity: matched.similarity,
            model_holdings,
            projections: Projections {
                current: current_projection,
                model: Some(model_projection),
            },
            historical_performance: HistoricalComparison {
                current: current?,
                model: Some(model_performance?),
            },
            fee_analysis,
        })
    }

    /// Quotes every holding concurrently. Unresolvable tickers are kept as
    /// degraded holdings; an unavailable gateway fails the request.
    async fn resolve_holdings(&self, portfolio: &Portfolio) -> EngineResult<ResolvedHoldings> {
        let fetches = portfolio.holdings.keys().map(|ticker| async move {
            (ticker, self.gateway.get_quote(ticker).await)
        });
        let quotes = join_all(fetches).await;

        let weights = portfolio.weights();
        let mut resolved = ResolvedHoldings {
            details: Vec::with_capacity(quotes.len()),
            classes: HashMap::new(),
            expense_ratios: HashMap::new(),
        };
        for (ticker, result) in quotes {
            let (quote, degraded): (Option<Quote>, Option<String>) = match result {
                Ok(quote) => (Some(quote), None),
                Err(GatewayError::Unavailable(msg)) => {
                    return Err(EngineError::ExternalUnavailable(msg));
                }
                Err(e) => {
                    warn!(%ticker, error = %e, "Holding degraded");
                    (None, Some(e.to_string()))
                }
            };

            let asset_class =
                self.classifier
                    .classify(ticker, quote.as_ref(), &portfolio.asset_class_overrides);
            let expense_ratio = quote.as_ref().and_then(|q| q.expense_ratio);
            if let Some(er) = expense_ratio {
                resolved.expense_ratios.insert(ticker.clone(), er);
            }
            resolved.classes.insert(ticker.clone(), asset_class);
            resolved.details.push(HoldingDetail {
                ticker: ticker.clone(),
                name: quote.as_ref().and_then(|q| q.name.clone()),
                asset_class,
                value: portfolio.holdings.get(ticker).copied().unwrap_or(0.0),
                weight: weights.get(ticker).copied().unwrap_or(0.0),
                expense_ratio,
                dividend_yield: quote.as_ref().and_then(|q| q.dividend_yield),
                degraded,
            });
        }
        Ok(resolved)
    }

    /// Expense ratios of the model's funds. A fund without a quote is
    /// charged its advisory fee only.
    async fn model_expense_ratios(&self, model: &ModelPortfolio) -> EngineResult<HashMap<String, f64>> {
        let tickers: Vec<String> = model.ticker_weights().into_iter().map(|(t, _, _)| t).collect();
        let fetches = tickers.iter().map(|ticker| async move {
            (ticker, self.gateway.get_quote(ticker).await)
        });

        let mut ratios = HashMap::new();
        for (ticker, result) in join_all(fetches).await {
            match result {
                Ok(quote) => {
                    if let Some(er) = quote.expense_ratio {
                        ratios.insert(ticker.clone(), er);
                    }
                }
                Err(GatewayError::Unavailable(msg)) => {
                    return Err(EngineError::ExternalUnavailable(msg));
                }
                Err(e) => warn!(%ticker, error = %e, "No quote for model constituent"),
            }
        }
        Ok(ratios)
    }

    fn project_accounts(
        &self,
        combined: &Portfolio,
        accounts: &[Portfolio],
        resolved: &ResolvedHoldings,
    ) -> EngineResult<Projection> {
        let projections = accounts
            .iter()
            .map(|account| {
                self.project_one(
                    account,
                    resolved.allocation_of(account),
                    resolved.expense_ratio_of(account),
                )
            })
            .collect::<EngineResult<Vec<_>>>()?;

        match projections.as_slice() {
            [single] => Ok(single.clone()),
            _ => combine_projections(&combined.name, &projections).ok_or_else(|| {
                EngineError::InvalidInput("at least one portfolio is required".to_string())
            }),
        }
    }

    /// Fund expenses that would take the combined rate to 100% or more are
    /// dropped, leaving the advisory fee alone.
    fn project_one(
        &self,
        portfolio: &Portfolio,
        allocation: Allocation,
        expense_ratio: f64,
    ) -> EngineResult<Projection> {
        let mut fee_rate = portfolio.advisory_fee + expense_ratio;
        if !(0.0..1.0).contains(&fee_rate) {
            warn!(
                portfolio = %portfolio.name,
                advisory_fee = portfolio.advisory_fee,
                expense_ratio,
                "Ignoring fund expenses for out of range fee rate"
            );
            fee_rate = portfolio.advisory_fee;
        }
        let request = ProjectionRequest {
            label: portfolio.name.clone(),
            starting_value: portfolio.total_value(),
            allocation,
            annual_cash_flow: portfolio.annual_cash_flow,
            account_type: portfolio.account_type,
            tax_rate: portfolio.tax_rate(),
            fee_rate,
            years: self.settings.projection_years,
        };
        project(&request, &self.settings.assumptions, self.settings.monte_carlo)
    }

    /// `(end, start)` of the lookback window.
    fn history_window(&self) -> (NaiveDate, NaiveDate) {
        let end = self.as_of.unwrap_or_else(|| Utc::now().date_naive());
        let start = end
            .checked_sub_months(Months::new(self.settings.lookback_years.saturating_mul(12)))
            .unwrap_or(NaiveDate::MIN);
        (end, start)
    }
}

fn fee_analysis(
    current: &Portfolio,
    current_expense_ratio: f64,
    current_projection: &Projection,
    model: Option<(&Portfolio, f64, &Projection)>,
) -> FeeAnalysis {
    let total_value = current.total_value();
    let current_annual_fee =
        annual_fee_dollars(total_value, current.advisory_fee + current_expense_ratio);
    let model_annual_fee = model
        .map(|(m, er, _)| annual_fee_dollars(total_value, m.advisory_fee + er));

    FeeAnalysis {
        current_advisory_fee: current.advisory_fee,
        current_expense_ratio,
        current_annual_fee,
        current_total_fees: current_projection.total_fees,
        model_advisory_fee: model.map(|(m, _, _)| m.advisory_fee),
        model_expense_ratio: model.map(|(_, er, _)| er),
        model_annual_fee,
        model_total_fees: model.map(|(_, _, p)| p.total_fees),
        annual_savings: model_annual_fee.map(|fee| current_annual_fee - fee),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::market::PricePoint;
    use crate::core::portfolio::AccountType;
    use crate::core::projection::MonteCarloSettings;
    use async_trait::async_trait;
    use chrono::{Datelike, Weekday};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TRADING_DAYS: usize = 600;

    fn business_days(count: usize) -> Vec<NaiveDate> {
        let mut date = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
        let mut dates = Vec::with_capacity(count);
        while dates.len() < count {
            if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                dates.push(date);
            }
            date = date.succ_opt().unwrap();
        }
        dates
    }

    fn series(count: usize, drift: f64, phase: f64) -> Vec<PricePoint> {
        business_days(count)
            .into_iter()
            .enumerate()
            .map(|(i, date)| PricePoint {
                date,
                adjusted_close: 100.0
                    * (1.0 + drift).powi(i as i32)
                    * (1.0 + 0.02 * (i as f64 * 0.3 + phase).sin()),
            })
            .collect()
    }

    fn quote(price: f64, name: &str, expense_ratio: Option<f64>) -> Quote {
        Quote {
            price,
            name: Some(name.to_string()),
            category_hint: None,
            dividend_yield: Some(0.02),
            expense_ratio,
        }
    }

    struct MockGateway {
        quotes: HashMap<String, Result<Quote, GatewayError>>,
        histories: HashMap<String, Vec<PricePoint>>,
        quote_calls: AtomicUsize,
    }

    impl MockGateway {
        fn new() -> Self {
            let mut gateway = MockGateway {
                quotes: HashMap::new(),
                histories: HashMap::new(),
                quote_calls: AtomicUsize::new(0),
            };
            gateway.add("VTI", quote(250.0, "Vanguard Total Stock Market ETF", Some(0.0003)), 0.0004, 0.0);
            gateway.add("VXUS", quote(60.0, "Vanguard Total International Stock ETF", Some(0.0007)), 0.0002, 1.0);
            gateway.add("BND", quote(72.0, "Vanguard Total Bond Market ETF", Some(0.0003)), 0.0001, 2.0);
            gateway.add("VNQ", quote(85.0, "Vanguard Real Estate ETF", Some(0.0012)), 0.0002, 3.0);
            gateway.add("ZZZ", quote(10.0, "Mystery Holdings", None), 0.0001, 4.0);
            gateway
        }

        fn add(&mut self, ticker: &str, quote: Quote, drift: f64, phase: f64) {
            self.quotes.insert(ticker.to_string(), Ok(quote));
            self.histories
                .insert(ticker.to_string(), series(TRADING_DAYS, drift, phase));
        }
    }

    #[async_trait]
    impl MarketDataGateway for MockGateway {
        async fn get_quote(&self, ticker: &str) -> Result<Quote, GatewayError> {
            self.quote_calls.fetch_add(1, Ordering::SeqCst);
            self.quotes
                .get(ticker)
                .cloned()
                .unwrap_or_else(|| Err(GatewayError::UnknownTicker(ticker.to_string())))
        }

        async fn get_history(
            &self,
            ticker: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<PricePoint>, GatewayError> {
            self.histories
                .get(ticker)
                .cloned()
                .ok_or_else(|| GatewayError::NoData(ticker.to_string()))
        }
    }

    fn settings() -> EngineConfig {
        EngineConfig {
            monte_carlo: MonteCarloSettings { paths: 50, seed: 11 },
            ..EngineConfig::default()
        }
    }

    fn engine_with(gateway: MockGateway) -> AnalysisEngine {
        AnalysisEngine::new(Arc::new(gateway), settings())
            .with_as_of(NaiveDate::from_ymd_opt(2024, 6, 28).unwrap())
    }

    fn engine() -> AnalysisEngine {
        engine_with(MockGateway::new())
    }

    fn portfolio(name: &str, holdings: &[(&str, f64)]) -> Portfolio {
        let mut portfolio = Portfolio::new(
            name,
            holdings.iter().map(|(t, v)| (t.to_string(), *v)).collect(),
        );
        portfolio.advisory_fee = 0.01;
        portfolio.tax_rate = Some(0.2);
        portfolio
    }

    #[tokio::test]
    async fn test_validate_ticker() {
        let engine = engine();

        let result = engine.validate_ticker(" vxus ").await.unwrap();
        assert!(result.valid);
        assert_eq!(result.ticker, "VXUS");
        assert_eq!(result.asset_class, Some(AssetClass::InternationalEquities));
        assert_eq!(
            result.resolved_name.as_deref(),
            Some("Vanguard Total International Stock ETF")
        );

        let result = engine.validate_ticker("NOPE").await.unwrap();
        assert!(!result.valid);
        assert_eq!(result.asset_class, None);
        assert_eq!(result.reason.as_deref(), Some("Unknown ticker: NOPE"));

        assert!(matches!(
            engine.validate_ticker("  ").await,
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_validate_tickers() {
        let engine = engine();
        let tickers = ["vti", "NOPE", "BND"].map(String::from);
        let results = engine.validate_tickers(&tickers).await.unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].ticker, "VTI");
        assert!(results[0].valid);
        assert!(!results[1].valid);
        assert_eq!(results[2].asset_class, Some(AssetClass::CoreFixedIncome));

        assert!(matches!(
            engine.validate_tickers(&[]).await,
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.validate_tickers(&["VTI".to_string(), " ".to_string()]).await,
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_validate_ticker_unavailable() {
        let mut gateway = MockGateway::new();
        gateway.quotes.insert(
            "VTI".to_string(),
            Err(GatewayError::Unavailable("timeout".to_string())),
        );
        let engine = engine_with(gateway);
        assert_eq!(
            engine.validate_ticker("VTI").await,
            Err(EngineError::ExternalUnavailable("timeout".to_string()))
        );
    }

    #[test]
    fn test_list_models() {
        let engine = engine();
        let names: Vec<&str> = engine.list_models().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Conservative",
                "Moderately Conservative",
                "Moderate",
                "Moderately Aggressive",
                "Aggressive"
            ]
        );
        assert!(engine.list_models().iter().all(|m| m.advisory_fee == 0.0025));
        assert!(engine.model("moderate").is_ok());
        assert!(matches!(engine.model("Yolo"), Err(EngineError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_analyze_portfolio() {
        let engine = engine();
        let response = engine
            .analyze(&portfolio("Taxable", &[("VTI", 60_000.0), ("BND", 40_000.0)]))
            .await
            .unwrap();

        assert_eq!(response.total_value, 100_000.0);
        assert!((response.current_allocation.weight(AssetClass::UsEquities) - 0.6).abs() < 1e-12);
        assert!((response.current_allocation.weight(AssetClass::CoreFixedIncome) - 0.4).abs() < 1e-12);
        assert_eq!(response.holdings.len(), 2);
        assert_eq!(response.degraded().count(), 0);

        let model = response.matched_model.as_ref().unwrap();
        assert_eq!(model.name, "Moderate");
        assert!(response.similarity > 0.9 && response.similarity <= 1.0);
        assert!((response.model_holdings.values().sum::<f64>() - 100_000.0).abs() < 1e-6);
        assert!((response.model_holdings["VTI"] - 40_000.0).abs() < 1e-6);

        assert_eq!(response.projections.current.rows.len(), 10);
        assert_eq!(response.projections.model.as_ref().unwrap().rows.len(), 10);

        let history = &response.historical_performance;
        assert_eq!(history.current.window.trading_days, TRADING_DAYS);
        assert_eq!(history.model.as_ref().unwrap().window.trading_days, TRADING_DAYS);
        assert!(
            history.current.stats_with_fees.total_return
                < history.current.stats_without_fees.total_return
        );

        let fees = &response.fee_analysis;
        assert!((fees.current_expense_ratio - 0.0003).abs() < 1e-12);
        assert!((fees.current_annual_fee - 1_030.0).abs() < 1e-6);
        assert!(fees.annual_savings.unwrap() > 0.0);
        assert!(fees.current_total_fees > fees.model_total_fees.unwrap());
    }

    #[tokio::test]
    async fn test_analyze_is_deterministic() {
        let engine = engine();
        let input = portfolio("Taxable", &[("VTI", 30_000.0), ("VXUS", 20_000.0), ("BND", 50_000.0)]);
        let first = engine.analyze(&input).await.unwrap();
        let second = engine.analyze(&input).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_degraded_holding_keeps_value() {
        let mut gateway = MockGateway::new();
        gateway.quotes.insert(
            "ZZZ".to_string(),
            Err(GatewayError::NoData("ZZZ".to_string())),
        );
        let engine = engine_with(gateway);
        let response = engine
            .analyze(&portfolio("Taxable", &[("VTI", 90_000.0), ("ZZZ", 10_000.0)]))
            .await
            .unwrap();

        assert_eq!(response.total_value, 100_000.0);
        let degraded: Vec<&HoldingDetail> = response.degraded().collect();
        assert_eq!(degraded.len(), 1);
        assert_eq!(degraded[0].ticker, "ZZZ");
        assert_eq!(degraded[0].asset_class, AssetClass::Unknown);
        assert!((response.current_allocation.unknown_weight - 0.1).abs() < 1e-12);
        assert_eq!(response.matched_model.unwrap().name, "Aggressive");
    }

    #[tokio::test]
    async fn test_override_applies_to_unknown_ticker() {
        let mut input = portfolio("Taxable", &[("VTI", 50_000.0), ("zzz", 50_000.0)]);
        input
            .asset_class_overrides
            .insert("ZZZ".to_string(), AssetClass::CoreFixedIncome);
        let response = engine().analyze(&input).await.unwrap();
        assert_eq!(
            response.current_allocation.weight(AssetClass::CoreFixedIncome),
            0.5
        );
        assert_eq!(response.current_allocation.unknown_weight, 0.0);
    }

    #[tokio::test]
    async fn test_all_unknown_has_no_recommendation() {
        let response = engine()
            .analyze(&portfolio("Mystery", &[("ZZZ", 10_000.0)]))
            .await
            .unwrap();
        assert!(response.matched_model.is_none());
        assert_eq!(response.similarity, 0.0);
        assert!(response.model_holdings.is_empty());
        assert!(response.projections.model.is_none());
        assert!(response.historical_performance.model.is_none());
        assert_eq!(response.fee_analysis.annual_savings, None);
        // Unknown value is projected without growth.
        let row = &response.projections.current.rows[0];
        assert_eq!(row.growth, 0.0);
    }

    #[tokio::test]
    async fn test_invalid_portfolio_rejected_before_fetching() {
        let gateway = Arc::new(MockGateway::new());
        let engine = AnalysisEngine::new(gateway.clone(), settings());

        let empty = Portfolio::new("Empty", BTreeMap::new());
        assert!(matches!(
            engine.analyze(&empty).await,
            Err(EngineError::InvalidInput(_))
        ));

        let mut bad_fee = portfolio("Fee", &[("VTI", 1_000.0)]);
        bad_fee.advisory_fee = 1.5;
        assert!(matches!(
            engine.analyze(&bad_fee).await,
            Err(EngineError::InvalidInput(_))
        ));

        let zero = portfolio("Zero", &[("VTI", 0.0)]);
        assert!(matches!(
            engine.analyze(&zero).await,
            Err(EngineError::InvalidInput(_))
        ));
        assert_eq!(gateway.quote_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_short_history_fails_request() {
        let mut gateway = MockGateway::new();
        gateway.add("NEWCO", quote(20.0, "New Fund", None), 0.0, 0.5);
        gateway.histories.insert("NEWCO".to_string(), series(100, 0.0, 0.5));
        let engine = engine_with(gateway);

        let result = engine
            .analyze(&portfolio("Taxable", &[("VTI", 50_000.0), ("NEWCO", 50_000.0)]))
            .await;
        assert!(matches!(result, Err(EngineError::InsufficientData(_))));
    }

    #[tokio::test]
    async fn test_unavailable_quote_fails_request() {
        let mut gateway = MockGateway::new();
        gateway.quotes.insert(
            "BND".to_string(),
            Err(GatewayError::Unavailable("rate limited".to_string())),
        );
        let engine = engine_with(gateway);
        let result = engine
            .analyze(&portfolio("Taxable", &[("VTI", 50_000.0), ("BND", 50_000.0)]))
            .await;
        assert_eq!(
            result,
            Err(EngineError::ExternalUnavailable("rate limited".to_string()))
        );
    }

    #[tokio::test]
    async fn test_aggregate_matches_single_portfolio() {
        let engine = engine();
        let single = engine
            .analyze(&portfolio("Single", &[("VTI", 100_000.0)]))
            .await
            .unwrap();
        let aggregate = engine
            .analyze_aggregate(
                &[
                    portfolio("A", &[("VTI", 50_000.0)]),
                    portfolio("B", &[("vti", 50_000.0)]),
                ],
                0.2,
            )
            .await
            .unwrap();

        assert_eq!(aggregate.portfolio, "Aggregate");
        assert_eq!(aggregate.total_value, 100_000.0);
        assert_eq!(aggregate.current_allocation, single.current_allocation);
        assert_eq!(aggregate.matched_model, single.matched_model);
        assert_eq!(aggregate.similarity, single.similarity);

        // Two identical accounts with the same seed project to twice one half.
        let rows = &aggregate.projections.current.rows;
        let single_rows = &single.projections.current.rows;
        for (a, s) in rows.iter().zip(single_rows) {
            assert!((a.ending_value - s.ending_value).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn test_aggregate_keeps_account_tax_treatment() {
        let engine = engine();
        let mut taxable = portfolio("Taxable", &[("VTI", 60_000.0)]);
        taxable.annual_cash_flow = 1_000.0;
        let mut ira = portfolio("IRA", &[("VTI", 40_000.0)]);
        ira.account_type = AccountType::TraditionalIra;
        ira.advisory_fee = 0.005;
        ira.annual_cash_flow = 2_000.0;

        let response = engine.analyze_aggregate(&[taxable, ira], 0.25).await.unwrap();
        let current = &response.projections.current;
        assert_eq!(current.account_type, None);
        assert!(current.deferred_tax_liability >= 0.0);
        assert!((current.total_cash_flows - 30_000.0).abs() < 1e-6);
        assert!((response.fee_analysis.current_advisory_fee - 0.008).abs() < 1e-12);

        let model = response.projections.model.as_ref().unwrap();
        assert_eq!(model.account_type, Some(AccountType::Brokerage));
        assert_eq!(model.deferred_tax_liability, 0.0);
        assert!((model.total_cash_flows - 30_000.0).abs() < 1e-6);

        assert!(matches!(
            engine.analyze_aggregate(&[], 0.2).await,
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            engine
                .analyze_aggregate(&[portfolio("A", &[("VTI", 1.0)])], 1.2)
                .await,
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_expensive_funds_do_not_fail_projection() {
        let mut gateway = MockGateway::new();
        gateway.add("PRICEY", quote(30.0, "Pricey Fund", Some(0.02)), 0.0003, 0.7);
        let engine = engine_with(gateway);

        let mut pricey = portfolio("Pricey", &[("PRICEY", 50_000.0)]);
        pricey.asset_class_overrides =
            HashMap::from([("PRICEY".to_string(), AssetClass::UsEquities)]);
        pricey.advisory_fee = 0.99;

        let response = engine.analyze(&pricey).await.unwrap();
        let projection = &response.projections.current;
        let advisory_only = crate::core::fees::annual_drag(0.99).unwrap();
        let row = &projection.rows[0];
        let after_taxes = row.starting_value + row.cash_flow + row.growth - row.taxes;
        assert!((row.fees - after_taxes * advisory_only).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_aggregate_skips_empty_accounts() {
        let engine = engine();
        let single = engine
            .analyze(&portfolio("Single", &[("VTI", 100_000.0)]))
            .await
            .unwrap();

        let mut empty = Portfolio::new("Empty", BTreeMap::new());
        empty.annual_cash_flow = 5_000.0;
        let zero = portfolio("Zero", &[("BND", 0.0)]);
        let response = engine
            .analyze_aggregate(&[portfolio("A", &[("VTI", 100_000.0)]), empty, zero], 0.2)
            .await
            .unwrap();

        assert_eq!(response.total_value, 100_000.0);
        assert_eq!(response.holdings.len(), 1);
        assert_eq!(response.current_allocation, single.current_allocation);
        assert_eq!(response.projections.current.total_cash_flows, 0.0);
        assert_eq!(response.fee_analysis.current_advisory_fee, 0.01);

        let only_empty = engine
            .analyze_aggregate(&[Portfolio::new("Empty", BTreeMap::new())], 0.2)
            .await;
        assert!(matches!(only_empty, Err(EngineError::InvalidInput(_))));
    }
}
