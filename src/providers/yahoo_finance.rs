use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::core::error::GatewayError;
use crate::core::market::{MarketDataGateway, PricePoint, Quote, normalize_history};
use crate::providers::util::with_retry;

const RETRIES: usize = 2;
const RETRY_DELAY_MS: u64 = 250;

pub struct YahooFinanceGateway {
    base_url: String,
    client: reqwest::Client,
}

impl YahooFinanceGateway {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("foliofit/0.1")
            .build()?;
        Ok(YahooFinanceGateway {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, ticker: &str) -> Result<T, GatewayError> {
        with_retry(
            || async move {
                debug!("Requesting {}", url);
                let response = self.client.get(url).send().await.map_err(|e| {
                    GatewayError::Unavailable(format!("request error for {ticker}: {e}"))
                })?;

                let status = response.status();
                if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    return Err(GatewayError::Unavailable(format!(
                        "HTTP error: {status} for symbol: {ticker}"
                    )));
                }
                if status.is_client_error() {
                    return Err(GatewayError::UnknownTicker(ticker.to_string()));
                }

                let text = response.text().await.map_err(|e| {
                    GatewayError::Unavailable(format!("failed to read body for {ticker}: {e}"))
                })?;
                serde_json::from_str::<T>(&text).map_err(|e| {
                    GatewayError::Unavailable(format!(
                        "Failed to parse JSON response for {ticker}: {e}"
                    ))
                })
            },
            RETRIES,
            RETRY_DELAY_MS,
        )
        .await
    }

    async fn fetch_chart(&self, ticker: &str, query: &str) -> Result<ChartItem, GatewayError> {
        let url = format!("{}/v8/finance/chart/{}?{}", self.base_url, ticker, query);
        let data: ChartResponse = self.get_json(&url, ticker).await?;
        data.chart
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| GatewayError::UnknownTicker(ticker.to_string()))
    }

    /// Fund category, yield and expense ratio. Best effort: the quote is
    /// still usable without them.
    async fn fetch_profile(&self, ticker: &str) -> Option<SummaryResult> {
        let url = format!(
            "{}/v10/finance/quoteSummary/{}?modules=summaryDetail,fundProfile,defaultKeyStatistics",
            self.base_url, ticker
        );
        match self.get_json::<SummaryResponse>(&url, ticker).await {
            Ok(data) => data
                .quote_summary
                .result
                .and_then(|r| r.into_iter().next()),
            Err(e) => {
                debug!("Profile unavailable for {}: {}", ticker, e);
                None
            }
        }
    }
}

#[derive(Deserialize, Debug)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    result: Option<Vec<ChartItem>>,
}

#[derive(Deserialize, Debug)]
struct ChartItem {
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Deserialize, Debug)]
struct ChartMeta {
    #[serde(alias = "regularMarketPrice")]
    regular_market_price: Option<f64>,
    #[serde(alias = "longName")]
    long_name: Option<String>,
    #[serde(alias = "shortName")]
    short_name: Option<String>,
    #[serde(alias = "instrumentType")]
    instrument_type: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    #[serde(default)]
    quote: Vec<CloseSeries>,
    #[serde(default)]
    adjclose: Vec<AdjCloseSeries>,
}

#[derive(Deserialize, Debug)]
struct CloseSeries {
    close: Option<Vec<Option<f64>>>,
}

#[derive(Deserialize, Debug)]
struct AdjCloseSeries {
    adjclose: Option<Vec<Option<f64>>>,
}

#[derive(Deserialize, Debug)]
struct SummaryResponse {
    #[serde(alias = "quoteSummary")]
    quote_summary: SummaryEnvelope,
}

#[derive(Deserialize, Debug)]
struct SummaryEnvelope {
    result: Option<Vec<SummaryResult>>,
}

#[derive(Deserialize, Debug, Default)]
struct SummaryResult {
    #[serde(alias = "summaryDetail")]
    summary_detail: Option<SummaryDetail>,
    #[serde(alias = "fundProfile")]
    fund_profile: Option<FundProfile>,
    #[serde(alias = "defaultKeyStatistics")]
    key_statistics: Option<KeyStatistics>,
}

#[derive(Deserialize, Debug)]
struct RawValue {
    raw: Option<f64>,
}

#[derive(Deserialize, Debug)]
struct SummaryDetail {
    #[serde(rename = "yield")]
    fund_yield: Option<RawValue>,
    #[serde(alias = "dividendYield")]
    dividend_yield: Option<RawValue>,
}

#[derive(Deserialize, Debug)]
struct FundProfile {
    #[serde(alias = "categoryName")]
    category_name: Option<String>,
    #[serde(alias = "feesExpensesInvestment")]
    fees: Option<FundFees>,
}

#[derive(Deserialize, Debug)]
struct FundFees {
    #[serde(alias = "annualReportExpenseRatio")]
    expense_ratio: Option<RawValue>,
}

#[derive(Deserialize, Debug)]
struct KeyStatistics {
    #[serde(alias = "annualReportExpenseRatio")]
    expense_ratio: Option<RawValue>,
}

fn raw(value: &Option<RawValue>) -> Option<f64> {
    value
        .as_ref()
        .and_then(|v| v.raw)
        .filter(|v| v.is_finite() && *v >= 0.0)
}

fn extract_price_points(item: &ChartItem) -> Vec<PricePoint> {
    let (Some(timestamps), Some(indicators)) = (item.timestamp.as_ref(), item.indicators.as_ref())
    else {
        return Vec::new();
    };
    // Prefer dividend and split adjusted closes, fall back to raw closes.
    let closes = indicators
        .adjclose
        .first()
        .and_then(|a| a.adjclose.as_ref())
        .or_else(|| indicators.quote.first().and_then(|q| q.close.as_ref()));
    let Some(closes) = closes else {
        return Vec::new();
    };

    timestamps
        .iter()
        .zip(closes)
        .filter_map(|(ts, close)| {
            let date = DateTime::from_timestamp(*ts, 0)?.date_naive();
            Some(PricePoint {
                date,
                adjusted_close: (*close)?,
            })
        })
        .collect()
}

fn day_start_timestamp(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map_or(0, |dt| dt.and_utc().timestamp())
}

#[async_trait]
impl MarketDataGateway for YahooFinanceGateway {
    #[instrument(name = "YahooQuoteFetch", skip(self), fields(ticker = %ticker))]
    async fn get_quote(&self, ticker: &str) -> Result<Quote, GatewayError> {
        let item = self.fetch_chart(ticker, "interval=1d&range=5d").await?;
        let price = item
            .meta
            .regular_market_price
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| GatewayError::UnknownTicker(ticker.to_string()))?;

        let profile = self.fetch_profile(ticker).await.unwrap_or_default();
        let detail = profile.summary_detail.as_ref();
        let fund = profile.fund_profile.as_ref();

        let dividend_yield = detail.and_then(|d| raw(&d.fund_yield).or_else(|| raw(&d.dividend_yield)));
        let expense_ratio = fund
            .and_then(|f| f.fees.as_ref())
            .and_then(|f| raw(&f.expense_ratio))
            .or_else(|| profile.key_statistics.as_ref().and_then(|k| raw(&k.expense_ratio)));
        let category_hint = fund
            .and_then(|f| f.category_name.clone())
            .or(item.meta.instrument_type.clone());

        Ok(Quote {
            price,
            name: item.meta.long_name.or(item.meta.short_name),
            category_hint,
            dividend_yield,
            expense_ratio,
        })
    }

    #[instrument(name = "YahooHistoryFetch", skip(self), fields(ticker = %ticker))]
    async fn get_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, GatewayError> {
        let query = format!(
            "period1={}&period2={}&interval=1d&events=div%2Csplit&includeAdjustedClose=true",
            day_start_timestamp(start),
            day_start_timestamp(end) + 86_400
        );
        let item = self.fetch_chart(ticker, &query).await?;

        let mut points = extract_price_points(&item);
        points.retain(|p| p.date >= start && p.date <= end);
        let points = normalize_history(points);
        if points.is_empty() {
            return Err(GatewayError::NoData(ticker.to_string()));
        }
        debug!(count = points.len(), "Received price history");
        Ok(points)
    }
}
