use crate::core::cache::Cache;
use crate::core::error::GatewayError;
use crate::core::market::{MarketDataGateway, PricePoint, Quote};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;

type HistoryKey = (String, NaiveDate, NaiveDate);

/// Gateway decorator that serves repeated quote and history requests from a
/// shared TTL cache. Concurrent requests for the same key reach the inner
/// gateway once.
#[derive(Clone)]
pub struct CachingGateway<G: MarketDataGateway + 'static> {
    inner: Arc<G>,
    quotes: Cache<String, Quote, GatewayError>,
    history: Cache<HistoryKey, Vec<PricePoint>, GatewayError>,
}

impl<G: MarketDataGateway + 'static> CachingGateway<G> {
    pub fn new(inner: G, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(inner),
            quotes: Cache::new(ttl),
            history: Cache::new(ttl),
        }
    }
}

#[async_trait]
impl<G: MarketDataGateway + 'static> MarketDataGateway for CachingGateway<G> {
    async fn get_quote(&self, ticker: &str) -> Result<Quote, GatewayError> {
        let inner = Arc::clone(&self.inner);
        let owned = ticker.to_string();
        self.quotes
            .get_or_fetch(ticker.to_string(), move || async move {
                inner.get_quote(&owned).await
            })
            .await
    }

    async fn get_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, GatewayError> {
        let inner = Arc::clone(&self.inner);
        let owned = ticker.to_string();
        self.history
            .get_or_fetch((ticker.to_string(), start, end), move || async move {
                inner.get_history(&owned, start, end).await
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingGateway {
        quote_calls: AtomicUsize,
        history_calls: AtomicUsize,
    }

    #[async_trait]
    impl MarketDataGateway for CountingGateway {
        async fn get_quote(&self, ticker: &str) -> Result<Quote, GatewayError> {
            self.quote_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if ticker == "ZZZZ" {
                return Err(GatewayError::UnknownTicker(ticker.to_string()));
            }
            Ok(Quote {
                price: 100.0,
                name: Some(ticker.to_string()),
                category_hint: None,
                dividend_yield: None,
                expense_ratio: None,
            })
        }

        async fn get_history(
            &self,
            _ticker: &str,
            start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<PricePoint>, GatewayError> {
            self.history_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![PricePoint {
                date: start,
                adjusted_close: 10.0,
            }])
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_quotes_hit_inner_once() {
        let gateway = Arc::new(CachingGateway::new(
            CountingGateway::default(),
            Duration::from_secs(60),
        ));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let gateway = Arc::clone(&gateway);
                tokio::spawn(async move { gateway.get_quote("VTI").await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().price, 100.0);
        }

        assert_eq!(gateway.inner.quote_calls.load(Ordering::SeqCst), 1);
        gateway.get_quote("VTI").await.unwrap();
        assert_eq!(gateway.inner.quote_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_history_keyed_by_range() {
        let gateway = CachingGateway::new(CountingGateway::default(), Duration::from_secs(60));

        gateway
            .get_history("BND", date(2020, 1, 1), date(2024, 1, 1))
            .await
            .unwrap();
        gateway
            .get_history("BND", date(2020, 1, 1), date(2024, 1, 1))
            .await
            .unwrap();
        assert_eq!(gateway.inner.history_calls.load(Ordering::SeqCst), 1);

        gateway
            .get_history("BND", date(2021, 1, 1), date(2024, 1, 1))
            .await
            .unwrap();
        assert_eq!(gateway.inner.history_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let gateway = CachingGateway::new(CountingGateway::default(), Duration::from_secs(60));

        assert!(gateway.get_quote("ZZZZ").await.is_err());
        assert!(gateway.get_quote("ZZZZ").await.is_err());
        assert_eq!(gateway.inner.quote_calls.load(Ordering::SeqCst), 2);
    }
}
