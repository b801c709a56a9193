//! Query façade: one entry point per record family.
//!
//! Every query follows the same path:
//!
//! ```text
//! lookup ──hit──────────────────────────────────────────▶ return
//!    │
//!   miss ─▶ fetch slot ─▶ lookup again ─hit──────────────▶ return
//!                             │
//!                            miss ─▶ fetch / paginate ─▶ empty ─▶ return
//!                                                        │
//!                                                     records ─▶ cache write ─▶ return
//! ```
//!
//! The whole path runs under the client's cancellation token and, when
//! configured, the per-query timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use polars::prelude::DataFrame;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::{CacheKey, CacheMode, CacheStore, WindowQuery};
use crate::config::ClientConfig;
use crate::endpoints::ApiCall;
use crate::fetcher::Fetcher;
use crate::frame::prices_to_frame;
use crate::http_client::{HttpAuth, HttpClient, ReqwestHttpClient};
use crate::pagination::{Paginator, Walk};
use crate::persistence::CachePersistence;
use crate::retry::RetryPolicy;
use crate::{
    CompanyNews, CoreError, Day, FetchError, FinancialMetric, InsiderTrade, LineItem, Period,
    Price, Record, RecordFamily, Ticker, ValidationError,
};

const DEFAULT_FUNDAMENTALS_LIMIT: usize = 10;
const DEFAULT_PAGE_LIMIT: usize = 1000;

fn ordered_range(start: Day, end: Day) -> Result<(), ValidationError> {
    if start > end {
        return Err(ValidationError::InvertedRange {
            start: start.to_string(),
            end: end.to_string(),
        });
    }
    Ok(())
}

fn positive(limit: usize) -> Result<usize, ValidationError> {
    if limit == 0 {
        return Err(ValidationError::ZeroLimit);
    }
    Ok(limit)
}

/// Daily prices within `[start, end]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRequest {
    ticker: Ticker,
    start: Day,
    end: Day,
}

impl PriceRequest {
    pub fn new(ticker: &str, start: &str, end: &str) -> Result<Self, ValidationError> {
        Self::from_parts(Ticker::parse(ticker)?, Day::parse(start)?, Day::parse(end)?)
    }

    pub fn from_parts(ticker: Ticker, start: Day, end: Day) -> Result<Self, ValidationError> {
        ordered_range(start, end)?;
        Ok(Self { ticker, start, end })
    }
}

/// Most recent financial metrics reported on or before `end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsRequest {
    ticker: Ticker,
    end: Day,
    period: Period,
    limit: usize,
}

impl MetricsRequest {
    /// Defaults to `ttm` with a limit of 10.
    pub fn new(ticker: &str, end: &str) -> Result<Self, ValidationError> {
        Self::from_parts(
            Ticker::parse(ticker)?,
            Day::parse(end)?,
            Period::Ttm,
            DEFAULT_FUNDAMENTALS_LIMIT,
        )
    }

    pub fn from_parts(
        ticker: Ticker,
        end: Day,
        period: Period,
        limit: usize,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            ticker,
            end,
            period,
            limit: positive(limit)?,
        })
    }

    pub fn with_period(mut self, period: Period) -> Self {
        self.period = period;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Result<Self, ValidationError> {
        self.limit = positive(limit)?;
        Ok(self)
    }
}

/// Named statement line items reported on or before `end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItemsRequest {
    ticker: Ticker,
    line_items: Option<Vec<String>>,
    end: Day,
    period: Period,
    limit: usize,
}

impl LineItemsRequest {
    /// Defaults to the client's configured line items, `ttm`, limit 10.
    pub fn new(ticker: &str, end: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            ticker: Ticker::parse(ticker)?,
            line_items: None,
            end: Day::parse(end)?,
            period: Period::Ttm,
            limit: DEFAULT_FUNDAMENTALS_LIMIT,
        })
    }

    pub fn with_line_items<I, S>(mut self, names: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(Into::into)
            .filter(|name| !name.trim().is_empty())
            .collect();
        if names.is_empty() {
            return Err(ValidationError::EmptyLineItems);
        }
        self.line_items = Some(names);
        Ok(self)
    }

    pub fn with_period(mut self, period: Period) -> Self {
        self.period = period;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Result<Self, ValidationError> {
        self.limit = positive(limit)?;
        Ok(self)
    }
}

/// Paginated history request shared by insider trades and news.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    ticker: Ticker,
    start: Option<Day>,
    end: Day,
    limit: usize,
}

impl HistoryRequest {
    /// Most recent page only, 1000 records per page.
    pub fn new(ticker: &str, end: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            ticker: Ticker::parse(ticker)?,
            start: None,
            end: Day::parse(end)?,
            limit: DEFAULT_PAGE_LIMIT,
        })
    }

    /// Walk back until `start`.
    pub fn with_start(mut self, start: &str) -> Result<Self, ValidationError> {
        let start = Day::parse(start)?;
        ordered_range(start, self.end)?;
        self.start = Some(start);
        Ok(self)
    }

    /// Page size sent to the provider.
    pub fn with_limit(mut self, limit: usize) -> Result<Self, ValidationError> {
        self.limit = positive(limit)?;
        Ok(self)
    }

    fn window(&self) -> WindowQuery {
        match self.start {
            Some(start) => WindowQuery::Range {
                start,
                end: self.end,
            },
            None => WindowQuery::Latest {
                end: self.end,
                limit: self.limit,
            },
        }
    }
}

pub type InsiderTradesRequest = HistoryRequest;
pub type CompanyNewsRequest = HistoryRequest;

/// Composes a [`FinancialDataClient`].
pub struct ClientBuilder {
    config: ClientConfig,
    http_client: Option<Arc<dyn HttpClient>>,
    cache: Option<CacheStore>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            http_client: None,
            cache: None,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Starts from [`ClientConfig::from_env`].
    pub fn from_env() -> Self {
        Self::new(ClientConfig::from_env())
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        self.config.api_key = (!api_key.trim().is_empty()).then_some(api_key);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    /// Share an existing store, e.g. one restored from disk.
    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_cache_mode(mut self, mode: CacheMode) -> Self {
        self.config.cache_mode = mode;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.query_timeout = timeout;
        self
    }

    pub fn with_line_items<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.line_items = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn build(self) -> FinancialDataClient {
        let http_client = self
            .http_client
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));
        let fetcher = Fetcher::new(
            http_client,
            HttpAuth::api_key(self.config.api_key.as_deref()),
            self.config.base_url.clone(),
            self.config.request_timeout,
            self.retry,
        );

        FinancialDataClient {
            fetcher,
            cache: self.cache.unwrap_or_default(),
            config: self.config,
            cancel: self.cancel,
        }
    }
}

/// Cached access to prices, fundamentals, insider trades and news.
///
/// Clones share the transport and the cache store.
#[derive(Clone)]
pub struct FinancialDataClient {
    fetcher: Fetcher,
    cache: CacheStore,
    config: ClientConfig,
    cancel: CancellationToken,
}

impl FinancialDataClient {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Client configured from the environment with default retry and cache.
    pub fn from_env() -> Self {
        ClientBuilder::from_env().build()
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// A view sharing cache and transport that observes `token` instead.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            cancel: token,
            ..self.clone()
        }
    }

    /// Daily prices in `[start, end]`, oldest first.
    pub async fn get_prices(&self, request: &PriceRequest) -> Result<Vec<Price>, FetchError> {
        let key = CacheKey::new(RecordFamily::Prices, &request.ticker);
        let window = WindowQuery::Range {
            start: request.start,
            end: request.end,
        };
        let call = ApiCall::prices(&request.ticker, request.start, request.end);

        let mut prices = self
            .cached(key, window, || self.fetch_once::<Price>(&call, &window))
            .await?;
        prices.sort_by_key(|price| price.time);
        Ok(prices)
    }

    /// Prices as a date-ascending frame with `date, open, high, low, close, volume`.
    pub async fn get_price_frame(&self, request: &PriceRequest) -> Result<DataFrame, CoreError> {
        let prices = self.get_prices(request).await?;
        Ok(prices_to_frame(&prices)?)
    }

    /// Price frame for raw `YYYY-MM-DD` bounds, validating them first.
    pub async fn get_price_data(
        &self,
        ticker: &str,
        start: &str,
        end: &str,
    ) -> Result<DataFrame, CoreError> {
        let request = PriceRequest::new(ticker, start, end)?;
        self.get_price_frame(&request).await
    }

    /// Restore a saved snapshot into this client's cache. `false` when none exists.
    pub async fn load_cache(&self, persistence: &dyn CachePersistence) -> Result<bool, CoreError> {
        Ok(self.cache.load_from(persistence).await?)
    }

    pub async fn save_cache(&self, persistence: &dyn CachePersistence) -> Result<(), CoreError> {
        Ok(self.cache.save_to(persistence).await?)
    }

    /// Up to `limit` metrics with `report_period <= end`, newest first.
    pub async fn get_financial_metrics(
        &self,
        request: &MetricsRequest,
    ) -> Result<Vec<FinancialMetric>, FetchError> {
        let key = CacheKey::new(RecordFamily::FinancialMetrics, &request.ticker)
            .with_variant(request.period.as_str());
        let window = WindowQuery::Latest {
            end: request.end,
            limit: request.limit,
        };
        let call = ApiCall::financial_metrics(
            &request.ticker,
            request.end,
            request.period,
            request.limit,
        );

        self.cached(key, window, || self.fetch_once::<FinancialMetric>(&call, &window))
            .await
    }

    /// Up to `limit` line-item rows with `report_period <= end`, newest first.
    pub async fn get_line_items(
        &self,
        request: &LineItemsRequest,
    ) -> Result<Vec<LineItem>, FetchError> {
        let names = request
            .line_items
            .as_deref()
            .unwrap_or(self.config.line_items.as_slice());
        if names.is_empty() {
            return Err(ValidationError::EmptyLineItems.into());
        }

        let mut variant_names = names.to_vec();
        variant_names.sort();
        variant_names.dedup();
        let key = CacheKey::new(RecordFamily::LineItems, &request.ticker).with_variant(format!(
            "{}_{}",
            request.period,
            variant_names.join(",")
        ));
        let window = WindowQuery::Latest {
            end: request.end,
            limit: request.limit,
        };
        let call = ApiCall::line_items(
            &request.ticker,
            names,
            request.end,
            request.period,
            request.limit,
        );

        self.cached(key, window, || self.fetch_once::<LineItem>(&call, &window))
            .await
    }

    /// Insider trades filed on or before `end`, walking back to `start` when set.
    pub async fn get_insider_trades(
        &self,
        request: &InsiderTradesRequest,
    ) -> Result<Vec<InsiderTrade>, FetchError> {
        let key = CacheKey::new(RecordFamily::InsiderTrades, &request.ticker);
        let paginator = Paginator::new(request.start, request.end, request.limit);

        self.cached(key, request.window(), || {
            paginator.collect(&self.cancel, |cursor| {
                let call =
                    ApiCall::insider_trades(&request.ticker, cursor, request.start, request.limit);
                async move { self.fetcher.fetch::<InsiderTrade>(&call, &self.cancel).await }
            })
        })
        .await
    }

    /// News published on or before `end`, walking back to `start` when set.
    pub async fn get_company_news(
        &self,
        request: &CompanyNewsRequest,
    ) -> Result<Vec<CompanyNews>, FetchError> {
        let key = CacheKey::new(RecordFamily::CompanyNews, &request.ticker);
        let paginator = Paginator::new(request.start, request.end, request.limit);

        self.cached(key, request.window(), || {
            paginator.collect(&self.cancel, |cursor| {
                let call =
                    ApiCall::company_news(&request.ticker, cursor, request.start, request.limit);
                async move { self.fetcher.fetch::<CompanyNews>(&call, &self.cancel).await }
            })
        })
        .await
    }

    /// Market cap from the latest ttm metrics on or before `end`.
    ///
    /// `None` when the provider has no metrics or the field is absent.
    pub async fn get_market_cap(&self, ticker: &Ticker, end: Day) -> Result<Option<f64>, FetchError> {
        let request = MetricsRequest::from_parts(ticker.clone(), end, Period::Ttm, 1)?;
        let metrics = self.get_financial_metrics(&request).await?;
        Ok(metrics.first().and_then(|metric| metric.market_cap))
    }

    async fn fetch_once<T: Record>(
        &self,
        call: &ApiCall,
        window: &WindowQuery,
    ) -> Result<Walk<T>, FetchError> {
        let records = self.fetcher.fetch::<T>(call, &self.cancel).await?;
        Ok(Walk::single(window, records))
    }

    async fn cached<T, F, Fut>(
        &self,
        key: CacheKey,
        window: WindowQuery,
        fetch: F,
    ) -> Result<Vec<T>, FetchError>
    where
        T: Record,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Walk<T>, FetchError>>,
    {
        let query = async {
            let mode = self.config.cache_mode;
            if mode == CacheMode::Bypass {
                return fetch().await.map(|walk| walk.records);
            }
            if mode == CacheMode::Use {
                if let Some(hit) = self.cache.lookup::<T>(&key, &window).await {
                    return Ok(hit);
                }
            }

            let _slot = self.cache.acquire_fetch_slot(&key).await;
            if mode == CacheMode::Use {
                if let Some(hit) = self.cache.lookup::<T>(&key, &window).await {
                    debug!(key = %key, "served by a concurrent fetch");
                    return Ok(hit);
                }
            }

            let walk = fetch().await?;
            if walk.records.is_empty() {
                debug!(key = %key, "empty result; nothing cached");
                return Ok(walk.records);
            }
            if !walk.exhausted {
                debug!(
                    key = %key,
                    coverage = ?walk.coverage,
                    "walk cut short; caching partial coverage"
                );
            }
            self.cache
                .store_with_coverage(key.clone(), walk.coverage, walk.records.clone())
                .await;
            Ok(walk.records)
        };

        let bounded = async {
            match self.config.query_timeout {
                Some(limit) => tokio::time::timeout(limit, query)
                    .await
                    .map_err(|_| FetchError::timed_out(limit.as_millis()))?,
                None => query.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(FetchError::cancelled()),
            outcome = bounded => outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FetchErrorKind;

    #[test]
    fn price_request_rejects_inverted_range() {
        let error = PriceRequest::new("AAPL", "2024-02-01", "2024-01-01").expect_err("inverted");
        assert!(matches!(error, ValidationError::InvertedRange { .. }));
    }

    #[test]
    fn requests_reject_zero_limit() {
        let metrics = MetricsRequest::new("AAPL", "2024-01-01")
            .expect("valid")
            .with_limit(0);
        let history = HistoryRequest::new("AAPL", "2024-01-01")
            .expect("valid")
            .with_limit(0);

        assert_eq!(metrics.expect_err("zero"), ValidationError::ZeroLimit);
        assert_eq!(history.expect_err("zero"), ValidationError::ZeroLimit);
    }

    #[test]
    fn history_start_must_not_follow_end() {
        let error = HistoryRequest::new("AAPL", "2024-01-01")
            .expect("valid")
            .with_start("2024-06-01")
            .expect_err("start after end");
        assert!(matches!(error, ValidationError::InvertedRange { .. }));
    }

    #[test]
    fn line_item_names_cannot_be_blank() {
        let error = LineItemsRequest::new("AAPL", "2024-01-01")
            .expect("valid")
            .with_line_items(["", "  "])
            .expect_err("blank names");
        assert_eq!(error, ValidationError::EmptyLineItems);
    }

    #[test]
    fn history_window_depends_on_start() {
        let latest = HistoryRequest::new("AAPL", "2024-06-01").expect("valid");
        let ranged = latest.clone().with_start("2024-01-01").expect("valid");

        assert!(matches!(latest.window(), WindowQuery::Latest { limit: 1000, .. }));
        assert!(matches!(ranged.window(), WindowQuery::Range { .. }));
    }

    #[tokio::test]
    async fn empty_configured_line_items_fail_before_fetching() {
        let client = ClientBuilder::default()
            .with_line_items(Vec::<String>::new())
            .build();
        let request = LineItemsRequest::new("AAPL", "2024-01-01").expect("valid");

        let error = client
            .get_line_items(&request)
            .await
            .expect_err("nothing to ask for");
        assert_eq!(error.kind(), FetchErrorKind::InvalidRequest);
    }
}
