//! Scripted transport shared by the behavior tests.

#![allow(dead_code)]

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use findata_core::{
    ClientBuilder, FinancialDataClient, HttpClient, HttpError, HttpRequest, HttpResponse,
    RetryPolicy,
};

type Handler = dyn Fn(&HttpRequest) -> Result<HttpResponse, HttpError> + Send + Sync;

/// Answers every request through a closure and records what was sent.
pub struct ScriptedHttpClient {
    handler: Box<Handler>,
    latency: Option<Duration>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, HttpError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            latency: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn slow<F>(latency: Duration, handler: F) -> Arc<Self>
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, HttpError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            latency: Some(latency),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Always replies with the same JSON body and status 200.
    pub fn replying(body: &'static str) -> Arc<Self> {
        Self::new(move |_| Ok(HttpResponse::ok_json(body)))
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("request log").clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("request log").len()
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        let response = (self.handler)(&request);
        self.requests.lock().expect("request log").push(request);
        let latency = self.latency;
        Box::pin(async move {
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            response
        })
    }
}

/// Client over `http` that never retries.
pub fn client(http: Arc<ScriptedHttpClient>) -> FinancialDataClient {
    builder(http).build()
}

pub fn builder(http: Arc<ScriptedHttpClient>) -> ClientBuilder {
    ClientBuilder::default()
        .with_base_url("https://api.test")
        .with_http_client(http)
        .with_retry(RetryPolicy::no_retry())
}

/// Value of query parameter `name` in `url`.
pub fn query_param(url: &str, name: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.to_owned())
    })
}

pub fn price_json(time: &str, close: f64) -> serde_json::Value {
    serde_json::json!({
        "open": close,
        "close": close,
        "high": close + 1.0,
        "low": close - 1.0,
        "volume": 1_000,
        "time": time,
    })
}

pub fn news_json(date: &str, url: &str) -> serde_json::Value {
    serde_json::json!({
        "ticker": "NVDA",
        "title": format!("headline {url}"),
        "author": "desk",
        "source": "wire",
        "date": date,
        "url": url,
        "sentiment": "neutral",
    })
}

pub fn trade_json(filing_date: &str, name: &str) -> serde_json::Value {
    serde_json::json!({
        "ticker": "AAPL",
        "issuer": "Apple Inc",
        "name": name,
        "title": "Director",
        "is_board_director": true,
        "transaction_date": filing_date,
        "transaction_shares": 100.0,
        "transaction_price_per_share": 180.0,
        "transaction_value": 18_000.0,
        "shares_owned_before_transaction": 1_000.0,
        "shares_owned_after_transaction": 1_100.0,
        "security_title": "Common Stock",
        "filing_date": filing_date,
    })
}

pub fn metric_json(report_period: &str, market_cap: Option<f64>) -> serde_json::Value {
    serde_json::json!({
        "ticker": "AAPL",
        "report_period": report_period,
        "period": "ttm",
        "currency": "USD",
        "market_cap": market_cap,
        "price_to_earnings_ratio": 28.5,
    })
}
