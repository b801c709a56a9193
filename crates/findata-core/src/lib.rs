//! # Findata Core
//!
//! Fetch-and-cache access layer for the Financial Datasets API.
//!
//! ## Overview
//!
//! - **Typed records** for prices, financial metrics, line items, insider
//!   trades and company news
//! - **Fetcher** with credential header, status classification and decode
//! - **Retry policy** with capped exponential backoff and jitter
//! - **Paginator** walking capped endpoints backward in time
//! - **Entity-scoped cache** with merge-on-write, coverage tracking and
//!   single-flight fetches
//! - **Query façade** composing all of the above
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | In-memory cache store, keys, coverage windows |
//! | [`client`] | Query façade and request types |
//! | [`config`] | Client configuration and environment loading |
//! | [`domain`] | Tickers, days, periods, record types |
//! | [`endpoints`] | Provider endpoint construction |
//! | [`error`] | Validation, fetch and top-level errors |
//! | [`fetcher`] | Single provider call and response decoding |
//! | [`frame`] | Price series as a polars `DataFrame` |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`pagination`] | Backward-walking paginator |
//! | [`persistence`] | Cache snapshot load/save seam |
//! | [`retry`] | Backoff and retry policy |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use findata_core::{FinancialDataClient, PriceRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = FinancialDataClient::from_env();
//!
//!     let request = PriceRequest::new("AAPL", "2024-01-01", "2024-03-31")?;
//!     let frame = client.get_price_frame(&request).await?;
//!     println!("{frame}");
//!
//!     // Served from the cache: no second request.
//!     let prices = client.get_prices(&request).await?;
//!     println!("{} bars", prices.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │  Query Façade   │────▶│   Cache Store    │
//! └────────┬────────┘     └──────────────────┘
//!          │ miss
//!          ▼
//! ┌─────────────────┐
//! │   Paginator     │ (insider trades, news)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │    Fetcher      │────▶│  HTTP Client     │
//! │ (retry policy)  │     │  (reqwest)       │
//! └─────────────────┘     └──────────────────┘
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod domain;
pub mod endpoints;
pub mod error;
pub mod fetcher;
pub mod frame;
pub mod http_client;
pub mod pagination;
pub mod persistence;
pub mod retry;

pub use cache::{CacheKey, CacheMode, CacheSnapshot, CacheStore, Coverage, WindowQuery};
pub use client::{
    ClientBuilder, CompanyNewsRequest, FinancialDataClient, HistoryRequest, InsiderTradesRequest,
    LineItemsRequest, MetricsRequest, PriceRequest,
};
pub use config::ClientConfig;
pub use domain::{
    CompanyNews, Day, DayStamp, FinancialMetric, InsiderTrade, LineItem, Period, Price, Record,
    RecordFamily, Ticker,
};
pub use error::{CoreError, FetchError, FetchErrorKind, PersistenceError, ValidationError};
pub use frame::prices_to_frame;
pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use persistence::{CachePersistence, JsonFileCache};
pub use retry::{Backoff, RetryPolicy};
