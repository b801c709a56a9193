//! # Domain Models
//!
//! Typed records decoded from provider payloads, plus the identifiers that
//! scope every query.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Ticker`] | Validated entity identifier |
//! | [`Day`] | Calendar day on the provider's date axis |
//! | [`DayStamp`] | Provider timestamp text plus its calendar day |
//! | [`Period`] | Reporting period (annual, quarterly, ttm) |
//! | [`Price`] | Daily OHLCV bar |
//! | [`FinancialMetric`] | Ratio snapshot for one report period |
//! | [`LineItem`] | Named statement values for one report period |
//! | [`InsiderTrade`] | Insider transaction filing |
//! | [`CompanyNews`] | News article |
//!
//! All records implement [`Record`], which gives the cache and paginator a
//! uniform view of a record's date and natural key.

mod day;
mod records;
mod ticker;

pub use day::{Day, DayStamp};
pub use records::{
    CompanyNews, FinancialMetric, InsiderTrade, LineItem, Period, Price, Record, RecordFamily,
};
pub use ticker::Ticker;
