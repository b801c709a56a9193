use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::cache::CachedBatch;
use crate::{Day, DayStamp, Ticker, ValidationError};

/// Reporting period of a fundamentals record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Annual,
    Quarterly,
    Ttm,
}

impl Period {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Annual => "annual",
            Self::Quarterly => "quarterly",
            Self::Ttm => "ttm",
        }
    }
}

impl Default for Period {
    fn default() -> Self {
        Self::Ttm
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "annual" => Ok(Self::Annual),
            "quarterly" => Ok(Self::Quarterly),
            "ttm" => Ok(Self::Ttm),
            _ => Err(ValidationError::InvalidPeriod {
                value: value.to_owned(),
            }),
        }
    }
}

/// Record families served by the provider, one per endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordFamily {
    Prices,
    FinancialMetrics,
    LineItems,
    InsiderTrades,
    CompanyNews,
}

impl RecordFamily {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Prices => "prices",
            Self::FinancialMetrics => "financial-metrics",
            Self::LineItems => "line-items",
            Self::InsiderTrades => "insider-trades",
            Self::CompanyNews => "company-news",
        }
    }

    /// Name of the array field carrying the records in a response body.
    pub const fn response_field(self) -> &'static str {
        match self {
            Self::Prices => "prices",
            Self::FinancialMetrics => "financial_metrics",
            Self::LineItems => "search_results",
            Self::InsiderTrades => "insider_trades",
            Self::CompanyNews => "news",
        }
    }
}

impl Display for RecordFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contract shared by every decoded record type.
///
/// Within one cache entry the ticker is fixed, so a record's natural key is
/// its day plus a discriminator separating records that share that day.
pub trait Record: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {
    const FAMILY: RecordFamily;

    /// The date the record is filed under on the provider's date axis.
    fn day(&self) -> Day;

    fn discriminator(&self) -> String;

    fn natural_key(&self) -> (Day, String) {
        (self.day(), self.discriminator())
    }

    fn into_batch(records: Vec<Self>) -> CachedBatch;

    fn from_batch(batch: &CachedBatch) -> Option<&[Self]>;
}

/// Daily OHLCV price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: u64,
    pub time: Day,
}

impl Record for Price {
    const FAMILY: RecordFamily = RecordFamily::Prices;

    fn day(&self) -> Day {
        self.time
    }

    fn discriminator(&self) -> String {
        String::new()
    }

    fn into_batch(records: Vec<Self>) -> CachedBatch {
        CachedBatch::Prices(records)
    }

    fn from_batch(batch: &CachedBatch) -> Option<&[Self]> {
        match batch {
            CachedBatch::Prices(records) => Some(records),
            _ => None,
        }
    }
}

/// Valuation, profitability, efficiency and growth ratios for one report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialMetric {
    pub ticker: Ticker,
    pub report_period: Day,
    pub period: Period,
    pub currency: Option<String>,
    pub market_cap: Option<f64>,
    pub enterprise_value: Option<f64>,
    pub price_to_earnings_ratio: Option<f64>,
    pub price_to_book_ratio: Option<f64>,
    pub price_to_sales_ratio: Option<f64>,
    pub enterprise_value_to_ebitda_ratio: Option<f64>,
    pub enterprise_value_to_revenue_ratio: Option<f64>,
    pub free_cash_flow_yield: Option<f64>,
    pub peg_ratio: Option<f64>,
    pub gross_margin: Option<f64>,
    pub operating_margin: Option<f64>,
    pub net_margin: Option<f64>,
    pub return_on_equity: Option<f64>,
    pub return_on_assets: Option<f64>,
    pub return_on_invested_capital: Option<f64>,
    pub asset_turnover: Option<f64>,
    pub inventory_turnover: Option<f64>,
    pub receivables_turnover: Option<f64>,
    pub days_sales_outstanding: Option<f64>,
    pub operating_cycle: Option<f64>,
    pub working_capital_turnover: Option<f64>,
    pub current_ratio: Option<f64>,
    pub quick_ratio: Option<f64>,
    pub cash_ratio: Option<f64>,
    pub operating_cash_flow_ratio: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub debt_to_assets: Option<f64>,
    pub interest_coverage: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub earnings_growth: Option<f64>,
    pub book_value_growth: Option<f64>,
    pub earnings_per_share_growth: Option<f64>,
    pub free_cash_flow_growth: Option<f64>,
    pub operating_income_growth: Option<f64>,
    pub ebitda_growth: Option<f64>,
    pub payout_ratio: Option<f64>,
    pub earnings_per_share: Option<f64>,
    pub book_value_per_share: Option<f64>,
    pub free_cash_flow_per_share: Option<f64>,
}

impl Record for FinancialMetric {
    const FAMILY: RecordFamily = RecordFamily::FinancialMetrics;

    fn day(&self) -> Day {
        self.report_period
    }

    fn discriminator(&self) -> String {
        self.period.as_str().to_owned()
    }

    fn into_batch(records: Vec<Self>) -> CachedBatch {
        CachedBatch::FinancialMetrics(records)
    }

    fn from_batch(batch: &CachedBatch) -> Option<&[Self]> {
        match batch {
            CachedBatch::FinancialMetrics(records) => Some(records),
            _ => None,
        }
    }
}

/// One report's worth of named financial-statement values.
///
/// The provider returns every requested line item as a field of the same
/// row; they are kept as a name-to-value map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub ticker: Ticker,
    pub report_period: Day,
    pub period: Period,
    pub currency: Option<String>,
    #[serde(flatten)]
    pub values: BTreeMap<String, serde_json::Value>,
}

impl LineItem {
    /// Numeric value of a named line item, if present and numeric.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(serde_json::Value::as_f64)
    }
}

impl Record for LineItem {
    const FAMILY: RecordFamily = RecordFamily::LineItems;

    fn day(&self) -> Day {
        self.report_period
    }

    fn discriminator(&self) -> String {
        self.period.as_str().to_owned()
    }

    fn into_batch(records: Vec<Self>) -> CachedBatch {
        CachedBatch::LineItems(records)
    }

    fn from_batch(batch: &CachedBatch) -> Option<&[Self]> {
        match batch {
            CachedBatch::LineItems(records) => Some(records),
            _ => None,
        }
    }
}

/// Form 4 style insider transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsiderTrade {
    pub ticker: Ticker,
    pub issuer: Option<String>,
    pub name: Option<String>,
    pub title: Option<String>,
    pub is_board_director: Option<bool>,
    pub transaction_date: Option<Day>,
    pub transaction_shares: Option<f64>,
    pub transaction_price_per_share: Option<f64>,
    pub transaction_value: Option<f64>,
    pub shares_owned_before_transaction: Option<f64>,
    pub shares_owned_after_transaction: Option<f64>,
    pub security_title: Option<String>,
    pub filing_date: DayStamp,
}

impl Record for InsiderTrade {
    const FAMILY: RecordFamily = RecordFamily::InsiderTrades;

    fn day(&self) -> Day {
        self.filing_date.day()
    }

    // No transaction id is exposed, and one order can fill at several prices
    // on the same day, so every field takes part in the key.
    fn discriminator(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn into_batch(records: Vec<Self>) -> CachedBatch {
        CachedBatch::InsiderTrades(records)
    }

    fn from_batch(batch: &CachedBatch) -> Option<&[Self]> {
        match batch {
            CachedBatch::InsiderTrades(records) => Some(records),
            _ => None,
        }
    }
}

/// News article mentioning the entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyNews {
    pub ticker: Ticker,
    pub title: String,
    pub author: Option<String>,
    pub source: Option<String>,
    pub date: DayStamp,
    pub url: String,
    pub sentiment: Option<String>,
}

impl Record for CompanyNews {
    const FAMILY: RecordFamily = RecordFamily::CompanyNews;

    fn day(&self) -> Day {
        self.date.day()
    }

    fn discriminator(&self) -> String {
        self.url.clone()
    }

    fn into_batch(records: Vec<Self>) -> CachedBatch {
        CachedBatch::CompanyNews(records)
    }

    fn from_batch(batch: &CachedBatch) -> Option<&[Self]> {
        match batch {
            CachedBatch::CompanyNews(records) => Some(records),
            _ => None,
        }
    }
}
