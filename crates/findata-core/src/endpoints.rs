//! Request construction for each provider endpoint.

use crate::http_client::HttpMethod;
use crate::{Day, Period, RecordFamily, Ticker};

pub const DEFAULT_BASE_URL: &str = "https://api.financialdatasets.ai";

/// Line items requested when the caller does not name any.
pub const DEFAULT_LINE_ITEMS: [&str; 30] = [
    "book_value_per_share",
    "capital_expenditure",
    "cash_and_equivalents",
    "current_assets",
    "current_liabilities",
    "debt_to_equity",
    "depreciation_and_amortization",
    "dividends_and_other_cash_distributions",
    "earnings_per_share",
    "ebit",
    "ebitda",
    "free_cash_flow",
    "goodwill_and_intangible_assets",
    "gross_margin",
    "gross_profit",
    "interest_expense",
    "issuance_or_purchase_of_equity_shares",
    "net_income",
    "operating_expense",
    "operating_income",
    "operating_margin",
    "outstanding_shares",
    "research_and_development",
    "return_on_invested_capital",
    "revenue",
    "shareholders_equity",
    "total_assets",
    "total_debt",
    "total_liabilities",
    "working_capital",
];

/// One provider call, independent of transport and credentials.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCall {
    pub family: RecordFamily,
    pub method: HttpMethod,
    pub path: &'static str,
    pub query: Vec<(&'static str, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiCall {
    pub fn prices(ticker: &Ticker, start: Day, end: Day) -> Self {
        Self::get(
            RecordFamily::Prices,
            "/prices/",
            vec![
                ("ticker", ticker.to_string()),
                ("interval", String::from("day")),
                ("interval_multiplier", String::from("1")),
                ("start_date", start.to_string()),
                ("end_date", end.to_string()),
            ],
        )
    }

    pub fn financial_metrics(ticker: &Ticker, end: Day, period: Period, limit: usize) -> Self {
        Self::get(
            RecordFamily::FinancialMetrics,
            "/financial-metrics/",
            vec![
                ("ticker", ticker.to_string()),
                ("report_period_lte", end.to_string()),
                ("limit", limit.to_string()),
                ("period", period.to_string()),
            ],
        )
    }

    pub fn line_items(
        ticker: &Ticker,
        line_items: &[String],
        end: Day,
        period: Period,
        limit: usize,
    ) -> Self {
        Self {
            family: RecordFamily::LineItems,
            method: HttpMethod::Post,
            path: "/financials/search/line-items",
            query: Vec::new(),
            body: Some(serde_json::json!({
                "tickers": [ticker.as_str()],
                "line_items": line_items,
                "end_date": end.to_string(),
                "period": period.as_str(),
                "limit": limit,
            })),
        }
    }

    /// One page of insider trades filed on or before `cursor`.
    pub fn insider_trades(ticker: &Ticker, cursor: Day, start: Option<Day>, limit: usize) -> Self {
        let mut query = vec![
            ("ticker", ticker.to_string()),
            ("filing_date_lte", cursor.to_string()),
        ];
        if let Some(start) = start {
            query.push(("filing_date_gte", start.to_string()));
        }
        query.push(("limit", limit.to_string()));
        Self::get(RecordFamily::InsiderTrades, "/insider-trades/", query)
    }

    /// One page of news published on or before `cursor`.
    pub fn company_news(ticker: &Ticker, cursor: Day, start: Option<Day>, limit: usize) -> Self {
        let mut query = vec![
            ("ticker", ticker.to_string()),
            ("end_date", cursor.to_string()),
        ];
        if let Some(start) = start {
            query.push(("start_date", start.to_string()));
        }
        query.push(("limit", limit.to_string()));
        Self::get(RecordFamily::CompanyNews, "/news/", query)
    }

    fn get(family: RecordFamily, path: &'static str, query: Vec<(&'static str, String)>) -> Self {
        Self {
            family,
            method: HttpMethod::Get,
            path,
            query,
            body: None,
        }
    }

    pub fn endpoint(&self) -> &'static str {
        self.family.as_str()
    }

    pub fn url(&self, base_url: &str) -> String {
        let mut url = format!("{}{}", base_url.trim_end_matches('/'), self.path);
        if !self.query.is_empty() {
            let pairs = self
                .query
                .iter()
                .map(|(name, value)| format!("{name}={}", urlencoding::encode(value)))
                .collect::<Vec<_>>()
                .join("&");
            url.push('?');
            url.push_str(&pairs);
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticker() -> Ticker {
        Ticker::parse("AAPL").expect("valid ticker")
    }

    fn day(value: &str) -> Day {
        Day::parse(value).expect("valid day")
    }

    #[test]
    fn prices_url_carries_daily_interval_and_bounds() {
        let call = ApiCall::prices(&ticker(), day("2024-01-01"), day("2024-03-31"));

        assert_eq!(
            call.url("https://api.financialdatasets.ai/"),
            "https://api.financialdatasets.ai/prices/?ticker=AAPL&interval=day&interval_multiplier=1&start_date=2024-01-01&end_date=2024-03-31"
        );
        assert_eq!(call.method, HttpMethod::Get);
    }

    #[test]
    fn insider_trades_omit_lower_bound_when_unset() {
        let call = ApiCall::insider_trades(&ticker(), day("2024-05-01"), None, 1000);
        let url = call.url(DEFAULT_BASE_URL);

        assert!(url.contains("filing_date_lte=2024-05-01"));
        assert!(!url.contains("filing_date_gte"));
        assert!(url.ends_with("limit=1000"));
    }

    #[test]
    fn news_includes_start_when_set() {
        let call =
            ApiCall::company_news(&ticker(), day("2024-05-01"), Some(day("2024-01-01")), 50);
        let url = call.url(DEFAULT_BASE_URL);

        assert!(url.contains("/news/?ticker=AAPL&end_date=2024-05-01&start_date=2024-01-01"));
    }

    #[test]
    fn line_items_post_body_matches_search_contract() {
        let names = DEFAULT_LINE_ITEMS.map(String::from).to_vec();
        let call = ApiCall::line_items(&ticker(), &names, day("2023-12-31"), Period::Annual, 5);
        let body = call.body.as_ref().expect("line items use a json body");

        assert_eq!(call.method, HttpMethod::Post);
        assert_eq!(body["tickers"], serde_json::json!(["AAPL"]));
        assert_eq!(body["line_items"].as_array().map(Vec::len), Some(30));
        assert_eq!(body["end_date"], "2023-12-31");
        assert_eq!(body["period"], "annual");
        assert_eq!(body["limit"], 5);
        assert_eq!(
            call.url(DEFAULT_BASE_URL),
            "https://api.financialdatasets.ai/financials/search/line-items"
        );
    }
}
