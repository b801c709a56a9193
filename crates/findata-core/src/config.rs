//! Client configuration and environment loading.

use std::env;
use std::time::Duration;

use crate::cache::CacheMode;
use crate::endpoints::{DEFAULT_BASE_URL, DEFAULT_LINE_ITEMS};

pub const API_KEY_ENV: &str = "FINANCIAL_DATASETS_API_KEY";
pub const BASE_URL_ENV: &str = "FINANCIAL_DATASETS_BASE_URL";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(300);

/// Settings shared by every query a client issues.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    /// Sent as `X-API-KEY` when present.
    pub api_key: Option<String>,
    /// Bound on a single HTTP attempt.
    pub request_timeout: Duration,
    /// Bound on one logical query, retries and pagination included. `None` waits forever.
    pub query_timeout: Option<Duration>,
    pub cache_mode: CacheMode,
    /// Names requested when a line-item query does not list any.
    pub line_items: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            api_key: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            query_timeout: Some(DEFAULT_QUERY_TIMEOUT),
            cache_mode: CacheMode::Use,
            line_items: DEFAULT_LINE_ITEMS.iter().map(|name| (*name).to_owned()).collect(),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `FINANCIAL_DATASETS_API_KEY` and
    /// `FINANCIAL_DATASETS_BASE_URL`. A missing or blank key is not an error.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();
        config.api_key = non_blank(API_KEY_ENV);
        if let Some(base_url) = non_blank(BASE_URL_ENV) {
            config.base_url = base_url;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_match_provider() {
        let config = ClientConfig::default();

        assert_eq!(config.base_url, "https://api.financialdatasets.ai");
        assert_eq!(config.api_key, None);
        assert_eq!(config.query_timeout, Some(Duration::from_secs(300)));
        assert_eq!(config.cache_mode, CacheMode::Use);
        assert_eq!(config.line_items.len(), DEFAULT_LINE_ITEMS.len());
    }

    #[test]
    fn reads_key_and_base_url() {
        let config = ClientConfig::from_lookup(lookup(&[
            (API_KEY_ENV, "secret"),
            (BASE_URL_ENV, "http://localhost:8080"),
        ]));

        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.base_url, "http://localhost:8080");
    }

    #[test]
    fn blank_key_counts_as_absent() {
        let config = ClientConfig::from_lookup(lookup(&[(API_KEY_ENV, "   ")]));

        assert_eq!(config.api_key, None);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }
}
