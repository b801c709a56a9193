use std::fmt::{Display, Formatter};

use thiserror::Error;

/// Validation errors raised by domain types and request constructors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("ticker cannot be empty")]
    EmptyTicker,
    #[error("ticker length {len} exceeds max {max}")]
    TickerTooLong { len: usize, max: usize },
    #[error("ticker must start with an ASCII letter: '{ch}'")]
    TickerInvalidStart { ch: char },
    #[error("ticker contains invalid character '{ch}' at index {index}")]
    TickerInvalidChar { ch: char, index: usize },

    #[error("date must be an ISO-8601 calendar day (YYYY-MM-DD): '{value}'")]
    InvalidDay { value: String },
    #[error("invalid period '{value}', expected one of annual, quarterly, ttm")]
    InvalidPeriod { value: String },

    #[error("start date {start} is after end date {end}")]
    InvertedRange { start: String, end: String },
    #[error("limit must be greater than zero")]
    ZeroLimit,
    #[error("line item list cannot be empty")]
    EmptyLineItems,
}

/// Classification of a failed fetch.
///
/// An empty provider answer (HTTP 404 or an empty array) is not represented
/// here: it is returned as an empty record list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Non-2xx status other than 404, or a transport failure.
    Transient,
    /// The payload did not match the expected record schema.
    Decode,
    InvalidRequest,
    Cancelled,
    TimedOut,
    RetriesExhausted,
}

/// Structured error returned by the fetcher, paginator and query façade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    kind: FetchErrorKind,
    message: String,
    status: Option<u16>,
}

impl FetchError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Transient,
            message: message.into(),
            status: None,
        }
    }

    pub fn status(status: u16, endpoint: &str) -> Self {
        Self {
            kind: FetchErrorKind::Transient,
            message: format!("{endpoint} returned status {status}"),
            status: Some(status),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Decode,
            message: message.into(),
            status: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::InvalidRequest,
            message: message.into(),
            status: None,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            kind: FetchErrorKind::Cancelled,
            message: String::from("query was cancelled by the caller"),
            status: None,
        }
    }

    pub fn timed_out(after_ms: u128) -> Self {
        Self {
            kind: FetchErrorKind::TimedOut,
            message: format!("query did not complete within {after_ms}ms"),
            status: None,
        }
    }

    pub fn retries_exhausted(attempts: u32, last: &FetchError) -> Self {
        Self {
            kind: FetchErrorKind::RetriesExhausted,
            message: format!("gave up after {attempts} attempts: {}", last.message),
            status: last.status,
        }
    }

    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status that caused the failure, when there was one.
    pub const fn http_status(&self) -> Option<u16> {
        self.status
    }

    pub const fn is_transient(&self) -> bool {
        matches!(self.kind, FetchErrorKind::Transient)
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            FetchErrorKind::Transient => "fetch.transient",
            FetchErrorKind::Decode => "fetch.decode",
            FetchErrorKind::InvalidRequest => "fetch.invalid_request",
            FetchErrorKind::Cancelled => "fetch.cancelled",
            FetchErrorKind::TimedOut => "fetch.timed_out",
            FetchErrorKind::RetriesExhausted => "fetch.retries_exhausted",
        }
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for FetchError {}

impl From<ValidationError> for FetchError {
    fn from(value: ValidationError) -> Self {
        Self::invalid_request(value.to_string())
    }
}

/// Failure while loading or saving a cache snapshot.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("cache snapshot i/o failed for '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cache snapshot is not valid json: {0}")]
    Format(#[from] serde_json::Error),
    #[error("unsupported cache snapshot version {found}, expected {expected}")]
    Version { found: u32, expected: u32 },
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("price frame conversion failed: {0}")]
    Frame(#[from] polars::error::PolarsError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_marked_transient() {
        assert!(FetchError::status(503, "prices").is_transient());
        assert!(FetchError::transient("connection reset").is_transient());
        assert!(!FetchError::decode("missing field").is_transient());
        assert!(!FetchError::cancelled().is_transient());
    }

    #[test]
    fn exhausted_error_keeps_last_status() {
        let last = FetchError::status(502, "financial-metrics");
        let error = FetchError::retries_exhausted(3, &last);

        assert_eq!(error.kind(), FetchErrorKind::RetriesExhausted);
        assert_eq!(error.http_status(), Some(502));
        assert!(error.message().contains("3 attempts"));
        assert_eq!(error.code(), "fetch.retries_exhausted");
    }

    #[test]
    fn validation_error_converts_to_invalid_request() {
        let error = FetchError::from(ValidationError::ZeroLimit);
        assert_eq!(error.kind(), FetchErrorKind::InvalidRequest);
        assert!(error.message().contains("limit"));
    }
}
