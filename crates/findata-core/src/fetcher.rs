//! Single provider call: credential header, status classification, decode.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::endpoints::ApiCall;
use crate::http_client::{HttpAuth, HttpClient, HttpMethod, HttpRequest};
use crate::retry::RetryPolicy;
use crate::{FetchError, Record};

const MAX_LOGGED_BODY: usize = 256;

/// Issues provider calls and turns responses into typed record batches.
///
/// | Outcome | Result |
/// |---------|--------|
/// | 2xx with records | `Ok(records)` |
/// | 2xx with `[]`/`null`, or 404 | `Ok(vec![])` |
/// | other status, transport failure | [`FetchErrorKind::Transient`](crate::FetchErrorKind), retried |
/// | 2xx with a malformed body | [`FetchErrorKind::Decode`](crate::FetchErrorKind) |
#[derive(Clone)]
pub struct Fetcher {
    http_client: Arc<dyn HttpClient>,
    auth: HttpAuth,
    base_url: String,
    request_timeout: Duration,
    retry: RetryPolicy,
}

impl Fetcher {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        auth: HttpAuth,
        base_url: impl Into<String>,
        request_timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http_client,
            auth,
            base_url: base_url.into(),
            request_timeout,
            retry,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Fetch and decode one call, retrying per the policy.
    pub async fn fetch<T: Record>(
        &self,
        call: &ApiCall,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, FetchError> {
        self.retry
            .run(cancel, call.endpoint(), || self.attempt::<T>(call))
            .await
    }

    /// One attempt without retry.
    pub async fn attempt<T: Record>(&self, call: &ApiCall) -> Result<Vec<T>, FetchError> {
        let request = self.build_request(call);
        let endpoint = call.endpoint();

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|error| {
                if error.retryable() {
                    FetchError::transient(format!(
                        "{endpoint} transport error: {}",
                        error.message()
                    ))
                } else {
                    FetchError::invalid_request(format!(
                        "{endpoint} request rejected before sending: {}",
                        error.message()
                    ))
                }
            })?;

        if response.is_not_found() {
            debug!(endpoint, "provider has no records for query");
            return Ok(Vec::new());
        }

        if !response.is_success() {
            warn!(
                endpoint,
                status = response.status,
                body = %truncate(&response.body, MAX_LOGGED_BODY),
                "provider returned error status"
            );
            return Err(FetchError::status(response.status, endpoint));
        }

        let records = decode_records::<T>(&response.body)?;
        debug!(endpoint, count = records.len(), "decoded provider page");
        Ok(records)
    }

    fn build_request(&self, call: &ApiCall) -> HttpRequest {
        let url = call.url(&self.base_url);
        let request = match call.method {
            HttpMethod::Get => HttpRequest::get(url),
            HttpMethod::Post => HttpRequest::post(url),
        };
        let request = match &call.body {
            Some(body) => request.with_json_body(body),
            None => request,
        };

        request
            .with_auth(&self.auth)
            .with_timeout_ms(u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX))
    }
}

/// Decode a response body into records of type `T`.
///
/// The body must be a JSON object carrying the family's array field; a
/// `null` field decodes as no records.
pub fn decode_records<T: Record>(body: &str) -> Result<Vec<T>, FetchError> {
    let family = T::FAMILY;
    let mut payload: serde_json::Map<String, Value> = serde_json::from_str(body)
        .map_err(|e| FetchError::decode(format!("{family} response is not a json object: {e}")))?;

    match payload.remove(family.response_field()) {
        None => Err(FetchError::decode(format!(
            "{family} response is missing field '{}'",
            family.response_field()
        ))),
        Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value::<Vec<T>>(value)
            .map_err(|e| FetchError::decode(format!("{family} records do not match schema: {e}"))),
    }
}

fn truncate(body: &str, max: usize) -> &str {
    match body.char_indices().nth(max) {
        Some((index, _)) => &body[..index],
        None => body,
    }
}
