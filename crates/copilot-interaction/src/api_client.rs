//! ApiClient - resilient HTTP client for the Copilot backend.
//!
//! Wraps every call with retry/backoff, content-type-aware decoding and
//! error normalization, and implements the domain endpoints
//! (`/api/health`, `/api/suggest`, `/api/chat`) on top of it.

use crate::normalize::normalize_reply;
use async_trait::async_trait;
use copilot_core::config::{ApiBase, AppConfig, RetryPolicy};
use copilot_core::error::{ApiError, is_transient_status};
use copilot_core::session::{ChatBackend, ChatRequest, HealthStatus, Message};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;

const HEALTH_PATH: &str = "/api/health";
const SUGGEST_PATH: &str = "/api/suggest";
const CHAT_PATH: &str = "/api/chat";

/// A decoded 2xx response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// The response announced a JSON content-type.
    Json(Value),
    /// Anything else, as raw text.
    Text(String),
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }
}

/// Method, body and headers of a single request.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
    pub headers: HeaderMap,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self {
            method: Method::GET,
            body: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn post(body: Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            headers: HeaderMap::new(),
        }
    }

    /// Adds a header. Names are case-insensitive.
    pub fn with_header(mut self, name: reqwest::header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// HTTP client bound to one API base.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    api_base: ApiBase,
    policy: RetryPolicy,
}

impl ApiClient {
    /// Creates a client with the default retry policy.
    pub fn new(api_base: ApiBase) -> Self {
        Self {
            client: Client::new(),
            api_base,
            policy: RetryPolicy::default(),
        }
    }

    /// Creates a client from a resolved configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.api_base.clone()).with_retry_policy(config.retry)
    }

    /// Creates a client from the process-wide configuration.
    pub fn from_global_config() -> Self {
        Self::from_config(AppConfig::global())
    }

    /// Overrides the retry policy used by the domain endpoints.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn api_base(&self) -> &ApiBase {
        &self.api_base
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Issues a request against `api_base + path`, retrying transient failures.
    ///
    /// Transport failures and 502/503/504 are retried up to
    /// `policy.max_retries` times with multiplicative backoff. Attempts are
    /// strictly sequential. Any other non-2xx fails immediately.
    pub async fn request(
        &self,
        path: &str,
        options: &RequestOptions,
        policy: &RetryPolicy,
    ) -> Result<ResponseBody, ApiError> {
        let url = self.api_base.join(path);
        let url = url.as_str();
        with_retries(url, options, policy, move || self.attempt(url, options)).await
    }

    /// Like [`request`](Self::request), but only reports the final status
    /// of a 2xx response. The body is never read.
    pub async fn request_status(
        &self,
        path: &str,
        options: &RequestOptions,
        policy: &RetryPolicy,
    ) -> Result<StatusCode, ApiError> {
        let url = self.api_base.join(path);
        let url = url.as_str();
        with_retries(url, options, policy, move || async move {
            self.send(url, options).await.map(|response| response.status())
        })
        .await
    }

    /// Sends one request and maps a non-2xx status to an error.
    async fn send(&self, url: &str, options: &RequestOptions) -> Result<Response, ApiError> {
        let mut headers = options.headers.clone();
        let mut builder = self.client.request(options.method.clone(), url);

        if let Some(body) = &options.body {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            let bytes = serde_json::to_vec(body)
                .map_err(|err| ApiError::decode(format!("Failed to encode request body: {err}")))?;
            builder = builder.body(bytes);
        }

        let response = builder
            .headers(headers)
            .send()
            .await
            .map_err(|err| ApiError::network(format!("Request to {url} failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body_text));
        }
        Ok(response)
    }

    async fn attempt(&self, url: &str, options: &RequestOptions) -> Result<ResponseBody, ApiError> {
        let response = self.send(url, options).await?;
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(is_json_content_type);

        let text = response
            .text()
            .await
            .map_err(|err| ApiError::network(format!("Failed to read response body: {err}")))?;

        if !is_json {
            return Ok(ResponseBody::Text(text));
        }
        if text.trim().is_empty() {
            return Ok(ResponseBody::Json(Value::Null));
        }
        serde_json::from_str(&text)
            .map(ResponseBody::Json)
            .map_err(|err| ApiError::decode(format!("Invalid JSON from {url}: {err}")))
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn get_health(&self) -> HealthStatus {
        match self
            .request_status(HEALTH_PATH, &RequestOptions::get(), &self.policy)
            .await
        {
            Ok(_) => HealthStatus::Ok,
            Err(err) => {
                tracing::warn!("[api] Health check failed: {err}");
                HealthStatus::Unavailable
            }
        }
    }

    async fn get_suggestions(&self) -> Vec<String> {
        match self.request(SUGGEST_PATH, &RequestOptions::get(), &self.policy).await {
            Ok(ResponseBody::Json(Value::Array(items))) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(text) => Some(text),
                    other => {
                        tracing::debug!("[api] Skipping non-string suggestion: {other}");
                        None
                    }
                })
                .collect(),
            Ok(other) => {
                tracing::debug!("[api] Suggestions response is not a JSON array: {other:?}");
                Vec::new()
            }
            Err(err) => {
                tracing::debug!("[api] Suggestions unavailable: {err}");
                Vec::new()
            }
        }
    }

    async fn post_chat(&self, request: &ChatRequest) -> Result<Message, ApiError> {
        let body = serde_json::to_value(request)
            .map_err(|err| ApiError::decode(format!("Failed to encode chat request: {err}")))?;
        let response = self
            .request(CHAT_PATH, &RequestOptions::post(body), &self.policy)
            .await?;
        Ok(normalize_reply(&response))
    }
}

/// Runs `attempt_once` until it succeeds, fails terminally or the retry
/// budget is spent.
async fn with_retries<T, F, Fut>(
    url: &str,
    options: &RequestOptions,
    policy: &RetryPolicy,
    mut attempt_once: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut retries_left = policy.max_retries;
    let mut backoff = policy.initial_backoff();
    let mut attempt = 1u32;

    loop {
        tracing::debug!(%url, method = %options.method, attempt, "[api] Sending request");
        match attempt_once().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && retries_left > 0 => {
                tracing::warn!(
                    %url,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "[api] Retrying after error: {err}"
                );
                tokio::time::sleep(backoff).await;
                backoff = policy.next_backoff(backoff);
                retries_left -= 1;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn is_json_content_type(value: &str) -> bool {
    let essence = value.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

/// Builds the error for a non-2xx response.
///
/// The message is the JSON `detail` field when present, else the raw body,
/// else the status reason phrase.
fn map_http_error(status: StatusCode, body: &str) -> ApiError {
    let message = extract_detail(body)
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .or_else(|| status.canonical_reason().map(str::to_string))
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    let status = status.as_u16();
    if is_transient_status(status) {
        tracing::debug!(status, "[api] Transient gateway status");
    }
    ApiError::http(status, message)
}

fn extract_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        Value::Null => None,
        Value::String(detail) if detail.trim().is_empty() => None,
        Value::String(detail) => Some(detail.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_detail_string() {
        assert_eq!(
            extract_detail(r#"{"detail":"Internal error"}"#).as_deref(),
            Some("Internal error")
        );
    }

    #[test]
    fn test_extract_detail_structured() {
        assert_eq!(
            extract_detail(r#"{"detail":[{"loc":["body"],"msg":"missing"}]}"#).as_deref(),
            Some(r#"[{"loc":["body"],"msg":"missing"}]"#)
        );
    }

    #[test]
    fn test_extract_detail_absent() {
        assert_eq!(extract_detail("not json"), None);
        assert_eq!(extract_detail(r#"{"error":"x"}"#), None);
        assert_eq!(extract_detail(r#"{"detail":""}"#), None);
    }

    #[test]
    fn test_map_http_error_fallbacks() {
        let err = map_http_error(StatusCode::BAD_REQUEST, "missing messages");
        assert_eq!(err, ApiError::http(400, "missing messages"));

        let err = map_http_error(StatusCode::INTERNAL_SERVER_ERROR, "  ");
        assert_eq!(err.user_message(), "Internal Server Error");

        let err = map_http_error(StatusCode::SERVICE_UNAVAILABLE, "");
        assert!(matches!(err, ApiError::TransientHttp { status: 503, .. }));
    }

    #[test]
    fn test_json_content_type_detection() {
        assert!(is_json_content_type("application/json"));
        assert!(is_json_content_type("Application/JSON; charset=utf-8"));
        assert!(is_json_content_type("application/problem+json"));
        assert!(!is_json_content_type("text/plain"));
        assert!(!is_json_content_type("text/html; charset=utf-8"));
    }
}
