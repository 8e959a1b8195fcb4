use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header;
use serde::{de::DeserializeOwned, Serialize};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::{
    decode::{decode_envelope, decode_error_response},
    error::INVALID_REQUEST_CODE,
    retry::{with_retry_cancellable, RetryOptions},
    types::now_millis,
    ClientError, ClientOptions, RequestContext, RequestInterceptor, RequestOptions,
    ResponseContext, Result,
};

#[derive(Clone)]
/// Typed HTTP client for the task dashboard API.
///
/// Responses follow the `{ success, data, error }` envelope; `data` is
/// deserialized into the caller's type. Every failure is one of the
/// [`ClientError`] variants.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    authorization: Option<String>,
    options: ClientOptions,
    interceptor: Option<Arc<RequestInterceptor>>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field(
                "authorization",
                &self.authorization.as_ref().map(|_| "<redacted>"),
            )
            .field("options", &self.options)
            .field("interceptor", &self.interceptor.is_some())
            .finish()
    }
}

impl ApiClient {
    /// Creates an unauthenticated client for `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            authorization: None,
            options: ClientOptions::default(),
            interceptor: None,
        }
    }

    /// Creates a client that sends `Authorization: <authorization>` verbatim.
    pub fn new_raw_auth(base_url: impl Into<String>, authorization: impl Into<String>) -> Self {
        let mut client = Self::new(base_url);
        client.authorization = Some(authorization.into());
        client
    }

    /// Creates a client from a bearer token.
    ///
    /// If the token is missing the `Bearer ` prefix, it is added automatically.
    pub fn new_bearer(base_url: impl Into<String>, token: impl AsRef<str>) -> Self {
        let authorization = normalize_bearer_authorization(token.as_ref());
        Self::new_raw_auth(base_url, authorization)
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `TASKDASH_API_URL`: base URL of the dashboard API (required)
    /// - `TASKDASH_API_TOKEN`: bearer token (optional)
    /// - `TASKDASH_TIMEOUT_MS`: request timeout in milliseconds (optional)
    ///
    /// # Example
    ///
    /// ```no_run
    /// use taskdash_http::ApiClient;
    ///
    /// let api = ApiClient::from_env().expect("missing TASKDASH_API_URL");
    /// ```
    pub fn from_env() -> std::result::Result<Self, String> {
        let url = std::env::var("TASKDASH_API_URL")
            .map_err(|_| "missing TASKDASH_API_URL environment variable".to_owned())?;
        if url.trim().is_empty() {
            return Err("TASKDASH_API_URL is set but empty".to_owned());
        }

        let mut client = match std::env::var("TASKDASH_API_TOKEN") {
            Ok(token) if !token.trim().is_empty() => Self::new_bearer(url.trim(), token),
            _ => Self::new(url.trim()),
        };

        if let Ok(raw) = std::env::var("TASKDASH_TIMEOUT_MS") {
            let timeout_ms = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| format!("TASKDASH_TIMEOUT_MS is not a number: '{raw}'"))?;
            client.options.timeout_ms = timeout_ms;
        }

        Ok(client)
    }

    /// Applies client options such as timeout and user agent.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.options = opts;
        self
    }

    /// Routes every request through `interceptor`: redacted logging, retry
    /// and error reporting. Without one each request is a single attempt.
    pub fn with_interceptor(mut self, interceptor: Arc<RequestInterceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Sends a request and decodes the envelope's `data` into `T`.
    ///
    /// `url` may be absolute or relative to the base URL.
    pub async fn request<T: DeserializeOwned>(&self, url: &str, options: RequestOptions) -> Result<T> {
        self.dispatch(url, options, None).await
    }

    /// [`Self::request`] that stops with [`ClientError::Cancelled`] as soon
    /// as `cancel` fires, including between retry attempts.
    pub async fn request_cancellable<T: DeserializeOwned>(
        &self,
        url: &str,
        options: RequestOptions,
        cancel: &CancellationToken,
    ) -> Result<T> {
        self.dispatch(url, options, Some(cancel)).await
    }

    pub async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.request(url, RequestOptions::get()).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<T> {
        self.request(url, RequestOptions::post(encode_body(body)?)).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<T> {
        self.request(url, RequestOptions::put(encode_body(body)?)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.request(url, RequestOptions::delete()).await
    }

    async fn dispatch<T: DeserializeOwned>(
        &self,
        url: &str,
        options: RequestOptions,
        cancel: Option<&CancellationToken>,
    ) -> Result<T> {
        let url = self.resolve_url(url);
        let context = self.request_context(&url, &options);
        let attempt = || self.send_once::<T>(&url, &options, &context);

        match (&self.interceptor, cancel) {
            (Some(interceptor), Some(cancel)) => {
                interceptor
                    .intercept_cancellable(attempt, &context, cancel)
                    .await
            }
            (Some(interceptor), None) => interceptor.intercept(attempt, &context).await,
            (None, Some(cancel)) => {
                with_retry_cancellable(attempt, &RetryOptions::no_retry(), cancel).await
            }
            (None, None) => attempt().await,
        }
    }

    /// One HTTP exchange. The timeout covers sending, headers and body;
    /// when it fires the in-flight request is dropped.
    async fn send_once<T: DeserializeOwned>(
        &self,
        url: &str,
        options: &RequestOptions,
        context: &RequestContext,
    ) -> Result<T> {
        let limit = Duration::from_millis(options.timeout_ms.unwrap_or(self.options.timeout_ms));
        let started = Instant::now();
        let response_logger = self
            .interceptor
            .as_deref()
            .filter(|interceptor| interceptor.config().log_responses);

        let exchange = async {
            let response = self.build_request(url, options).send().await?;
            let status = response.status();
            let headers = response_logger.map(|_| header_map_to_btree(response.headers()));
            let body = response.text().await?;
            Ok::<_, ClientError>((status, headers, body))
        };

        let (status, headers, body) = match timeout(limit, exchange).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ClientError::timeout(format!(
                    "Request timed out after {}ms",
                    limit.as_millis()
                )))
            }
        };

        if let Some(interceptor) = response_logger {
            interceptor.log_response(
                context,
                &ResponseContext {
                    status: status.as_u16(),
                    status_text: status.canonical_reason().unwrap_or_default().to_owned(),
                    headers,
                    body: serde_json::from_str(&body).ok(),
                    timestamp: now_millis(),
                    duration_ms: started.elapsed().as_millis() as u64,
                },
            );
        }

        if !status.is_success() {
            return Err(decode_error_response(status, &body));
        }

        decode_envelope(status, &body)
    }

    fn build_request(&self, url: &str, options: &RequestOptions) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(options.method.clone(), url)
            .header(header::ACCEPT, "application/json")
            .header(header::USER_AGENT, &self.options.user_agent);

        if let Some(authorization) = &self.authorization {
            builder = builder.header(header::AUTHORIZATION, authorization);
        }
        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &options.body {
            builder = builder.json(body);
        }
        builder
    }

    fn request_context(&self, url: &str, options: &RequestOptions) -> RequestContext {
        let mut headers = BTreeMap::new();
        if let Some(authorization) = &self.authorization {
            headers.insert(header::AUTHORIZATION.as_str().to_owned(), authorization.clone());
        }
        headers.extend(options.headers.clone());

        let mut context =
            RequestContext::new(options.method.as_str(), url).with_headers(headers);
        if let Some(body) = &options.body {
            context = context.with_body(body.clone());
        }
        context
    }

    fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_owned();
        }
        let base = self.base_url.trim_end_matches('/');
        let path = url.trim_start_matches('/');
        if path.is_empty() {
            base.to_owned()
        } else {
            format!("{base}/{path}")
        }
    }
}

fn encode_body<B: Serialize + ?Sized>(body: &B) -> Result<serde_json::Value> {
    serde_json::to_value(body).map_err(|err| {
        ClientError::api(format!("Failed to serialize request body: {err}"), 0)
            .with_code(INVALID_REQUEST_CODE)
    })
}

fn header_map_to_btree(headers: &header::HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_owned(), value.to_owned()))
        })
        .collect()
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_bearer_authorization, ApiClient};

    #[test]
    fn normalize_bearer_adds_prefix_when_missing() {
        assert_eq!(
            normalize_bearer_authorization("abc123"),
            "Bearer abc123".to_owned()
        );
    }

    #[test]
    fn normalize_bearer_keeps_existing_prefix() {
        assert_eq!(
            normalize_bearer_authorization("bEaReR abc123"),
            "bEaReR abc123".to_owned()
        );
    }

    #[test]
    fn debug_redacts_authorization_value() {
        let client = ApiClient::new_bearer("http://localhost:3000", "secret-token");
        let debug = format!("{client:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn relative_urls_join_base() {
        let client = ApiClient::new("http://localhost:3000/");
        assert_eq!(client.resolve_url("/api/tasks"), "http://localhost:3000/api/tasks");
        assert_eq!(client.resolve_url("api/tasks"), "http://localhost:3000/api/tasks");
        assert_eq!(
            client.resolve_url("https://other.example/api"),
            "https://other.example/api"
        );
    }

    #[test]
    fn request_context_carries_auth_for_redaction() {
        let client = ApiClient::new_bearer("http://localhost:3000", "tok");
        let context = client.request_context(
            "http://localhost:3000/api/execute",
            &crate::RequestOptions::post(serde_json::json!({ "prompt": "hi" })),
        );
        assert_eq!(context.method, "POST");
        let headers = context.headers.expect("headers");
        assert_eq!(headers["authorization"], "Bearer tok");
        assert_eq!(context.body, Some(serde_json::json!({ "prompt": "hi" })));
    }
}
