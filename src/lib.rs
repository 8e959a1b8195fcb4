//! `taskdash-http` is the resilient HTTP client layer of the task dashboard.
//!
//! - [`ApiClient`] sends typed requests and unwraps the `{ success, data }`
//!   envelope.
//! - [`RequestInterceptor`] adds redacted logging, retry with jittered
//!   exponential backoff and error reporting.
//! - [`with_retry`] and friends are usable on any fallible async operation.
//!
//! ```no_run
//! use std::sync::Arc;
//! use taskdash_http::{ApiClient, InterceptorConfig, RequestInterceptor};
//!
//! # async fn run() -> taskdash_http::Result<()> {
//! let interceptor = Arc::new(RequestInterceptor::new(InterceptorConfig::default()));
//! let api = ApiClient::new_bearer("http://localhost:3000", "token").with_interceptor(interceptor);
//!
//! let providers: Vec<String> = api.get("/api/providers").await?;
//! # let _ = providers;
//! # Ok(())
//! # }
//! ```

mod client;
mod decode;
mod error;
mod interceptor;
mod options;
mod redact;
mod retry;
mod types;
mod wire;

pub use client::ApiClient;
pub use decode::INVALID_RESPONSE_CODE;
pub use error::{ClientError, TransportCause, INVALID_REQUEST_CODE};
pub use interceptor::{
    ErrorContext, ErrorStore, ErrorType, InterceptorConfig, LogSink, RequestInterceptor,
    Severity, TracingLogSink,
};
pub use options::{ClientOptions, DEFAULT_TIMEOUT_MS};
pub use redact::{
    redact_headers, redact_object_fields, redact_url_query, DEFAULT_SENSITIVE_FIELDS, DEFAULT_SENSITIVE_HEADERS,
    REDACTED,
};
pub use retry::{
    calculate_backoff_delay, should_retry_error, with_retry, with_retry_cancellable,
    with_retry_tracking, FailedAttempt, RetryOptions, RetryPredicate, RetryReport, RetryState,
    RetryTracker, DEFAULT_RETRYABLE_STATUS_CODES,
};
pub use tokio_util::sync::CancellationToken;
pub use types::{RequestContext, RequestOptions, ResponseContext};

pub type Result<T> = std::result::Result<T, ClientError>;
