//! Request interceptor: redacted request/response logging, retry execution
//! and translation of final errors into UI-facing [`ErrorContext`] records.
//!
//! Construct one [`RequestInterceptor`] at startup and share it behind an
//! `Arc`; there is no process-wide instance.

use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    redact::{
        redact_headers, redact_object_fields, redact_url_query, DEFAULT_SENSITIVE_FIELDS,
        DEFAULT_SENSITIVE_HEADERS,
    },
    retry::{with_retry, with_retry_cancellable, RetryOptions},
    types::{now_millis, RequestContext, ResponseContext},
    ClientError, Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Validation,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// Trace of an outbound request.
    Request,
    /// Trace of a received response, or an application-level failure
    /// reported with a non-error status.
    Response,
    Validation,
    Authentication,
    Authorization,
    NotFound,
    RateLimit,
    Server,
    Timeout,
    Network,
    Parse,
    Cancelled,
}

/// Record handed to a [`LogSink`] or [`ErrorStore`]. Built only from
/// redacted data.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    pub code: String,
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub severity: Severity,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// What the user was doing, e.g. `POST http://host/api/execute`.
    pub user_action: String,
    pub recoverable: bool,
    pub suggested_actions: Vec<String>,
    pub is_development: bool,
    /// Redacted request/response snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Destination for request traces and error records.
pub trait LogSink: Send + Sync {
    fn log(&self, entry: &ErrorContext);
}

/// UI-facing error store. Takes ownership of each record.
///
/// Failures, including panics, are caught by the interceptor and never
/// reach the caller.
pub trait ErrorStore: Send + Sync {
    fn add_error(
        &self,
        context: ErrorContext,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Emits records as `tracing` events at a level matching their severity.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, entry: &ErrorContext) {
        let details = entry
            .details
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_default();

        match entry.severity {
            Severity::Info => info!(
                code = %entry.code,
                action = %entry.user_action,
                details = %details,
                "{}",
                entry.message
            ),
            Severity::Warning | Severity::Validation => warn!(
                code = %entry.code,
                error_type = ?entry.error_type,
                action = %entry.user_action,
                recoverable = entry.recoverable,
                details = %details,
                "{}",
                entry.message
            ),
            Severity::Error => error!(
                code = %entry.code,
                error_type = ?entry.error_type,
                action = %entry.user_action,
                recoverable = entry.recoverable,
                details = %details,
                "{}",
                entry.message
            ),
        }
    }
}

#[derive(Clone, Debug)]
pub struct InterceptorConfig {
    pub log_requests: bool,
    pub log_responses: bool,
    pub log_errors: bool,
    /// Attach redacted request snapshots to error records.
    pub is_development: bool,
    /// Header names redacted before logging, matched case-insensitively.
    pub sensitive_headers: Vec<String>,
    /// Body keys redacted at any depth, matched case-insensitively.
    pub sensitive_fields: Vec<String>,
    pub retry: RetryOptions,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            log_requests: true,
            log_responses: true,
            log_errors: true,
            is_development: cfg!(debug_assertions),
            sensitive_headers: DEFAULT_SENSITIVE_HEADERS.map(str::to_owned).to_vec(),
            sensitive_fields: DEFAULT_SENSITIVE_FIELDS.map(str::to_owned).to_vec(),
            retry: RetryOptions::default(),
        }
    }
}

pub struct RequestInterceptor {
    config: InterceptorConfig,
    log_sink: Arc<dyn LogSink>,
    error_store: Option<Arc<dyn ErrorStore>>,
}

impl fmt::Debug for RequestInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestInterceptor")
            .field("config", &self.config)
            .field("error_store", &self.error_store.is_some())
            .finish()
    }
}

impl Default for RequestInterceptor {
    fn default() -> Self {
        Self::new(InterceptorConfig::default())
    }
}

impl RequestInterceptor {
    /// Creates an interceptor logging through [`TracingLogSink`] with no
    /// error store attached.
    pub fn new(config: InterceptorConfig) -> Self {
        Self {
            config,
            log_sink: Arc::new(TracingLogSink),
            error_store: None,
        }
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = sink;
        self
    }

    pub fn with_error_store(mut self, store: Arc<dyn ErrorStore>) -> Self {
        self.error_store = Some(store);
        self
    }

    pub fn config(&self) -> &InterceptorConfig {
        &self.config
    }

    /// Logs `request`, then runs `request_fn` under the configured retry
    /// options. The final error, if any, goes through [`Self::handle_error`].
    pub async fn intercept<F, Fut, T>(&self, request_fn: F, request: &RequestContext) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.log_request(request);
        let started = Instant::now();
        let outcome = with_retry(request_fn, &self.config.retry).await;
        self.finish(outcome, request, started)
    }

    /// [`Self::intercept`] with a cancellation token threaded into the
    /// retry loop.
    pub async fn intercept_cancellable<F, Fut, T>(
        &self,
        request_fn: F,
        request: &RequestContext,
        cancel: &CancellationToken,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.log_request(request);
        let started = Instant::now();
        let outcome = with_retry_cancellable(request_fn, &self.config.retry, cancel).await;
        self.finish(outcome, request, started)
    }

    fn finish<T>(&self, outcome: Result<T>, request: &RequestContext, started: Instant) -> Result<T> {
        match outcome {
            Ok(value) => {
                debug!(
                    method = %request.method,
                    url = %redact_url_query(&request.url, &self.config.sensitive_fields),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "request completed"
                );
                Ok(value)
            }
            Err(err) => {
                self.handle_error(&err, request);
                Err(err)
            }
        }
    }

    /// Copy of `request` with sensitive headers, query parameters and body
    /// fields redacted.
    pub fn redact_request(&self, request: &RequestContext) -> RequestContext {
        RequestContext {
            url: redact_url_query(&request.url, &self.config.sensitive_fields),
            method: request.method.clone(),
            headers: request
                .headers
                .as_ref()
                .map(|headers| redact_headers(headers, &self.config.sensitive_headers)),
            body: request
                .body
                .as_ref()
                .map(|body| redact_object_fields(body, &self.config.sensitive_fields)),
            timestamp: request.timestamp,
        }
    }

    pub fn redact_response(&self, response: &ResponseContext) -> ResponseContext {
        ResponseContext {
            status: response.status,
            status_text: response.status_text.clone(),
            headers: response
                .headers
                .as_ref()
                .map(|headers| redact_headers(headers, &self.config.sensitive_headers)),
            body: response
                .body
                .as_ref()
                .map(|body| redact_object_fields(body, &self.config.sensitive_fields)),
            timestamp: response.timestamp,
            duration_ms: response.duration_ms,
        }
    }

    pub fn log_request(&self, request: &RequestContext) {
        if !self.config.log_requests {
            return;
        }
        let redacted = self.redact_request(request);
        let action = user_action(&redacted);
        self.log_sink.log(&ErrorContext {
            code: "REQUEST".to_owned(),
            message: format!("-> {action}"),
            error_type: ErrorType::Request,
            severity: Severity::Info,
            timestamp: redacted.timestamp,
            user_action: action,
            recoverable: true,
            suggested_actions: Vec::new(),
            is_development: self.config.is_development,
            details: Some(request_snapshot(&redacted)),
        });
    }

    pub fn log_response(&self, request: &RequestContext, response: &ResponseContext) {
        if !self.config.log_responses {
            return;
        }
        let redacted = self.redact_response(response);
        let action = user_action(&self.redact_request(request));
        self.log_sink.log(&ErrorContext {
            code: "RESPONSE".to_owned(),
            message: format!(
                "<- {action} {} {} ({}ms)",
                redacted.status, redacted.status_text, redacted.duration_ms
            ),
            error_type: ErrorType::Response,
            severity: Severity::Info,
            timestamp: redacted.timestamp,
            user_action: action,
            recoverable: true,
            suggested_actions: Vec::new(),
            is_development: self.config.is_development,
            details: Some(json!({
                "status": redacted.status,
                "statusText": redacted.status_text,
                "headers": redacted.headers,
                "body": redacted.body,
                "durationMs": redacted.duration_ms,
            })),
        });
    }

    /// Classifies `error`, logs it and pushes it to the error store.
    ///
    /// Never fails: store errors and panics are logged and swallowed.
    pub fn handle_error(&self, error: &ClientError, request: &RequestContext) {
        let context = self.classify_error(error, request);

        if self.config.log_errors {
            self.log_sink.log(&context);
        }

        let Some(store) = &self.error_store else {
            return;
        };
        match catch_unwind(AssertUnwindSafe(|| store.add_error(context))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(error = %err, "failed to push error to error store"),
            Err(_) => error!("error store panicked while adding an error"),
        }
    }

    /// Translates `error` into an [`ErrorContext`] without side effects.
    pub fn classify_error(&self, error: &ClientError, request: &RequestContext) -> ErrorContext {
        let class = classify(error, &self.config.retry);
        let redacted = self.redact_request(request);

        let details = self.config.is_development.then(|| {
            let error_details = match error {
                ClientError::Api {
                    details: Some(details),
                    ..
                } => Some(redact_object_fields(details, &self.config.sensitive_fields)),
                _ => None,
            };
            json!({
                "request": request_snapshot(&redacted),
                "error": error_details,
            })
        });

        ErrorContext {
            code: class.code,
            message: error.message().to_owned(),
            error_type: class.error_type,
            severity: class.severity,
            timestamp: now_millis(),
            user_action: user_action(&redacted),
            recoverable: class.recoverable,
            suggested_actions: class.actions.iter().map(|a| (*a).to_owned()).collect(),
            is_development: self.config.is_development,
            details,
        }
    }
}

const RETRY: &str = "Retry the request";
const CHECK_CONNECTION: &str = "Check your internet connection";
const CONTACT_SUPPORT: &str = "Contact support if the problem persists";

const RETRY_ONLY: &[&str] = &[RETRY];
const RETRY_OR_SUPPORT: &[&str] = &[RETRY, CONTACT_SUPPORT];
const SIGN_IN: &[&str] = &["Sign in again", "Check your API credentials"];
const ACCESS: &[&str] = &["Check that your account can access this resource", CONTACT_SUPPORT];
const CHECK_RESOURCE: &[&str] = &["Check that the requested resource exists"];
const SLOW_DOWN: &[&str] = &["Wait a moment before retrying", RETRY];
const CHECK_INPUT: &[&str] = &["Check your input and try again"];

struct Classification {
    code: String,
    error_type: ErrorType,
    severity: Severity,
    recoverable: bool,
    actions: &'static [&'static str],
}

fn classify(error: &ClientError, retry: &RetryOptions) -> Classification {
    match error {
        ClientError::Timeout { .. } => Classification {
            code: "TIMEOUT".to_owned(),
            error_type: ErrorType::Timeout,
            severity: Severity::Warning,
            recoverable: true,
            actions: &[RETRY, CHECK_CONNECTION],
        },
        ClientError::Network { .. } => Classification {
            code: "NETWORK_ERROR".to_owned(),
            error_type: ErrorType::Network,
            severity: Severity::Error,
            recoverable: true,
            actions: &[CHECK_CONNECTION, RETRY],
        },
        ClientError::Cancelled => Classification {
            code: "CANCELLED".to_owned(),
            error_type: ErrorType::Cancelled,
            severity: Severity::Info,
            recoverable: true,
            actions: RETRY_ONLY,
        },
        ClientError::Api { status, code, .. } => {
            let status = *status;
            let code = code.clone().unwrap_or_else(|| match status {
                0 => "PARSE_ERROR".to_owned(),
                _ => format!("HTTP_{status}"),
            });
            let retryable = retry.retryable_status_codes.contains(&status);
            let (error_type, severity, recoverable, actions) = match status {
                0 => (ErrorType::Parse, Severity::Error, false, RETRY_OR_SUPPORT),
                401 => (ErrorType::Authentication, Severity::Error, true, SIGN_IN),
                403 => (ErrorType::Authorization, Severity::Error, false, ACCESS),
                404 => (ErrorType::NotFound, Severity::Validation, false, CHECK_RESOURCE),
                408 => (ErrorType::Timeout, Severity::Validation, true, RETRY_ONLY),
                429 => (ErrorType::RateLimit, Severity::Validation, true, SLOW_DOWN),
                400..=499 => (ErrorType::Validation, Severity::Validation, retryable, CHECK_INPUT),
                500..=599 => (ErrorType::Server, Severity::Error, retryable, RETRY_OR_SUPPORT),
                _ => (ErrorType::Response, Severity::Validation, false, CHECK_INPUT),
            };
            Classification {
                code,
                error_type,
                severity,
                recoverable,
                actions,
            }
        }
    }
}

fn user_action(request: &RequestContext) -> String {
    format!("{} {}", request.method, request.url)
}

fn request_snapshot(redacted: &RequestContext) -> Value {
    json!({
        "method": redacted.method,
        "url": redacted.url,
        "headers": redacted.headers,
        "body": redacted.body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        entries: Mutex<Vec<ErrorContext>>,
    }

    impl Recorder {
        fn entries(&self) -> Vec<ErrorContext> {
            self.entries.lock().unwrap().clone()
        }
    }

    impl LogSink for Recorder {
        fn log(&self, entry: &ErrorContext) {
            self.entries.lock().unwrap().push(entry.clone());
        }
    }

    impl ErrorStore for Recorder {
        fn add_error(
            &self,
            context: ErrorContext,
        ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.entries.lock().unwrap().push(context);
            Ok(())
        }
    }

    struct FailingStore;

    impl ErrorStore for FailingStore {
        fn add_error(
            &self,
            _context: ErrorContext,
        ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Err("store offline".into())
        }
    }

    struct PanickingStore;

    impl ErrorStore for PanickingStore {
        fn add_error(
            &self,
            _context: ErrorContext,
        ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            panic!("store exploded")
        }
    }

    fn request() -> RequestContext {
        let headers = BTreeMap::from([
            ("Authorization".to_owned(), "Bearer sk-live-123".to_owned()),
            ("Accept".to_owned(), "application/json".to_owned()),
        ]);
        RequestContext::new("POST", "http://localhost/api/execute")
            .with_headers(headers)
            .with_body(json!({ "prompt": "hi", "auth": { "apiKey": "key-456" } }))
    }

    fn dev_config() -> InterceptorConfig {
        InterceptorConfig {
            is_development: true,
            ..InterceptorConfig::default()
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryOptions {
        RetryOptions::default()
            .with_max_attempts(max_attempts)
            .with_initial_delay_ms(1)
            .with_jitter_factor(0.0)
    }

    #[test]
    fn request_log_never_contains_secrets() {
        let sink = Arc::new(Recorder::default());
        let interceptor = RequestInterceptor::new(dev_config()).with_log_sink(sink.clone());

        interceptor.log_request(&request());

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        let serialized = serde_json::to_string(&entries[0]).unwrap();
        assert!(!serialized.contains("sk-live-123"));
        assert!(!serialized.contains("key-456"));
        assert!(serialized.contains("[REDACTED]"));
        assert_eq!(entries[0].severity, Severity::Info);
        assert_eq!(entries[0].user_action, "POST http://localhost/api/execute");
    }

    #[test]
    fn query_credentials_are_redacted_in_error_records() {
        let sink = Arc::new(Recorder::default());
        let interceptor = RequestInterceptor::new(dev_config()).with_log_sink(sink.clone());
        let request = RequestContext::new("GET", "http://localhost/api/tasks?page=2&token=sk-q-789");

        interceptor.handle_error(&ClientError::network("down"), &request);

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].user_action,
            "GET http://localhost/api/tasks?page=2&token=[REDACTED]"
        );
        let serialized = serde_json::to_string(&entries[0]).unwrap();
        assert!(!serialized.contains("sk-q-789"));
    }

    #[test]
    fn disabled_request_logging_emits_nothing() {
        let sink = Arc::new(Recorder::default());
        let config = InterceptorConfig {
            log_requests: false,
            log_responses: false,
            ..InterceptorConfig::default()
        };
        let interceptor = RequestInterceptor::new(config).with_log_sink(sink.clone());

        interceptor.log_request(&request());
        interceptor.log_response(
            &request(),
            &ResponseContext {
                status: 200,
                status_text: "OK".to_owned(),
                headers: None,
                body: None,
                timestamp: 0,
                duration_ms: 3,
            },
        );

        assert!(sink.entries().is_empty());
    }

    #[test]
    fn response_body_is_redacted() {
        let sink = Arc::new(Recorder::default());
        let interceptor = RequestInterceptor::default().with_log_sink(sink.clone());

        interceptor.log_response(
            &request(),
            &ResponseContext {
                status: 200,
                status_text: "OK".to_owned(),
                headers: Some(BTreeMap::from([("Set-Cookie".to_owned(), "a=b".to_owned())])),
                body: Some(json!({ "success": true, "data": { "accessToken": "at-789" } })),
                timestamp: 0,
                duration_ms: 12,
            },
        );

        let serialized = serde_json::to_string(&sink.entries()[0]).unwrap();
        assert!(!serialized.contains("at-789"));
    }

    #[test]
    fn classification_by_status() {
        let interceptor = RequestInterceptor::default();
        let req = request();

        let cases = [
            (400, ErrorType::Validation, Severity::Validation, false),
            (401, ErrorType::Authentication, Severity::Error, true),
            (403, ErrorType::Authorization, Severity::Error, false),
            (404, ErrorType::NotFound, Severity::Validation, false),
            (422, ErrorType::Validation, Severity::Validation, false),
            (429, ErrorType::RateLimit, Severity::Validation, true),
            (500, ErrorType::Server, Severity::Error, true),
            (501, ErrorType::Server, Severity::Error, false),
            (503, ErrorType::Server, Severity::Error, true),
            (0, ErrorType::Parse, Severity::Error, false),
        ];

        for (status, error_type, severity, recoverable) in cases {
            let ctx = interceptor.classify_error(&ClientError::api("failed", status), &req);
            assert_eq!(ctx.error_type, error_type, "status {status}");
            assert_eq!(ctx.severity, severity, "status {status}");
            assert_eq!(ctx.recoverable, recoverable, "status {status}");
            assert!(!ctx.suggested_actions.is_empty(), "status {status}");
        }
    }

    #[test]
    fn classification_of_transport_errors() {
        let interceptor = RequestInterceptor::default();
        let req = request();

        let timeout = interceptor.classify_error(&ClientError::timeout("slow"), &req);
        assert_eq!(timeout.code, "TIMEOUT");
        assert_eq!(timeout.severity, Severity::Warning);
        assert!(timeout.recoverable);

        let network = interceptor.classify_error(&ClientError::network("refused"), &req);
        assert_eq!(network.code, "NETWORK_ERROR");
        assert_eq!(network.severity, Severity::Error);
        assert!(network
            .suggested_actions
            .iter()
            .any(|a| a == "Check your internet connection"));
    }

    #[test]
    fn server_code_is_preserved() {
        let interceptor = RequestInterceptor::default();
        let err = ClientError::api("no such task", 404).with_code("TASK_NOT_FOUND");
        let ctx = interceptor.classify_error(&err, &request());
        assert_eq!(ctx.code, "TASK_NOT_FOUND");

        let ctx = interceptor.classify_error(&ClientError::api("boom", 502), &request());
        assert_eq!(ctx.code, "HTTP_502");
    }

    #[test]
    fn details_only_in_development_and_redacted() {
        let err = ClientError::Api {
            message: "rejected".to_owned(),
            status: 422,
            code: None,
            details: Some(json!({ "field": "password", "password": "hunter2" })),
        };

        let prod = RequestInterceptor::new(InterceptorConfig {
            is_development: false,
            ..InterceptorConfig::default()
        });
        assert!(prod.classify_error(&err, &request()).details.is_none());

        let dev = RequestInterceptor::new(dev_config());
        let ctx = dev.classify_error(&err, &request());
        let serialized = serde_json::to_string(&ctx).unwrap();
        assert!(ctx.details.is_some());
        assert!(!serialized.contains("hunter2"));
        assert!(!serialized.contains("sk-live-123"));
    }

    #[test]
    fn failing_store_is_swallowed() {
        let sink = Arc::new(Recorder::default());
        let interceptor = RequestInterceptor::default()
            .with_log_sink(sink.clone())
            .with_error_store(Arc::new(FailingStore));

        interceptor.handle_error(&ClientError::network("down"), &request());

        assert_eq!(sink.entries().len(), 1);
    }

    #[test]
    fn panicking_store_is_swallowed() {
        let interceptor = RequestInterceptor::default().with_error_store(Arc::new(PanickingStore));
        interceptor.handle_error(&ClientError::timeout("slow"), &request());
    }

    #[tokio::test]
    async fn intercept_retries_and_reports_final_error() {
        let store = Arc::new(Recorder::default());
        let sink = Arc::new(Recorder::default());
        let interceptor = RequestInterceptor::new(InterceptorConfig {
            retry: fast_retry(3),
            ..InterceptorConfig::default()
        })
        .with_log_sink(sink.clone())
        .with_error_store(store.clone());

        let calls = &AtomicU32::new(0);
        let err = interceptor
            .intercept(
                || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ClientError::api("unavailable", 503))
                },
                &request(),
            )
            .await
            .expect_err("must exhaust retries");

        assert_eq!(err.status(), Some(503));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let reported = store.entries();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].code, "HTTP_503");

        let logged = sink.entries();
        assert_eq!(logged.len(), 2);
        assert_eq!(logged[0].error_type, ErrorType::Request);
        assert_eq!(logged[1].error_type, ErrorType::Server);
    }

    #[tokio::test]
    async fn intercept_success_reports_nothing() {
        let store = Arc::new(Recorder::default());
        let interceptor = RequestInterceptor::new(InterceptorConfig {
            retry: fast_retry(3),
            ..InterceptorConfig::default()
        })
        .with_error_store(store.clone());

        let calls = &AtomicU32::new(0);
        let value = interceptor
            .intercept(
                || async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(ClientError::network("flaky"))
                    } else {
                        Ok(42)
                    }
                },
                &request(),
            )
            .await
            .expect("second attempt succeeds");

        assert_eq!(value, 42);
        assert!(store.entries().is_empty());
    }
}
