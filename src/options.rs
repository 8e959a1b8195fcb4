/// Default per-request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Configures HTTP timeout and identification of the client.
///
/// Retry behavior lives in [`crate::RetryOptions`] and is applied by the
/// [`crate::RequestInterceptor`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Per-request timeout in milliseconds, covering connect, headers and body.
    pub timeout_ms: u64,
    /// Value sent as `User-Agent`.
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            user_agent: concat!("taskdash-http/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}
