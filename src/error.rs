use std::sync::Arc;

/// Code attached to requests that could not be built or serialized.
pub const INVALID_REQUEST_CODE: &str = "INVALID_REQUEST";

/// Shared transport cause attached to [`ClientError::Network`].
pub type TransportCause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Error type returned by this crate.
///
/// Exactly one variant describes any failed call. Match on the variant,
/// not on the message text.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ClientError {
    /// The endpoint answered with a non-2xx status, or the success envelope
    /// was malformed or reported a failure.
    #[error("api error {status}: {message}")]
    Api {
        message: String,
        /// HTTP status of the response; `0` when no usable response exists
        /// (for example the body was not valid JSON).
        status: u16,
        /// Machine-readable error code from the response body.
        code: Option<String>,
        /// Structured details from the response body.
        details: Option<serde_json::Value>,
    },
    /// The call exceeded its timeout before a response arrived.
    #[error("timeout: {message}")]
    Timeout { message: String },
    /// The transport failed before any HTTP semantics applied.
    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<TransportCause>,
    },
    /// The caller cancelled the request or retry sequence.
    #[error("request cancelled")]
    Cancelled,
}

impl ClientError {
    pub fn api(message: impl Into<String>, status: u16) -> Self {
        Self::Api {
            message: message.into(),
            status,
            code: None,
            details: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps a transport failure, keeping it as the error source.
    pub fn network_from<E>(message: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Network {
            message: message.into(),
            source: Some(Arc::new(cause)),
        }
    }

    /// Attaches a machine-readable code to an [`ClientError::Api`] error.
    /// Other variants are returned unchanged.
    pub fn with_code(mut self, new_code: impl Into<String>) -> Self {
        if let Self::Api { code, .. } = &mut self {
            *code = Some(new_code.into());
        }
        self
    }

    /// HTTP status for API errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Human-readable message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Api { message, .. }
            | Self::Timeout { message }
            | Self::Network { message, .. } => message,
            Self::Cancelled => "Request cancelled",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        // The URL may carry credentials in its query and messages end up in logs.
        let err = err.without_url();
        if err.is_timeout() {
            return Self::timeout(err.to_string());
        }
        // Malformed URL or header: the request never left the process.
        if err.is_builder() {
            return Self::api(format!("Invalid request: {err}"), 0).with_code(INVALID_REQUEST_CODE);
        }
        Self::network_from(err.to_string(), err)
    }
}
