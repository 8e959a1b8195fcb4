use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::{
    wire::{Envelope, ErrorBody},
    ClientError,
};

/// Code attached when `data` does not match the requested type.
pub const INVALID_RESPONSE_CODE: &str = "INVALID_RESPONSE";

/// Decodes a 2xx body following the `{ success, data, error }` envelope.
pub(crate) fn decode_envelope<T: DeserializeOwned>(
    status: StatusCode,
    body: &str,
) -> Result<T, ClientError> {
    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|_| ClientError::api("Failed to parse response", 0))?;

    if !envelope.success {
        return Err(ClientError::Api {
            message: envelope
                .error
                .unwrap_or_else(|| "Request failed".to_owned()),
            status: status.as_u16(),
            code: envelope.code,
            details: envelope.details,
        });
    }

    let data = envelope
        .data
        .ok_or_else(|| ClientError::api("No data in response", status.as_u16()))?;

    serde_json::from_value(data).map_err(|err| {
        ClientError::api(format!("Response data has unexpected shape: {err}"), 0)
            .with_code(INVALID_RESPONSE_CODE)
    })
}

/// Builds the error for a non-2xx response. Never fails: a body that is not
/// JSON falls back to `HTTP {status}: {reason}`.
pub(crate) fn decode_error_response(status: StatusCode, body: &str) -> ClientError {
    let parsed = serde_json::from_str::<ErrorBody>(body).unwrap_or_default();
    let message = parsed
        .error
        .unwrap_or_else(|| http_fallback_message(status));

    ClientError::Api {
        message,
        status: status.as_u16(),
        code: parsed.code,
        details: parsed.details,
    }
}

fn http_fallback_message(status: StatusCode) -> String {
    format!(
        "HTTP {}: {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown Status")
    )
}
