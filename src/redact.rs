//! Redaction of sensitive header and body values before logging.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Placeholder written in place of a sensitive value.
pub const REDACTED: &str = "[REDACTED]";

pub const DEFAULT_SENSITIVE_HEADERS: [&str; 3] = ["authorization", "x-api-key", "cookie"];

pub const DEFAULT_SENSITIVE_FIELDS: [&str; 5] =
    ["password", "token", "apiKey", "secret", "accessToken"];

fn is_sensitive<S: AsRef<str>>(name: &str, sensitive: &[S]) -> bool {
    sensitive
        .iter()
        .any(|candidate| candidate.as_ref().eq_ignore_ascii_case(name))
}

/// Replaces values of sensitive headers (matched case-insensitively) with
/// [`REDACTED`]. Other headers pass through unchanged.
pub fn redact_headers<S: AsRef<str>>(
    headers: &BTreeMap<String, String>,
    sensitive_headers: &[S],
) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            let value = if is_sensitive(name, sensitive_headers) {
                REDACTED.to_owned()
            } else {
                value.clone()
            };
            (name.clone(), value)
        })
        .collect()
}

/// Replaces the values of sensitive query parameters in `url` with
/// [`REDACTED`]. The path, other parameters and the fragment are kept.
pub fn redact_url_query<S: AsRef<str>>(url: &str, sensitive_fields: &[S]) -> String {
    let (without_fragment, fragment) = match url.split_once('#') {
        Some((head, fragment)) => (head, Some(fragment)),
        None => (url, None),
    };
    let Some((base, query)) = without_fragment.split_once('?') else {
        return url.to_owned();
    };

    let query = query
        .split('&')
        .map(|pair| {
            let key = pair.split_once('=').map_or(pair, |(key, _)| key);
            if is_sensitive(key, sensitive_fields) {
                format!("{key}={REDACTED}")
            } else {
                pair.to_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("&");

    let mut redacted = format!("{base}?{query}");
    if let Some(fragment) = fragment {
        redacted.push('#');
        redacted.push_str(fragment);
    }
    redacted
}

/// Recursively replaces the values of sensitive keys with [`REDACTED`].
///
/// Objects and arrays are walked at every depth; scalars and `null` are
/// returned as they are. Redacting twice gives the same result as once.
pub fn redact_object_fields<S: AsRef<str>>(value: &Value, sensitive_fields: &[S]) -> Value {
    match value {
        Value::Object(map) => {
            let redacted: Map<String, Value> = map
                .iter()
                .map(|(key, inner)| {
                    let inner = if is_sensitive(key, sensitive_fields) {
                        Value::String(REDACTED.to_owned())
                    } else {
                        redact_object_fields(inner, sensitive_fields)
                    };
                    (key.clone(), inner)
                })
                .collect();
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| redact_object_fields(item, sensitive_fields))
                .collect(),
        ),
        scalar => scalar.clone(),
    }
}
