//! Shared HTTP plumbing for the provider adapters
//!
//! Every provider nests its error message differently. Responses that fail
//! are reduced to a single message and classified by status code into a
//! [`PlatformError`], so callers see the same error kinds regardless of which
//! API produced them.

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use crate::error::{PlatformError, Result};

/// Build the client shared by all adapters
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("omnicast/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)).into())
}

/// Pull the human-readable message out of a provider error body.
///
/// Understands the Graph API (`error.error_user_msg`, `error.message`),
/// Google (`error.message`), LinkedIn (`message`), OAuth token endpoints
/// (`error_description`) and list-shaped errors (`errors[0].message`).
pub fn extract_provider_message(body: &Value) -> Option<String> {
    let candidates = [
        body.pointer("/error/error_user_msg"),
        body.pointer("/error/message"),
        body.pointer("/error_description"),
        body.pointer("/message"),
        body.pointer("/errors/0/message"),
        body.pointer("/error_message"),
        body.pointer("/error"),
    ];

    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Map a failed provider response to a platform error
pub fn classify_status(
    status: StatusCode,
    provider: &str,
    context: &str,
    message: &str,
) -> PlatformError {
    let detail = format!("{} {} failed ({}): {}", provider, context, status.as_u16(), message);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PlatformError::Authentication(detail),
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimit(detail),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            PlatformError::Validation(detail)
        }
        s if s.is_server_error() => PlatformError::Network(detail),
        _ => PlatformError::Posting(detail),
    }
}

/// Map a transport failure (connect, timeout, TLS, body read)
pub fn map_transport_error(error: reqwest::Error, provider: &str, context: &str) -> PlatformError {
    let reason = if error.is_timeout() {
        "request timed out"
    } else if error.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    PlatformError::Network(format!(
        "{} {}: {}: {}",
        provider, context, reason, error
    ))
}

/// Send a request and return the response if the status is a success
pub async fn send(request: RequestBuilder, provider: &str, context: &str) -> Result<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| map_transport_error(e, provider, context))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| extract_provider_message(&v))
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("no response body")
                    .to_string()
            } else {
                body.chars().take(300).collect()
            }
        });

    tracing::debug!("{} {} returned {}: {}", provider, context, status, message);
    Err(classify_status(status, provider, context, &message).into())
}

/// Send a request and decode a successful JSON response
pub async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    provider: &str,
    context: &str,
) -> Result<T> {
    let response = send(request, provider, context).await?;
    response.json::<T>().await.map_err(|e| {
        PlatformError::Posting(format!(
            "{} {} returned an unexpected response: {}",
            provider, context, e
        ))
        .into()
    })
}

/// Read a required string field from a JSON response
pub fn required_str(value: &Value, pointer: &str, provider: &str, context: &str) -> Result<String> {
    match value.pointer(pointer) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(PlatformError::Posting(format!(
            "{} {} response is missing '{}'",
            provider,
            context,
            pointer.trim_start_matches('/')
        ))
        .into()),
    }
}

/// Read an integer metric, accepting numbers and numeric strings
pub fn metric_value(value: &Value, pointer: &str) -> Option<i64> {
    match value.pointer(pointer)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Absolute expiry from an `expires_in` seconds field
pub fn expires_at_from(value: &Value, now: i64) -> Option<i64> {
    metric_value(value, "/expires_in").map(|secs| now + secs)
}
