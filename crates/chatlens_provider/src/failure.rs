use std::time::Duration;

use chatlens_domain::AnnotationFailure;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

/// Joins `path` onto the backend base URL.
pub(crate) fn url(base: &Url, path: &str) -> Result<Url, AnnotationFailure> {
    if path.contains("://") || path.contains("..") {
        return Err(AnnotationFailure::other(format!("Invalid path: {path}")));
    }
    let path = path.trim_start_matches('/');
    base.join(path)
        .map_err(|e| AnnotationFailure::other(format!("Failed to append {path} to {base}: {e}")))
}

/// Posts `body` and decodes a successful JSON reply, classifying every
/// failure along the way.
pub(crate) async fn post_json<B: Serialize, R: DeserializeOwned>(
    request: RequestBuilder,
    body: &B,
) -> Result<R, AnnotationFailure> {
    let response = request.json(body).send().await.map_err(from_transport)?;
    let status = response.status();
    let headers = response.headers().clone();
    let text = response.text().await.map_err(from_transport)?;

    if !status.is_success() {
        return Err(from_status(status, &headers, &text));
    }

    serde_json::from_str(&text)
        .map_err(|e| AnnotationFailure::other(format!("Unexpected response body: {e}")))
}

pub(crate) fn from_transport(error: reqwest::Error) -> AnnotationFailure {
    if error.is_timeout() {
        AnnotationFailure::timeout(error.to_string())
    } else {
        AnnotationFailure::other(error.to_string())
    }
}

pub(crate) fn from_status(status: StatusCode, headers: &HeaderMap, body: &str) -> AnnotationFailure {
    let message = format!("HTTP {status}: {}", error_message(body));

    if status == StatusCode::TOO_MANY_REQUESTS || body.contains("rate_limit_exceeded") {
        let failure = AnnotationFailure::rate_limited(message);
        return match retry_after(headers) {
            Some(wait) => failure.with_retry_after(wait),
            None => failure,
        };
    }

    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => AnnotationFailure::timeout(message),
        _ => AnnotationFailure::other(message),
    }
}

/// Extracts `error.message` from an OpenAI-style error body, falling back to
/// the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| match value.pointer("/error/message").or_else(|| value.get("error")) {
            Some(Value::String(message)) => Some(message.clone()),
            _ => None,
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Delay-seconds form of `Retry-After`. HTTP dates are not honoured.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
}
