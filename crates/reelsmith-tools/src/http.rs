//! HTTP helpers shared by tool back-ends.
//!
//! `send_with_retry` retries 429 responses and connection failures. A
//! `Retry-After` header from the server overrides the computed backoff.

use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::warn;

use reelsmith_core::retry::{RetryPolicy, parse_retry_after};

use crate::ToolError;

/// Longest response body quoted back in an error message.
const MAX_ERROR_BODY: usize = 500;

/// Send a request, retrying rate limits and transport errors under `policy`.
///
/// `build` is called once per attempt. Non-429 error statuses fail
/// immediately.
pub async fn send_with_retry<F>(
    build: F,
    policy: &RetryPolicy,
    label: &str,
) -> Result<Response, ToolError>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        match build().send().await {
            Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = resp
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after);
                if attempt >= policy.max_retries {
                    return Err(ToolError::RateLimited { retry_after });
                }
                let delay = policy.delay_for(attempt, retry_after);
                warn!(
                    tool = label,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limited, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Ok(resp) if !resp.status().is_success() => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(ToolError::Failed(format!(
                    "{label} returned HTTP {status}: {}",
                    truncate(&body, MAX_ERROR_BODY)
                )));
            }
            Ok(resp) => return Ok(resp),
            Err(e) => {
                if attempt >= policy.max_retries || !(e.is_connect() || e.is_timeout()) {
                    return Err(ToolError::Failed(format!("{label} request failed: {e}")));
                }
                let delay = policy.delay_for(attempt, None);
                warn!(tool = label, attempt = attempt + 1, error = %e, "Request failed, retrying");
                tokio::time::sleep(delay).await;
            }
        }
        attempt += 1;
    }
}

/// Send with retry and decode a JSON body.
pub async fn get_json<F>(
    build: F,
    policy: &RetryPolicy,
    label: &str,
) -> Result<serde_json::Value, ToolError>
where
    F: Fn() -> RequestBuilder,
{
    let resp = send_with_retry(build, policy, label).await?;
    resp.json()
        .await
        .map_err(|e| ToolError::Failed(format!("{label} returned malformed JSON: {e}")))
}

/// Send with retry and return the body as text.
pub async fn get_text<F>(build: F, policy: &RetryPolicy, label: &str) -> Result<String, ToolError>
where
    F: Fn() -> RequestBuilder,
{
    let resp = send_with_retry(build, policy, label).await?;
    resp.text()
        .await
        .map_err(|e| ToolError::Failed(format!("{label} body could not be read: {e}")))
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundary() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("héllo", 2), "h");
        assert_eq!(truncate("abcdef", 3), "abc");
    }
}
