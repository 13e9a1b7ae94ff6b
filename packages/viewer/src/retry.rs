//! HTTP retry helpers for transient errors.
//!
//! Every call to the viewer service goes through [`send_json`], which
//! retries connection failures, timeouts, rate limiting and server
//! errors with exponential backoff.
//!
//! ```ignore
//! let body: ViewInRegionResponse =
//!     retry::send_json(|| client.post(&url).json(&request), &policy).await?;
//! ```

use std::time::Duration;

use saferplace_viewer_models::ConnectError;
use serde::de::DeserializeOwned;

use crate::ClientError;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 500;

/// How many times, and how patiently, to retry a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Sends an HTTP request and parses the response body as JSON.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`] (since builders are consumed by
/// `.send()`).
///
/// Does **not** retry HTTP 4xx (except 429); those are permanent and
/// are returned as [`ClientError::Status`] with the Connect error body.
///
/// # Errors
///
/// Returns [`ClientError`] if the request fails after all retries, the
/// server returns a non-retryable status code, or the body is not the
/// expected JSON.
#[allow(clippy::future_not_send)]
pub async fn send_json<T, F>(build_request: F, policy: &RetryPolicy) -> Result<T, ClientError>
where
    T: DeserializeOwned,
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = send_inner(&build_request, policy).await?;
    let url = response.url().to_string();
    let status = response.status();
    let text = response.text().await?;

    serde_json::from_str(&text).map_err(|e| {
        log::error!(
            "JSON parse failed.\n  \
             url: {url}\n  \
             status: {status}\n  \
             received: {} bytes\n  \
             parse error: {e}\n  \
             body preview: {}",
            text.len(),
            preview(&text),
        );
        ClientError::Json(e)
    })
}

/// Core retry loop behind [`send_json`].
///
/// Returns the successful [`reqwest::Response`] (status 2xx or 3xx).
#[allow(clippy::future_not_send)]
async fn send_inner<F>(
    build_request: &F,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, ClientError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let max_retries = policy.max_retries;
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = policy.delay(attempt);
            log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        let response = match build_request().send().await {
            Ok(response) => response,
            Err(e) if is_transient(&e) && attempt < max_retries => {
                log::warn!("  transient error: {e}");
                attempt += 1;
                continue;
            }
            Err(e) => return Err(ClientError::Http(e)),
        };

        let status = response.status();
        let retryable =
            status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error();

        if retryable && attempt < max_retries {
            log::warn!("  HTTP {status}");
            attempt += 1;
            continue;
        }

        if status.is_client_error() || status.is_server_error() {
            return Err(status_error(response).await);
        }

        return Ok(response);
    }
}

/// Builds a [`ClientError::Status`] from a failed response, using the
/// Connect error body when there is one.
#[allow(clippy::future_not_send)]
async fn status_error(response: reqwest::Response) -> ClientError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let body: ConnectError = serde_json::from_str(&text).unwrap_or_else(|_| ConnectError {
        code: String::new(),
        message: preview(&text),
    });

    ClientError::Status {
        status: status.as_u16(),
        code: body.code,
        message: body.message,
    }
}

fn preview(text: &str) -> String {
    if text.len() > BODY_PREVIEW_LEN {
        let end = (0..=BODY_PREVIEW_LEN)
            .rev()
            .find(|&i| text.is_char_boundary(i))
            .unwrap_or(0);
        format!("{}...", &text[..end])
    } else {
        text.to_string()
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy {
            max_retries: 4,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(4), Duration::from_millis(800));
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let text = "é".repeat(400);
        let short = preview(&text);
        assert!(short.ends_with("..."));
        assert!(short.len() <= BODY_PREVIEW_LEN + 3);
    }

    #[test]
    fn preview_keeps_short_bodies() {
        assert_eq!(preview("oops"), "oops");
    }
}
