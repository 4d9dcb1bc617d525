//! Readiness probe for the service under test.
//!
//! Polls the health endpoint with exponential backoff until it answers with
//! a success status or the budget is spent. A probe that never succeeds is
//! fatal to the whole run.

use reqwest::Client;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, instrument};

/// Health endpoint, relative to the base URL (which carries the `/v1` prefix).
pub const HEALTH_PATH: &str = "healthz";

/// Initial retry delay for exponential backoff.
const INITIAL_DELAY: Duration = Duration::from_millis(500);

/// Per-attempt HTTP timeout.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Readiness errors.
#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("Service at {url} not ready within {timeout:?}: {last_error}")]
    TimedOut {
        url: String,
        timeout: Duration,
        last_error: String,
    },

    #[error("Failed to create HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),
}

/// Poll `condition` until it returns `Ok`, or fail with the last error.
///
/// Backoff strategy:
/// - Initial delay: `initial_delay`
/// - Exponential multiplier: 2x
/// - Delay capped at the remaining budget
pub async fn poll_until<F, Fut>(
    timeout: Duration,
    initial_delay: Duration,
    mut condition: F,
) -> Result<(), String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), String>>,
{
    let mut delay = initial_delay;
    let start = Instant::now();

    loop {
        let last_error = match condition().await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(last_error);
        }

        let remaining = timeout.saturating_sub(elapsed);
        sleep(delay.min(remaining)).await;

        delay *= 2;
    }
}

/// HTTP health probe against `{base_url}/healthz`.
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    url: String,
    timeout: Duration,
    http_client: Client,
}

impl ReadinessProbe {
    /// Create a probe for the service at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ReadinessError> {
        let http_client = Client::builder().timeout(ATTEMPT_TIMEOUT).build()?;

        Ok(Self {
            url: format!("{}/{}", base_url.trim_end_matches('/'), HEALTH_PATH),
            timeout,
            http_client,
        })
    }

    /// Health URL being probed.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Single health check.
    pub async fn check(&self) -> Result<(), String> {
        let response = self
            .http_client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("health endpoint returned status {}", status));
        }

        Ok(())
    }

    /// Block until the health check succeeds or the budget is spent.
    #[instrument(skip_all, fields(url = %self.url))]
    pub async fn wait(&self) -> Result<(), ReadinessError> {
        let start = Instant::now();
        let probe = self;

        poll_until(self.timeout, INITIAL_DELAY, move || async move {
            let result = probe.check().await;
            if let Err(e) = &result {
                debug!(error = %e, "Service not ready yet");
            }
            result
        })
        .await
        .map_err(|last_error| ReadinessError::TimedOut {
            url: self.url.clone(),
            timeout: self.timeout,
            last_error,
        })?;

        info!(elapsed_ms = start.elapsed().as_millis() as u64, "Service ready");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_poll_until_succeeds_immediately() {
        let result = poll_until(Duration::from_secs(1), Duration::from_millis(10), || async {
            Ok(())
        })
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_poll_until_succeeds_after_retry() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let result = poll_until(Duration::from_secs(5), Duration::from_millis(10), move || {
            let attempts = attempts_clone.clone();
            async move {
                let count = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if count >= 3 {
                    Ok(())
                } else {
                    Err(format!("attempt {}", count))
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_poll_until_returns_last_error_on_timeout() {
        let result = poll_until(
            Duration::from_millis(100),
            Duration::from_millis(10),
            || async { Err("still down".to_string()) },
        )
        .await;

        assert_eq!(result.unwrap_err(), "still down");
    }

    #[test]
    fn test_health_url_from_base_url() {
        let probe = ReadinessProbe::new("http://localhost:8000/v1/", Duration::from_secs(1)).unwrap();
        assert_eq!(probe.url(), "http://localhost:8000/v1/healthz");
    }

    #[tokio::test]
    async fn test_wait_succeeds_when_healthy() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/healthz"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
            .mount(&mock_server)
            .await;

        let probe = ReadinessProbe::new(&format!("{}/v1", mock_server.uri()), Duration::from_secs(2))
            .unwrap();
        probe.wait().await.expect("healthy service should be ready");
    }

    #[tokio::test]
    async fn test_wait_times_out_on_unhealthy_service() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/healthz"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let probe = ReadinessProbe::new(
            &format!("{}/v1", mock_server.uri()),
            Duration::from_millis(300),
        )
        .unwrap();

        let err = probe.wait().await.unwrap_err();
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("/v1/healthz"));
    }
}
