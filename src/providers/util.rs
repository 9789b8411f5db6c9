use anyhow::Error;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

pub const USER_AGENT: &str = "lotwise/1.0";
pub const RETRIES: usize = 3;
pub const RETRY_DELAY_MS: u64 = 500;

/// Retries an async request on transport errors.
///
/// `operation` runs once plus up to `retries` more times, `delay_ms`
/// milliseconds apart. The last error is returned when all attempts fail.
pub async fn with_retry<F, Fut, T>(mut operation: F, retries: usize, delay_ms: u64) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, reqwest::Error>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) if attempt > retries => return Err(err.into()),
            Err(err) => {
                debug!(attempt, retries, error = %err, "Request failed, retrying");
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

/// Builds the HTTP client shared by the quote providers.
pub fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().user_agent(USER_AGENT).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_retry_gives_up_after_all_attempts() {
        let attempts = AtomicUsize::new(0);
        let client = http_client().unwrap();

        // Nothing listens on port 1.
        let result = with_retry(
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                client.get("http://127.0.0.1:1/").send()
            },
            2,
            1,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_sends_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(header("user-agent", USER_AGENT))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = http_client().unwrap();
        let url = format!("{}/ping", server.uri());
        let response = with_retry(|| client.get(&url).send(), RETRIES, RETRY_DELAY_MS)
            .await
            .unwrap();
        assert!(response.status().is_success());
    }
}
