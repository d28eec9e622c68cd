//! Image downloads over reqwest.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use review_harvest::{AssetFetcher, HarvestError, HarvestResult};

/// Share of the batch deadline given to the HTTP request, so the request
/// times out (and cleans up) before the batch fetcher cancels it.
const REQUEST_SHARE: f64 = 0.9;

fn request_timeout(timeout: Duration) -> Duration {
    timeout.mul_f64(REQUEST_SHARE)
}

/// `AssetFetcher` backed by a shared reqwest client.
#[derive(Clone)]
pub struct HttpAssetFetcher {
    client: reqwest::Client,
}

impl HttpAssetFetcher {
    /// Client sending `user_agent` on every request.
    pub fn new(user_agent: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(user_agent)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    async fn download(&self, url: &str, destination: &Path, timeout: Duration) -> Result<(), String> {
        let response = self
            .client
            .get(url)
            .timeout(request_timeout(timeout))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(|e| e.to_string())?;
        tokio::fs::write(destination, &bytes)
            .await
            .map_err(|e| format!("write {}: {e}", destination.display()))?;
        debug!(url, bytes = bytes.len(), path = %destination.display(), "image saved");
        Ok(())
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, url: &str, destination: &Path, timeout: Duration) -> HarvestResult<()> {
        match self.download(url, destination, timeout).await {
            Ok(()) => Ok(()),
            Err(reason) => {
                // Never leave a truncated file behind.
                let _ = tokio::fs::remove_file(destination).await;
                Err(HarvestError::Fetch {
                    url: url.to_string(),
                    reason,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_USER_AGENT;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpAssetFetcher {
        HttpAssetFetcher::new(DEFAULT_USER_AGENT, Duration::from_secs(5))
    }

    #[test]
    fn test_request_deadline_precedes_batch_deadline() {
        let batch = Duration::from_secs(30);
        assert!(request_timeout(batch) < batch);
        let ten = request_timeout(Duration::from_secs(10));
        assert!(ten > Duration::from_millis(8_900) && ten <= Duration::from_millis(9_001));
    }

    #[tokio::test]
    async fn test_fetch_writes_body_with_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/p/photo.jpg"))
            .and(header("user-agent", DEFAULT_USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF]))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("photo.jpg");
        fetcher()
            .fetch(&format!("{}/p/photo.jpg", server.uri()), &dest, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), vec![0xFF, 0xD8, 0xFF]);
    }

    #[tokio::test]
    async fn test_non_success_status_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing.jpg");
        let err = fetcher()
            .fetch(&format!("{}/gone.jpg", server.uri()), &dest, Duration::from_secs(5))
            .await
            .unwrap_err();

        match err {
            HarvestError::Fetch { reason, .. } => assert_eq!(reason, "HTTP 404"),
            other => panic!("expected fetch error, got {other:?}"),
        }
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("slow.jpg");
        let result = fetcher()
            .fetch(&format!("{}/slow.jpg", server.uri()), &dest, Duration::from_millis(200))
            .await;

        assert!(matches!(result, Err(HarvestError::Fetch { .. })));
        assert!(!dest.exists());
    }
}
