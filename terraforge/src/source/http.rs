//! HTTP client abstraction for testability

use std::time::Duration;

use bytes::Bytes;

use super::{BoxFuture, SourceError};

/// User agent sent with every tile request.
pub const DEFAULT_USER_AGENT: &str = concat!("TerraForge/", env!("CARGO_PKG_VERSION"));

/// Default per-request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Trait for HTTP client operations.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock HTTP clients in tests.
pub trait HttpClient: Send + Sync {
    /// Performs an HTTP GET request.
    ///
    /// Non-success statuses are reported as [`SourceError::Status`] so the
    /// caller can classify them.
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, SourceError>>;
}

/// Real HTTP client implementation using reqwest.
pub struct ReqwestClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestClient {
    /// Creates a new ReqwestClient with the default timeout.
    pub fn new() -> Result<Self, SourceError> {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    /// Creates a new ReqwestClient with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|e| SourceError::Client(e.to_string()))?;

        Ok(Self { client, timeout })
    }
}

impl HttpClient for ReqwestClient {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, SourceError>> {
        Box::pin(async move {
            let response = self.client.get(url).send().await.map_err(|e| {
                if e.is_timeout() {
                    SourceError::Timeout(self.timeout)
                } else {
                    SourceError::Connect {
                        url: url.to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(SourceError::Status {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }

            response.bytes().await.map_err(|e| SourceError::Connect {
                url: url.to_string(),
                message: format!("failed to read response: {}", e),
            })
        })
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    /// Mock HTTP client for testing.
    ///
    /// Answers from a URL map, falling back to `default`. Every request is
    /// recorded so tests can assert on call counts.
    pub struct MockHttpClient {
        pub responses: Mutex<HashMap<String, Result<Bytes, SourceError>>>,
        pub default: Result<Bytes, SourceError>,
        pub requests: Mutex<Vec<String>>,
        pub calls: AtomicUsize,
    }

    impl MockHttpClient {
        /// Answers every URL with the same response.
        pub fn always(response: Result<Bytes, SourceError>) -> Self {
            Self {
                responses: Mutex::new(HashMap::new()),
                default: response,
                requests: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }

        /// Overrides the response for one URL.
        pub fn respond(&self, url: &str, response: Result<Bytes, SourceError>) {
            self.responses.lock().insert(url.to_string(), response);
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl HttpClient for MockHttpClient {
        fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, SourceError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().push(url.to_string());
            let response = self
                .responses
                .lock()
                .get(url)
                .cloned()
                .unwrap_or_else(|| self.default.clone());
            Box::pin(async move { response })
        }
    }

    #[tokio::test]
    async fn test_mock_client_success() {
        let mock = MockHttpClient::always(Ok(Bytes::from_static(&[1, 2, 3, 4])));

        let result = mock.get("http://example.com").await;
        assert_eq!(result.unwrap(), Bytes::from_static(&[1, 2, 3, 4]));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_client_per_url_override() {
        let mock = MockHttpClient::always(Ok(Bytes::new()));
        mock.respond(
            "http://example.com/missing",
            Err(SourceError::Status {
                status: 404,
                url: "http://example.com/missing".into(),
            }),
        );

        assert!(mock.get("http://example.com/ok").await.is_ok());
        assert!(mock.get("http://example.com/missing").await.is_err());
        assert_eq!(mock.requests.lock().len(), 2);
    }

    #[test]
    fn test_reqwest_client_builds() {
        assert!(ReqwestClient::with_timeout(Duration::from_secs(1)).is_ok());
    }
}
