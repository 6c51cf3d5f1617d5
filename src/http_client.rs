use crate::error::AppError;
use reqwest::{Client, Response};
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Number of retry attempts
    pub retry_attempts: u32,
    /// Initial retry delay in milliseconds
    pub retry_delay_ms: u64,
    /// Maximum retry delay in milliseconds (for exponential backoff cap)
    pub max_retry_delay_ms: u64,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            max_retry_delay_ms: 30000,
            user_agent: format!("resolve-xml/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Async HTTP client for downloading remote DTDs, schemas, and stylesheets
pub struct AsyncHttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl AsyncHttpClient {
    /// Create a new async HTTP client with the given configuration
    pub fn new(config: HttpClientConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(AppError::from)?;

        Ok(Self { client, config })
    }

    /// Download a resource with retry logic and exponential backoff
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, AppError> {
        let response = self.get_response_with_retry(url).await?;
        let bytes = response.bytes().await.map_err(AppError::from)?;
        Ok(bytes.to_vec())
    }

    /// Get response with retry logic
    async fn get_response_with_retry(&self, url: &str) -> Result<Response, AppError> {
        let mut current_attempt = 0;

        loop {
            match self.make_request(url).await {
                Ok(response) => {
                    if response.status().is_success() {
                        return Ok(response);
                    }
                    let status = response.status();
                    let error = AppError::HttpStatus {
                        url: url.to_string(),
                        status: status.as_u16(),
                    };

                    // Retry on server errors (5xx) but not client errors (4xx)
                    if status.is_server_error() && current_attempt < self.config.retry_attempts {
                        self.wait_before_retry(current_attempt).await;
                        current_attempt += 1;
                        continue;
                    }

                    return Err(error);
                }
                Err(error) => {
                    if current_attempt < self.config.retry_attempts
                        && self.is_retryable_error(&error)
                    {
                        self.wait_before_retry(current_attempt).await;
                        current_attempt += 1;
                        continue;
                    }
                    return Err(error);
                }
            }
        }
    }

    /// Make a single HTTP request with timeout
    async fn make_request(&self, url: &str) -> Result<Response, AppError> {
        let request_future = self.client.get(url).send();

        timeout(
            Duration::from_secs(self.config.timeout_seconds),
            request_future,
        )
        .await
        .map_err(|_| AppError::Timeout {
            url: url.to_string(),
            timeout_seconds: self.config.timeout_seconds,
        })?
        .map_err(AppError::from)
    }

    /// Wait before retry with exponential backoff
    async fn wait_before_retry(&self, attempt: u32) {
        let delay_ms = self.config.retry_delay_ms * 2_u64.pow(attempt);
        let capped_delay = delay_ms.min(self.config.max_retry_delay_ms);
        sleep(Duration::from_millis(capped_delay)).await;
    }

    /// Check if an error is retryable
    fn is_retryable_error(&self, error: &AppError) -> bool {
        match error {
            AppError::Http(reqwest_error) => {
                reqwest_error.is_timeout()
                    || reqwest_error.is_connect()
                    || reqwest_error.is_request()
            }
            AppError::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Get the client configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_client_creation() {
        let config = HttpClientConfig::default();
        let client = AsyncHttpClient::new(config);
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_exponential_backoff_is_capped() {
        let config = HttpClientConfig {
            retry_delay_ms: 10,
            max_retry_delay_ms: 20,
            ..Default::default()
        };
        let client = AsyncHttpClient::new(config).unwrap();

        let start = std::time::Instant::now();
        client.wait_before_retry(0).await; // ~10ms
        client.wait_before_retry(5).await; // capped at 20ms
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(30));
        assert!(elapsed < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_retryable_error_detection() {
        let config = HttpClientConfig::default();
        let client = AsyncHttpClient::new(config).unwrap();

        let timeout_error = AppError::Timeout {
            url: "http://example.com".to_string(),
            timeout_seconds: 30,
        };
        assert!(client.is_retryable_error(&timeout_error));

        let status_error = AppError::HttpStatus {
            url: "http://example.com".to_string(),
            status: 404,
        };
        assert!(!client.is_retryable_error(&status_error));
    }
}
