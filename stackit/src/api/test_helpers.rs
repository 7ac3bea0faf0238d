//! Test helpers for the STACKIT API

use super::{Client, Endpoints, RetryConfig};

/// Client pointing every service at a mock server, with fast retries
pub fn create_test_client(url: &str) -> Client {
    let retry = RetryConfig {
        max_retries: 3,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        timeout_seconds: 5,
    };
    Client::with_config("test-token", &Endpoints::all(url), retry)
        .expect("mock server url is valid")
}

#[cfg(test)]
mod tests {
    use super::super::*;

    #[test]
    fn test_retry_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_backoff_ms, 100);
        assert_eq!(config.max_backoff_ms, 10000);
        assert_eq!(config.timeout_seconds, 30);
    }

    #[test]
    fn test_client_uses_mock_url_for_every_service() {
        let client = super::create_test_client("http://127.0.0.1:1234");
        for service in [Service::Iaas, Service::PostgresFlex, Service::Ske] {
            assert_eq!(client.base_url(service), "http://127.0.0.1:1234");
        }
    }
}
