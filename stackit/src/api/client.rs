use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::common::ErrorResponse;
use super::error::ApiError;

const USER_AGENT_VALUE: &str = concat!("terraform-provider-stackit/", env!("CARGO_PKG_VERSION"));

/// STACKIT services the provider talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Iaas,
    PostgresFlex,
    Ske,
}

impl Service {
    pub fn default_endpoint(self) -> &'static str {
        match self {
            Service::Iaas => "https://iaas.api.stackit.cloud",
            Service::PostgresFlex => "https://postgres-flex-service.api.stackit.cloud",
            Service::Ske => "https://ske.api.stackit.cloud",
        }
    }
}

/// Custom base URLs, None keeps the service default
#[derive(Debug, Clone, Default)]
pub struct Endpoints {
    pub iaas: Option<String>,
    pub postgresflex: Option<String>,
    pub ske: Option<String>,
}

impl Endpoints {
    /// Every service served from the same base URL
    pub fn all(url: &str) -> Self {
        Self {
            iaas: Some(url.to_string()),
            postgresflex: Some(url.to_string()),
            ske: Some(url.to_string()),
        }
    }

    fn custom(&self, service: Service) -> Option<&str> {
        match service {
            Service::Iaas => self.iaas.as_deref(),
            Service::PostgresFlex => self.postgresflex.as_deref(),
            Service::Ske => self.ske.as_deref(),
        }
    }
}

/// STACKIT API client
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    auth_header: String,
    iaas_url: String,
    postgresflex_url: String,
    ske_url: String,
    retry_config: RetryConfig,
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10000,
            timeout_seconds: 30,
        }
    }
}

impl Client {
    /// Create a new API client with default configuration
    pub fn new(token: &str, endpoints: &Endpoints) -> Result<Self, ApiError> {
        Self::with_config(token, endpoints, RetryConfig::default())
    }

    /// Create a new API client with custom retry configuration
    pub fn with_config(
        token: &str,
        endpoints: &Endpoints,
        retry_config: RetryConfig,
    ) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(retry_config.timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                http_client,
                auth_header: format!("Bearer {}", token),
                iaas_url: base_url(endpoints, Service::Iaas)?,
                postgresflex_url: base_url(endpoints, Service::PostgresFlex)?,
                ske_url: base_url(endpoints, Service::Ske)?,
                retry_config,
            }),
        })
    }

    /// Base URL requests to a service are sent to
    pub fn base_url(&self, service: Service) -> &str {
        match service {
            Service::Iaas => &self.inner.iaas_url,
            Service::PostgresFlex => &self.inner.postgresflex_url,
            Service::Ske => &self.inner.ske_url,
        }
    }

    /// IaaS API operations
    pub fn iaas(&self) -> crate::api::iaas::IaasApi<'_> {
        crate::api::iaas::IaasApi::new(self)
    }

    /// PostgreSQL Flex API operations
    pub fn postgresflex(&self) -> crate::api::postgresflex::PostgresFlexApi<'_> {
        crate::api::postgresflex::PostgresFlexApi::new(self)
    }

    /// Kubernetes Engine API operations
    pub fn ske(&self) -> crate::api::ske::SkeApi<'_> {
        crate::api::ske::SkeApi::new(self)
    }

    /// Execute a GET request with retry logic
    pub async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        service: Service,
        path: &str,
    ) -> Result<T, ApiError> {
        self.send::<T, ()>(Method::GET, service, path, None).await
    }

    /// Execute a POST request with retry logic
    pub async fn post<T: for<'de> Deserialize<'de>, B: Serialize>(
        &self,
        service: Service,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(Method::POST, service, path, Some(body)).await
    }

    /// Execute a PUT request with retry logic
    pub async fn put<T: for<'de> Deserialize<'de>, B: Serialize>(
        &self,
        service: Service,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(Method::PUT, service, path, Some(body)).await
    }

    /// Execute a PATCH request with retry logic
    pub async fn patch<T: for<'de> Deserialize<'de>, B: Serialize>(
        &self,
        service: Service,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(Method::PATCH, service, path, Some(body)).await
    }

    /// Execute a DELETE request with retry logic
    pub async fn delete<T: for<'de> Deserialize<'de>>(
        &self,
        service: Service,
        path: &str,
    ) -> Result<T, ApiError> {
        self.send::<T, ()>(Method::DELETE, service, path, None).await
    }

    async fn send<T: for<'de> Deserialize<'de>, B: Serialize>(
        &self,
        method: Method,
        service: Service,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url(service), path);
        let (inner, url, method) = (&self.inner, url.as_str(), &method);

        self.execute_with_retry(
            || async move {
                tracing::debug!("{} request to: {}", method, url);

                let mut request = inner
                    .http_client
                    .request(method.clone(), url)
                    .header(AUTHORIZATION, &inner.auth_header)
                    .header(USER_AGENT, USER_AGENT_VALUE);
                if let Some(body) = body {
                    request = request.json(body);
                }
                request.send().await
            },
            path,
        )
        .await
    }

    /// Execute request with retry logic
    async fn execute_with_retry<F, Fut, T>(&self, request_fn: F, path: &str) -> Result<T, ApiError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
        T: for<'de> Deserialize<'de>,
    {
        let retry = &self.inner.retry_config;
        let mut attempt = 0;
        let mut last_error = None;

        while attempt <= retry.max_retries {
            if attempt > 0 {
                let backoff = std::cmp::min(
                    retry.initial_backoff_ms * (2_u64.pow(attempt - 1)),
                    retry.max_backoff_ms,
                );
                tracing::debug!(
                    "Retrying request to {} after {}ms (attempt {})",
                    path,
                    backoff,
                    attempt
                );
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            match request_fn().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return self.parse_success_response(response).await;
                    }

                    if status == reqwest::StatusCode::UNAUTHORIZED {
                        return Err(ApiError::AuthError);
                    }

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        last_error = Some(ApiError::RateLimited);
                    } else if status.is_server_error() {
                        last_error = Some(self.error_from_response(response).await);
                    } else {
                        return Err(self.error_from_response(response).await);
                    }
                }
                Err(e) => {
                    if e.is_timeout() {
                        last_error = Some(ApiError::Timeout(retry.timeout_seconds));
                    } else if e.is_connect() {
                        last_error = Some(ApiError::ServiceUnavailable);
                    } else {
                        return Err(ApiError::RequestError(e));
                    }
                }
            }

            attempt += 1;
        }

        Err(last_error.unwrap_or(ApiError::ServiceUnavailable))
    }

    /// Parse successful response, an empty body reads as JSON null
    async fn parse_success_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let text = response.text().await?;
        tracing::debug!("API response body: {}", text);

        let body = if text.trim().is_empty() { "null" } else { &text };
        serde_json::from_str::<T>(body).map_err(|e| {
            tracing::error!("Failed to deserialize response: {}, body: {}", e, text);
            ApiError::ParseError(format!("Failed to parse response: {}", e))
        })
    }

    async fn error_from_response(&self, response: reqwest::Response) -> ApiError {
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        let message = match serde_json::from_str::<ErrorResponse>(&text) {
            Ok(ErrorResponse {
                message: Some(message),
                ..
            }) => message,
            _ => text,
        };

        ApiError::ApiError { status, message }
    }
}

fn base_url(endpoints: &Endpoints, service: Service) -> Result<String, ApiError> {
    let raw = endpoints
        .custom(service)
        .unwrap_or_else(|| service.default_endpoint());

    url::Url::parse(raw).map_err(|e| ApiError::InvalidEndpoint(format!("{}: {}", raw, e)))?;
    Ok(raw.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_helpers::create_test_client;
    use mockito::Server;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Thing {
        id: String,
    }

    #[tokio::test]
    async fn sends_bearer_token_and_parses_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/things/1")
            .match_header("authorization", "Bearer test-token")
            .with_body(r#"{"id":"1"}"#)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let thing: Thing = client.get(Service::Iaas, "/v2/things/1").await.unwrap();

        assert_eq!(thing, Thing { id: "1".to_string() });
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn empty_body_parses_as_unit() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("DELETE", "/v2/things/1")
            .with_status(204)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let result: Result<(), _> = client.delete(Service::Ske, "/v2/things/1").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn error_body_message_is_extracted() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/things/missing")
            .with_status(404)
            .with_body(r#"{"code":404,"message":"thing not found"}"#)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let error = client
            .get::<Thing>(Service::Iaas, "/v2/things/missing")
            .await
            .unwrap_err();

        assert!(error.is_not_found());
        assert!(error.to_string().contains("thing not found"));
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let mut server = Server::new_async().await;
        let failing = server
            .mock("GET", "/v2/flaky")
            .with_status(503)
            .expect(4)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let error = client
            .get::<Thing>(Service::Iaas, "/v2/flaky")
            .await
            .unwrap_err();

        assert_eq!(error.status(), Some(503));
        failing.assert_async().await;
    }

    #[tokio::test]
    async fn unauthorized_is_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/secret")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let error = client
            .get::<Thing>(Service::Iaas, "/v2/secret")
            .await
            .unwrap_err();

        assert!(matches!(error, ApiError::AuthError));
        mock.assert_async().await;
    }

    #[test]
    fn default_and_custom_endpoints() {
        let endpoints = Endpoints {
            ske: Some("http://localhost:8080/".to_string()),
            ..Default::default()
        };
        let client = Client::new("token", &endpoints).unwrap();

        assert_eq!(client.base_url(Service::Ske), "http://localhost:8080");
        assert_eq!(
            client.base_url(Service::Iaas),
            "https://iaas.api.stackit.cloud"
        );
    }

    #[test]
    fn invalid_custom_endpoint_is_rejected() {
        let endpoints = Endpoints {
            iaas: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            Client::new("token", &endpoints),
            Err(ApiError::InvalidEndpoint(_))
        ));
    }
}
