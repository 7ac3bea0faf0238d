use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("Too many requests, rate limited")]
    RateLimited,

    #[error("Service unavailable, retry later")]
    ServiceUnavailable,
}

impl ApiError {
    /// HTTP status of the failed call, when the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::ApiError { status, .. } => Some(*status),
            ApiError::AuthError => Some(401),
            ApiError::RateLimited => Some(429),
            ApiError::RequestError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// The object does not exist (anymore): 404 Not Found or 410 Gone
    pub fn is_not_found(&self) -> bool {
        matches!(self.status(), Some(404) | Some(410))
    }
}
