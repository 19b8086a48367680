use thiserror::Error;

/// Application-wide error types for booker.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A metadata provider returned an unexpected response.
    #[error("provider error (HTTP {status_code}): {message}")]
    Provider { message: String, status_code: u16 },

    /// Rate limit exceeded (HTTP 429).
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// A provider refused the lookup because its self-disable latch is set.
    #[error("{0} provider self-disabled, probably due to rate limit")]
    ProviderDisabled(String),

    /// Text extraction failed.
    #[error("extract error: {0}")]
    Extract(String),

    /// Request timed out.
    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    /// JSON serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is an upstream rate-limit signal.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, AppError::RateLimitExceeded)
            || matches!(
                self,
                AppError::Provider {
                    status_code: 429,
                    ..
                }
            )
    }
}
