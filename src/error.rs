use std::time::Duration;
use thiserror::Error;

/// Type alias for Result with CleanupError
pub type Result<T> = std::result::Result<T, CleanupError>;

/// Error types for the mailbox cleanup service
#[derive(Error, Debug)]
pub enum CleanupError {
    /// Gmail API returned an error
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Rate limit exceeded - should retry after specified seconds
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Network-related error (connection issues, resets)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// A single remote request exceeded its deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Search was issued with an unusable filter expression
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Tool or pipeline argument out of range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Label-related errors
    #[error("Label error: {0}")]
    LabelError(String),

    /// Mail service could not be acquired (missing secrets, failed OAuth, ...)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl CleanupError {
    /// Check if the error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CleanupError::RateLimitExceeded { .. }
                | CleanupError::ServerError { .. }
                | CleanupError::NetworkError(_)
                | CleanupError::Timeout(_)
        )
    }

    /// Check if the error is permanent and should not be retried
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Server-requested delay before the next attempt, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            CleanupError::RateLimitExceeded { retry_after } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ => None,
        }
    }
}

/// Parse the Retry-After header from an HTTP response
///
/// The header is either delay-seconds ("120") or an HTTP-date. Missing,
/// invalid or past values fall back to 5 seconds.
fn parse_retry_after_header<B>(response: &hyper::Response<B>) -> u64 {
    const DEFAULT_RETRY_AFTER: u64 = 5;

    if let Some(retry_after_value) = response.headers().get("retry-after") {
        if let Ok(retry_after_str) = retry_after_value.to_str() {
            if let Ok(seconds) = retry_after_str.parse::<u64>() {
                return seconds;
            }

            if let Ok(http_date) = httpdate::parse_http_date(retry_after_str) {
                if let Ok(duration) = http_date.duration_since(std::time::SystemTime::now()) {
                    return duration.as_secs();
                }
            }
        }
    }

    DEFAULT_RETRY_AFTER
}

impl From<google_gmail1::Error> for CleanupError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let status_code = status.as_u16();
                let message = format!(
                    "HTTP {}: {}",
                    status_code,
                    status.canonical_reason().unwrap_or("Unknown")
                );

                match status_code {
                    429 => CleanupError::RateLimitExceeded {
                        retry_after: parse_retry_after_header(response),
                    },
                    404 => CleanupError::NotFound(message),
                    400 => CleanupError::BadRequest(message),
                    401 => CleanupError::AuthError(message),
                    403 => CleanupError::Forbidden(message),
                    500..=599 => CleanupError::ServerError {
                        status: status_code,
                        message,
                    },
                    _ => CleanupError::ApiError(message),
                }
            }
            google_gmail1::Error::BadRequest(ref err) => {
                CleanupError::BadRequest(format!("{}", err))
            }
            google_gmail1::Error::HttpError(ref err) => {
                CleanupError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => CleanupError::NetworkError(err.to_string()),
            google_gmail1::Error::MissingToken(err) => CleanupError::AuthError(err.to_string()),
            _ => CleanupError::ApiError(error.to_string()),
        }
    }
}
