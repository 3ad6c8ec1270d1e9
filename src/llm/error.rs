//! Structured LLM errors and the retry policy for transient failures.

use std::time::Duration;

use thiserror::Error;

/// Broad classification of a failed LLM request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// 429 from the provider
    RateLimited,
    /// 5xx from the provider
    ServerError,
    /// 4xx other than 429
    ClientError,
    /// Timeout, DNS or connection failure
    NetworkError,
    /// Response body did not have the expected shape
    ParseError,
}

impl std::fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate limited"),
            Self::ServerError => write!(f, "server error"),
            Self::ClientError => write!(f, "client error"),
            Self::NetworkError => write!(f, "network error"),
            Self::ParseError => write!(f, "parse error"),
        }
    }
}

/// Map an HTTP status code onto an error kind.
pub fn classify_http_status(status: u16) -> LlmErrorKind {
    match status {
        429 => LlmErrorKind::RateLimited,
        500..=599 => LlmErrorKind::ServerError,
        400..=499 => LlmErrorKind::ClientError,
        _ => LlmErrorKind::ServerError,
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
    pub status: Option<u16>,
    /// From the Retry-After header, when the provider sent one
    pub retry_after: Option<Duration>,
}

impl LlmError {
    fn new(kind: LlmErrorKind, message: String, status: Option<u16>) -> Self {
        Self {
            kind,
            message,
            status,
            retry_after: None,
        }
    }

    pub fn rate_limited(message: String, retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::new(LlmErrorKind::RateLimited, message, Some(429))
        }
    }

    pub fn server_error(status: u16, message: String) -> Self {
        Self::new(LlmErrorKind::ServerError, message, Some(status))
    }

    pub fn client_error(status: u16, message: String) -> Self {
        Self::new(LlmErrorKind::ClientError, message, Some(status))
    }

    pub fn network_error(message: String) -> Self {
        Self::new(LlmErrorKind::NetworkError, message, None)
    }

    pub fn parse_error(message: String) -> Self {
        Self::new(LlmErrorKind::ParseError, message, None)
    }

    /// Whether retrying the same request can plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            LlmErrorKind::RateLimited | LlmErrorKind::ServerError | LlmErrorKind::NetworkError
        )
    }

    /// Delay before retry number `attempt` (0-based).
    ///
    /// Honors Retry-After when present, otherwise doubles from one second and
    /// caps at thirty.
    pub fn suggested_delay(&self, attempt: u32) -> Duration {
        if let Some(retry_after) = self.retry_after {
            return retry_after;
        }
        let base = match self.kind {
            LlmErrorKind::RateLimited => Duration::from_secs(2),
            _ => Duration::from_secs(1),
        };
        let factor = 2u32.saturating_pow(attempt.min(5));
        base.saturating_mul(factor).min(Duration::from_secs(30))
    }
}

/// Retry policy for transient LLM failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// Wall-clock budget across all attempts of one request
    pub max_retry_duration: Duration,
    pub retry_on_rate_limit: bool,
    pub retry_on_server_error: bool,
    pub retry_on_network_error: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_retry_duration: Duration::from_secs(120),
            retry_on_rate_limit: true,
            retry_on_server_error: true,
            retry_on_network_error: true,
        }
    }
}

impl RetryConfig {
    pub fn should_retry(&self, error: &LlmError) -> bool {
        match error.kind {
            LlmErrorKind::RateLimited => self.retry_on_rate_limit,
            LlmErrorKind::ServerError => self.retry_on_server_error,
            LlmErrorKind::NetworkError => self.retry_on_network_error,
            LlmErrorKind::ClientError | LlmErrorKind::ParseError => false,
        }
    }
}
