//! Core error types for Threadscope.
//!
//! `ScrapeError` is the central error type shared by every crate in the
//! workspace. Each variant belongs to exactly one [`ErrorCategory`], which
//! decides whether the failure is retried and how it is reported to callers.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Central error type for all scraping operations.
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// Untrusted input was rejected (bad handle, URL, or limit)
    #[error("validation error: {0}")]
    Validation(String),

    /// The requested profile does not exist or was removed
    #[error("not found: {0}")]
    NotFound(String),

    /// The profile is private or access was blocked
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// An operation exceeded its deadline
    #[error("timeout: {0}")]
    Timeout(String),

    /// The client exceeded its request budget
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimited {
        /// How long the client must wait before its next request
        retry_after: Duration,
    },

    /// The admission gate refused new work (capacity or circuit open)
    #[error("capacity exhausted: {0}")]
    Capacity(String),

    /// Navigation or connection failure
    #[error("network error: {0}")]
    Network(String),

    /// Browser driver failure (launch, page creation, CDP)
    #[error("browser error: {0}")]
    Browser(String),

    /// Expected embedded data was missing from an otherwise loaded page
    #[error("extraction error: {0}")]
    Extraction(String),

    /// Configuration errors (file loading, parsing, validation)
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl ScrapeError {
    /// Category used for retry decisions and boundary reporting.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::Forbidden(_) => ErrorCategory::Forbidden,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Timeout(_) | Self::Capacity(_) => ErrorCategory::Resource,
            Self::Network(_) | Self::Browser(_) | Self::Extraction(_) => ErrorCategory::Network,
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => ErrorCategory::System,
        }
    }

    /// Whether the facade's retry policy may attempt the operation again.
    ///
    /// Caller mistakes and definitive answers from the origin are never
    /// retried; transient driver, network and deadline failures are.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Network(_) | Self::Browser(_) | Self::Extraction(_)
        )
    }

    /// Whether this error is a timeout (tracked separately by the governor).
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// HTTP status code reported at the service boundary.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::RateLimited { .. } => 429,
            Self::Timeout(_) | Self::Capacity(_) => 503,
            Self::Network(_) | Self::Browser(_) | Self::Extraction(_) => 502,
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => 500,
        }
    }

    /// Sanitized message safe to show to untrusted callers.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Invalid profile URL or handle. Please check the format.",
            Self::NotFound(_) => "Profile not found. Please check the username.",
            Self::Forbidden(_) => "This profile is private or inaccessible.",
            Self::RateLimited { .. } => "Too many requests. Please wait before trying again.",
            Self::Timeout(_) | Self::Capacity(_) => {
                "Service temporarily unavailable. Please try again later."
            }
            Self::Network(_) | Self::Browser(_) | Self::Extraction(_) => {
                "Network error. Please check your connection and try again."
            }
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => {
                "An unexpected error occurred. Please try again later."
            }
        }
    }

    /// Suggested wait before retrying, when the category has one.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            Self::Timeout(_) | Self::Capacity(_) => Some(Duration::from_secs(30)),
            _ => None,
        }
    }
}

/// Boundary-facing error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad input
    Validation,
    /// Profile absent
    NotFound,
    /// Private or blocked
    Forbidden,
    /// Client over budget
    RateLimit,
    /// Capacity, circuit breaker or deadline
    Resource,
    /// Navigation, driver or origin failure
    Network,
    /// Anything else
    System,
}

impl ErrorCategory {
    /// Stable lowercase name, matching the serialized form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::RateLimit => "rate_limit",
            Self::Resource => "resource",
            Self::Network => "network",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to determine config directory path
    #[error("could not determine config directory (XDG base directories not available)")]
    NoConfigDir,

    /// Failed to parse TOML
    #[error("failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config
    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// I/O error reading/writing config
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue {
        /// Field name
        field: String,
        /// Reason for invalidity
        reason: String,
    },
}

/// Result type alias using `ScrapeError`.
pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
