//! Provider and router error taxonomy

use std::time::Duration;
use thiserror::Error;

/// Errors from a single provider dispatch
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Authentication rejected: {0}")]
    Authentication(String),

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Quota or billing exhausted: {0}")]
    Quota(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Stream ended before completion")]
    StreamTruncated,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    /// Classify an HTTP error status into the taxonomy
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => Self::Authentication(message),
            402 => Self::Quota(message),
            404 => Self::NotFound(message),
            408 => Self::Timeout(Duration::from_secs(0)),
            429 => Self::RateLimited {
                retry_after: Duration::from_secs(60),
            },
            _ => Self::Api { status, message },
        }
    }

    /// Check if this is a rate limit error
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Network(_) => true,
            Self::Timeout(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::StreamTruncated => true,
            Self::Authentication(_) | Self::Quota(_) | Self::NotFound(_) => false,
            Self::InvalidResponse(_) | Self::Json(_) => false,
        }
    }

    /// Get the retry duration if this is a rate limit error
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Stable classification tag written to persisted error columns
    pub fn classification(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "authentication",
            Self::RateLimited { .. } => "rate_limit",
            Self::Quota(_) => "quota",
            Self::Network(_) => "network",
            Self::Timeout(_) => "timeout",
            Self::NotFound(_) => "not_found",
            Self::Api { .. } => "internal",
            Self::InvalidResponse(_) => "validation",
            Self::StreamTruncated => "network",
            Self::Json(_) => "validation",
        }
    }
}

/// Errors from the provider router
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("All providers unavailable; last error: {last}")]
    AllProvidersUnavailable { last: Box<ProviderError> },

    #[error("No provider configured")]
    NoProviderConfigured,

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl RouterError {
    /// Whether a later retry might succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AllProvidersUnavailable { last } => last.is_retryable(),
            Self::NoProviderConfigured => false,
            Self::Provider(e) => e.is_retryable(),
        }
    }

    /// Stable classification tag
    pub fn classification(&self) -> &'static str {
        match self {
            Self::AllProvidersUnavailable { last } => last.classification(),
            Self::NoProviderConfigured => "validation",
            Self::Provider(e) => e.classification(),
        }
    }
}
