//! Provider failure taxonomy.
//!
//! Callers retry only what [`ProviderError::is_transient`] allows; every
//! other failure is stored on the unit as a permanent error.

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider throttled the request (HTTP 429).
    #[error("Provider rate limited the request: {0}")]
    RateLimited(String),

    /// The request or the provider's own processing timed out.
    #[error("Provider request timed out: {0}")]
    Timeout(String),

    /// The provider is temporarily unavailable (HTTP 5xx).
    #[error("Provider unavailable ({status}): {body}")]
    Unavailable { status: u16, body: String },

    /// The provider refused the input (HTTP 4xx other than 408/429).
    #[error("Provider rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The provider answered 2xx with a body that could not be used.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),

    /// Network, DNS or TLS failure before a response arrived.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Provider configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    /// Classify a non-2xx HTTP response.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => Self::RateLimited(body),
            408 | 504 => Self::Timeout(body),
            500..=599 => Self::Unavailable { status, body },
            _ => Self::Rejected { status, body },
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited(_) | Self::Timeout(_) | Self::Unavailable { .. } => true,
            Self::Request(err) => err.is_timeout() || err.is_connect(),
            Self::Rejected { .. } | Self::InvalidResponse(_) | Self::Config(_) => false,
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;
