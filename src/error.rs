// ABOUTME: Defines all error types for tollgate using thiserror.
// ABOUTME: Wire and admission errors are unified under GatewayError.

use std::time::Duration;

/// Top-level error delivered to callers of the gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Timed out after {waited:?} waiting for quota (retry in ~{retry_in:?})")]
    AdmissionTimeout { waited: Duration, retry_in: Duration },

    #[error("Provider kept rejecting the request for quota after {attempts} attempts")]
    QuotaExhausted { attempts: u32, retry_in: Duration },

    #[error("Transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Request cancelled")]
    Cancelled,
}

/// Coarse classification of a [`GatewayError`] for user-facing messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The gateway is misconfigured; retrying will not help.
    Configuration,
    /// Quota was not available in time; retrying later may succeed.
    RateLimit,
    /// Anything else.
    Failure,
}

impl GatewayError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Configuration(_) => ErrorKind::Configuration,
            GatewayError::AdmissionTimeout { .. } | GatewayError::QuotaExhausted { .. } => {
                ErrorKind::RateLimit
            }
            _ => ErrorKind::Failure,
        }
    }

    /// How long the caller should wait before trying again, for rate-limit errors.
    pub fn retry_hint(&self) -> Option<Duration> {
        match self {
            GatewayError::AdmissionTimeout { retry_in, .. }
            | GatewayError::QuotaExhausted { retry_in, .. } => Some(*retry_in),
            _ => None,
        }
    }
}

/// Errors from the wire-level chat client.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited by provider: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("Unexpected response shape: {0}")]
    Malformed(String),

    #[error("Deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<LlmError> for GatewayError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Http(e) => GatewayError::Transport(e),
            LlmError::Api { status, message } => GatewayError::Provider { status, message },
            // Only reached when a caller bypasses the dispatcher's retry loop.
            LlmError::RateLimited {
                retry_after,
                message: _,
            } => GatewayError::QuotaExhausted {
                attempts: 1,
                retry_in: retry_after.unwrap_or_default(),
            },
            LlmError::Malformed(msg) => GatewayError::MalformedResponse(msg),
            LlmError::Deserialize(e) => GatewayError::MalformedResponse(e.to_string()),
            LlmError::Configuration(msg) => GatewayError::Configuration(msg),
        }
    }
}

/// Errors from waiting on quota admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("admission deadline of {waited:?} elapsed")]
    Timeout { waited: Duration },
}
