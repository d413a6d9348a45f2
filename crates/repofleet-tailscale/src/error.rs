//! Tailscale client error types.

use thiserror::Error;

/// Errors raised by [`crate::TailscaleClient`] operations.
///
/// Timeouts, transport failures, and API-level failures are kept distinct
/// so the operator can tell an unreachable API from rejected credentials.
#[derive(Debug, Error)]
pub enum TailscaleError {
    /// The API did not answer within the request timeout.
    #[error("request timed out: Tailscale API not responding")]
    Timeout,

    /// Transport-level failure (connection refused, DNS, TLS).
    #[error("network error: {0}")]
    Network(String),

    /// The API answered with a non-success status.
    #[error("Tailscale API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A response body could not be decoded.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// Bulk issuance produced no keys at all.
    #[error("failed to issue any auth keys (all {attempted} attempts failed)")]
    NoKeysIssued { attempted: usize },

    /// Writing the key backup file failed.
    #[error("failed to write key backup: {0}")]
    Backup(#[from] std::io::Error),
}

impl TailscaleError {
    /// Whether a retry with backoff can reasonably succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            TailscaleError::Timeout | TailscaleError::Network(_) => true,
            TailscaleError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for TailscaleError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TailscaleError::Timeout
        } else {
            TailscaleError::Network(e.to_string())
        }
    }
}

/// Result type for Tailscale client operations.
pub type TailscaleResult<T> = Result<T, TailscaleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(TailscaleError::Timeout.is_retryable());
        assert!(TailscaleError::Network("refused".into()).is_retryable());
        assert!(TailscaleError::Api {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(!TailscaleError::Api {
            status: 403,
            message: "forbidden".into()
        }
        .is_retryable());
        assert!(!TailscaleError::NoKeysIssued { attempted: 5 }.is_retryable());
    }
}
