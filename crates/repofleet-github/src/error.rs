//! GitHub client error types with retryable/fatal classification.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by [`crate::GithubClient`] operations.
#[derive(Debug, Error)]
pub enum GithubError {
    /// Network-level failure (connection refused, DNS, TLS).
    #[error("network error: {0}")]
    Network(String),

    /// The request timed out.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// GitHub signalled abuse/secondary rate limiting.
    #[error("rate limited by GitHub (retry after {retry_after_secs:?} seconds)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Repository creation hit an existing repository with the same name.
    #[error("repository name already exists: {name}")]
    NameConflict { name: String },

    /// The requested resource does not exist (or is not yet visible).
    #[error("not found: {0}")]
    NotFound(String),

    /// Credentials were rejected.
    #[error("authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    /// Any other API-level failure.
    #[error("GitHub API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A local file exceeded the upload size limit.
    #[error("file too large ({size_mib:.1} MiB, maximum 50 MiB): {path}")]
    FileTooLarge { path: PathBuf, size_mib: f64 },

    /// Local filesystem failure while preparing an upload.
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Secret name failed the `^[A-Z0-9_]+$` constraint.
    #[error(
        "invalid secret name '{0}': only uppercase letters, digits and underscores are allowed"
    )]
    InvalidSecretName(String),

    /// Sealed-box encryption failed.
    #[error("failed to encrypt secret: {0}")]
    Encryption(String),

    /// The repository has no workflows at all.
    #[error(
        "no workflows exist in repository '{repo}'; upload a workflow file under \
         .github/workflows/ first"
    )]
    NoWorkflows { repo: String },

    /// The named workflow file is not among the repository's workflows.
    #[error("workflow file '{file}' not found in repository '{repo}'; available: {available:?}")]
    WorkflowNotFound {
        repo: String,
        file: String,
        available: Vec<String>,
    },

    /// The workflow exists but refuses manual dispatch.
    #[error(
        "workflow '{file}' does not accept manual dispatch; add a 'workflow_dispatch:' \
         trigger to its 'on:' section"
    )]
    WorkflowNotDispatchable { file: String },

    /// A response body could not be decoded.
    #[error("failed to parse response: {0}")]
    Parse(String),
}

impl GithubError {
    /// Whether a retry with backoff can reasonably succeed.
    ///
    /// Rate limiting, server-side errors, and transport failures are
    /// retryable; every other 4xx-class or local error is fatal on first
    /// sight.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            GithubError::Network(_) | GithubError::Timeout(_) | GithubError::RateLimited { .. } => {
                true
            }
            GithubError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for GithubError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GithubError::Timeout(e.to_string())
        } else {
            GithubError::Network(e.to_string())
        }
    }
}

/// Result type for GitHub client operations.
pub type GithubResult<T> = Result<T, GithubError>;
