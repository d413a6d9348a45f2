//! Error types for configuration loading and validation.

use thiserror::Error;

/// Errors raised while loading, migrating, or validating configuration.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration file could not be read or written.
    #[error("configuration file error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid JSON or does not match the schema.
    #[error("configuration parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Configuration file declares a version this build does not understand.
    #[error("unsupported configuration version {0}")]
    UnsupportedVersion(u64),

    /// Name generation failed.
    #[error(transparent)]
    Naming(#[from] crate::naming::NamingError),

    /// Pre-flight validation found one or more problems.
    ///
    /// Every problem is listed; nothing is silently dropped.
    #[error("configuration validation failed:\n{}", .0.join("\n"))]
    Validation(Vec<String>),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
