//! Error types for fedifetch
//!
//! All errors in the crate are converted to `AppError`.
//! Signature rejection reasons are internal: `SignatureService::verify`
//! collapses them into a plain `false` for callers deciding trust.

use thiserror::Error;

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Signing attempted with a keypair that holds no private key
    #[error("Operation not permitted: keypair has no private key")]
    OperationNotPermitted,

    /// Neither `Signature` nor `Authorization: Signature` header present
    #[error("Missing signature")]
    SignatureMissing,

    /// Signature parameter string could not be parsed
    #[error("Malformed signature: {0}")]
    SignatureMalformed(String),

    /// Request carries no `Date` header
    #[error("Missing Date header")]
    DateMissing,

    /// `Date` header is not an RFC 2822 date
    #[error("Invalid Date header: {0}")]
    DateInvalid(String),

    /// Declared request time is outside the replay window
    #[error("Clock skew of {skew_seconds}s exceeds replay window")]
    ClockSkewExceeded { skew_seconds: i64 },

    /// Signature algorithm other than RSA-SHA256
    #[error("Unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Cryptographic mismatch
    #[error("Signature verification failed")]
    VerificationFailed,

    /// Signed `Digest` header missing, unsupported, or not matching the body
    #[error("Digest check failed: {0}")]
    DigestMismatch(String),

    /// Dereference produced no node
    #[error("Node not found: {iri}")]
    NodeNotFound { iri: String },

    /// Triple is not fully specified
    #[error("Invalid triple: {0}")]
    InvalidTriple(String),

    /// Key material could not be parsed, encoded or generated
    #[error("Key error: {0}")]
    Key(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Destination host is not allowed
    #[error("Access denied")]
    Forbidden,

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    /// Stable label used for metrics and log fields
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::OperationNotPermitted => "operation_not_permitted",
            AppError::SignatureMissing => "signature_missing",
            AppError::SignatureMalformed(_) => "signature_malformed",
            AppError::DateMissing => "date_missing",
            AppError::DateInvalid(_) => "date_invalid",
            AppError::ClockSkewExceeded { .. } => "clock_skew_exceeded",
            AppError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            AppError::VerificationFailed => "verification_failed",
            AppError::DigestMismatch(_) => "digest_mismatch",
            AppError::NodeNotFound { .. } => "node_not_found",
            AppError::InvalidTriple(_) => "invalid_triple",
            AppError::Key(_) => "key",
            AppError::Validation(_) => "validation",
            AppError::Forbidden => "forbidden",
            AppError::Database(_) => "database",
            AppError::HttpClient(_) => "http_client",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }

    /// Build a `NodeNotFound` for an IRI
    pub fn node_not_found(iri: impl Into<String>) -> Self {
        AppError::NodeNotFound { iri: iri.into() }
    }

    /// Record this error in the error counter and hand it back
    pub fn record(self) -> Self {
        crate::metrics::ERRORS_TOTAL
            .with_label_values(&[self.error_type()])
            .inc();
        self
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
