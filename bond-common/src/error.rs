//! Error types for the bond screener.

use thiserror::Error;

/// Result type alias using the screener error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the screener pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection failure, timeout or non-success HTTP status
    #[error("Network error: {0}")]
    Network(String),

    /// Response body does not match the expected ISS schema
    #[error("Parse error: {0}")]
    Parse(String),

    /// Criterion whose threshold does not fit its operator or attribute
    #[error("Invalid criterion: {0}")]
    InvalidCriterion(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping context wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this is a network error.
    pub fn is_network(&self) -> bool {
        matches!(self.root(), Self::Network(_))
    }

    /// Check if this is a parse error.
    pub fn is_parse(&self) -> bool {
        matches!(self.root(), Self::Parse(_))
    }

    /// Check if this is an invalid criterion error.
    pub fn is_invalid_criterion(&self) -> bool {
        matches!(self.root(), Self::InvalidCriterion(_))
    }

    /// Only network failures are transient; everything else fails the same way twice.
    pub fn is_retryable(&self) -> bool {
        self.is_network()
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self.root() {
            Self::Network(_) => 2,
            Self::Parse(_) | Self::Json(_) => 3,
            Self::InvalidCriterion(_) => 4,
            Self::Config(_) => 5,
            _ => 1,
        }
    }
}

/// Extension trait for adding context to any error type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}
