use thiserror::Error;

/// Message raised when a lookup is built without a search endpoint.
pub const MISSING_ENDPOINT_MESSAGE: &str = "Missing API_ENDPOINT in configuration";

/// Top-level error for building and running a trial lookup
#[derive(Debug, Error)]
pub enum MatchError {
    /// Missing or invalid setup, raised while constructing a lookup
    #[error("{0}")]
    Configuration(String),

    /// The remote trial-search query failed
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The code mapping tables could not be loaded
    #[error(transparent)]
    CodeTables(#[from] CodeTableError),
}

impl MatchError {
    /// Create a new Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Error raised when no search endpoint is configured
    pub fn missing_endpoint() -> Self {
        Self::Configuration(MISSING_ENDPOINT_MESSAGE.to_string())
    }

    /// Whether this error was raised while building the lookup
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Api(err) => err.category(),
            Self::CodeTables(_) => ErrorCategory::CodeTables,
        }
    }
}

/// Failure of the remote trial-search query.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The HTTP exchange could not complete; carries the transport message verbatim.
    #[error("{0}")]
    Transport(String),

    /// The endpoint answered with a non-success status.
    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body is not JSON.
    #[error("Unable to parse response from server as JSON: {0}")]
    InvalidJson(String),

    /// The response is JSON, but not an array of trial summaries.
    #[error("Unexpected response from server: {0}")]
    UnexpectedShape(String),

    /// A trial summary arrived without its registry identifier.
    #[error("Trial summary at index {index} has no trialId")]
    MissingTrialId { index: usize },

    /// The patient record could not be encoded as a request body.
    #[error("Unable to encode query: {0}")]
    Encode(String),
}

impl ApiError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        Self::InvalidJson(message.into())
    }

    pub fn unexpected_shape(message: impl Into<String>) -> Self {
        Self::UnexpectedShape(message.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(_) | Self::Status { .. } => ErrorCategory::Upstream,
            Self::InvalidJson(_)
            | Self::UnexpectedShape(_)
            | Self::MissingTrialId { .. }
            | Self::Encode(_) => ErrorCategory::Protocol,
        }
    }
}

/// Failure to load a code mapping table.
#[derive(Debug, Error)]
pub enum CodeTableError {
    #[error("Failed to read code mapping file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid code mapping file {path}: {message}")]
    Parse { path: String, message: String },
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Upstream,
    Protocol,
    CodeTables,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Upstream => write!(f, "upstream"),
            Self::Protocol => write!(f, "protocol"),
            Self::CodeTables => write!(f, "code_tables"),
        }
    }
}

/// Convenience result type for matching operations
pub type Result<T> = std::result::Result<T, MatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_endpoint_message() {
        let err = MatchError::missing_endpoint();
        assert_eq!(err.to_string(), "Missing API_ENDPOINT in configuration");
        assert!(err.is_configuration_error());
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_transport_message_is_verbatim() {
        let err: MatchError = ApiError::transport("Oops").into();
        assert_eq!(err.to_string(), "Oops");
        assert!(!err.is_configuration_error());
        assert_eq!(err.category(), ErrorCategory::Upstream);
    }

    #[test]
    fn test_status_error_carries_body() {
        let err = ApiError::status(500, "This is an error.");
        assert_eq!(err.to_string(), "Server returned 500: This is an error.");
        assert_eq!(err.category(), ErrorCategory::Upstream);
    }

    #[test]
    fn test_protocol_errors() {
        assert_eq!(
            ApiError::invalid_json("expected value").category(),
            ErrorCategory::Protocol
        );
        assert_eq!(
            ApiError::unexpected_shape("null").category(),
            ErrorCategory::Protocol
        );
        let missing = ApiError::MissingTrialId { index: 2 };
        assert_eq!(missing.to_string(), "Trial summary at index 2 has no trialId");
    }

    #[test]
    fn test_code_table_error_display() {
        let err: MatchError = CodeTableError::Parse {
            path: "rxnorm.json".into(),
            message: "expected object".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Invalid code mapping file rxnorm.json: expected object"
        );
        assert_eq!(err.category(), ErrorCategory::CodeTables);
    }

    #[test]
    fn test_error_categories_display() {
        assert_eq!(ErrorCategory::Configuration.to_string(), "configuration");
        assert_eq!(ErrorCategory::Upstream.to_string(), "upstream");
        assert_eq!(ErrorCategory::Protocol.to_string(), "protocol");
        assert_eq!(ErrorCategory::CodeTables.to_string(), "code_tables");
    }
}
