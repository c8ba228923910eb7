use reqwest::StatusCode;
use thiserror::Error;

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Logical backend operation, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Health,
    RootTest,
    Upload,
    GetFile,
    Process,
    TestImages,
    Preflight,
    Probe,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Health => "health check",
            Operation::RootTest => "root path test",
            Operation::Upload => "upload",
            Operation::GetFile => "get file",
            Operation::Process => "image processing",
            Operation::TestImages => "test image listing",
            Operation::Preflight => "CORS preflight",
            Operation::Probe => "endpoint probe",
        };
        f.write_str(name)
    }
}

/// Coarse classification of an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request never produced a response (transport, DNS, deadline).
    Network,
    /// The backend rejected the request with HTTP 422.
    Validation,
    /// Any other non-success status.
    Server,
    /// A response arrived but its body was not what we expected.
    Decode,
    /// Rejected locally before a request was sent.
    Input,
}

/// Errors returned by [`crate::api::ApiClient`].
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport-level failure, including an expired deadline
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// HTTP 422; `detail` is the JSON serialization of the body's `detail` field
    #[error("{operation} validation error: {detail}")]
    Validation { operation: Operation, detail: String },

    /// Non-success status other than 422
    #[error("{operation} failed (HTTP {status})")]
    Server {
        operation: Operation,
        status: StatusCode,
        body: Option<String>,
    },

    /// Body did not decode as the expected JSON
    #[error("{operation} returned an unexpected body: {source}")]
    Decode {
        operation: Operation,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid path segment: {0:?}")]
    InvalidPathSegment(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Network(_) => ErrorKind::Network,
            ApiError::Validation { .. } => ErrorKind::Validation,
            ApiError::Server { .. } => ErrorKind::Server,
            ApiError::Decode { .. } => ErrorKind::Decode,
            ApiError::InvalidInput(_) | ApiError::InvalidPathSegment(_) | ApiError::Io(_) => {
                ErrorKind::Input
            }
        }
    }

    /// HTTP status of the response that caused this error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Validation { .. } => Some(StatusCode::UNPROCESSABLE_ENTITY),
            ApiError::Server { status, .. } => Some(*status),
            ApiError::Network(e) => e.status(),
            _ => None,
        }
    }

    /// Whether the request ran out of time rather than failing outright.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Network(e) if e.is_timeout())
    }
}
