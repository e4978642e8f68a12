use thiserror::Error;

/// Type alias for Result with SweepError
pub type Result<T> = std::result::Result<T, SweepError>;

/// Error types for the mailbox sweep engine
#[derive(Error, Debug)]
pub enum SweepError {
    /// Remote API answered with a non-success status
    #[error("Gmail API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Network-related error (connection issues, TLS, etc.)
    #[error("Network error: {0}")]
    Network(String),

    /// Gateway returned a shape the engine cannot parse
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// No local records match the requested sender
    #[error("No emails found from {sender}")]
    NotFound { sender: String },

    /// Another operation of the same kind is still in flight
    #[error("Operation already in progress: {0}")]
    Busy(String),

    /// Authentication failed or no credential is available
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Wraps another error with the name of the failed operation
    #[error("Failed to {operation}: {source}")]
    Operation {
        operation: String,
        #[source]
        source: Box<SweepError>,
    },
}

impl SweepError {
    /// Wrap this error with operation context, keeping its kind
    pub fn context(self, operation: impl Into<String>) -> Self {
        SweepError::Operation {
            operation: operation.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any operation context
    pub fn root(&self) -> &SweepError {
        match self {
            SweepError::Operation { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if the error came from the remote gateway
    pub fn is_transport(&self) -> bool {
        matches!(
            self.root(),
            SweepError::Api { .. } | SweepError::Network(_) | SweepError::InvalidResponse(_)
        )
    }

    /// Check if the error means no local records matched a sender
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), SweepError::NotFound { .. })
    }
}

impl From<google_gmail1::Error> for SweepError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            // HTTP response with status code (non-success responses)
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                SweepError::Api {
                    status: status.as_u16(),
                    message: status.canonical_reason().unwrap_or("Unknown").to_string(),
                }
            }
            // JSON error body: {"error": {"code": 404, "message": "..."}}
            google_gmail1::Error::BadRequest(ref body) => SweepError::Api {
                status: body
                    .pointer("/error/code")
                    .and_then(|c| c.as_u64())
                    .and_then(|c| u16::try_from(c).ok())
                    .unwrap_or(400),
                message: body
                    .pointer("/error/message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| body.to_string()),
            },
            google_gmail1::Error::HttpError(ref err) => {
                SweepError::Network(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => SweepError::Network(err.to_string()),
            google_gmail1::Error::JsonDecodeError(body, err) => {
                SweepError::InvalidResponse(format!("{} (body: {})", err, body))
            }
            _ => SweepError::Network(error.to_string()),
        }
    }
}
