//! Error types for queue operations.

use thiserror::Error;

/// Single error type returned by every queue operation.
///
/// Every remote failure carries a provider-assigned code and a human-readable
/// message, available through [`QueueError::code`] and [`QueueError::message`].
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Message not found or pop receipt no longer valid: {message_id}")]
    MessageNotFound { message_id: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Storage service error ({status}): {code} - {message}")]
    Service {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl QueueError {
    /// Error code, as reported by the storage service where one exists
    pub fn code(&self) -> &str {
        match self {
            Self::QueueNotFound { .. } => "QueueNotFound",
            Self::MessageNotFound { .. } => "MessageNotFound",
            Self::AuthenticationFailed { .. } => "AuthenticationFailed",
            Self::ConnectionFailed { .. } => "ConnectionFailed",
            Self::Timeout { .. } => "Timeout",
            Self::Service { code, .. } => code,
            Self::Serialization(_) => "SerializationError",
            Self::Configuration(_) => "ConfigurationError",
            Self::Validation(_) => "ValidationError",
        }
    }

    /// Human-readable message without the code prefix
    pub fn message(&self) -> String {
        match self {
            Self::Service { message, .. } => message.clone(),
            Self::AuthenticationFailed { message } | Self::ConnectionFailed { message } => {
                message.clone()
            }
            Self::Serialization(e) => e.to_string(),
            Self::Configuration(e) => e.to_string(),
            Self::Validation(e) => e.to_string(),
            other => other.to_string(),
        }
    }

    /// HTTP status reported by the service, if the error came from a response
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Service { status, .. } => Some(*status),
            Self::QueueNotFound { .. } | Self::MessageNotFound { .. } => Some(404),
            _ => None,
        }
    }

    /// Check if error is transient and a caller may retry
    ///
    /// The client never retries on its own; this is advice for callers.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::QueueNotFound { .. } => false,
            Self::MessageNotFound { .. } => false,
            Self::AuthenticationFailed { .. } => false,
            Self::ConnectionFailed { .. } => true,
            Self::Timeout { .. } => true,
            Self::Service { status, code, .. } => {
                *status >= 500 || *status == 408 || code == "ServerBusy"
            }
            Self::Serialization(_) => false,
            Self::Configuration(_) => false,
            Self::Validation(_) => false,
        }
    }
}

/// Errors while decoding service responses or message bodies
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("XML parsing failed: {message}")]
    Xml { message: String },

    #[error("Response is missing element '{element}'")]
    MissingElement { element: String },

    #[error("Message text is not valid base64: {message}")]
    InvalidBase64 { message: String },

    #[error("Message body is not valid UTF-8")]
    InvalidUtf8,

    #[error("Header '{header}' has invalid value '{value}'")]
    InvalidHeader { header: String, value: String },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Connection string parsing failed: {message}")]
    ConnectionString { message: String },
}

/// Validation errors for locally constructed identifiers
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
