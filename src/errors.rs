//! Error handling for the vote pipeline

/// Result type alias for the vote pipeline
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the vote pipeline
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The queue broker cannot be reached or refused the operation
    #[error("Transport unavailable: {message}")]
    TransportUnavailable { message: String },

    /// An established transport connection went away
    #[error("Transport connection lost: {message}")]
    ConnectionLost { message: String },

    /// The counter store cannot be reached or refused the operation
    #[error("Counter store unavailable: {message}")]
    StoreUnavailable { message: String },

    /// Payload width does not match the fixed candidate encoding
    #[error("Malformed payload: expected {expected} bytes, got {actual}")]
    MalformedPayload { expected: usize, actual: usize },

    /// Well-formed payload naming a candidate outside the known set
    #[error("Unknown candidate: {0}")]
    UnknownCandidate(i32),

    /// Validation errors
    #[error("Validation failed: {field}")]
    Validation { field: String },

    /// Invalid or missing configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Create a new transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportUnavailable {
            message: message.into(),
        }
    }

    /// Create a new connection-lost error
    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::ConnectionLost {
            message: message.into(),
        }
    }

    /// Create a new counter store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(field: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
        }
    }

    /// Create a new configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the failure is tied to a single message and should be dropped
    pub fn is_decode_failure(&self) -> bool {
        matches!(
            self,
            Self::MalformedPayload { .. } | Self::UnknownCandidate(_)
        )
    }

    /// Whether retrying the same operation later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransportUnavailable { .. }
                | Self::ConnectionLost { .. }
                | Self::StoreUnavailable { .. }
        )
    }
}

impl From<lapin::Error> for Error {
    fn from(err: lapin::Error) -> Self {
        match err {
            lapin::Error::InvalidChannelState(_) | lapin::Error::InvalidConnectionState(_) => {
                Self::connection_lost(err.to_string())
            }
            other => Self::transport(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Self::store(err.to_string())
    }
}

/// Convenience macros for creating specific error types
#[macro_export]
macro_rules! transport_error {
    ($msg:expr) => {
        $crate::Error::transport($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::transport(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! store_error {
    ($msg:expr) => {
        $crate::Error::store($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::store(format!($fmt, $($arg)*))
    };
}
