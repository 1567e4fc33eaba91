//! Error types for the unified persistence layer.
//!
//! All errors use `thiserror`. The taxonomy is backend-agnostic: native driver
//! failures from `sqlx` and `mongodb` are folded into it via `From`
//! conversions so callers never have to match on driver-specific types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// A required connection string was missing or malformed.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The requested backend kind is not recognized.
    #[error("Unsupported backend: '{kind}'")]
    UnsupportedBackend { kind: String },

    /// Handshake failure or pool-acquisition timeout.
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    /// Unique-constraint violation (email on users or auth).
    #[error("Duplicate key: {message}")]
    DuplicateKey {
        message: String,
        /// Native error code when the driver exposes one
        /// (e.g. "23505" for PostgreSQL, "11000" for MongoDB).
        code: Option<String>,
    },

    /// Unrecognized verb inside an `execute` query object.
    #[error("Unsupported operation: '{operation}'")]
    UnsupportedOperation { operation: String },

    /// A member operation of a transaction failed; the whole batch was
    /// rolled back.
    #[error("Transaction failed: {message}")]
    Transaction { message: String },

    /// Any other native database error.
    #[error("Database error: {message}")]
    Database {
        message: String,
        code: Option<String>,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl StoreError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an unsupported-backend error.
    pub fn unsupported_backend(kind: impl Into<String>) -> Self {
        Self::UnsupportedBackend { kind: kind.into() }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a duplicate-key error.
    pub fn duplicate_key(message: impl Into<String>, code: Option<String>) -> Self {
        Self::DuplicateKey {
            message: message.into(),
            code,
        }
    }

    /// Create an unsupported-operation error.
    pub fn unsupported_operation(operation: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation: operation.into(),
        }
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Create a database error with an optional native code.
    pub fn database(message: impl Into<String>, code: Option<String>) -> Self {
        Self::Database {
            message: message.into(),
            code,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Backend-specific error code, when available. Feeds the failure
    /// envelope's `code` field.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::DuplicateKey { code, .. } | Self::Database { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }
}

/// Convert sqlx errors to StoreError.
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => StoreError::configuration(msg.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                if db_err.is_unique_violation() {
                    StoreError::duplicate_key(db_err.message(), code)
                } else {
                    StoreError::database(db_err.message(), code)
                }
            }
            sqlx::Error::PoolTimedOut => StoreError::connection(
                "Timed out acquiring a connection from the pool",
                "The pool is exhausted; retry or raise max_connections",
            ),
            sqlx::Error::PoolClosed => StoreError::connection(
                "Connection pool is closed",
                "Request a new handle from the provider",
            ),
            sqlx::Error::Io(io_err) => StoreError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => StoreError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => StoreError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::RowNotFound => StoreError::database("No rows returned", None),
            sqlx::Error::ColumnNotFound(col) => {
                StoreError::internal(format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                StoreError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => StoreError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => StoreError::internal("Database worker crashed"),
            _ => StoreError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Convert mongodb driver errors to StoreError.
impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::{ErrorKind, WriteFailure};

        match err.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(we)) => {
                if we.code == 11000 {
                    StoreError::duplicate_key(we.message.clone(), Some(we.code.to_string()))
                } else {
                    StoreError::database(we.message.clone(), Some(we.code.to_string()))
                }
            }
            ErrorKind::Write(WriteFailure::WriteConcernError(wce)) => {
                StoreError::database(wce.message.clone(), Some(wce.code.to_string()))
            }
            ErrorKind::Command(ce) => {
                if ce.code == 11000 {
                    StoreError::duplicate_key(ce.message.clone(), Some(ce.code.to_string()))
                } else {
                    StoreError::database(ce.message.clone(), Some(ce.code.to_string()))
                }
            }
            ErrorKind::ServerSelection { message, .. } => StoreError::connection(
                message.clone(),
                "Check that the MongoDB server is reachable and the URI is correct",
            ),
            ErrorKind::Io(io_err) => StoreError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            ErrorKind::Authentication { message, .. } => StoreError::connection(
                message.clone(),
                "Verify the credentials in the connection string",
            ),
            ErrorKind::InvalidArgument { message, .. } => StoreError::configuration(message.clone()),
            ErrorKind::Transaction { message, .. } => StoreError::transaction(message.clone()),
            _ => StoreError::database(err.to_string(), None),
        }
    }
}

/// Result type alias for persistence operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));

        let err = StoreError::unsupported_backend("oracle");
        assert!(err.to_string().contains("oracle"));
    }

    #[test]
    fn test_unsupported_operation_mentions_verb() {
        let err = StoreError::unsupported_operation("explodeMany");
        assert!(err.to_string().contains("explodeMany"));
    }

    #[test]
    fn test_error_code_accessor() {
        let err = StoreError::duplicate_key("email taken", Some("23505".to_string()));
        assert_eq!(err.error_code(), Some("23505"));

        let err = StoreError::database("syntax error", Some("42601".to_string()));
        assert_eq!(err.error_code(), Some("42601"));

        let err = StoreError::configuration("missing connection string");
        assert_eq!(err.error_code(), None);
    }

    #[test]
    fn test_error_retryable() {
        assert!(StoreError::connection("err", "sugg").is_retryable());
        assert!(!StoreError::duplicate_key("dup", None).is_retryable());
        assert!(!StoreError::unsupported_backend("x").is_retryable());
    }

    #[test]
    fn test_pool_timeout_maps_to_connection() {
        let err: StoreError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, StoreError::Connection { .. }));
        assert!(err.suggestion().is_some());
    }
}
