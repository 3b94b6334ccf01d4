//! Error types for salesnote.
//!
//! This module defines all error types used throughout the salesnote crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for salesnote operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Domain Errors ===
    /// A referenced record does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of record (e.g. "customer", "schedule").
        entity: &'static str,
        /// The requested identifier.
        id: i64,
    },

    /// A record failed validation before being written.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A stored or user-supplied enum value was not recognized.
    #[error("invalid {kind}: '{value}'")]
    InvalidValue {
        /// Which kind of value (e.g. "stage", "activity type").
        kind: &'static str,
        /// The offending input.
        value: String,
    },

    // === Grading Errors ===
    /// The external text generator failed or returned unusable output.
    #[error("text generator failed: {0}")]
    Generator(String),

    // === Backup Errors ===
    /// A backup could not be created or verified.
    #[error("backup failed for {path}: {message}")]
    Backup {
        /// Path of the backup file involved.
        path: PathBuf,
        /// Description of what went wrong.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for salesnote operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a not-found error for the given entity kind.
    #[must_use]
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Create a new validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an invalid-value error.
    #[must_use]
    pub fn invalid_value(kind: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            kind,
            value: value.into(),
        }
    }

    /// Create a new text generator error.
    #[must_use]
    pub fn generator(message: impl Into<String>) -> Self {
        Self::Generator(message.into())
    }

    /// Create a backup error.
    #[must_use]
    pub fn backup(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Backup {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error is a missing-record error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error came from input validation.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidValue { .. })
    }
}

/// Convert a domain error into a `rusqlite` conversion error so that row
/// mappers can surface bad enum values without panicking.
pub(crate) fn to_sql_error(err: Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = Error::not_found("customer", 42);
        assert_eq!(err.to_string(), "customer 42 not found");
        assert!(err.is_not_found());
        assert!(!err.is_validation());
    }

    #[test]
    fn test_validation_display() {
        let err = Error::validation("quantity must be positive");
        assert_eq!(
            err.to_string(),
            "validation failed: quantity must be positive"
        );
        assert!(err.is_validation());
    }

    #[test]
    fn test_invalid_value_display() {
        let err = Error::invalid_value("stage", "negotiating");
        assert_eq!(err.to_string(), "invalid stage: 'negotiating'");
        assert!(err.is_validation());
    }

    #[test]
    fn test_generator_error() {
        let err = Error::generator("exit status 1");
        assert_eq!(err.to_string(), "text generator failed: exit status 1");
    }

    #[test]
    fn test_backup_error_display() {
        let err = Error::backup("/backups/a.db", "checksum mismatch");
        let msg = err.to_string();
        assert!(msg.contains("/backups/a.db"));
        assert!(msg.contains("checksum mismatch"));
    }

    #[test]
    fn test_internal_error() {
        let err = Error::internal("something went wrong");
        assert_eq!(err.to_string(), "internal error: something went wrong");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_rusqlite_error() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/db.sqlite",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err: Error = sqlite_err.into();
            assert!(matches!(err, Error::DatabaseQuery(_)));
        }
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_database_migration_error_display() {
        let err = Error::DatabaseMigration {
            message: "version mismatch".to_string(),
        };
        assert!(err.to_string().contains("version mismatch"));
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "keep must be positive".to_string(),
        };
        assert!(err.to_string().contains("keep must be positive"));
    }

    #[test]
    fn test_to_sql_error_wraps() {
        let err = to_sql_error(Error::invalid_value("stage", "x"));
        assert!(matches!(
            err,
            rusqlite::Error::FromSqlConversionFailure(_, _, _)
        ));
    }
}
