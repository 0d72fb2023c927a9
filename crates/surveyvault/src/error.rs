//! Error types for surveyvault.
//!
//! This module defines the error types shared by the stores, the ledger, the
//! configuration layer, and the submission pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for surveyvault operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the record database.
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

    /// Persisting an anonymized record failed.
    #[error("failed to write record {identity}: {message}")]
    RecordWrite {
        /// Identity the record was being written under.
        identity: String,
        /// Description of what went wrong.
        message: String,
    },

    /// Reading an anonymized record back failed.
    #[error("failed to read record {identity}: {message}")]
    RecordRead {
        /// Identity of the record being read.
        identity: String,
        /// Description of what went wrong.
        message: String,
    },

    // === Ledger Errors ===
    /// Appending to the identity ledger failed.
    #[error("failed to append to ledger at {path}: {source}")]
    LedgerAppend {
        /// Path to the ledger file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Identity Errors ===
    /// The operating system entropy source could not be read.
    #[error("entropy source unavailable: {0}")]
    Entropy(String),

    /// A string was not a well-formed submission identity.
    #[error("invalid submission identity: {0:?}")]
    InvalidIdentity(String),

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

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for surveyvault operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a record write error for the given identity.
    #[must_use]
    pub fn record_write(identity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RecordWrite {
            identity: identity.into(),
            message: message.into(),
        }
    }

    /// Create a record read error for the given identity.
    #[must_use]
    pub fn record_read(identity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RecordRead {
            identity: identity.into(),
            message: message.into(),
        }
    }

    /// Check if this error came from the entropy source.
    #[must_use]
    pub fn is_entropy_error(&self) -> bool {
        matches!(self, Self::Entropy(_))
    }
}
