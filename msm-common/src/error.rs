//! Common error types for the music school services

use sqlx::error::ErrorKind;
use thiserror::Error;

/// Common result type
pub type Result<T> = std::result::Result<T, Error>;

/// Which storage constraint rejected a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityKind {
    Unique,
    ForeignKey,
    NotNull,
    Check,
}

impl std::fmt::Display for IntegrityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IntegrityKind::Unique => "UNIQUE",
            IntegrityKind::ForeignKey => "FOREIGN KEY",
            IntegrityKind::NotNull => "NOT NULL",
            IntegrityKind::Check => "CHECK",
        };
        f.write_str(name)
    }
}

/// Common error types across the music school crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error that is not a constraint violation
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A uniqueness, foreign-key or check constraint rejected the write
    #[error("{message}")]
    Integrity { kind: IntegrityKind, message: String },

    /// A row read earlier in the request vanished or changed before the write
    #[error("Concurrent modification: {0}")]
    Concurrency(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Constraint kind, if this error came from a rejected write
    pub fn integrity_kind(&self) -> Option<IntegrityKind> {
        match self {
            Error::Integrity { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        self.integrity_kind() == Some(IntegrityKind::Unique)
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        self.integrity_kind() == Some(IntegrityKind::ForeignKey)
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let kind = match db_err.kind() {
                ErrorKind::UniqueViolation => Some(IntegrityKind::Unique),
                ErrorKind::ForeignKeyViolation => Some(IntegrityKind::ForeignKey),
                ErrorKind::NotNullViolation => Some(IntegrityKind::NotNull),
                ErrorKind::CheckViolation => Some(IntegrityKind::Check),
                _ => None,
            };
            if let Some(kind) = kind {
                return Error::Integrity {
                    kind,
                    message: db_err.message().to_string(),
                };
            }
        }
        Error::Database(err)
    }
}
