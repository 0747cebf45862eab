//! Database error types.

use derive_more::{Display, Error};

/// Broad category of a database failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DbErrorKind {
    /// Could not open the database.
    #[display("connection")]
    Connection,
    /// Schema migration failed.
    #[display("migration")]
    Migration,
    /// A row that should exist does not.
    #[display("not found")]
    NotFound,
    /// Any other query failure.
    #[display("query")]
    Query,
}

/// Database error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Database {} error: {} at {}:{}", kind, message, file, line)]
pub struct DbError {
    /// Failure category.
    pub kind: DbErrorKind,
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl DbError {
    /// Creates a query error with caller location tracking.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_kind(DbErrorKind::Query, message)
    }

    /// Creates an error of the given kind with caller location tracking.
    #[track_caller]
    pub fn with_kind(kind: DbErrorKind, message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// Creates a not-found error.
    #[track_caller]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_kind(DbErrorKind::NotFound, message)
    }
}

impl From<diesel::result::Error> for DbError {
    #[track_caller]
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => Self::not_found("Row not found"),
            other => Self::new(format!("Diesel error: {}", other)),
        }
    }
}

impl From<diesel::ConnectionError> for DbError {
    #[track_caller]
    fn from(err: diesel::ConnectionError) -> Self {
        Self::with_kind(DbErrorKind::Connection, format!("Connection error: {}", err))
    }
}
