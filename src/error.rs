//! Error taxonomy for the import pipeline.
//!
//! Each variant names the phase that failed so the caller can tell a bad
//! upload apart from an unreachable database or a rejected row. Messages are
//! redacted before they are wrapped here; nothing in this module ever sees a
//! password.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("CSV parsing error: {0}")]
    Parse(String),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Transaction error: {0}")]
    Transaction(String),
    #[error("Schema error: {0}")]
    Schema(String),
    #[error("Table error: {0}")]
    Table(String),
    #[error("Row error: row {row}: {message}")]
    Row { row: usize, message: String },
    #[error("Commit error: {0}")]
    Commit(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Parse,
    Connection,
    Transaction,
    Schema,
    Table,
    Row,
    Commit,
}

impl ErrorKind {
    /// Problems with the upload itself rather than with the database.
    pub fn is_client_error(self) -> bool {
        matches!(self, ErrorKind::Validation | ErrorKind::Parse)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Parse => "parse",
            ErrorKind::Connection => "connection",
            ErrorKind::Transaction => "transaction",
            ErrorKind::Schema => "schema",
            ErrorKind::Table => "table",
            ErrorKind::Row => "row",
            ErrorKind::Commit => "commit",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ImportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ImportError::Validation(_) => ErrorKind::Validation,
            ImportError::Parse(_) => ErrorKind::Parse,
            ImportError::Connection(_) => ErrorKind::Connection,
            ImportError::Transaction(_) => ErrorKind::Transaction,
            ImportError::Schema(_) => ErrorKind::Schema,
            ImportError::Table(_) => ErrorKind::Table,
            ImportError::Row { .. } => ErrorKind::Row,
            ImportError::Commit(_) => ErrorKind::Commit,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ImportError::Validation(message.into())
    }

    pub fn message(&self) -> &str {
        match self {
            ImportError::Validation(m)
            | ImportError::Parse(m)
            | ImportError::Connection(m)
            | ImportError::Transaction(m)
            | ImportError::Schema(m)
            | ImportError::Table(m)
            | ImportError::Commit(m)
            | ImportError::Row { message: m, .. } => m,
        }
    }

    /// Rewrites the message while keeping the kind (and row number).
    pub fn map_message(self, f: impl FnOnce(&str) -> String) -> Self {
        match self {
            ImportError::Validation(m) => ImportError::Validation(f(&m)),
            ImportError::Parse(m) => ImportError::Parse(f(&m)),
            ImportError::Connection(m) => ImportError::Connection(f(&m)),
            ImportError::Transaction(m) => ImportError::Transaction(f(&m)),
            ImportError::Schema(m) => ImportError::Schema(f(&m)),
            ImportError::Table(m) => ImportError::Table(f(&m)),
            ImportError::Row { row, message } => ImportError::Row {
                row,
                message: f(&message),
            },
            ImportError::Commit(m) => ImportError::Commit(f(&m)),
        }
    }
}
