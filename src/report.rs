use serde::Serialize;

use crate::error::{ErrorKind, ImportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Success {
        rows_imported: usize,
        schema_name: String,
        table_name: String,
    },
    /// The error already has credentials redacted from its message.
    Failure(ImportError),
}

impl ImportOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ImportOutcome::Success { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ImportOutcome::Success { .. } => None,
            ImportOutcome::Failure(error) => Some(error.kind()),
        }
    }

    pub fn rows_imported(&self) -> Option<usize> {
        match self {
            ImportOutcome::Success { rows_imported, .. } => Some(*rows_imported),
            ImportOutcome::Failure(_) => None,
        }
    }

    /// HTTP-style status hint: 200, 400 for bad uploads, 500 otherwise.
    pub fn status_code(&self) -> u16 {
        match self {
            ImportOutcome::Success { .. } => 200,
            ImportOutcome::Failure(error) if error.kind().is_client_error() => 400,
            ImportOutcome::Failure(_) => 500,
        }
    }

    pub fn to_response(&self) -> ImportResponse {
        match self {
            ImportOutcome::Success {
                rows_imported,
                schema_name,
                table_name,
            } => ImportResponse {
                success: true,
                message: Some(format!(
                    "{rows_imported} rows imported into {schema_name}.{table_name}"
                )),
                error: None,
                rows_imported: Some(*rows_imported),
            },
            ImportOutcome::Failure(error) => ImportResponse {
                success: false,
                message: None,
                error: Some(error.to_string()),
                rows_imported: None,
            },
        }
    }
}

/// Caller-facing shape of an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_imported: Option<usize>,
}
