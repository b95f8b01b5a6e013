//! SQL identifier checks and quoting.
//!
//! DDL cannot be parameterized, so every name that reaches statement text
//! goes through here first. Table, schema and key names are restricted to
//! `[A-Za-z0-9_]`; header-derived column names may be arbitrary text and are
//! protected by quoting alone.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::ImportError;

/// PostgreSQL truncates identifiers longer than this many bytes.
pub const MAX_IDENTIFIER_BYTES: usize = 63;

fn safe_pattern() -> &'static Regex {
    static SAFE: OnceLock<Regex> = OnceLock::new();
    SAFE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("identifier pattern is valid"))
}

pub fn is_identifier_safe(value: &str) -> bool {
    value.len() <= MAX_IDENTIFIER_BYTES && safe_pattern().is_match(value)
}

/// Rejects `value` unless it is identifier-safe. `label` names the field in
/// the error message.
pub fn validate_identifier(label: &str, value: &str) -> Result<(), ImportError> {
    if value.is_empty() {
        return Err(ImportError::Validation(format!("{label} is required")));
    }
    if value.len() > MAX_IDENTIFIER_BYTES {
        return Err(ImportError::Validation(format!(
            "{label} '{value}' exceeds {MAX_IDENTIFIER_BYTES} bytes"
        )));
    }
    if !safe_pattern().is_match(value) {
        return Err(ImportError::Validation(format!(
            "{label} '{value}' may only contain letters, digits, and underscores"
        )));
    }
    Ok(())
}

pub fn validate_column_name(name: &str) -> Result<(), ImportError> {
    if name.is_empty() {
        return Err(ImportError::validation("Column names cannot be empty"));
    }
    if name.len() > MAX_IDENTIFIER_BYTES {
        return Err(ImportError::Validation(format!(
            "Column name '{name}' exceeds {MAX_IDENTIFIER_BYTES} bytes"
        )));
    }
    if name.contains('\0') {
        return Err(ImportError::Validation(format!(
            "Column name '{}' contains a NUL character",
            name.escape_default()
        )));
    }
    Ok(())
}

/// Wraps `name` in double quotes, doubling any embedded quote.
pub fn quote_ident(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('"');
    for ch in name.chars() {
        if ch == '"' {
            quoted.push('"');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}
