//! Turns the raw upload into an ordered table of typed records.
//!
//! The first line is the header. Blank lines are skipped, and any record
//! whose width differs from the header's is reported as a parse failure with
//! its line number.

use std::collections::{BTreeMap, HashSet};

use encoding_rs::{Encoding, UTF_8};
use log::debug;

use crate::{
    data::{Value, infer_value, literal_value},
    error::ImportError,
    io_utils,
};

/// Column name → cell value for one data row.
pub type Record = BTreeMap<String, Value>;

static NULL: Value = Value::Null;

#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    pub delimiter: u8,
    pub encoding: &'static Encoding,
    pub dynamic_typing: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            delimiter: io_utils::DEFAULT_CSV_DELIMITER,
            encoding: UTF_8,
            dynamic_typing: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTable {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}

impl ParsedTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Cells of `row` in column order, with absent keys as null.
    pub fn ordered_values<'a>(&'a self, row: &'a Record) -> impl Iterator<Item = &'a Value> + 'a {
        self.columns
            .iter()
            .map(move |column| row.get(column).unwrap_or(&NULL))
    }
}

pub fn parse_csv(bytes: &[u8], options: &ParseOptions) -> Result<ParsedTable, ImportError> {
    if bytes.is_empty() {
        return Err(ImportError::validation("CSV file is empty"));
    }
    let text = io_utils::decode_bytes(bytes, options.encoding)
        .map_err(|err| ImportError::Parse(err.to_string()))?;
    let mut reader = io_utils::open_csv_reader(text.as_bytes(), options.delimiter, true);

    let headers = reader
        .headers()
        .map_err(|err| ImportError::Parse(err.to_string()))?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    validate_headers(&headers)?;

    let to_value: fn(&str) -> Value = if options.dynamic_typing {
        infer_value
    } else {
        literal_value
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| ImportError::Parse(err.to_string()))?;
        let parsed = headers
            .iter()
            .zip(record.iter())
            .map(|(column, raw)| (column.clone(), to_value(raw)))
            .collect::<Record>();
        rows.push(parsed);
    }

    if rows.is_empty() {
        return Err(ImportError::validation(
            "CSV file is empty or has no valid columns",
        ));
    }
    debug!("Parsed {} row(s) across {} column(s)", rows.len(), headers.len());
    Ok(ParsedTable {
        columns: headers,
        rows,
    })
}

fn validate_headers(headers: &[String]) -> Result<(), ImportError> {
    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(ImportError::validation(
            "CSV file is empty or has no valid columns",
        ));
    }
    let mut seen = HashSet::with_capacity(headers.len());
    for (idx, header) in headers.iter().enumerate() {
        if header.is_empty() {
            return Err(ImportError::Validation(format!(
                "Header column {} has no name",
                idx + 1
            )));
        }
        if !seen.insert(header.as_str()) {
            return Err(ImportError::Validation(format!(
                "Duplicate header column '{header}'"
            )));
        }
    }
    Ok(())
}
