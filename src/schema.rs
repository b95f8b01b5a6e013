//! Table definition derived from the CSV header, plus the statements built
//! from it.
//!
//! Every header column is stored as `TEXT`. Cells can change variant from row
//! to row (a number here, free text there), and a uniform textual column
//! accepts all of them without ever needing to widen a type after the fact.
//! The cost is that numeric and boolean data land as text.
//!
//! An auto-incrementing primary key is always prepended. Rows are inserted in
//! file order, so ascending key order reproduces the order of the upload.

use std::fmt;

use itertools::Itertools;

use crate::{
    error::ImportError,
    identifier::{quote_ident, validate_column_name, validate_identifier},
};

pub const DEFAULT_SCHEMA: &str = "public";
pub const DEFAULT_PRIMARY_KEY: &str = "id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    /// Auto-incrementing integer key.
    Serial,
    Text,
}

impl StorageType {
    pub fn sql(self) -> &'static str {
        match self {
            StorageType::Serial => "SERIAL PRIMARY KEY",
            StorageType::Text => "TEXT",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub storage_type: StorageType,
}

impl ColumnDefinition {
    pub fn quoted_name(&self) -> String {
        quote_ident(&self.name)
    }

    fn ddl(&self) -> String {
        format!("{} {}", self.quoted_name(), self.storage_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub schema_name: String,
    pub table_name: String,
    pub primary_key: ColumnDefinition,
    pub columns: Vec<ColumnDefinition>,
}

impl TableDefinition {
    /// Derives the definition for `fields`, which must be distinct and in
    /// header order. Fails if any field collides with the key column.
    pub fn derive(
        schema_name: &str,
        table_name: &str,
        primary_key: &str,
        fields: &[String],
    ) -> Result<Self, ImportError> {
        validate_identifier("Schema name", schema_name)?;
        validate_identifier("Table name", table_name)?;
        validate_identifier("Primary key column", primary_key)?;
        if fields.is_empty() {
            return Err(ImportError::validation(
                "CSV file is empty or has no valid columns",
            ));
        }

        let mut columns = Vec::with_capacity(fields.len());
        for field in fields {
            validate_column_name(field)?;
            if field == primary_key {
                return Err(ImportError::Validation(format!(
                    "CSV column '{field}' collides with the generated primary key column; \
                     rename it or choose another key with --primary-key"
                )));
            }
            columns.push(ColumnDefinition {
                name: field.clone(),
                storage_type: StorageType::Text,
            });
        }

        Ok(Self {
            schema_name: schema_name.to_string(),
            table_name: table_name.to_string(),
            primary_key: ColumnDefinition {
                name: primary_key.to_string(),
                storage_type: StorageType::Serial,
            },
            columns,
        })
    }

    pub fn uses_default_schema(&self) -> bool {
        self.schema_name == DEFAULT_SCHEMA
    }

    pub fn qualified_name(&self) -> String {
        format!(
            "{}.{}",
            quote_ident(&self.schema_name),
            quote_ident(&self.table_name)
        )
    }

    /// `schema.table` as shown to the operator.
    pub fn display_name(&self) -> String {
        format!("{}.{}", self.schema_name, self.table_name)
    }

    pub fn create_schema_sql(&self) -> String {
        format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            quote_ident(&self.schema_name)
        )
    }

    pub fn create_table_sql(&self) -> String {
        let definitions = std::iter::once(&self.primary_key)
            .chain(self.columns.iter())
            .map(ColumnDefinition::ddl)
            .join(", ");
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({definitions})",
            self.qualified_name()
        )
    }

    /// Advisory lock serializing imports that create this schema. Released
    /// when the transaction ends.
    pub fn lock_schema_sql(&self) -> String {
        advisory_lock_sql(&format!("schema:{}", self.schema_name))
    }

    /// Advisory lock serializing imports into this table, so a second
    /// creator waits for the first to commit and then finds the table.
    pub fn lock_table_sql(&self) -> String {
        advisory_lock_sql(&format!("table:{}", self.display_name()))
    }

    /// Parameterized insert binding every derived column, `$1..$n` in column
    /// order.
    pub fn insert_sql(&self) -> String {
        let columns = self.columns.iter().map(ColumnDefinition::quoted_name).join(", ");
        let placeholders = (1..=self.columns.len()).map(|idx| format!("${idx}")).join(", ");
        format!(
            "INSERT INTO {} ({columns}) VALUES ({placeholders})",
            self.qualified_name()
        )
    }
}

fn advisory_lock_sql(key: &str) -> String {
    format!(
        "SELECT pg_advisory_xact_lock(hashtext('{}'))",
        key.replace('\'', "''")
    )
}
