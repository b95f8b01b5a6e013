//! Transactional load of a parsed table into the target database.
//!
//! ```text
//! Idle → TransactionOpen → SchemaEnsured → TableEnsured → RowsInserting → Committed
//!   └──────────────┴───────────────┴──────────────┴──────────────┴──→ RolledBack
//! ```
//!
//! The import is all-or-nothing: the first failing statement rolls back the
//! whole transaction. Rows are inserted one at a time in file order, which is
//! what makes the generated key order match the order of the upload.
//!
//! Each `CREATE ... IF NOT EXISTS` runs behind a transaction-scoped advisory
//! lock. Without it, a concurrent import creating the same table blocks on
//! the first creator's uncommitted catalog entry and then fails with a
//! unique violation instead of finding the table.

use log::{debug, info, warn};

use crate::{
    connection::Session,
    error::ImportError,
    parser::ParsedTable,
    schema::TableDefinition,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPhase {
    Idle,
    TransactionOpen,
    SchemaEnsured,
    TableEnsured,
    RowsInserting,
    Committed,
    RolledBack,
}

impl ImportPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, ImportPhase::Committed | ImportPhase::RolledBack)
    }

    fn in_transaction(self) -> bool {
        matches!(
            self,
            ImportPhase::TransactionOpen
                | ImportPhase::SchemaEnsured
                | ImportPhase::TableEnsured
                | ImportPhase::RowsInserting
        )
    }
}

/// Drives one import through its phases on a borrowed session.
///
/// If the executor is dropped mid-transaction (for example while unwinding),
/// the transaction is rolled back.
pub struct ImportExecutor<'s, S: Session> {
    session: &'s mut S,
    phase: ImportPhase,
}

impl<'s, S: Session> ImportExecutor<'s, S> {
    pub fn new(session: &'s mut S) -> Self {
        Self {
            session,
            phase: ImportPhase::Idle,
        }
    }

    pub fn phase(&self) -> ImportPhase {
        self.phase
    }

    /// Runs the import and returns the number of rows committed.
    pub fn run(
        &mut self,
        definition: &TableDefinition,
        table: &ParsedTable,
    ) -> Result<usize, ImportError> {
        if self.phase != ImportPhase::Idle {
            return Err(ImportError::Transaction(format!(
                "Executor already ran (phase {:?})",
                self.phase
            )));
        }
        match self.load(definition, table) {
            Ok(rows) => Ok(rows),
            Err(err) => {
                debug!("Import failed during {:?}: {err}", self.phase);
                self.rollback();
                Err(err)
            }
        }
    }

    fn load(&mut self, definition: &TableDefinition, table: &ParsedTable) -> Result<usize, ImportError> {
        self.session
            .batch_execute("BEGIN")
            .map_err(|err| ImportError::Transaction(err.message))?;
        self.transition(ImportPhase::TransactionOpen);

        if !definition.uses_default_schema() {
            for sql in [definition.lock_schema_sql(), definition.create_schema_sql()] {
                debug!("{sql}");
                self.session
                    .batch_execute(&sql)
                    .map_err(|err| ImportError::Schema(err.message))?;
            }
        }
        self.transition(ImportPhase::SchemaEnsured);

        for sql in [definition.lock_table_sql(), definition.create_table_sql()] {
            debug!("{sql}");
            self.session
                .batch_execute(&sql)
                .map_err(|err| ImportError::Table(err.message))?;
        }
        self.transition(ImportPhase::TableEnsured);

        self.transition(ImportPhase::RowsInserting);
        let insert = definition.insert_sql();
        debug!("{insert}");
        for (idx, row) in table.rows.iter().enumerate() {
            let params = table
                .ordered_values(row)
                .map(|value| value.to_sql_text())
                .collect::<Vec<_>>();
            self.session
                .execute(&insert, &params)
                .map_err(|err| ImportError::Row {
                    row: idx + 1,
                    message: err.message,
                })?;
        }

        self.session
            .batch_execute("COMMIT")
            .map_err(|err| ImportError::Commit(err.message))?;
        self.transition(ImportPhase::Committed);
        info!(
            "Committed {} row(s) into {}",
            table.row_count(),
            definition.display_name()
        );
        Ok(table.row_count())
    }

    fn transition(&mut self, next: ImportPhase) {
        debug!("Import phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    /// Best-effort rollback; a failure here is logged and never replaces the
    /// error that caused it.
    fn rollback(&mut self) {
        if self.phase.in_transaction() {
            if let Err(err) = self.session.batch_execute("ROLLBACK") {
                warn!("Rollback failed: {err}");
            }
        }
        self.transition(ImportPhase::RolledBack);
    }
}

impl<S: Session> Drop for ImportExecutor<'_, S> {
    fn drop(&mut self) {
        if self.phase.in_transaction() {
            self.rollback();
        }
    }
}
