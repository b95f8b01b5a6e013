#![allow(dead_code)]

use std::cell::RefCell;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use csv_pg_import::connection::{ConnectionSpec, DbError, DiscreteParams, Session};
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}

pub fn local_spec(password: &str) -> ConnectionSpec {
    ConnectionSpec::Discrete(DiscreteParams {
        host: "localhost".into(),
        port: None,
        database: "app".into(),
        username: "loader".into(),
        password: Some(password.into()),
    })
}

/// Database state shared by every [`MemorySession`] opened on it, so several
/// imports can run against the same "server".
#[derive(Debug, Default)]
pub struct MemoryDb {
    /// Every statement issued, in order, across all sessions.
    pub statements: Vec<String>,
    /// Rows visible after commit, as bound parameters.
    pub committed: Vec<Vec<Option<String>>>,
    pending: Vec<Vec<Option<String>>>,
    in_transaction: bool,
    pub sessions_opened: usize,
    pub sessions_closed: usize,
    /// Batch statements starting with this prefix fail.
    pub fail_statement: Option<String>,
    /// Inserts binding NULL at this parameter index fail, like a NOT NULL column.
    pub not_null_param: Option<usize>,
    /// Set to make ROLLBACK itself fail.
    pub fail_rollback: bool,
}

impl MemoryDb {
    pub fn shared() -> Rc<RefCell<MemoryDb>> {
        Rc::new(RefCell::new(MemoryDb::default()))
    }

    pub fn count_starting_with(&self, prefix: &str) -> usize {
        self.statements
            .iter()
            .filter(|s| s.starts_with(prefix))
            .count()
    }
}

pub struct MemorySession {
    db: Rc<RefCell<MemoryDb>>,
}

impl MemorySession {
    pub fn open(db: &Rc<RefCell<MemoryDb>>) -> Self {
        db.borrow_mut().sessions_opened += 1;
        Self { db: Rc::clone(db) }
    }
}

impl Session for MemorySession {
    fn batch_execute(&mut self, sql: &str) -> Result<(), DbError> {
        let mut db = self.db.borrow_mut();
        db.statements.push(sql.to_string());
        if db
            .fail_statement
            .as_deref()
            .is_some_and(|prefix| sql.starts_with(prefix))
        {
            if sql == "COMMIT" {
                db.pending.clear();
                db.in_transaction = false;
            }
            return Err(DbError::new(format!("injected failure for {sql}")));
        }
        match sql {
            "BEGIN" => {
                db.in_transaction = true;
                db.pending.clear();
            }
            "COMMIT" => {
                let pending = std::mem::take(&mut db.pending);
                db.committed.extend(pending);
                db.in_transaction = false;
            }
            "ROLLBACK" => {
                if db.fail_rollback {
                    return Err(DbError::new("connection lost during rollback"));
                }
                db.pending.clear();
                db.in_transaction = false;
            }
            _ => {}
        }
        Ok(())
    }

    fn execute(&mut self, sql: &str, params: &[Option<String>]) -> Result<u64, DbError> {
        let mut db = self.db.borrow_mut();
        db.statements.push(sql.to_string());
        if let Some(idx) = db.not_null_param {
            if params.get(idx).is_some_and(Option::is_none) {
                return Err(DbError {
                    code: Some("23502".into()),
                    message: "null value violates not-null constraint".into(),
                });
            }
        }
        db.pending.push(params.to_vec());
        Ok(1)
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.db.borrow_mut().sessions_closed += 1;
    }
}
