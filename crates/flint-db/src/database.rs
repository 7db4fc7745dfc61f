use std::cell::RefCell;
use std::path::Path;
use std::time::Duration;

use flint_store::{ConnectOptions, JournalMode, SqliteConnection};

use crate::collection::Collection;
use crate::error::DbError;

/// Options governing how a [`Database`] opens its backing file.
#[derive(Debug, Clone, Copy)]
pub struct OpenOptions {
    pub journal_mode: JournalMode,
    pub busy_timeout: Duration,
    pub logging: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions { journal_mode: JournalMode::Wal, busy_timeout: Duration::from_secs(5), logging: false }
    }
}

/// An open handle to the document store.
///
/// Wraps a single `SqliteConnection`. Every mutating `Collection` operation
/// borrows it exclusively for the duration of one transaction; nested scopes
/// within that transaction are realized as `SAVEPOINT`s, never a second
/// `BEGIN`. Concurrent operations against handles sharing one `Database` are
/// not supported — open separate handles and let SQLite's WAL locking
/// arbitrate.
pub struct Database {
    conn: RefCell<SqliteConnection>,
    logging: bool,
}

impl Database {
    pub fn open(path: &Path, opts: OpenOptions) -> Result<Self, DbError> {
        let conn = SqliteConnection::open(path, Self::connect_options(&opts))?;
        if opts.logging {
            tracing::debug!(path = %path.display(), "database opened");
        }
        Ok(Database { conn: RefCell::new(conn), logging: opts.logging })
    }

    pub fn open_in_memory(opts: OpenOptions) -> Result<Self, DbError> {
        let conn = SqliteConnection::open_in_memory(Self::connect_options(&opts))?;
        if opts.logging {
            tracing::debug!("in-memory database opened");
        }
        Ok(Database { conn: RefCell::new(conn), logging: opts.logging })
    }

    fn connect_options(opts: &OpenOptions) -> ConnectOptions {
        ConnectOptions { journal_mode: opts.journal_mode, busy_timeout: opts.busy_timeout }
    }

    /// Drops the handle, closing the underlying connection.
    pub fn close(self) {}

    pub fn collection<'db>(&'db self, name: &str, id_field: Option<&str>) -> Result<Collection<'db>, DbError> {
        Collection::open(self, name, id_field)
    }

    /// Run `f` against one top-level transaction on the connection. Any
    /// `Collection` operation invoked recursively from within `f` must use an
    /// internal `*_in(scope, ...)` variant taking the same `&Transaction`
    /// rather than calling back into `Database` — the connection is already
    /// mutably borrowed for the duration of `f`.
    pub fn within_transaction<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T, DbError>,
    ) -> Result<T, DbError> {
        let mut conn = self.conn.borrow_mut();
        let txn = conn.transaction()?;
        if self.logging {
            tracing::trace!("transaction opened");
        }
        match f(&txn) {
            Ok(value) => {
                txn.commit().map_err(DbError::from)?;
                Ok(value)
            }
            Err(e) => {
                let _ = txn.rollback();
                Err(e)
            }
        }
    }

    /// Run `f` against the raw connection outside of any transaction, for
    /// read-only operations.
    pub(crate) fn read<T>(&self, f: impl FnOnce(&rusqlite::Connection) -> Result<T, DbError>) -> Result<T, DbError> {
        let conn = self.conn.borrow();
        f(conn.raw())
    }
}
