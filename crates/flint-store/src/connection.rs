use std::path::Path;

use rusqlite::Connection;

use crate::error::StoreError;

/// SQLite journal mode to open with. WAL is the default: it lets readers
/// proceed while a writer holds the connection, which matters once the
/// engine starts nesting savepoints inside a single collection operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    Wal,
    Delete,
    Truncate,
    Memory,
}

impl JournalMode {
    fn pragma_value(self) -> &'static str {
        match self {
            JournalMode::Wal => "WAL",
            JournalMode::Delete => "DELETE",
            JournalMode::Truncate => "TRUNCATE",
            JournalMode::Memory => "MEMORY",
        }
    }
}

/// Options governing how a [`SqliteConnection`] opens its underlying file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectOptions {
    pub journal_mode: JournalMode,
    pub busy_timeout: std::time::Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        ConnectOptions {
            journal_mode: JournalMode::Wal,
            busy_timeout: std::time::Duration::from_secs(5),
        }
    }
}

/// An open connection to the relational backend.
///
/// Wraps a single `rusqlite::Connection`. SQLite connections aren't `Sync`,
/// so callers that need concurrent access hand out one `SqliteConnection`
/// per worker rather than sharing this across threads.
pub struct SqliteConnection {
    conn: Connection,
}

impl SqliteConnection {
    pub fn open(path: &Path, opts: ConnectOptions) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Open(e.to_string()))?;
        Self::configure(&conn, opts)?;
        Ok(SqliteConnection { conn })
    }

    pub fn open_in_memory(opts: ConnectOptions) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Open(e.to_string()))?;
        Self::configure(&conn, opts)?;
        Ok(SqliteConnection { conn })
    }

    fn configure(conn: &Connection, opts: ConnectOptions) -> Result<(), StoreError> {
        conn.pragma_update(None, "journal_mode", opts.journal_mode.pragma_value())?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(opts.busy_timeout)?;
        Ok(())
    }

    /// Begin a top-level transaction. Nested scopes within it are opened via
    /// `rusqlite::Transaction::savepoint`, which emits `SAVEPOINT` /
    /// `RELEASE` / `ROLLBACK TO` rather than a second `BEGIN`.
    pub fn transaction(&mut self) -> Result<rusqlite::Transaction<'_>, StoreError> {
        tracing::trace!("opening transaction");
        Ok(self.conn.transaction()?)
    }

    pub fn raw(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::SqlScope;

    #[test]
    fn opens_in_memory_with_wal_defaults() {
        let conn = SqliteConnection::open_in_memory(ConnectOptions::default()).unwrap();
        conn.raw().execute("CREATE TABLE t (id TEXT PRIMARY KEY)", []).unwrap();
    }

    #[test]
    fn savepoint_rollback_leaves_outer_transaction_intact() {
        let mut conn = SqliteConnection::open_in_memory(ConnectOptions::default()).unwrap();
        conn.raw().execute("CREATE TABLE t (id TEXT PRIMARY KEY)", []).unwrap();

        let txn = conn.transaction().unwrap();
        txn.execute("INSERT INTO t (id) VALUES ('a')", &[]).unwrap();

        {
            let sp = txn.savepoint().unwrap();
            sp.execute("INSERT INTO t (id) VALUES ('b')", &[]).unwrap();
            // dropped without commit: rolls back to the savepoint
        }

        let rows = txn.query_cells("SELECT COUNT(*) FROM t", &[]).unwrap();
        assert_eq!(rows, vec![Cell::Int(1)]);
        txn.commit().unwrap();
    }
}
