use rusqlite::Connection;

use crate::error::StoreError;
use crate::param::Param;
use crate::row::{Cell, DocRow};

/// Everything the rest of the crate needs from an open connection,
/// transaction, or savepoint. `rusqlite::Transaction` and `rusqlite::Savepoint`
/// both deref to `rusqlite::Connection`, so a single free function backs all
/// three trait impls below.
pub trait SqlScope {
    fn conn(&self) -> &Connection;

    fn execute(&self, sql: &str, params: &[Param]) -> Result<usize, StoreError> {
        execute_on(self.conn(), sql, params)
    }

    fn query_rows(&self, sql: &str, params: &[Param]) -> Result<Vec<DocRow>, StoreError> {
        query_rows_on(self.conn(), sql, params)
    }

    fn query_cells(&self, sql: &str, params: &[Param]) -> Result<Vec<Cell>, StoreError> {
        query_cells_on(self.conn(), sql, params)
    }
}

fn execute_on(conn: &Connection, sql: &str, params: &[Param]) -> Result<usize, StoreError> {
    let params: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
    tracing::trace!(sql, "executing statement");
    Ok(conn.execute(sql, params.as_slice())?)
}

fn query_rows_on(conn: &Connection, sql: &str, params: &[Param]) -> Result<Vec<DocRow>, StoreError> {
    let bound: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
    tracing::trace!(sql, "executing query");
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(bound.as_slice(), |row| {
            Ok(DocRow { id: row.get(0)?, document: row.get(1)? })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn query_cells_on(conn: &Connection, sql: &str, params: &[Param]) -> Result<Vec<Cell>, StoreError> {
    let bound: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
    tracing::trace!(sql, "executing scalar query");
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(bound.as_slice(), |row| {
            let value: rusqlite::types::Value = row.get(0)?;
            Ok(match value {
                rusqlite::types::Value::Null => Cell::Null,
                rusqlite::types::Value::Integer(i) => Cell::Int(i),
                rusqlite::types::Value::Real(f) => Cell::Float(f),
                rusqlite::types::Value::Text(s) => Cell::Text(s),
                rusqlite::types::Value::Blob(_) => Cell::Null,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

impl SqlScope for Connection {
    fn conn(&self) -> &Connection {
        self
    }
}

impl SqlScope for rusqlite::Transaction<'_> {
    fn conn(&self) -> &Connection {
        self
    }
}

impl SqlScope for rusqlite::Savepoint<'_> {
    fn conn(&self) -> &Connection {
        self
    }
}
