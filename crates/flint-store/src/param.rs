use rusqlite::ToSql;
use rusqlite::types::{ToSqlOutput, Value as SqlValue};

/// A single bound parameter. Mirrors the operand scalar types the query and
/// update compilers can produce — nothing else ever reaches a `?`
/// placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ToSql for Param {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            Param::Null => SqlValue::Null,
            Param::Bool(b) => SqlValue::Integer(*b as i64),
            Param::Int(i) => SqlValue::Integer(*i),
            Param::Float(f) => SqlValue::Real(*f),
            Param::Text(s) => SqlValue::Text(s.clone()),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}
