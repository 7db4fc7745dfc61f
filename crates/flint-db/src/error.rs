use std::fmt;

use flint_engine::EngineError;
use flint_query::{FilterParseError, UpdateParseError};
use flint_store::StoreError;

#[derive(Debug)]
pub enum DbError {
    Store(StoreError),
    Query(FilterParseError),
    Update(UpdateParseError),
    Compile(String),
    DuplicateKey(String),
    CollectionNotFound(String),
    InvalidDocument(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::Store(e) => write!(f, "store error: {e}"),
            DbError::Query(e) => write!(f, "invalid query: {e}"),
            DbError::Update(e) => write!(f, "invalid update: {e}"),
            DbError::Compile(msg) => write!(f, "compile error: {msg}"),
            DbError::DuplicateKey(id) => write!(f, "duplicate key: {id}"),
            DbError::CollectionNotFound(name) => write!(f, "collection not found: {name}"),
            DbError::InvalidDocument(msg) => write!(f, "invalid document: {msg}"),
        }
    }
}

impl std::error::Error for DbError {}

impl From<StoreError> for DbError {
    fn from(e: StoreError) -> Self {
        DbError::Store(e)
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        let msg = e.to_string();
        if msg.contains("UNIQUE constraint failed") {
            DbError::DuplicateKey(msg)
        } else {
            DbError::Store(StoreError::from(e))
        }
    }
}

impl From<EngineError> for DbError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Store(se) => DbError::Store(se),
            EngineError::CollectionNotFound(name) => DbError::CollectionNotFound(name),
            EngineError::InvalidPath(msg) => DbError::Compile(format!("invalid keypath: {msg}")),
        }
    }
}

impl From<FilterParseError> for DbError {
    fn from(e: FilterParseError) -> Self {
        DbError::Query(e)
    }
}

impl From<UpdateParseError> for DbError {
    fn from(e: UpdateParseError) -> Self {
        DbError::Update(e)
    }
}
