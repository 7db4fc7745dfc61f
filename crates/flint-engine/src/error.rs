use std::fmt;

use flint_store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    Store(StoreError),
    InvalidPath(String),
    CollectionNotFound(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Store(e) => write!(f, "store error: {e}"),
            EngineError::InvalidPath(p) => write!(f, "invalid keypath: {p:?}"),
            EngineError::CollectionNotFound(name) => write!(f, "collection not found: {name}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Store(e)
    }
}
