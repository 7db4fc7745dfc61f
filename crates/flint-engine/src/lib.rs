mod array_index;
mod error;
mod index_map;
mod json_path;
mod metadata;

pub use array_index::{array_index_table_name, build_array_index_ddl, ArrayIndexDdl};
pub use error::EngineError;
pub use index_map::ArrayIndexMap;
pub use json_path::to_json_path;
pub use metadata::{ArrayIndexEntry, CollectionMeta};
