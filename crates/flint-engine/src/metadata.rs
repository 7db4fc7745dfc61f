use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row of the `_metadata` collection: everything the engine needs to
/// reopen a collection the way it was left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMeta {
    #[serde(rename = "_id")]
    pub name: String,
    #[serde(rename = "idField")]
    pub id_field: String,
    #[serde(rename = "arrayIndexes", default)]
    pub array_indexes: Vec<ArrayIndexEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayIndexEntry {
    pub keypath: String,
    #[serde(rename = "indexTable")]
    pub index_table: String,
}

impl CollectionMeta {
    pub fn new(name: impl Into<String>, id_field: impl Into<String>) -> Self {
        CollectionMeta { name: name.into(), id_field: id_field.into(), array_indexes: Vec::new() }
    }

    pub fn with_array_index(mut self, keypath: impl Into<String>, index_table: impl Into<String>) -> Self {
        self.array_indexes.push(ArrayIndexEntry { keypath: keypath.into(), index_table: index_table.into() });
        self
    }

    pub fn to_document(&self) -> Value {
        serde_json::to_value(self).expect("CollectionMeta always serializes")
    }

    pub fn from_document(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}
