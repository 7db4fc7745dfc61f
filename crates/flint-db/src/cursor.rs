use serde_json::{json, Map, Value};

use crate::collection::Collection;
use crate::error::DbError;
use flint_query::{Sort, SortDirection};

/// A lazy, immutable query builder over one collection.
///
/// Each chain method (`filter`, `sort`, `skip`, `take`) clones the current
/// state into a new `Cursor` rather than mutating in place, so a partially
/// built cursor can be branched and reused. Nothing touches the database
/// until a terminal method (`run`, `run_one`, `count`) is called.
#[derive(Clone)]
pub struct Cursor<'c, 'db> {
    collection: &'c Collection<'db>,
    filter: Value,
    order: Vec<Sort>,
    skip: Option<u32>,
    take: Option<u32>,
}

impl<'c, 'db> Cursor<'c, 'db> {
    pub(crate) fn new(collection: &'c Collection<'db>) -> Self {
        Cursor { collection, filter: json!({}), order: Vec::new(), skip: None, take: None }
    }

    /// Narrow by `extra`, combined with any existing filter under an
    /// implicit `$and`.
    pub fn filter(&self, extra: Value) -> Self {
        let mut next = self.clone();
        next.filter = merge_and(&next.filter, &extra);
        next
    }

    pub fn sort(&self, field: impl Into<String>, direction: SortDirection) -> Self {
        let mut next = self.clone();
        next.order.push(Sort { field: field.into(), direction });
        next
    }

    pub fn skip(&self, n: u32) -> Self {
        let mut next = self.clone();
        next.skip = Some(n);
        next
    }

    pub fn take(&self, n: u32) -> Self {
        let mut next = self.clone();
        next.take = Some(n);
        next
    }

    /// Compile and execute, returning every matching document.
    pub fn run(&self) -> Result<Vec<Value>, DbError> {
        self.collection.find_with(&self.effective_query(), self.skip, self.take)
    }

    /// `run` narrowed to at most one document.
    pub fn run_one(&self) -> Result<Option<Value>, DbError> {
        let take = Some(self.take.unwrap_or(1).min(1));
        let mut rows = self.collection.find_with(&self.effective_query(), self.skip, take)?;
        Ok(if rows.is_empty() { None } else { Some(rows.remove(0)) })
    }

    /// Count matching documents, ignoring `skip`/`take`/`sort`.
    pub fn count(&self) -> Result<u64, DbError> {
        self.collection.count(&self.filter)
    }

    fn effective_query(&self) -> Value {
        if self.order.is_empty() {
            return self.filter.clone();
        }
        let mut order = Map::new();
        for s in &self.order {
            let dir = match s.direction {
                SortDirection::Asc => 1,
                SortDirection::Desc => -1,
            };
            order.insert(s.field.clone(), json!(dir));
        }
        json!({ "$query": self.filter, "$order": Value::Object(order) })
    }
}

fn merge_and(base: &Value, extra: &Value) -> Value {
    let base_obj = base.as_object().cloned().unwrap_or_default();
    let extra_obj = extra.as_object().cloned().unwrap_or_default();

    if base_obj.is_empty() {
        return Value::Object(extra_obj);
    }
    if extra_obj.is_empty() {
        return Value::Object(base_obj);
    }

    let mut merged = Map::new();
    merged.insert("$and".to_string(), Value::Array(vec![Value::Object(base_obj), Value::Object(extra_obj)]));
    Value::Object(merged)
}
