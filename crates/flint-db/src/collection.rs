use std::cell::RefCell;

use flint_engine::{build_array_index_ddl, to_json_path, ArrayIndexMap, CollectionMeta};
use flint_query::{parse_query, parse_update, Sort, SortDirection, Update, UpdateOp};
use flint_store::{quote_identifier, Cell, DocRow, Param, SqlScope, StoreError};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::compile::compile;
use crate::cursor::Cursor;
use crate::database::Database;
use crate::error::DbError;
use crate::update_compile::{compile_update, row_selector, Statement};

pub(crate) const METADATA_COLLECTION: &str = "_metadata";
const DEFAULT_ID_FIELD: &str = "_id";

#[derive(Debug, Clone, Copy)]
pub struct UpdateOptions {
    pub multi: bool,
    pub upsert: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        UpdateOptions { multi: false, upsert: false }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOptions {
    pub just_one: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexOptions {
    pub unique: bool,
}

/// A named document collection bound to one [`Database`].
///
/// Holds the collection's identifier-field name and its array-index map in
/// memory, both loaded from the `_metadata` collection on open. Every
/// mutating operation runs inside a transaction opened on `db`; nested
/// sub-operations (upsert's insert-then-update, `$addToSet`'s recursive
/// `update`) run inside a `SAVEPOINT` on that same transaction rather than
/// reopening one.
pub struct Collection<'db> {
    db: &'db Database,
    name: String,
    id_field: RefCell<String>,
    indexes: ArrayIndexMap,
}

impl<'db> Collection<'db> {
    pub(crate) fn open(db: &'db Database, name: &str, id_field_hint: Option<&str>) -> Result<Collection<'db>, DbError> {
        let coll_q = quote_identifier(name)?;
        db.within_transaction(|txn| {
            txn.execute(
                &format!("CREATE TABLE IF NOT EXISTS {coll_q} (\"_id\" TEXT PRIMARY KEY, document JSON)"),
                &[],
            )?;
            Ok(())
        })?;

        if name == METADATA_COLLECTION {
            return Ok(Collection {
                db,
                name: name.to_string(),
                id_field: RefCell::new(DEFAULT_ID_FIELD.to_string()),
                indexes: ArrayIndexMap::new(),
            });
        }

        let metadata = db.collection(METADATA_COLLECTION, None)?;
        let key = json!({ "_id": name });
        let meta = match metadata.find_one(&key)? {
            Some(doc) => CollectionMeta::from_document(&doc)
                .ok_or_else(|| DbError::InvalidDocument(format!("corrupt metadata for '{name}'")))?,
            None => {
                let meta = CollectionMeta::new(name, id_field_hint.unwrap_or(DEFAULT_ID_FIELD));
                metadata.insert(meta.to_document())?;
                meta
            }
        };

        Ok(Collection {
            db,
            name: name.to_string(),
            id_field: RefCell::new(meta.id_field.clone()),
            indexes: ArrayIndexMap::from_entries(&meta.array_indexes),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start a lazy, chainable query against this collection.
    pub fn cursor(&self) -> Cursor<'_, 'db> {
        Cursor::new(self)
    }

    pub fn id_field(&self) -> String {
        self.id_field.borrow().clone()
    }

    pub fn set_id_field(&self, new_field: impl Into<String>) -> Result<(), DbError> {
        let new_field = new_field.into();
        if self.name != METADATA_COLLECTION {
            self.db.within_transaction(|txn| self.persist_id_field(txn, &new_field))?;
        }
        *self.id_field.borrow_mut() = new_field;
        Ok(())
    }

    // ── Insert ──────────────────────────────────────────────────

    pub fn insert(&self, doc: Value) -> Result<Value, DbError> {
        self.db.within_transaction(|txn| self.insert_in(txn, doc))
    }

    pub fn insert_many(&self, docs: Vec<Value>) -> Result<Vec<Value>, DbError> {
        self.db.within_transaction(|txn| docs.into_iter().map(|doc| self.insert_in(txn, doc)).collect())
    }

    /// If `doc` carries an identifier, upserts by it and re-reads the stored
    /// row; otherwise inserts it fresh.
    pub fn save(&self, doc: Value) -> Result<Value, DbError> {
        let id_field = self.id_field();
        let obj = as_object_ref(&doc)?;

        match obj.get(&id_field) {
            Some(id_value) => {
                let mut key = Map::new();
                key.insert(id_field, id_value.clone());
                let key = Value::Object(key);
                self.update(&key, &doc, UpdateOptions { multi: false, upsert: true })?;
                self.find_one(&key)?.ok_or_else(|| DbError::InvalidDocument("save: row missing after upsert".into()))
            }
            None => self.insert(doc),
        }
    }

    fn insert_in(&self, scope: &impl SqlScope, doc: Value) -> Result<Value, DbError> {
        let mut obj = as_object(doc)?;
        let id_field = self.id_field();
        let id = extract_or_generate_id(&mut obj, &id_field);
        let json_body = serde_json::to_string(&Value::Object(obj.clone()))
            .map_err(|e| DbError::InvalidDocument(e.to_string()))?;

        let coll_q = quote_identifier(&self.name)?;
        scope
            .execute(
                &format!("INSERT INTO {coll_q} (\"_id\", document) VALUES (?, json(?))"),
                &[Param::Text(id.clone()), Param::Text(json_body)],
            )
            .map_err(store_err)?;

        tracing::debug!(collection = %self.name, id = %id, "document inserted");
        obj.insert(id_field, Value::String(id));
        Ok(Value::Object(obj))
    }

    // ── Find ────────────────────────────────────────────────────

    pub fn find(&self, q: &Value, limit: Option<u32>) -> Result<Vec<Value>, DbError> {
        self.find_with(q, None, limit)
    }

    pub fn find_one(&self, q: &Value) -> Result<Option<Value>, DbError> {
        let mut rows = self.find(q, Some(1))?;
        Ok(if rows.is_empty() { None } else { Some(rows.remove(0)) })
    }

    pub(crate) fn find_with(&self, q: &Value, skip: Option<u32>, take: Option<u32>) -> Result<Vec<Value>, DbError> {
        self.db.read(|conn| self.find_in(conn, q, skip, take))
    }

    fn find_in(&self, scope: &impl SqlScope, q: &Value, skip: Option<u32>, take: Option<u32>) -> Result<Vec<Value>, DbError> {
        let query = parse_query(q)?;
        let id_field = self.id_field();
        let snapshot = self.indexes.snapshot();
        let compiled = compile(query.filter.as_ref(), &self.name, &id_field, &snapshot)?;
        let coll_q = quote_identifier(&self.name)?;
        let order_sql = order_by_sql(&query.order_by, &id_field);
        let limit_sql = match (skip, take) {
            (None, None) => String::new(),
            (None, Some(n)) => format!(" LIMIT {n}"),
            (Some(s), Some(n)) => format!(" LIMIT {n} OFFSET {s}"),
            (Some(s), None) => format!(" LIMIT -1 OFFSET {s}"),
        };

        let sql = format!(
            "SELECT DISTINCT {coll_q}.\"_id\", {coll_q}.document FROM {coll_q} {join} WHERE {predicate}{order_sql}{limit_sql}",
            join = compiled.join,
            predicate = compiled.where_clause,
        );
        let rows: Vec<DocRow> = scope.query_rows(&sql, &compiled.params).map_err(DbError::from)?;
        tracing::debug!(collection = %self.name, rows = rows.len(), "find executed");
        rows.into_iter().map(|row| hydrate(row, &id_field)).collect()
    }

    pub fn count(&self, q: &Value) -> Result<u64, DbError> {
        self.db.read(|conn| self.count_in(conn, q))
    }

    fn count_in(&self, scope: &impl SqlScope, q: &Value) -> Result<u64, DbError> {
        let query = parse_query(q)?;
        let id_field = self.id_field();
        let snapshot = self.indexes.snapshot();
        let compiled = compile(query.filter.as_ref(), &self.name, &id_field, &snapshot)?;
        let coll_q = quote_identifier(&self.name)?;
        let sql = format!(
            "SELECT COUNT(DISTINCT {coll_q}.\"_id\") FROM {coll_q} {join} WHERE {predicate}",
            join = compiled.join,
            predicate = compiled.where_clause,
        );
        let cells = scope.query_cells(&sql, &compiled.params).map_err(DbError::from)?;
        Ok(match cells.first() {
            Some(Cell::Int(n)) => *n as u64,
            _ => 0,
        })
    }

    // ── Update ──────────────────────────────────────────────────

    pub fn update(&self, q: &Value, u: &Value, options: UpdateOptions) -> Result<(), DbError> {
        self.db.within_transaction(|txn| self.update_in(txn, q, u, &options))
    }

    fn update_in(&self, scope: &impl SqlScope, q: &Value, u: &Value, options: &UpdateOptions) -> Result<(), DbError> {
        let query = parse_query(q)?;
        let id_field = self.id_field();
        let snapshot = self.indexes.snapshot();
        let compiled = compile(query.filter.as_ref(), &self.name, &id_field, &snapshot)?;

        let coll_q = quote_identifier(&self.name)?;
        let probe_sql = format!(
            "SELECT {coll_q}.\"_id\" FROM {coll_q} {join} WHERE {predicate} LIMIT 1",
            join = compiled.join,
            predicate = compiled.where_clause,
        );
        let probe = scope.query_cells(&probe_sql, &compiled.params).map_err(DbError::from)?;

        if probe.is_empty() {
            return self.upsert_seed(scope, q, u, options);
        }

        let update = parse_update(u)?;

        if options.multi {
            let (where_sql, where_params) = row_selector(&self.name, &compiled, None)?;
            return self.apply_update(scope, update, q, &where_sql, &where_params, options);
        }

        // Pin the single row the probe just found by its identifier, and
        // thread that identifier-scoped query through both the plain
        // operators and every recursive `$addToSet` call below — otherwise
        // `$addToSet` re-probing the original `q` on its own could land on a
        // different matching row than the one the plain operators just
        // touched.
        let Some(Cell::Text(target_id)) = probe.into_iter().next() else {
            return Err(DbError::InvalidDocument("probe row carried no identifier".into()));
        };
        let mut by_id = Map::new();
        by_id.insert(id_field.clone(), json!(target_id));
        let scoped_query = Value::Object(by_id);
        let scoped_filter = parse_query(&scoped_query)?;
        let scoped_compiled = compile(scoped_filter.filter.as_ref(), &self.name, &id_field, &snapshot)?;
        let (where_sql, where_params) = row_selector(&self.name, &scoped_compiled, Some(1))?;
        self.apply_update(scope, update, &scoped_query, &where_sql, &where_params, options)
    }

    fn apply_update(
        &self,
        scope: &impl SqlScope,
        update: Update,
        q: &Value,
        where_sql: &str,
        where_params: &[Param],
        options: &UpdateOptions,
    ) -> Result<(), DbError> {
        let id_field = self.id_field();
        match update {
            Update::Replacement(_) => {
                let statements = compile_update(&self.name, &id_field, where_sql, where_params, &update)?;
                self.run_statements(scope, statements)
            }
            Update::Operators(ops) => {
                let (plain, add_to_set): (Vec<UpdateOp>, Vec<UpdateOp>) =
                    ops.into_iter().partition(|op| !matches!(op, UpdateOp::AddToSet { .. }));

                let statements =
                    compile_update(&self.name, &id_field, where_sql, where_params, &Update::Operators(plain))?;
                self.run_statements(scope, statements)?;

                for op in add_to_set {
                    let UpdateOp::AddToSet { field, value } = op else { unreachable!() };
                    self.apply_add_to_set(scope, q, &field, value, options)?;
                }
                Ok(())
            }
        }
    }

    fn run_statements(&self, scope: &impl SqlScope, statements: Vec<Statement>) -> Result<(), DbError> {
        let mut affected = 0usize;
        for stmt in statements {
            affected += scope.execute(&stmt.sql, &stmt.params).map_err(DbError::from)?;
        }
        tracing::debug!(collection = %self.name, affected, "update executed");
        Ok(())
    }

    /// `$addToSet {k: v}` realized as: recurse with the original query
    /// augmented by `{k: {$nin: [v]}}` and a `$push` update — rows that
    /// already contain `v` simply fail the augmented query and are left
    /// untouched.
    fn apply_add_to_set(
        &self,
        scope: &impl SqlScope,
        q: &Value,
        field: &str,
        value: Value,
        options: &UpdateOptions,
    ) -> Result<(), DbError> {
        let mut augmented = as_object_ref(q)?.clone();
        augmented.insert(field.to_string(), json!({ "$nin": [value.clone()] }));
        let augmented_query = Value::Object(augmented);
        let push_update = json!({ "$push": { field: value } });

        with_savepoint(scope, || {
            self.update_in(scope, &augmented_query, &push_update, &UpdateOptions { multi: options.multi, upsert: false })
        })
    }

    /// Step 2-4 of the upsert algorithm: no row matched `q`.
    fn upsert_seed(&self, scope: &impl SqlScope, q: &Value, u: &Value, options: &UpdateOptions) -> Result<(), DbError> {
        if !options.upsert {
            return Ok(());
        }

        let update = parse_update(u)?;
        let id_field = self.id_field();

        match update {
            Update::Replacement(body) => {
                let mut seed = Value::Object(body);
                let seed_obj = seed.as_object_mut().expect("constructed as object");
                if !seed_obj.contains_key(&id_field) {
                    if let Some(id_value) = as_object_ref(q)?.get(&id_field) {
                        seed_obj.insert(id_field.clone(), id_value.clone());
                    }
                }
                with_savepoint(scope, || self.insert_in(scope, seed).map(|_| ()))
            }
            Update::Operators(_) => {
                let seed_query = strip_operator_keys(q);
                with_savepoint(scope, || {
                    let inserted = self.insert_in(scope, seed_query)?;
                    let id_value = as_object_ref(&inserted)?
                        .get(&id_field)
                        .cloned()
                        .ok_or_else(|| DbError::InvalidDocument("seed insert produced no identifier".into()))?;
                    let mut by_id = Map::new();
                    by_id.insert(id_field.clone(), id_value);
                    self.update_in(scope, &Value::Object(by_id), u, &UpdateOptions { multi: false, upsert: false })
                })
            }
        }
    }

    // ── Delete ──────────────────────────────────────────────────

    pub fn delete(&self, q: &Value, options: DeleteOptions) -> Result<u64, DbError> {
        self.db.within_transaction(|txn| self.delete_in(txn, q, &options))
    }

    fn delete_in(&self, scope: &impl SqlScope, q: &Value, options: &DeleteOptions) -> Result<u64, DbError> {
        let query = parse_query(q)?;
        let id_field = self.id_field();
        let snapshot = self.indexes.snapshot();
        let compiled = compile(query.filter.as_ref(), &self.name, &id_field, &snapshot)?;
        let limit = if options.just_one { Some(1) } else { None };
        let (where_sql, where_params) = row_selector(&self.name, &compiled, limit)?;
        let coll_q = quote_identifier(&self.name)?;
        let sql = format!("DELETE FROM {coll_q} WHERE {where_sql}");
        let affected = scope.execute(&sql, &where_params).map_err(DbError::from)?;
        tracing::debug!(collection = %self.name, affected, "delete executed");
        Ok(affected as u64)
    }

    // ── Indexes ─────────────────────────────────────────────────

    pub fn ensure_index(&self, path: &str, options: IndexOptions) -> Result<(), DbError> {
        self.db.within_transaction(|txn| self.ensure_index_in(txn, path, &options))
    }

    fn ensure_index_in(&self, scope: &impl SqlScope, path: &str, options: &IndexOptions) -> Result<(), DbError> {
        let json_path = to_json_path(path)?;
        let coll_q = quote_identifier(&self.name)?;
        let idx_name = format!("{}_{}_idx", self.name, path.replace('.', "_"));
        let idx_q = quote_identifier(&idx_name)?;
        let unique_sql = if options.unique { "UNIQUE " } else { "" };
        scope
            .execute(
                &format!("CREATE {unique_sql}INDEX IF NOT EXISTS {idx_q} ON {coll_q}(json_extract(document,'{json_path}'))"),
                &[],
            )
            .map_err(DbError::from)?;
        Ok(())
    }

    pub fn ensure_array_index(&self, path: &str, order: Option<SortDirection>) -> Result<(), DbError> {
        self.db.within_transaction(|txn| self.ensure_array_index_in(txn, path, order))
    }

    fn ensure_array_index_in(&self, scope: &impl SqlScope, path: &str, order: Option<SortDirection>) -> Result<(), DbError> {
        if self.indexes.table_for(path).is_some() {
            return Ok(());
        }

        let ddl = build_array_index_ddl(&self.name, path, order)?;
        for trigger in ddl.trigger_names() {
            let trigger_q = quote_identifier(&trigger)?;
            scope.execute(&format!("DROP TRIGGER IF EXISTS {trigger_q}"), &[]).map_err(DbError::from)?;
        }
        for stmt in ddl.statements() {
            scope.execute(stmt, &[]).map_err(DbError::from)?;
        }

        self.persist_array_index(scope, path, &ddl.table_name)?;
        self.indexes.insert(path.to_string(), ddl.table_name.clone());
        tracing::debug!(collection = %self.name, path, table = %ddl.table_name, "array index built");
        Ok(())
    }

    // ── Metadata plumbing ───────────────────────────────────────

    /// A handle onto `_metadata` that reuses an already-open scope instead of
    /// opening a fresh transaction — `self` is only reached here from inside
    /// one already.
    fn metadata_handle(&self) -> Collection<'db> {
        Collection {
            db: self.db,
            name: METADATA_COLLECTION.to_string(),
            id_field: RefCell::new(DEFAULT_ID_FIELD.to_string()),
            indexes: ArrayIndexMap::new(),
        }
    }

    fn persist_array_index(&self, scope: &impl SqlScope, path: &str, table_name: &str) -> Result<(), DbError> {
        let metadata = self.metadata_handle();
        let key = json!({ "_id": self.name });
        let existing = metadata
            .find_in(scope, &key, None, Some(1))?
            .into_iter()
            .next()
            .ok_or_else(|| DbError::CollectionNotFound(self.name.clone()))?;
        let meta = CollectionMeta::from_document(&existing)
            .ok_or_else(|| DbError::InvalidDocument(format!("corrupt metadata for '{}'", self.name)))?
            .with_array_index(path, table_name);
        metadata.update_in(scope, &key, &meta.to_document(), &UpdateOptions { multi: false, upsert: false })
    }

    fn persist_id_field(&self, scope: &impl SqlScope, new_field: &str) -> Result<(), DbError> {
        let metadata = self.metadata_handle();
        let key = json!({ "_id": self.name });
        let existing = metadata
            .find_in(scope, &key, None, Some(1))?
            .into_iter()
            .next()
            .ok_or_else(|| DbError::CollectionNotFound(self.name.clone()))?;
        let mut meta = CollectionMeta::from_document(&existing)
            .ok_or_else(|| DbError::InvalidDocument(format!("corrupt metadata for '{}'", self.name)))?;
        meta.id_field = new_field.to_string();
        metadata.update_in(scope, &key, &meta.to_document(), &UpdateOptions { multi: false, upsert: false })
    }
}

/// Run `f` inside a named `SAVEPOINT`, rolling back to it (and releasing
/// immediately after) on failure rather than aborting the enclosing
/// transaction.
fn with_savepoint<T>(scope: &impl SqlScope, f: impl FnOnce() -> Result<T, DbError>) -> Result<T, DbError> {
    let name = format!("sp_{}", Uuid::new_v4().simple());
    let quoted = quote_identifier(&name)?;
    scope.execute(&format!("SAVEPOINT {quoted}"), &[]).map_err(DbError::from)?;
    match f() {
        Ok(value) => {
            scope.execute(&format!("RELEASE {quoted}"), &[]).map_err(DbError::from)?;
            Ok(value)
        }
        Err(e) => {
            let _ = scope.execute(&format!("ROLLBACK TO {quoted}"), &[]);
            let _ = scope.execute(&format!("RELEASE {quoted}"), &[]);
            Err(e)
        }
    }
}

fn store_err(e: StoreError) -> DbError {
    if e.to_string().contains("UNIQUE constraint failed") {
        DbError::DuplicateKey(e.to_string())
    } else {
        DbError::from(e)
    }
}

fn as_object(doc: Value) -> Result<Map<String, Value>, DbError> {
    match doc {
        Value::Object(obj) => Ok(obj),
        _ => Err(DbError::InvalidDocument("document must be a JSON object".into())),
    }
}

fn as_object_ref(doc: &Value) -> Result<&Map<String, Value>, DbError> {
    doc.as_object().ok_or_else(|| DbError::InvalidDocument("query document must be a JSON object".into()))
}

fn extract_or_generate_id(doc: &mut Map<String, Value>, id_field: &str) -> String {
    match doc.remove(id_field) {
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => Uuid::new_v4().to_string(),
    }
}

fn hydrate(row: DocRow, id_field: &str) -> Result<Value, DbError> {
    let mut value: Value = serde_json::from_str(&row.document).map_err(|e| DbError::InvalidDocument(e.to_string()))?;
    let obj = value
        .as_object_mut()
        .ok_or_else(|| DbError::InvalidDocument("stored document is not an object".into()))?;
    obj.insert(id_field.to_string(), Value::String(row.id));
    Ok(value)
}

fn order_by_sql(order_by: &[Sort], id_field: &str) -> String {
    if order_by.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = order_by
        .iter()
        .map(|s| {
            let dir = match s.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            let column = if s.field == id_field {
                "\"_id\"".to_string()
            } else {
                format!("json_extract(document,'$.{}')", s.field.replace('\'', "''"))
            };
            format!("{column} {dir}")
        })
        .collect();
    format!(" ORDER BY {}", parts.join(", "))
}

/// Strip every `$`-prefixed key from `value`, at any depth — used to build an
/// upsert seed document from a query that contains operator sub-documents.
fn strip_operator_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                if k.starts_with('$') {
                    continue;
                }
                out.insert(k.clone(), strip_operator_keys(v));
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(strip_operator_keys).collect()),
        other => other.clone(),
    }
}
