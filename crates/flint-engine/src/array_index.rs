use flint_query::SortDirection;
use flint_store::quote_identifier;

use crate::error::EngineError;
use crate::json_path::to_json_path;

/// Name the materialized table backing an array index. Dots in `path` carry
/// straight through — the table name is still a single quoted identifier,
/// never split on them.
pub fn array_index_table_name(collection: &str, path: &str) -> String {
    format!("{collection}_{path}")
}

/// The DDL needed to stand up (or rebuild) one array index: one materialized
/// table, one value index, and the three triggers that keep the table in
/// sync with the primary collection table. Pure text generation — nothing
/// here touches a connection.
pub struct ArrayIndexDdl {
    pub table_name: String,
    pub create_table: String,
    pub create_value_index: String,
    pub insert_trigger: String,
    pub update_trigger: String,
    pub delete_trigger: String,
}

impl ArrayIndexDdl {
    /// Every statement in the order it must run: the table first, then the
    /// value index, then the three triggers. `drop_triggers_first` is not
    /// included here — callers `DROP TRIGGER IF EXISTS` themselves before
    /// replaying this list, since `CREATE TRIGGER` has no `OR REPLACE`.
    pub fn statements(&self) -> [&str; 5] {
        [
            &self.create_table,
            &self.create_value_index,
            &self.insert_trigger,
            &self.update_trigger,
            &self.delete_trigger,
        ]
    }

    pub fn trigger_names(&self) -> [String; 3] {
        [
            format!("{}_ai", self.table_name),
            format!("{}_au", self.table_name),
            format!("{}_ad", self.table_name),
        ]
    }
}

pub fn build_array_index_ddl(
    collection: &str,
    path: &str,
    order: Option<SortDirection>,
) -> Result<ArrayIndexDdl, EngineError> {
    let json_path = to_json_path(path)?;
    let table_name = array_index_table_name(collection, path);

    let coll_q = quote_identifier(collection)?;
    let table_q = quote_identifier(&table_name)?;
    let value_idx_q = quote_identifier(&format!("{table_name}_value_idx"))?;
    let insert_trigger_q = quote_identifier(&format!("{table_name}_ai"))?;
    let update_trigger_q = quote_identifier(&format!("{table_name}_au"))?;
    let delete_trigger_q = quote_identifier(&format!("{table_name}_ad"))?;

    let order_sql = match order {
        Some(SortDirection::Desc) => " DESC",
        Some(SortDirection::Asc) | None => "",
    };

    let create_table = format!(
        "CREATE TABLE {table_q} AS SELECT {coll_q}.\"_id\" AS \"_id\", je.key, je.value, je.type, je.atom, je.id \
         FROM {coll_q}, json_each({coll_q}.document,'{json_path}') AS je"
    );

    let create_value_index = format!("CREATE INDEX {value_idx_q} ON {table_q}(value{order_sql})");

    let expand_select = format!(
        "SELECT NEW.\"_id\" AS \"_id\", je.key, je.value, je.type, je.atom, je.id \
         FROM json_each(NEW.document,'{json_path}') AS je"
    );

    let insert_trigger = format!(
        "CREATE TRIGGER {insert_trigger_q} AFTER INSERT ON {coll_q} BEGIN \
         INSERT INTO {table_q} {expand_select}; END"
    );

    let update_trigger = format!(
        "CREATE TRIGGER {update_trigger_q} AFTER UPDATE ON {coll_q} BEGIN \
         DELETE FROM {table_q} WHERE \"_id\" = OLD.\"_id\"; \
         INSERT INTO {table_q} {expand_select}; END"
    );

    let delete_trigger = format!(
        "CREATE TRIGGER {delete_trigger_q} AFTER DELETE ON {coll_q} BEGIN \
         DELETE FROM {table_q} WHERE \"_id\" = OLD.\"_id\"; END"
    );

    Ok(ArrayIndexDdl {
        table_name,
        create_table,
        create_value_index,
        insert_trigger,
        update_trigger,
        delete_trigger,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_name_joins_with_underscore() {
        assert_eq!(array_index_table_name("people", "tags"), "people_tags");
    }

    #[test]
    fn ddl_references_the_right_tables() {
        let ddl = build_array_index_ddl("people", "tags", None).unwrap();
        assert_eq!(ddl.table_name, "people_tags");
        assert!(ddl.create_table.contains("\"people_tags\""));
        assert!(ddl.create_table.contains("json_each(\"people\".document,'$.tags')"));
        assert!(ddl.insert_trigger.contains("AFTER INSERT ON \"people\""));
        assert!(ddl.update_trigger.contains("AFTER UPDATE ON \"people\""));
        assert!(ddl.delete_trigger.contains("AFTER DELETE ON \"people\""));
    }

    #[test]
    fn desc_order_changes_value_index_only() {
        let ddl = build_array_index_ddl("people", "tags", Some(SortDirection::Desc)).unwrap();
        assert!(ddl.create_value_index.ends_with("(value DESC)"));
    }

    #[test]
    fn rejects_bad_path() {
        assert!(build_array_index_ddl("people", "", None).is_err());
    }

    #[test]
    fn rejects_hostile_collection_name() {
        assert!(build_array_index_ddl("evil\"", "tags", None).is_err());
    }
}
