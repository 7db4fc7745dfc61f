use std::collections::HashMap;

use flint_query::{LogicalOp, Node, Operand, Operator, Scalar};
use flint_store::Param;

use crate::error::DbError;

/// The result of compiling a query AST: a boolean expression referencing the
/// collection's primary table (and possibly joins introduced for array-index
/// containment), plus the positional parameters it binds.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub where_clause: String,
    pub join: String,
    pub params: Vec<Param>,
}

struct Ctx<'a> {
    collection: &'a str,
    id_field: &'a str,
    index_map: &'a HashMap<String, String>,
    alias_counter: u32,
    joins: Vec<String>,
    params: Vec<Param>,
}

pub fn compile(
    node: Option<&Node>,
    collection: &str,
    id_field: &str,
    index_map: &HashMap<String, String>,
) -> Result<CompiledQuery, DbError> {
    let mut ctx = Ctx {
        collection,
        id_field,
        index_map,
        alias_counter: 0,
        joins: Vec::new(),
        params: Vec::new(),
    };
    let where_clause = match node {
        Some(node) => compile_node(&mut ctx, node)?,
        None => "1=1".to_string(),
    };
    Ok(CompiledQuery { where_clause, join: ctx.joins.join(" "), params: ctx.params })
}

fn scalar_to_param(s: &Scalar) -> Param {
    match s {
        Scalar::Null => Param::Null,
        Scalar::Bool(b) => Param::Bool(*b),
        Scalar::Number(n) => {
            if let Some(i) = n.as_i64() {
                Param::Int(i)
            } else {
                Param::Float(n.as_f64().unwrap_or_default())
            }
        }
        Scalar::String(s) => Param::Text(s.clone()),
    }
}

fn escape_json_path_literal(field: &str) -> String {
    field.replace('\'', "''")
}

fn column_for_field(ctx: &Ctx<'_>, field: &str) -> (String, bool) {
    if field == ctx.id_field {
        ("\"_id\"".to_string(), true)
    } else {
        (format!("json_extract(document,'$.{}')", escape_json_path_literal(field)), false)
    }
}

fn compile_node(ctx: &mut Ctx<'_>, node: &Node) -> Result<String, DbError> {
    match node {
        Node::Logical { op, children } => {
            if children.is_empty() {
                return Err(DbError::Compile("logical node with no children".into()));
            }
            let joiner = match op {
                LogicalOp::And => " AND ",
                LogicalOp::Or => " OR ",
            };
            let parts = children
                .iter()
                .map(|c| compile_node(ctx, c).map(|frag| format!("({frag})")))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(parts.join(joiner))
        }
        Node::Not(inner) => {
            let Node::Predicate { field, op, operand } = inner.as_ref() else {
                return Err(DbError::Compile("$not only wraps a single comparator".into()));
            };
            // `$in`/`$nin` explode the field into one row per array element via
            // `json_each`; wrapping the joined predicate in a plain `NOT (...)`
            // would negate per-row instead of per-document. Negate by swapping
            // to the other containment compiler instead, which is already
            // whole-document via its subquery/direct-membership shape.
            match op {
                Operator::In => {
                    let list = operand.as_list().ok_or_else(scalar_shape_err(field))?;
                    let (_, is_id) = column_for_field(ctx, field);
                    compile_nin(ctx, field, is_id, list)
                }
                Operator::Nin => {
                    let list = operand.as_list().ok_or_else(scalar_shape_err(field))?;
                    let (_, is_id) = column_for_field(ctx, field);
                    compile_in(ctx, field, is_id, list)
                }
                _ => {
                    let frag = compile_predicate(ctx, field, *op, operand)?;
                    Ok(format!("NOT ({frag})"))
                }
            }
        }
        Node::Predicate { field, op, operand } => compile_predicate(ctx, field, *op, operand),
    }
}

fn compile_predicate(
    ctx: &mut Ctx<'_>,
    field: &str,
    op: Operator,
    operand: &Operand,
) -> Result<String, DbError> {
    let (column, is_id) = column_for_field(ctx, field);

    match op {
        Operator::Eq => {
            let scalar = operand.as_scalar().ok_or_else(scalar_shape_err(field))?;
            ctx.params.push(scalar_to_param(scalar));
            Ok(format!("{column} IS ?"))
        }
        Operator::Ne => {
            let scalar = operand.as_scalar().ok_or_else(scalar_shape_err(field))?;
            ctx.params.push(scalar_to_param(scalar));
            Ok(format!("{column} != ?"))
        }
        Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
            let scalar = operand.as_scalar().ok_or_else(scalar_shape_err(field))?;
            let sql_op = match op {
                Operator::Gt => ">",
                Operator::Gte => ">=",
                Operator::Lt => "<",
                Operator::Lte => "<=",
                _ => unreachable!(),
            };
            ctx.params.push(scalar_to_param(scalar));
            Ok(format!("{column} {sql_op} ?"))
        }
        Operator::Like => {
            let scalar = operand.as_scalar().ok_or_else(scalar_shape_err(field))?;
            ctx.params.push(scalar_to_param(scalar));
            Ok(format!("{column} LIKE ?"))
        }
        Operator::In => {
            let list = operand.as_list().ok_or_else(scalar_shape_err(field))?;
            compile_in(ctx, field, is_id, list)
        }
        Operator::Nin => {
            let list = operand.as_list().ok_or_else(scalar_shape_err(field))?;
            compile_nin(ctx, field, is_id, list)
        }
    }
}

fn scalar_shape_err(field: &str) -> impl FnOnce() -> DbError + '_ {
    move || DbError::Compile(format!("operand shape does not match operator for field {field:?}"))
}

fn placeholders(n: usize) -> String {
    std::iter::repeat("?").take(n).collect::<Vec<_>>().join(",")
}

/// `$in` on the identifier field is a direct membership test against the
/// primary-key column; `$in` on any other path always goes through
/// `json_each`, indexed or not — SQLite's `json_each` happily treats a
/// scalar value at the path as a single-row table, so the same join shape
/// covers both array and scalar fields.
fn compile_in(ctx: &mut Ctx<'_>, field: &str, is_id: bool, list: &[Scalar]) -> Result<String, DbError> {
    if is_id {
        let ph = placeholders(list.len());
        ctx.params.extend(list.iter().map(scalar_to_param));
        return Ok(format!("\"_id\" IN ({ph})"));
    }

    let (join, value_ref) = array_join(ctx, field);
    ctx.joins.push(join);
    let ph = placeholders(list.len());
    ctx.params.extend(list.iter().map(scalar_to_param));
    Ok(format!("{value_ref} IN ({ph})"))
}

/// `$nin` is negation-via-subquery: the inner join never leaks into the
/// outer query's join list, it lives only inside the subquery text.
fn compile_nin(ctx: &mut Ctx<'_>, field: &str, is_id: bool, list: &[Scalar]) -> Result<String, DbError> {
    if is_id {
        let ph = placeholders(list.len());
        ctx.params.extend(list.iter().map(scalar_to_param));
        return Ok(format!("\"_id\" NOT IN ({ph})"));
    }

    let coll_q = flint_store::quote_identifier(ctx.collection)?;
    let mut inner = Ctx {
        collection: ctx.collection,
        id_field: ctx.id_field,
        index_map: ctx.index_map,
        alias_counter: ctx.alias_counter,
        joins: Vec::new(),
        params: Vec::new(),
    };
    let (join, value_ref) = array_join(&mut inner, field);
    ctx.alias_counter = inner.alias_counter;
    let ph = placeholders(list.len());
    let inner_params = list.iter().map(scalar_to_param).collect::<Vec<_>>();
    ctx.params.extend(inner_params);

    Ok(format!(
        "{coll_q}.\"_id\" NOT IN (SELECT {coll_q}.\"_id\" FROM {coll_q} {join} WHERE {value_ref} IN ({ph}))"
    ))
}

/// Build the join fragment and the value-column reference for an array
/// containment test on `field`: an indexed join against the materialized
/// side table when one exists, otherwise a fresh lateral `json_each` alias.
fn array_join(ctx: &mut Ctx<'_>, field: &str) -> (String, String) {
    let coll_q = flint_store::quote_identifier(ctx.collection).unwrap_or_default();

    if let Some(index_table) = ctx.index_map.get(field) {
        let table_q = flint_store::quote_identifier(index_table).unwrap_or_default();
        let join = format!("INNER JOIN {table_q} ON {table_q}.\"_id\" = {coll_q}.\"_id\"");
        (join, format!("{table_q}.value"))
    } else {
        let alias = format!("je{}", ctx.alias_counter);
        ctx.alias_counter += 1;
        let alias_q = format!("\"{alias}\"");
        let json_path = format!("$.{}", escape_json_path_literal(field));
        let join = format!(", json_each(document,'{json_path}') AS {alias_q}");
        (join, format!("{alias_q}.value"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flint_query::parse_query;
    use serde_json::json;

    fn compile_doc(doc: serde_json::Value, index_map: &HashMap<String, String>) -> CompiledQuery {
        let q = parse_query(&doc).unwrap();
        compile(q.filter.as_ref(), "people", "_id", index_map).unwrap()
    }

    #[test]
    fn empty_query_matches_everything() {
        let c = compile_doc(json!({}), &HashMap::new());
        assert_eq!(c.where_clause, "1=1");
        assert!(c.params.is_empty());
    }

    #[test]
    fn bare_field_compiles_to_json_extract_is() {
        let c = compile_doc(json!({"name": "Bart"}), &HashMap::new());
        assert!(c.where_clause.contains("json_extract(document,'$.name') IS ?"));
        assert_eq!(c.params.len(), 1);
    }

    #[test]
    fn id_field_bypasses_json_extract() {
        let c = compile_doc(json!({"_id": "abc"}), &HashMap::new());
        assert!(c.where_clause.contains("\"_id\" IS ?"));
        assert!(!c.where_clause.contains("json_extract"));
    }

    #[test]
    fn gt_emits_ordering_comparator() {
        let c = compile_doc(json!({"age": {"$gt": 10}}), &HashMap::new());
        assert!(c.where_clause.contains("json_extract(document,'$.age') > ?"));
    }

    #[test]
    fn in_on_unindexed_path_uses_lateral_join() {
        let c = compile_doc(json!({"tags": {"$in": ["a", "b"]}}), &HashMap::new());
        assert!(c.join.contains("json_each(document,'$.tags')"));
        assert!(c.where_clause.contains(".value IN (?,?)"));
        assert_eq!(c.params.len(), 2);
    }

    #[test]
    fn in_on_indexed_path_uses_index_table_join() {
        let mut map = HashMap::new();
        map.insert("tags".to_string(), "people_tags".to_string());
        let c = compile_doc(json!({"tags": {"$in": ["a"]}}), &map);
        assert!(c.join.contains("INNER JOIN \"people_tags\""));
        assert!(c.where_clause.contains("\"people_tags\".value IN (?)"));
    }

    #[test]
    fn nin_compiles_to_negated_subquery_without_leaking_join() {
        let c = compile_doc(json!({"tags": {"$nin": ["a"]}}), &HashMap::new());
        assert!(c.join.is_empty());
        assert!(c.where_clause.contains("NOT IN (SELECT"));
        assert!(c.where_clause.contains("json_each"));
    }

    #[test]
    fn not_wraps_single_comparator() {
        let c = compile_doc(json!({"age": {"$not": {"$gt": 10}}}), &HashMap::new());
        assert!(c.where_clause.starts_with("NOT ("));
    }

    #[test]
    fn not_wrapping_in_on_array_field_negates_whole_document_not_each_row() {
        let c = compile_doc(json!({"tags": {"$not": {"$in": ["a"]}}}), &HashMap::new());
        assert!(c.join.is_empty());
        assert!(c.where_clause.contains("NOT IN (SELECT"));
        assert!(c.where_clause.contains("json_each"));
    }

    #[test]
    fn not_wrapping_nin_on_array_field_uses_positive_join() {
        let c = compile_doc(json!({"tags": {"$not": {"$nin": ["a"]}}}), &HashMap::new());
        assert!(c.join.contains("json_each(document,'$.tags')"));
        assert!(c.where_clause.contains(".value IN (?)"));
    }

    #[test]
    fn implicit_and_wraps_each_field_in_parens() {
        let c = compile_doc(json!({"name": "Bart", "age": 10}), &HashMap::new());
        assert!(c.where_clause.contains(") AND ("));
    }

    #[test]
    fn null_equality_uses_is() {
        let c = compile_doc(json!({"k": null}), &HashMap::new());
        assert!(c.where_clause.contains("IS ?"));
        assert_eq!(c.params[0], Param::Null);
    }
}
