use flint_query::{PopEnd, Update, UpdateOp};
use flint_store::{quote_identifier, Param};
use serde_json::Value;

use crate::compile::CompiledQuery;
use crate::error::DbError;

/// One parameterized statement to run, in order, against the predicate the
/// row selector has already narrowed.
pub struct Statement {
    pub sql: String,
    pub params: Vec<Param>,
}

/// The final `WHERE` text an `UPDATE`/`DELETE` statement should use, after
/// accounting for any join the query compiler introduced and any row-count
/// limit the caller asked for. SQLite's `UPDATE`/`DELETE` don't support a
/// `LIMIT` or an arbitrary `FROM`, so both cases collapse to a `_id IN
/// (SELECT DISTINCT …)` wrapper around the original predicate.
pub fn row_selector(collection: &str, compiled: &CompiledQuery, limit: Option<u32>) -> Result<(String, Vec<Param>), DbError> {
    let coll_q = quote_identifier(collection)?;
    let needs_wrap = !compiled.join.is_empty() || limit.is_some();

    if !needs_wrap {
        return Ok((compiled.where_clause.clone(), compiled.params.clone()));
    }

    let limit_sql = match limit {
        Some(n) => format!(" LIMIT {n}"),
        None => String::new(),
    };
    let where_sql = format!(
        "\"_id\" IN (SELECT DISTINCT {coll_q}.\"_id\" FROM {coll_q} {join} WHERE {predicate}{limit_sql})",
        join = compiled.join,
        predicate = compiled.where_clause,
    );
    Ok((where_sql, compiled.params.clone()))
}

/// Compile a normalized update document (minus `$addToSet`, which the
/// orchestrator realizes via recursion rather than direct SQL) into the
/// ordered sequence of statements that must run against the already-selected
/// row set.
pub fn compile_update(
    collection: &str,
    id_field: &str,
    where_sql: &str,
    where_params: &[Param],
    update: &Update,
) -> Result<Vec<Statement>, DbError> {
    let coll_q = quote_identifier(collection)?;

    match update {
        Update::Replacement(doc) => {
            let mut body = doc.clone();
            body.remove(id_field);
            let json = serde_json::to_string(&Value::Object(body))
                .map_err(|e| DbError::InvalidDocument(e.to_string()))?;
            let mut params = vec![Param::Text(json)];
            params.extend(where_params.iter().cloned());
            Ok(vec![Statement {
                sql: format!("UPDATE {coll_q} SET document = json(?) WHERE {where_sql}"),
                params,
            }])
        }
        Update::Operators(ops) => {
            let mut statements = Vec::new();
            for op in ops {
                match op {
                    UpdateOp::Set { field, value } => {
                        statements.push(compile_set(&coll_q, field, value, where_sql, where_params)?);
                    }
                    UpdateOp::Inc { field, amount } => {
                        statements.push(compile_inc(&coll_q, field, *amount, where_sql, where_params));
                    }
                    UpdateOp::Push { field, value } => {
                        statements.extend(compile_push(&coll_q, field, value, where_sql, where_params)?);
                    }
                    UpdateOp::Pop { field, end } => {
                        statements.push(compile_pop(&coll_q, field, *end, where_sql, where_params));
                    }
                    UpdateOp::AddToSet { .. } => {
                        return Err(DbError::Compile(
                            "$addToSet is realized by the orchestrator, not the update compiler".into(),
                        ));
                    }
                }
            }
            Ok(statements)
        }
    }
}

fn json_path_literal(field: &str) -> String {
    format!("'$.{}'", field.replace('\'', "''"))
}

fn compile_set(
    coll_q: &str,
    field: &str,
    value: &Value,
    where_sql: &str,
    where_params: &[Param],
) -> Result<Statement, DbError> {
    let path = json_path_literal(field);
    let param = scalar_or_json_param(value)?;
    let mut params = vec![param];
    params.extend(where_params.iter().cloned());
    Ok(Statement {
        sql: format!("UPDATE {coll_q} SET document = json_set(document,{path}, ?) WHERE {where_sql}"),
        params,
    })
}

fn compile_inc(coll_q: &str, field: &str, amount: f64, where_sql: &str, where_params: &[Param]) -> Statement {
    let path = json_path_literal(field);
    let mut params = vec![Param::Float(amount)];
    params.extend(where_params.iter().cloned());
    Statement {
        sql: format!(
            "UPDATE {coll_q} SET document = json_set(document,{path}, coalesce(json_extract(document,{path}),0) + ?) WHERE {where_sql}"
        ),
        params,
    }
}

fn compile_push(
    coll_q: &str,
    field: &str,
    value: &Value,
    where_sql: &str,
    where_params: &[Param],
) -> Result<Vec<Statement>, DbError> {
    let path = json_path_literal(field);
    let field_lit = format!("'{}'", field.replace('\'', "''"));

    let init = Statement {
        sql: format!(
            "UPDATE {coll_q} SET document = json_set(document,{path}, json_array()) \
             WHERE ({where_sql}) AND json_extract(document,{path}) IS NULL"
        ),
        params: where_params.to_vec(),
    };

    let element_param = scalar_or_json_param(value)?;
    let mut append_params = vec![element_param];
    append_params.extend(where_params.iter().cloned());
    let append = Statement {
        sql: format!(
            "UPDATE {coll_q} SET document = json_set(document, \
             '$.' || {field_lit} || '[' || json_array_length(json_extract(document,{path})) || ']', ?) \
             WHERE {where_sql}"
        ),
        params: append_params,
    };

    Ok(vec![init, append])
}

fn compile_pop(coll_q: &str, field: &str, end: PopEnd, where_sql: &str, where_params: &[Param]) -> Statement {
    let path = json_path_literal(field);
    let field_lit = format!("'{}'", field.replace('\'', "''"));
    let index_expr = match end {
        PopEnd::Last => format!("(json_array_length(json_extract(document,{path})) - 1)"),
        PopEnd::First => "0".to_string(),
    };
    Statement {
        sql: format!(
            "UPDATE {coll_q} SET document = json_remove(document, \
             '$.' || {field_lit} || '[' || {index_expr} || ']') WHERE {where_sql}"
        ),
        params: where_params.to_vec(),
    }
}

fn scalar_or_json_param(value: &Value) -> Result<Param, DbError> {
    Ok(match value {
        Value::Null => Param::Null,
        Value::Bool(b) => Param::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Param::Int(i)
            } else {
                Param::Float(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => Param::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => {
            Param::Text(serde_json::to_string(value).map_err(|e| DbError::InvalidDocument(e.to_string()))?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flint_query::parse_update;
    use serde_json::json;

    #[test]
    fn set_scalar_binds_value_directly() {
        let u = parse_update(&json!({"$set": {"name": "Bart"}})).unwrap();
        let stmts = compile_update("people", "_id", "\"_id\" IS ?", &[Param::Text("1".into())], &u).unwrap();
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].sql.contains("json_set(document,'$.name', ?)"));
        assert_eq!(stmts[0].params[0], Param::Text("Bart".into()));
    }

    #[test]
    fn inc_uses_coalesce() {
        let u = parse_update(&json!({"$inc": {"age": 1}})).unwrap();
        let stmts = compile_update("people", "_id", "1=1", &[], &u).unwrap();
        assert!(stmts[0].sql.contains("coalesce(json_extract(document,'$.age'),0) + ?"));
    }

    #[test]
    fn push_emits_init_then_append() {
        let u = parse_update(&json!({"$push": {"tags": "x"}})).unwrap();
        let stmts = compile_update("people", "_id", "1=1", &[], &u).unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].sql.contains("json_array()"));
        assert!(stmts[1].sql.contains("json_array_length"));
    }

    #[test]
    fn pop_last_uses_length_minus_one() {
        let u = parse_update(&json!({"$pop": {"tags": 1}})).unwrap();
        let stmts = compile_update("people", "_id", "1=1", &[], &u).unwrap();
        assert!(stmts[0].sql.contains("json_array_length(json_extract(document,'$.tags')) - 1"));
    }

    #[test]
    fn pop_first_uses_index_zero() {
        let u = parse_update(&json!({"$pop": {"tags": -1}})).unwrap();
        let stmts = compile_update("people", "_id", "1=1", &[], &u).unwrap();
        assert!(stmts[0].sql.contains("'[' || 0 || ']'"));
    }

    #[test]
    fn replacement_strips_identifier_key() {
        let u = parse_update(&json!({"_id": "x", "name": "Bart"})).unwrap();
        let stmts = compile_update("people", "_id", "1=1", &[], &u).unwrap();
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].sql.contains("json(?)"));
        if let Param::Text(body) = &stmts[0].params[0] {
            assert!(!body.contains("\"_id\""));
        } else {
            panic!("expected text param");
        }
    }

    #[test]
    fn add_to_set_is_rejected_by_the_statement_compiler() {
        let u = parse_update(&json!({"$addToSet": {"tags": "x"}})).unwrap();
        assert!(compile_update("people", "_id", "1=1", &[], &u).is_err());
    }

    #[test]
    fn row_selector_passes_through_when_no_join_or_limit() {
        let compiled = CompiledQuery { where_clause: "\"_id\" IS ?".into(), join: String::new(), params: vec![Param::Text("1".into())] };
        let (sql, params) = row_selector("people", &compiled, None).unwrap();
        assert_eq!(sql, "\"_id\" IS ?");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn row_selector_wraps_when_join_present() {
        let compiled = CompiledQuery {
            where_clause: "\"je0\".value IN (?)".into(),
            join: ", json_each(document,'$.tags') AS \"je0\"".into(),
            params: vec![Param::Text("x".into())],
        };
        let (sql, _) = row_selector("people", &compiled, None).unwrap();
        assert!(sql.starts_with("\"_id\" IN (SELECT DISTINCT"));
    }

    #[test]
    fn row_selector_wraps_when_limit_present() {
        let compiled = CompiledQuery { where_clause: "1=1".into(), join: String::new(), params: vec![] };
        let (sql, _) = row_selector("people", &compiled, Some(1)).unwrap();
        assert!(sql.contains("LIMIT 1"));
    }
}
