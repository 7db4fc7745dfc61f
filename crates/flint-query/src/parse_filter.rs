use serde_json::Value;

use crate::node::Node;
use crate::operator::{LogicalOp, Operator};
use crate::query::Query;
use crate::sort::{Sort, SortDirection};
use crate::value::{Operand, Scalar};

/// Parse error for query documents.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterParseError(pub String);

impl std::fmt::Display for FilterParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "query parse error: {}", self.0)
    }
}

impl std::error::Error for FilterParseError {}

/// Parse a top-level query document into a `Query`.
///
/// Recognizes the `{$query: Q, $order: O}` envelope; otherwise the whole
/// document is the filter and `order_by` is empty.
pub fn parse_query(doc: &Value) -> Result<Query, FilterParseError> {
    let obj = match doc {
        Value::Object(obj) => obj,
        _ => return Err(FilterParseError("query document must be an object".into())),
    };

    if let Some(inner) = obj.get("$query") {
        let filter = match inner {
            Value::Object(inner_obj) if inner_obj.is_empty() => None,
            _ => Some(parse_filter(inner)?),
        };
        let order_by = match obj.get("$order") {
            Some(order) => parse_order(order)?,
            None => Vec::new(),
        };
        return Ok(Query { filter, order_by });
    }

    if obj.is_empty() {
        return Ok(Query::match_all());
    }

    Ok(Query { filter: Some(parse_filter(doc)?), order_by: Vec::new() })
}

/// Parse an `$order` document, e.g. `{"firstname": 1, "age": -1}`.
fn parse_order(value: &Value) -> Result<Vec<Sort>, FilterParseError> {
    let obj = match value {
        Value::Object(obj) => obj,
        _ => return Err(FilterParseError("$order value must be an object".into())),
    };

    let mut sorts = Vec::with_capacity(obj.len());
    for (field, dir) in obj {
        let direction = match dir.as_i64() {
            Some(1) => SortDirection::Asc,
            Some(-1) => SortDirection::Desc,
            _ => {
                return Err(FilterParseError(format!(
                    "$order value for '{field}' must be 1 or -1"
                )));
            }
        };
        sorts.push(Sort { field: field.clone(), direction });
    }
    Ok(sorts)
}

/// Parse a query document (or sub-document) into an `Node` tree.
///
/// Follows Mongo query semantics:
/// - Top-level document is an implicit AND of all entries.
/// - `{ "field": value }` is an implicit `$eq`.
/// - `{ "field": { "$gt": v } }` uses operator sub-documents.
/// - `{ "$or": [...] }` / `{ "$and": [...] }` for explicit logical connectives.
pub fn parse_filter(value: &Value) -> Result<Node, FilterParseError> {
    let obj = match value {
        Value::Object(obj) => obj,
        _ => return Err(FilterParseError("query node must be an object".into())),
    };

    let mut children = Vec::new();

    for (key, val) in obj {
        match key.as_str() {
            "$and" => children.push(parse_logical_array(val, LogicalOp::And)?),
            "$or" => children.push(parse_logical_array(val, LogicalOp::Or)?),
            k if k.starts_with('$') => {
                return Err(FilterParseError(format!("unknown top-level operator: {k}")));
            }
            _ => children.push(parse_field_condition(key, val)?),
        }
    }

    if children.is_empty() {
        return Err(FilterParseError("empty query document".into()));
    }

    if children.len() == 1 {
        Ok(children.pop().unwrap())
    } else {
        Ok(Node::and(children))
    }
}

fn parse_logical_array(value: &Value, op: LogicalOp) -> Result<Node, FilterParseError> {
    let arr = match value {
        Value::Array(a) => a,
        _ => return Err(FilterParseError("$and/$or value must be an array".into())),
    };

    if arr.is_empty() {
        return Err(FilterParseError("$and/$or array must not be empty".into()));
    }

    let children = arr.iter().map(parse_filter).collect::<Result<Vec<_>, _>>()?;

    Ok(Node::Logical { op, children })
}

/// Parse a field condition: either implicit `$eq` or an operator sub-document.
fn parse_field_condition(field: &str, value: &Value) -> Result<Node, FilterParseError> {
    if let Value::Object(obj) = value {
        if obj.keys().next().is_some_and(|k| k.starts_with('$')) {
            return parse_operator_doc(field, obj);
        }
    }

    let scalar = Scalar::from_value(value)
        .ok_or_else(|| FilterParseError(format!("'{field}': operand must be a scalar")))?;
    Ok(Node::Predicate { field: field.to_string(), op: Operator::Eq, operand: Operand::Scalar(scalar) })
}

/// Parse an operator sub-document like `{ "$gt": 21, "$lte": 100 }`.
fn parse_operator_doc(
    field: &str,
    obj: &serde_json::Map<String, Value>,
) -> Result<Node, FilterParseError> {
    let mut conditions = Vec::new();

    for (op_key, op_value) in obj {
        match op_key.as_str() {
            "$not" => conditions.push(Node::Not(Box::new(parse_leaf_operator(field, op_value)?))),
            _ => conditions.push(parse_one_operator(field, op_key, op_value)?),
        }
    }

    match conditions.len() {
        0 => Err(FilterParseError("empty operator document".into())),
        1 => Ok(conditions.pop().unwrap()),
        _ => Ok(Node::and(conditions)),
    }
}

/// Parse the single leaf comparator a `$not` wraps. A nested `$not` or
/// logical connective here is a configuration error — `$not` composition is
/// shallow by design (see Design Notes).
fn parse_leaf_operator(field: &str, value: &Value) -> Result<Node, FilterParseError> {
    let obj = match value {
        Value::Object(obj) => obj,
        _ => return Err(FilterParseError("$not value must be an operator document".into())),
    };

    let mut iter = obj.iter();
    let (op_key, op_value) = iter
        .next()
        .ok_or_else(|| FilterParseError("$not value must contain exactly one operator".into()))?;
    if iter.next().is_some() {
        return Err(FilterParseError("$not value must contain exactly one operator".into()));
    }
    if op_key == "$not" {
        return Err(FilterParseError("$not cannot nest $not".into()));
    }

    parse_one_operator(field, op_key, op_value)
}

fn parse_one_operator(field: &str, op_key: &str, op_value: &Value) -> Result<Node, FilterParseError> {
    let scalar_operand = |v: &Value| -> Result<Operand, FilterParseError> {
        Scalar::from_value(v)
            .map(Operand::Scalar)
            .ok_or_else(|| FilterParseError(format!("'{field}' {op_key}: operand must be a scalar")))
    };

    let list_operand = |v: &Value| -> Result<Operand, FilterParseError> {
        let arr = match v {
            Value::Array(a) => a,
            _ => {
                return Err(FilterParseError(format!(
                    "'{field}' {op_key}: operand must be an array"
                )));
            }
        };
        let scalars = arr
            .iter()
            .map(|e| {
                Scalar::from_value(e).ok_or_else(|| {
                    FilterParseError(format!("'{field}' {op_key}: list elements must be scalars"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Operand::List(scalars))
    };

    let (op, operand) = match op_key {
        "$eq" => (Operator::Eq, scalar_operand(op_value)?),
        "$ne" => (Operator::Ne, scalar_operand(op_value)?),
        "$gt" => (Operator::Gt, scalar_operand(op_value)?),
        "$gte" => (Operator::Gte, scalar_operand(op_value)?),
        "$lt" => (Operator::Lt, scalar_operand(op_value)?),
        "$lte" => (Operator::Lte, scalar_operand(op_value)?),
        "$like" => (Operator::Like, scalar_operand(op_value)?),
        "$in" => (Operator::In, list_operand(op_value)?),
        "$nin" => (Operator::Nin, list_operand(op_value)?),
        k => return Err(FilterParseError(format!("unknown field operator: {k}"))),
    };

    Ok(Node::Predicate { field: field.to_string(), op, operand })
}
