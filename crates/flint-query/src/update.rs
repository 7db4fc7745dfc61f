use serde_json::{Map, Value};

/// `$pop` direction: `1` removes the last element, `-1` the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopEnd {
    Last,
    First,
}

/// A single normalized update instruction.
///
/// The update document is parsed into a `Vec<UpdateOp>` before any SQL is
/// emitted, separating validation from emission and making "one operator per
/// key" a simple set check.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    Set { field: String, value: Value },
    Inc { field: String, amount: f64 },
    Push { field: String, value: Value },
    Pop { field: String, end: PopEnd },
    AddToSet { field: String, value: Value },
}

impl UpdateOp {
    pub fn field(&self) -> &str {
        match self {
            UpdateOp::Set { field, .. }
            | UpdateOp::Inc { field, .. }
            | UpdateOp::Push { field, .. }
            | UpdateOp::Pop { field, .. }
            | UpdateOp::AddToSet { field, .. } => field,
        }
    }
}

/// A fully parsed update document: either a list of operator instructions,
/// or a whole-document replacement.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Operators(Vec<UpdateOp>),
    Replacement(Map<String, Value>),
}

/// Parse error for update documents.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateParseError(pub String);

impl std::fmt::Display for UpdateParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "update parse error: {}", self.0)
    }
}

impl std::error::Error for UpdateParseError {}

/// Parse an update document into a validated `Update`.
///
/// A document with no `$`-prefixed keys is a replacement. A document whose
/// keys are all `$`-prefixed is an operator update. Mixing the two is an
/// error, as is targeting the same field from more than one operator.
pub fn parse_update(doc: &Value) -> Result<Update, UpdateParseError> {
    let obj = match doc {
        Value::Object(obj) => obj,
        _ => return Err(UpdateParseError("update document must be an object".into())),
    };

    if obj.is_empty() {
        return Err(UpdateParseError("empty update document".into()));
    }

    let operator_keys = obj.keys().filter(|k| k.starts_with('$')).count();
    if operator_keys == 0 {
        return Ok(Update::Replacement(obj.clone()));
    }
    if operator_keys != obj.len() {
        return Err(UpdateParseError(
            "update document mixes operator and replacement keys".into(),
        ));
    }

    let mut ops = Vec::new();
    for (key, value) in obj {
        match key.as_str() {
            "$set" => parse_field_value_ops(value, |field, value| UpdateOp::Set { field, value }, &mut ops)?,
            "$inc" => parse_inc_fields(value, &mut ops)?,
            "$push" => parse_field_value_ops(value, |field, value| UpdateOp::Push { field, value }, &mut ops)?,
            "$pop" => parse_pop_fields(value, &mut ops)?,
            "$addToSet" => {
                parse_field_value_ops(value, |field, value| UpdateOp::AddToSet { field, value }, &mut ops)?
            }
            k => return Err(UpdateParseError(format!("unknown update operator: {k}"))),
        }
    }

    let mut seen = std::collections::HashSet::new();
    for op in &ops {
        if !seen.insert(op.field().to_string()) {
            return Err(UpdateParseError(format!(
                "multiple operators target the same field: '{}'",
                op.field()
            )));
        }
    }

    Ok(Update::Operators(ops))
}

fn parse_field_value_ops(
    value: &Value,
    make_op: impl Fn(String, Value) -> UpdateOp,
    ops: &mut Vec<UpdateOp>,
) -> Result<(), UpdateParseError> {
    let obj = match value {
        Value::Object(obj) => obj,
        _ => return Err(UpdateParseError("operator value must be an object".into())),
    };
    for (field, val) in obj {
        ops.push(make_op(field.clone(), val.clone()));
    }
    Ok(())
}

fn parse_inc_fields(value: &Value, ops: &mut Vec<UpdateOp>) -> Result<(), UpdateParseError> {
    let obj = match value {
        Value::Object(obj) => obj,
        _ => return Err(UpdateParseError("$inc value must be an object".into())),
    };
    for (field, val) in obj {
        let amount = val
            .as_f64()
            .ok_or_else(|| UpdateParseError(format!("$inc value for '{field}' must be numeric")))?;
        ops.push(UpdateOp::Inc { field: field.clone(), amount });
    }
    Ok(())
}

fn parse_pop_fields(value: &Value, ops: &mut Vec<UpdateOp>) -> Result<(), UpdateParseError> {
    let obj = match value {
        Value::Object(obj) => obj,
        _ => return Err(UpdateParseError("$pop value must be an object".into())),
    };
    for (field, val) in obj {
        let end = match val.as_i64() {
            Some(1) => PopEnd::Last,
            Some(-1) => PopEnd::First,
            _ => {
                return Err(UpdateParseError(format!(
                    "$pop value for '{field}' must be 1 or -1"
                )));
            }
        };
        ops.push(UpdateOp::Pop { field: field.clone(), end });
    }
    Ok(())
}
