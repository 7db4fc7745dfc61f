use serde_json::{Number, Value};

/// A scalar operand: the only shape the compiler can safely bind as a `?`
/// placeholder. Matches the operand types named in the external interface —
/// string, number, boolean, or `null`.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl Scalar {
    /// Convert a JSON value into a `Scalar`, rejecting arrays and objects.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Scalar::Null),
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::Number(n) => Some(Scalar::Number(n.clone())),
            Value::String(s) => Some(Scalar::String(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

/// The operand of a predicate: a single scalar, or a list of scalars (for
/// `$in`/`$nin`).
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Scalar(Scalar),
    List(Vec<Scalar>),
}

impl Operand {
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Operand::Scalar(s) => Some(s),
            Operand::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Scalar]> {
        match self {
            Operand::List(l) => Some(l),
            Operand::Scalar(_) => None,
        }
    }
}
