//! Expression tree and evaluation.

use serde_json::Value;

use super::{Bindings, ExpressionError};

/// Restricted expression grammar: literals, binding lookups, property
/// access and a handful of boolean operators.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Identifier(String),
    Member { object: Box<Expr>, property: String },
    Index { object: Box<Expr>, index: Box<Expr> },
    Not(Box<Expr>),
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    And,
    Or,
}

impl Expr {
    pub fn evaluate(&self, bindings: &Bindings) -> Result<Value, ExpressionError> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Identifier(name) => bindings
                .get(name)
                .cloned()
                .ok_or_else(|| ExpressionError::UnknownIdentifier(name.clone())),
            Expr::Member { object, property } => {
                let target = object.evaluate(bindings)?;
                read_property(&target, property)
            }
            Expr::Index { object, index } => {
                let target = object.evaluate(bindings)?;
                match index.evaluate(bindings)? {
                    Value::Number(n) => match (&target, n.as_u64()) {
                        (Value::Array(items), Some(i)) => {
                            Ok(items.get(i as usize).cloned().unwrap_or(Value::Null))
                        }
                        _ => read_property(&target, &n.to_string()),
                    },
                    Value::String(key) => read_property(&target, &key),
                    other => read_property(&target, &super::stringify(&other)),
                }
            }
            Expr::Not(inner) => Ok(Value::Bool(!truthy(&inner.evaluate(bindings)?))),
            Expr::Binary { op, left, right } => {
                let lhs = left.evaluate(bindings)?;
                match op {
                    BinaryOp::And if !truthy(&lhs) => Ok(lhs),
                    BinaryOp::Or if truthy(&lhs) => Ok(lhs),
                    BinaryOp::And | BinaryOp::Or => right.evaluate(bindings),
                    BinaryOp::Eq => Ok(Value::Bool(lhs == right.evaluate(bindings)?)),
                    BinaryOp::Ne => Ok(Value::Bool(lhs != right.evaluate(bindings)?)),
                }
            }
        }
    }
}

fn read_property(target: &Value, property: &str) -> Result<Value, ExpressionError> {
    match target {
        Value::Null => Err(ExpressionError::NullAccess(property.to_string())),
        Value::Object(map) => Ok(map.get(property).cloned().unwrap_or(Value::Null)),
        Value::Array(items) if property == "length" => Ok(Value::from(items.len())),
        Value::String(s) if property == "length" => Ok(Value::from(s.chars().count())),
        _ => Ok(Value::Null),
    }
}

/// Truthiness used by `!`, `&&`, `||` and boolean conditions.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
