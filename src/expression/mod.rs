//! Sandboxed template expressions.
//!
//! # Data Flow
//! ```text
//! "${req.url} ${egContext.req.method}"
//!     → template.rs (split literal text and ${...} segments)
//!     → parser.rs (tokenize, parse into Expr)
//!     → ast.rs (evaluate Expr against Bindings only)
//!     → stringified result, or ExpressionError for the whole template
//! ```
//!
//! # Design Decisions
//! - The grammar has no call, assignment or constructor productions, so
//!   configuration cannot execute code; `a.b(1)` is a syntax error.
//! - Identifiers resolve against the explicit `Bindings` map and nothing else.
//! - A template either renders completely or fails; no partial substitution.

pub mod ast;
pub mod parser;
pub mod template;

use serde_json::Value;
use thiserror::Error;

pub use ast::{BinaryOp, Expr};
pub use template::Template;

/// Allow-list of names visible to expressions.
pub type Bindings = serde_json::Map<String, Value>;

/// Failure to parse or evaluate an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("unterminated expression starting at offset {0}")]
    Unterminated(usize),

    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("function calls are not allowed (offset {0})")]
    CallNotAllowed(usize),

    #[error("identifier `{0}` is not defined")]
    UnknownIdentifier(String),

    #[error("cannot read property `{0}` of null")]
    NullAccess(String),
}

/// A single parsed expression, reusable across requests.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    expr: Expr,
}

impl Expression {
    /// Parse an expression (without the surrounding `${}`).
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        Ok(Self {
            source: source.to_string(),
            expr: parser::parse(source)?,
        })
    }

    /// The original source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate to a JSON value.
    pub fn evaluate(&self, bindings: &Bindings) -> Result<Value, ExpressionError> {
        self.expr.evaluate(bindings)
    }

    /// Evaluate and coerce the result to a boolean.
    pub fn evaluate_bool(&self, bindings: &Bindings) -> Result<bool, ExpressionError> {
        self.evaluate(bindings).map(|v| ast::truthy(&v))
    }
}

/// Render a template string against the given bindings.
///
/// Fails as a whole if any `${}` segment fails to parse or evaluate.
pub fn evaluate(template: &str, bindings: &Bindings) -> Result<String, ExpressionError> {
    Template::parse(template)?.render(bindings)
}

/// Stringify a value the way templates substitute it.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
