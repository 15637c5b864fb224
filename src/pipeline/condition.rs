//! Policy conditions.
//!
//! A condition object is compiled once per configuration and evaluated once
//! per request before its step runs. Unknown condition names fail
//! compilation; an expression that cannot be evaluated counts as false.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::config::schema::OneOrMany;
use crate::context::RequestContext;
use crate::expression::Expression;
use crate::routing::matcher::{HostMatcher, MethodMatcher};

/// Condition object as written in the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "name", rename_all = "camelCase")]
pub enum ConditionConfig {
    Always,
    Never,
    AllOf { conditions: Vec<ConditionConfig> },
    OneOf { conditions: Vec<ConditionConfig> },
    Not { condition: Box<ConditionConfig> },
    PathExact { path: String },
    PathMatch { pattern: String },
    Method { methods: OneOrMany<String> },
    HostMatch { pattern: String },
    Expression { expression: String },
    Authenticated,
    Anonymous,
}

/// Compiled predicate over the request context.
#[derive(Debug, Clone)]
pub enum Condition {
    Always,
    Never,
    AllOf(Vec<Condition>),
    OneOf(Vec<Condition>),
    Not(Box<Condition>),
    PathExact(String),
    PathMatch(Regex),
    Method(MethodMatcher),
    HostMatch(HostMatcher),
    Expression(Expression),
    Authenticated,
    Anonymous,
}

impl Condition {
    /// Compile a raw condition object. Errors are human readable.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let config: ConditionConfig = serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
        Self::compile(&config)
    }

    pub fn compile(config: &ConditionConfig) -> Result<Self, String> {
        let compile_all = |list: &[ConditionConfig]| list.iter().map(Self::compile).collect::<Result<Vec<_>, _>>();

        Ok(match config {
            ConditionConfig::Always => Self::Always,
            ConditionConfig::Never => Self::Never,
            ConditionConfig::AllOf { conditions } => Self::AllOf(compile_all(conditions)?),
            ConditionConfig::OneOf { conditions } => Self::OneOf(compile_all(conditions)?),
            ConditionConfig::Not { condition } => Self::Not(Box::new(Self::compile(condition)?)),
            ConditionConfig::PathExact { path } => Self::PathExact(path.clone()),
            ConditionConfig::PathMatch { pattern } => {
                Self::PathMatch(Regex::new(pattern).map_err(|e| e.to_string())?)
            }
            ConditionConfig::Method { methods } => match MethodMatcher::parse(&methods.to_vec()) {
                Ok(MethodMatcher::Any) => return Err("method condition needs at least one method".into()),
                Ok(matcher) => Self::Method(matcher),
                Err(e) => return Err(e.to_string()),
            },
            ConditionConfig::HostMatch { pattern } => {
                Self::HostMatch(HostMatcher::parse(Some(pattern.as_str())).map_err(|e| e.to_string())?)
            }
            ConditionConfig::Expression { expression } => {
                Self::Expression(Expression::parse(expression).map_err(|e| e.to_string())?)
            }
            ConditionConfig::Authenticated => Self::Authenticated,
            ConditionConfig::Anonymous => Self::Anonymous,
        })
    }

    pub fn evaluate(&self, ctx: &RequestContext) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::AllOf(list) => list.iter().all(|c| c.evaluate(ctx)),
            Self::OneOf(list) => list.iter().any(|c| c.evaluate(ctx)),
            Self::Not(inner) => !inner.evaluate(ctx),
            Self::PathExact(path) => ctx.path() == path,
            Self::PathMatch(re) => re.is_match(ctx.path()),
            Self::Method(methods) => methods.matches(ctx.method()),
            Self::HostMatch(host) => host.matches(ctx.host().as_deref()),
            Self::Expression(expr) => match ctx.evaluate_condition(expr) {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(
                        request_id = %ctx.request_id(),
                        api_endpoint = %ctx.api_endpoint(),
                        expression = %expr.source(),
                        error = %e,
                        "Condition expression failed; treating as false"
                    );
                    false
                }
            },
            Self::Authenticated => ctx.consumer().is_some(),
            Self::Anonymous => ctx.consumer().is_none(),
        }
    }
}
