//! Compiled policy chain.
//!
//! # Responsibilities
//! - Resolve every policy reference against the registry at compile time
//! - Run steps strictly in config order, skipping those whose condition is false
//! - Stop at the first terminal response or failure
//!
//! # Design Decisions
//! - Explicit loop over steps; no implicit next() chaining
//! - A panicking step fails only its own request
//! - Once the context holds a response, no later step runs

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;

use crate::config::schema::{GatewayConfig, PipelineConfig};
use crate::config::ConfigError;
use crate::context::RequestContext;
use crate::pipeline::condition::Condition;
use crate::pipeline::policy::{Policy, PolicyError, StepOutcome};
use crate::pipeline::registry::PolicyRegistry;

/// One executable step.
#[derive(Debug, Clone)]
pub struct PolicyStep {
    policy_name: String,
    condition: Option<Condition>,
    policy: Arc<dyn Policy>,
}

impl PolicyStep {
    pub fn new(policy_name: impl Into<String>, condition: Option<Condition>, policy: Arc<dyn Policy>) -> Self {
        Self {
            policy_name: policy_name.into(),
            condition,
            policy,
        }
    }

    pub fn policy_name(&self) -> &str {
        &self.policy_name
    }
}

/// How the chain ended.
#[derive(Debug)]
pub enum ChainOutcome {
    /// A step produced the response; it is stored in the context.
    Responded,
    /// Every step continued without responding.
    Exhausted,
    /// A step failed or panicked.
    Failed { policy: String, error: PolicyError },
}

/// Ordered steps of one pipeline.
#[derive(Debug, Clone)]
pub struct PolicyChain {
    pipeline: String,
    steps: Vec<PolicyStep>,
}

impl PolicyChain {
    pub fn new(pipeline: impl Into<String>, steps: Vec<PolicyStep>) -> Self {
        Self {
            pipeline: pipeline.into(),
            steps,
        }
    }

    /// Compile a pipeline definition. Unknown policies, bad conditions and
    /// rejected action parameters are configuration errors.
    pub fn compose(
        definition: &PipelineConfig,
        registry: &PolicyRegistry,
        config: &GatewayConfig,
    ) -> Result<Self, ConfigError> {
        let references = definition
            .references()
            .map_err(|index| ConfigError::MalformedPolicyEntry {
                pipeline: definition.name.clone(),
                index,
            })?;

        let mut steps = Vec::with_capacity(references.len());
        for reference in references {
            let factory = registry
                .get(&reference.policy)
                .ok_or_else(|| ConfigError::UnknownPolicy {
                    pipeline: definition.name.clone(),
                    policy: reference.policy.clone(),
                })?;

            let condition = reference
                .condition
                .as_ref()
                .map(Condition::from_value)
                .transpose()
                .map_err(|message| ConfigError::Condition {
                    pipeline: definition.name.clone(),
                    policy: reference.policy.clone(),
                    message,
                })?;

            let policy = factory
                .build(&reference.action, config)
                .map_err(|source| ConfigError::Policy {
                    pipeline: definition.name.clone(),
                    policy: reference.policy.clone(),
                    source,
                })?;

            steps.push(PolicyStep::new(reference.policy, condition, policy));
        }

        Ok(Self::new(definition.name.clone(), steps))
    }

    pub fn name(&self) -> &str {
        &self.pipeline
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn policy_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(PolicyStep::policy_name)
    }

    /// Drive the steps for one request.
    pub async fn execute(&self, ctx: &mut RequestContext) -> ChainOutcome {
        for step in &self.steps {
            if let Some(condition) = &step.condition {
                if !condition.evaluate(ctx) {
                    tracing::trace!(
                        request_id = %ctx.request_id(),
                        pipeline = %self.pipeline,
                        policy = %step.policy_name,
                        "Condition false; skipping policy"
                    );
                    continue;
                }
            }

            let outcome = AssertUnwindSafe(step.policy.execute(ctx)).catch_unwind().await;

            match outcome {
                Ok(StepOutcome::Continue) => {
                    if ctx.has_responded() {
                        return ChainOutcome::Responded;
                    }
                }
                Ok(StepOutcome::Terminate(response)) => {
                    ctx.respond(response);
                    return ChainOutcome::Responded;
                }
                Ok(StepOutcome::Fail(error)) => {
                    return ChainOutcome::Failed {
                        policy: step.policy_name.clone(),
                        error,
                    };
                }
                Err(panic) => {
                    return ChainOutcome::Failed {
                        policy: step.policy_name.clone(),
                        error: PolicyError::Panicked(panic_message(panic.as_ref())),
                    };
                }
            }
        }
        ChainOutcome::Exhausted
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
