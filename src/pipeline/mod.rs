//! Policy pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! PipelineConfig (apiEndpoints, policies[])
//!     → registry.rs (policy name → factory)
//!     → factory.build(action, config) per step
//!     → condition.rs (compile optional step condition)
//!     → chain.rs (ordered PolicyChain, frozen in the snapshot)
//!
//! Per request:
//!     RequestContext
//!     → chain.execute (step by step, condition gated)
//!     → ChainOutcome::{Responded, Exhausted, Failed}
//! ```
//!
//! # Design Decisions
//! - Policies are trait objects behind `Arc`; one instance serves every request
//! - Each step reports its outcome explicitly instead of calling `next()`
//! - Unknown policy names and bad parameters are config errors, never runtime ones
//! - Authentication delegates credential lookup to a `CredentialService`

pub mod builtin;
pub mod chain;
pub mod condition;
pub mod credentials;
pub mod policy;
pub mod registry;

pub use chain::{ChainOutcome, PolicyChain, PolicyStep};
pub use condition::Condition;
pub use credentials::{CredentialKind, CredentialService, Identity};
pub use policy::{Policy, PolicyError, PolicyFactory, StepOutcome};
pub use registry::PolicyRegistry;
