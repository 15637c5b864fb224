//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path, method)
//!     → router.rs (endpoint lookup, declaration order)
//!     → matcher.rs (host AND path AND method per variant)
//!     → Return: EndpointMatch (name, params, scopes) or no match
//!
//! Route Compilation (at config load):
//!     EndpointConfig[]
//!     → Normalize shapes (path/paths/pathRegex, methods string or list)
//!     → Compile matcher variants
//!     → Freeze as immutable RoutingTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled once per configuration, immutable at runtime
//! - Shapes are normalized at compile time; matching never branches on them
//! - Deterministic: same input always matches same endpoint
//! - First match wins (declaration order, no specificity ranking)

pub mod matcher;
pub mod router;

pub use matcher::PatternError;
pub use router::{EndpointMatch, RoutingTable};
