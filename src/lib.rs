//! Policy gateway library.

// Core subsystems
pub mod config;
pub mod context;
pub mod expression;
pub mod gateway;
pub mod pipeline;
pub mod routing;
pub mod tls;

// Transport
pub mod http;
pub mod net;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use config::schema::GatewayConfig;
pub use error::GatewayError;
pub use gateway::Gateway;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pipeline::PolicyRegistry;
