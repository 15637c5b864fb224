//! Built-in policies.
//!
//! | name         | action                                              |
//! |--------------|-----------------------------------------------------|
//! | `terminate`  | `status_code`, `message`                            |
//! | `log`        | `message` (template), `level`                       |
//! | `headers`    | `request_headers_prefix`, `forward_headers`         |
//! | `proxy`      | `service_endpoint`, `strip_path`, `change_origin`   |
//! | `basic-auth` | `passthrough`                                       |
//! | `key-auth`   | `header`, `header_scheme`, `query_param`, ...       |
//!
//! The auth policies are only registered when a credential service is
//! supplied (see [`PolicyRegistry::with_credentials`]).

pub mod auth;
pub mod headers;
pub mod log;
pub mod proxy;
pub mod terminate;

use crate::pipeline::registry::PolicyRegistry;

/// Register the policies that need no collaborators.
pub fn register(registry: &mut PolicyRegistry) {
    registry
        .register("terminate", terminate::build)
        .register("log", log::build)
        .register("headers", headers::build)
        .register("proxy", proxy::ProxyFactory::new());
}
