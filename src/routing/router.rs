//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled endpoints in declaration order
//! - Look up the endpoint for (host, path, method)
//! - Return the match with bound parameters, or an explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - First endpoint in declaration order wins; no specificity ranking
//! - O(n) scan over variants (acceptable for typical endpoint counts)

use axum::http::Method;

use crate::config::schema::EndpointConfig;
use crate::routing::matcher::{MatcherVariant, PatternError};

/// Endpoint ready for matching.
#[derive(Debug, Clone)]
pub struct CompiledEndpoint {
    name: String,
    variants: Vec<MatcherVariant>,
}

impl CompiledEndpoint {
    pub fn compile(config: &EndpointConfig) -> Result<Self, PatternError> {
        let variants = config
            .matcher_variants()
            .iter()
            .map(MatcherVariant::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: config.name.clone(),
            variants,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Result of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointMatch<'a> {
    /// Position of the endpoint in the table.
    pub index: usize,
    pub endpoint: &'a str,
    pub params: Vec<(String, String)>,
    pub scopes: &'a [String],
    pub wildcard: Option<String>,
}

/// Immutable routing table.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    endpoints: Vec<CompiledEndpoint>,
}

impl RoutingTable {
    /// Compile endpoints, keeping their order. Errors name the endpoint.
    pub fn compile<'a, I>(endpoints: I) -> Result<Self, (String, PatternError)>
    where
        I: IntoIterator<Item = &'a EndpointConfig>,
    {
        let endpoints = endpoints
            .into_iter()
            .map(|e| CompiledEndpoint::compile(e).map_err(|err| (e.name.clone(), err)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { endpoints })
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn endpoints(&self) -> &[CompiledEndpoint] {
        &self.endpoints
    }

    /// Find the first endpoint with a satisfied matcher variant.
    ///
    /// `host` must be normalized (lowercase, no port).
    pub fn resolve(&self, host: Option<&str>, path: &str, method: &Method) -> Option<EndpointMatch<'_>> {
        self.endpoints.iter().enumerate().find_map(|(index, endpoint)| {
            endpoint.variants.iter().find_map(|variant| {
                variant.matches(host, path, method).map(|m| EndpointMatch {
                    index,
                    endpoint: &endpoint.name,
                    params: m.params,
                    scopes: variant.scopes(),
                    wildcard: m.wildcard,
                })
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::GatewayConfig;

    fn table(toml_src: &str) -> RoutingTable {
        let config: GatewayConfig = toml::from_str(toml_src).unwrap();
        RoutingTable::compile(&config.api_endpoints).unwrap()
    }

    #[test]
    fn multi_variant_endpoint_with_methods() {
        let t = table(
            r#"
            [[api_endpoints]]
            name = "api"
            [[api_endpoints.variants]]
            path_regex = "/wild-cats$"
            methods = "POST,PUT"
            [[api_endpoints.variants]]
            path = "/admin"
            methods = ["PUT"]
            "#,
        );

        assert!(t.resolve(None, "/wild-cats", &Method::POST).is_some());
        assert!(t.resolve(None, "/wild-cats", &Method::PUT).is_some());
        assert!(t.resolve(None, "/wild-cats", &Method::GET).is_none());
        assert!(t.resolve(None, "/wild-cats2", &Method::POST).is_none());
        assert!(t.resolve(None, "/admin", &Method::PUT).is_some());
        assert!(t.resolve(None, "/admin", &Method::POST).is_none());
        assert!(t.resolve(None, "/admin", &Method::GET).is_none());
        assert!(t.resolve(None, "/admin/new", &Method::PUT).is_none());
    }

    #[test]
    fn first_declared_endpoint_wins() {
        let t = table(
            r#"
            [[api_endpoints]]
            name = "general"
            paths = "/api/*"

            [[api_endpoints]]
            name = "specific"
            paths = "/api/users/:id"
            "#,
        );
        let m = t.resolve(None, "/api/users/7", &Method::GET).unwrap();
        assert_eq!(m.endpoint, "general");
        assert_eq!(m.index, 0);
        assert_eq!(m.wildcard.as_deref(), Some("users/7"));
    }

    #[test]
    fn host_specific_endpoints() {
        let t = table(
            r#"
            [[api_endpoints]]
            name = "example"
            host = "example.com"
            paths = "/admin"

            [[api_endpoints]]
            name = "fallback"
            paths = "/admin"
            scopes = ["admin"]
            "#,
        );
        assert_eq!(
            t.resolve(Some("example.com"), "/admin", &Method::GET).unwrap().endpoint,
            "example"
        );
        let m = t.resolve(Some("other.com"), "/admin/", &Method::GET).unwrap();
        assert_eq!(m.endpoint, "fallback");
        assert_eq!(m.scopes, ["admin".to_string()]);
        assert!(t.resolve(Some("other.com"), "/student", &Method::GET).is_none());
    }

    #[test]
    fn top_level_scopes_apply_to_variants_only() {
        let t = table(
            r#"
            [[api_endpoints]]
            name = "admin"
            scopes = ["admin"]
            [[api_endpoints.variants]]
            path = "/admin"
            "#,
        );
        assert!(t.resolve(None, "/totally/unrelated", &Method::GET).is_none());
        let m = t.resolve(None, "/admin", &Method::GET).unwrap();
        assert_eq!(m.endpoint, "admin");
        assert_eq!(m.scopes, ["admin".to_string()]);
    }

    #[test]
    fn top_level_methods_restrict_variants() {
        let t = table(
            r#"
            [[api_endpoints]]
            name = "orders"
            methods = "POST"
            [[api_endpoints.variants]]
            path = "/orders"
            [[api_endpoints.variants]]
            path = "/orders/:id"
            methods = "PUT"
            "#,
        );
        assert!(t.resolve(None, "/anything", &Method::POST).is_none());
        assert!(t.resolve(None, "/orders", &Method::POST).is_some());
        assert!(t.resolve(None, "/orders", &Method::GET).is_none());
        assert!(t.resolve(None, "/orders/7", &Method::PUT).is_some());
        assert!(t.resolve(None, "/orders/7", &Method::POST).is_none());
    }

    #[test]
    fn top_level_path_is_its_own_variant() {
        let t = table(
            r#"
            [[api_endpoints]]
            name = "docs"
            host = "docs.example.com"
            paths = "/guide/*"
            [[api_endpoints.variants]]
            path = "/reference"
            "#,
        );
        assert!(t.resolve(Some("docs.example.com"), "/guide/intro", &Method::GET).is_some());
        assert!(t.resolve(Some("docs.example.com"), "/reference", &Method::GET).is_some());
        assert!(t.resolve(Some("other.com"), "/reference", &Method::GET).is_none());
        assert!(t.resolve(Some("docs.example.com"), "/elsewhere", &Method::GET).is_none());
    }

    #[test]
    fn malformed_pattern_names_endpoint() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [[api_endpoints]]
            name = "broken"
            paths = "no-slash"
            "#,
        )
        .unwrap();
        let (name, err) = RoutingTable::compile(&config.api_endpoints).unwrap_err();
        assert_eq!(name, "broken");
        assert!(matches!(err, PatternError::MissingLeadingSlash(_)));
    }
}
