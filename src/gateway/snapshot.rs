//! Immutable compiled configuration.
//!
//! # Responsibilities
//! - Bind endpoints to pipelines (first pipeline in declaration order wins)
//! - Compile the routing table from bound endpoints only
//! - Compose every pipeline's policy chain
//! - Load the SNI table for the https listener

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::Method;

use crate::config::schema::GatewayConfig;
use crate::config::validation::validate_config;
use crate::config::ConfigError;
use crate::context::RouteInfo;
use crate::pipeline::{PolicyChain, PolicyRegistry};
use crate::routing::router::CompiledEndpoint;
use crate::routing::RoutingTable;
use crate::tls::SniResolver;

/// One consistent view of the gateway. In-flight requests keep the
/// snapshot they started with.
#[derive(Debug)]
pub struct GatewaySnapshot {
    version: u64,
    config: Arc<GatewayConfig>,
    routes: RoutingTable,
    pipelines: Vec<PolicyChain>,
    /// Endpoint name → index into `pipelines`.
    endpoint_pipelines: HashMap<String, usize>,
    sni: SniResolver,
}

impl GatewaySnapshot {
    /// Validate and compile. Any error leaves the caller's current
    /// snapshot untouched.
    pub fn compile(config: GatewayConfig, registry: &PolicyRegistry, version: u64) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let mut endpoint_pipelines: HashMap<String, usize> = HashMap::new();
        for (index, pipeline) in config.pipelines.iter().enumerate() {
            for endpoint in pipeline.api_endpoints.to_vec() {
                if let Some(&first) = endpoint_pipelines.get(&endpoint) {
                    tracing::warn!(
                        api_endpoint = %endpoint,
                        pipeline = %pipeline.name,
                        serving_pipeline = %config.pipelines[first].name,
                        "Endpoint already bound to an earlier pipeline; ignoring binding"
                    );
                    continue;
                }
                endpoint_pipelines.insert(endpoint, index);
            }
        }

        for endpoint in &config.api_endpoints {
            if !endpoint_pipelines.contains_key(&endpoint.name) {
                CompiledEndpoint::compile(endpoint).map_err(|source| ConfigError::Pattern {
                    endpoint: endpoint.name.clone(),
                    source,
                })?;
                tracing::debug!(api_endpoint = %endpoint.name, "Endpoint has no pipeline; not routed");
            }
        }

        let routes = RoutingTable::compile(
            config
                .api_endpoints
                .iter()
                .filter(|e| endpoint_pipelines.contains_key(&e.name)),
        )
        .map_err(|(endpoint, source)| ConfigError::Pattern { endpoint, source })?;

        let pipelines = config
            .pipelines
            .iter()
            .map(|p| PolicyChain::compose(p, registry, &config))
            .collect::<Result<Vec<_>, _>>()?;

        let sni = match &config.https {
            Some(https) => SniResolver::from_config(https)?,
            None => SniResolver::default(),
        };

        tracing::debug!(
            version,
            endpoints = routes.len(),
            pipelines = pipelines.len(),
            tls_hosts = sni.len(),
            "Configuration compiled"
        );

        Ok(Self {
            version,
            config: Arc::new(config),
            routes,
            pipelines,
            endpoint_pipelines,
            sni,
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    pub fn sni(&self) -> &SniResolver {
        &self.sni
    }

    pub fn pipeline(&self, name: &str) -> Option<&PolicyChain> {
        self.pipelines.iter().find(|p| p.name() == name)
    }

    /// Endpoint and pipeline for a request, or `None` for a routing miss.
    pub fn resolve(&self, host: Option<&str>, path: &str, method: &Method) -> Option<(RouteInfo, &PolicyChain)> {
        let found = self.routes.resolve(host, path, method)?;
        let chain = self
            .endpoint_pipelines
            .get(found.endpoint)
            .and_then(|&index| self.pipelines.get(index))?;
        let route = RouteInfo {
            api_endpoint: found.endpoint.to_string(),
            pipeline: chain.name().to_string(),
            params: found.params,
            scopes: found.scopes.to_vec(),
            wildcard: found.wildcard,
        };
        Some((route, chain))
    }
}
