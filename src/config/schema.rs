//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.
//! Endpoints, pipelines and policy references are arrays so that declaration
//! order survives deserialization.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Plain HTTP listener.
    pub http: Option<HttpListenerConfig>,

    /// TLS listener with per-host certificates.
    pub https: Option<HttpsConfig>,

    /// Named upstream services the proxy policy forwards to.
    pub service_endpoints: Vec<ServiceEndpointConfig>,

    /// Endpoint definitions, in match priority order.
    pub api_endpoints: Vec<EndpointConfig>,

    /// Policy names enabled for use in pipelines.
    pub policies: Vec<String>,

    /// Pipeline definitions.
    pub pipelines: Vec<PipelineConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Request limits.
    pub security: SecurityConfig,
}

/// Plain listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for HttpListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// TLS listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpsConfig {
    pub bind_address: String,

    pub max_connections: usize,

    /// Global TLS options; hosts may override individual fields.
    pub options: TlsOptionsConfig,

    /// Certificates selected by SNI hostname.
    pub tls: Vec<TlsHostConfig>,
}

impl Default for HttpsConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8443".to_string(),
            max_connections: 10_000,
            options: TlsOptionsConfig::default(),
            tls: Vec::new(),
        }
    }
}

/// Client certificate handling. `None` inherits the global value.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsOptionsConfig {
    /// Ask clients for a certificate.
    pub request_cert: Option<bool>,

    /// Abort the handshake when the client certificate does not verify.
    pub reject_unauthorized: Option<bool>,
}

/// Certificate material for one SNI hostname.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsHostConfig {
    /// Exact hostname matched against the client's SNI.
    pub host: String,

    /// Path to certificate chain (PEM).
    pub cert: String,

    /// Path to private key (PEM).
    pub key: String,

    /// Trusted CA bundles for client certificates (PEM).
    #[serde(default)]
    pub ca: Vec<String>,

    #[serde(default)]
    pub options: TlsOptionsConfig,
}

/// Upstream service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceEndpointConfig {
    pub name: String,

    /// Base URL, e.g. "http://127.0.0.1:3000".
    pub url: String,
}

/// A value given either as a single item or a list.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    // `Many` first: a derived struct would also accept a sequence.
    Many(Vec<T>),
    One(T),
}

impl<T: Clone> OneOrMany<T> {
    pub fn to_vec(&self) -> Vec<T> {
        match self {
            OneOrMany::One(v) => vec![v.clone()],
            OneOrMany::Many(v) => v.clone(),
        }
    }
}

/// One matcher variant: host AND path AND method.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Exact host, `*`, `*.suffix`, or absent for any host.
    pub host: Option<String>,

    /// Single path pattern (alias of `paths` with one entry).
    pub path: Option<String>,

    /// Path patterns: literal, trailing `/*`, or `:name` segments.
    pub paths: Option<OneOrMany<String>>,

    /// Regex matched against the raw request path.
    pub path_regex: Option<String>,

    /// Comma separated string or list; absent means all methods.
    pub methods: Option<OneOrMany<String>>,

    /// Scopes required when this variant matches.
    pub scopes: Vec<String>,
}

impl MatcherConfig {
    pub fn is_empty(&self) -> bool {
        self.host.is_none()
            && self.path.is_none()
            && self.paths.is_none()
            && self.path_regex.is_none()
            && self.methods.is_none()
            && self.scopes.is_empty()
    }

    /// True when the matcher names a path, a path list or a path regex.
    pub fn has_path(&self) -> bool {
        self.path.is_some() || self.paths.is_some() || self.path_regex.is_some()
    }

    /// Fills unset `host`, `methods` and `scopes` from `defaults`.
    pub fn with_defaults(&self, defaults: &MatcherConfig) -> MatcherConfig {
        MatcherConfig {
            host: self.host.clone().or_else(|| defaults.host.clone()),
            methods: self.methods.clone().or_else(|| defaults.methods.clone()),
            scopes: if self.scopes.is_empty() {
                defaults.scopes.clone()
            } else {
                self.scopes.clone()
            },
            ..self.clone()
        }
    }
}

/// Named endpoint definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    pub name: String,

    /// Top-level matcher. With `variants` present it only becomes a
    /// variant of its own when it names a path; its host, methods and
    /// scopes act as defaults for every variant.
    #[serde(flatten)]
    pub matcher: MatcherConfig,

    /// Additional matcher variants.
    #[serde(default)]
    pub variants: Vec<MatcherConfig>,
}

impl EndpointConfig {
    /// Effective matcher variants in declaration order. An endpoint with no
    /// matcher at all matches every request.
    pub fn matcher_variants(&self) -> Vec<MatcherConfig> {
        if self.variants.is_empty() {
            return vec![self.matcher.clone()];
        }
        let mut out = Vec::with_capacity(self.variants.len() + 1);
        if self.matcher.has_path() {
            out.push(self.matcher.clone());
        }
        out.extend(self.variants.iter().map(|v| v.with_defaults(&self.matcher)));
        out
    }
}

/// Pipeline definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    pub name: String,

    /// Endpoint names served by this pipeline.
    #[serde(alias = "api_endpoint")]
    pub api_endpoints: OneOrMany<String>,

    /// Ordered policy references.
    #[serde(default)]
    pub policies: Vec<PolicyEntry>,
}

/// A policy reference as written in the config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PolicyEntry {
    /// `{ policy = "log", action = {...}, condition = {...} }`
    Reference(PolicyReference),
    /// `{ log = [ { action = {...}, condition = {...} }, ... ] }`
    Compact(BTreeMap<String, OneOrMany<PolicyStepConfig>>),
}

/// Normalized policy reference.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PolicyReference {
    pub policy: String,

    #[serde(default)]
    pub action: Value,

    #[serde(default)]
    pub condition: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyStepConfig {
    pub action: Value,
    pub condition: Option<Value>,
}

impl PipelineConfig {
    /// Flatten both reference shapes into config order.
    ///
    /// Compact entries must name exactly one policy; the offending entry
    /// index is returned otherwise.
    pub fn references(&self) -> Result<Vec<PolicyReference>, usize> {
        let mut out = Vec::new();
        for (index, entry) in self.policies.iter().enumerate() {
            match entry {
                PolicyEntry::Reference(r) => out.push(r.clone()),
                PolicyEntry::Compact(map) => {
                    if map.len() != 1 {
                        return Err(index);
                    }
                    for (policy, steps) in map {
                        for step in steps.to_vec() {
                            out.push(PolicyReference {
                                policy: policy.clone(),
                                action: step.action,
                                condition: step.condition,
                            });
                        }
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Gateway-wide request timeout in seconds; 0 disables it.
    pub request_secs: u64,

    /// Seconds to wait for in-flight connections on shutdown.
    pub shutdown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 0,
            shutdown_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}
