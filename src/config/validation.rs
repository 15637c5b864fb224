//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (pipelines reference existing endpoints,
//!   enabled policies and service endpoints)
//! - Reject duplicate names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Pattern and policy compilation happen later, against the registry

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::GatewayConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no listener configured; add an [http] or [https] section")]
    NoListener,

    #[error("invalid bind address `{0}`")]
    InvalidBindAddress(String),

    #[error("duplicate api endpoint `{0}`")]
    DuplicateEndpoint(String),

    #[error("duplicate pipeline `{0}`")]
    DuplicatePipeline(String),

    #[error("duplicate service endpoint `{0}`")]
    DuplicateServiceEndpoint(String),

    #[error("duplicate TLS host `{0}`")]
    DuplicateTlsHost(String),

    #[error("pipeline `{pipeline}` references unknown api endpoint `{endpoint}`")]
    UnknownEndpoint { pipeline: String, endpoint: String },

    #[error("pipeline `{pipeline}` policy entry {index} must name exactly one policy")]
    MalformedPolicyEntry { pipeline: String, index: usize },

    #[error("pipeline `{pipeline}` uses policy `{policy}` which is not enabled in `policies`")]
    PolicyNotEnabled { pipeline: String, policy: String },

    #[error("pipeline `{pipeline}` proxies to unknown service endpoint `{service}`")]
    UnknownServiceEndpoint { pipeline: String, service: String },
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.http.is_none() && config.https.is_none() {
        errors.push(ValidationError::NoListener);
    }
    let addresses = config
        .http
        .iter()
        .map(|h| &h.bind_address)
        .chain(config.https.iter().map(|h| &h.bind_address));
    for address in addresses {
        if address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidBindAddress(address.clone()));
        }
    }

    let endpoints = unique(
        config.api_endpoints.iter().map(|e| e.name.as_str()),
        ValidationError::DuplicateEndpoint,
        &mut errors,
    );
    unique(
        config.pipelines.iter().map(|p| p.name.as_str()),
        ValidationError::DuplicatePipeline,
        &mut errors,
    );
    let services = unique(
        config.service_endpoints.iter().map(|s| s.name.as_str()),
        ValidationError::DuplicateServiceEndpoint,
        &mut errors,
    );
    if let Some(https) = &config.https {
        // Server names are looked up case-insensitively.
        let hosts: Vec<String> = https.tls.iter().map(|t| t.host.to_ascii_lowercase()).collect();
        unique(
            hosts.iter().map(String::as_str),
            ValidationError::DuplicateTlsHost,
            &mut errors,
        );
    }

    let enabled: HashSet<&str> = config.policies.iter().map(String::as_str).collect();

    for pipeline in &config.pipelines {
        for endpoint in pipeline.api_endpoints.to_vec() {
            if !endpoints.contains(endpoint.as_str()) {
                errors.push(ValidationError::UnknownEndpoint {
                    pipeline: pipeline.name.clone(),
                    endpoint,
                });
            }
        }

        let references = match pipeline.references() {
            Ok(references) => references,
            Err(index) => {
                errors.push(ValidationError::MalformedPolicyEntry {
                    pipeline: pipeline.name.clone(),
                    index,
                });
                continue;
            }
        };

        for reference in references {
            if !enabled.contains(reference.policy.as_str()) {
                errors.push(ValidationError::PolicyNotEnabled {
                    pipeline: pipeline.name.clone(),
                    policy: reference.policy.clone(),
                });
            }
            if reference.policy == "proxy" {
                if let Some(service) = reference.action.get("service_endpoint").and_then(|v| v.as_str()) {
                    if !services.contains(service) {
                        errors.push(ValidationError::UnknownServiceEndpoint {
                            pipeline: pipeline.name.clone(),
                            service: service.to_string(),
                        });
                    }
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Collect names, reporting each duplicate once.
fn unique<'a, F>(
    names: impl Iterator<Item = &'a str>,
    duplicate: F,
    errors: &mut Vec<ValidationError>,
) -> HashSet<&'a str>
where
    F: Fn(String) -> ValidationError,
{
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    for name in names {
        if !seen.insert(name) && reported.insert(name) {
            errors.push(duplicate(name.to_string()));
        }
    }
    seen
}
