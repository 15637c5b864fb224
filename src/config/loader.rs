//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};
use crate::pipeline::PolicyError;
use crate::routing::matcher::PatternError;
use crate::tls::TlsError;

/// Error type for loading and compiling configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("api endpoint `{endpoint}`: {source}")]
    Pattern {
        endpoint: String,
        #[source]
        source: PatternError,
    },

    #[error("pipeline `{pipeline}`: unknown policy `{policy}`")]
    UnknownPolicy { pipeline: String, policy: String },

    #[error("pipeline `{pipeline}`: policy `{policy}`: {source}")]
    Policy {
        pipeline: String,
        policy: String,
        #[source]
        source: PolicyError,
    },

    #[error("pipeline `{pipeline}`: condition on `{policy}`: {message}")]
    Condition {
        pipeline: String,
        policy: String,
        message: String,
    },

    #[error("pipeline `{pipeline}`: policy entry {index} must name exactly one policy")]
    MalformedPolicyEntry { pipeline: String, index: usize },

    #[error(transparent)]
    Tls(#[from] TlsError),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// `.json` files are JSON; everything else is TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str, format: ConfigFormat) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = match format {
        ConfigFormat::Toml => toml::from_str(content)?,
        ConfigFormat::Json => serde_json::from_str(content)?,
    };

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load and validate configuration from a file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content, ConfigFormat::from_path(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn format_by_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.json")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("a.JSON")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("a.toml")), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("gateway")), ConfigFormat::Toml);
    }

    #[test]
    fn loads_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{
                "http": {{ "bind_address": "127.0.0.1:0" }},
                "api_endpoints": [{{ "name": "api", "paths": ["/a", "/b/*"] }}],
                "pipelines": [{{ "name": "p", "api_endpoints": "api", "policies": [] }}]
            }}"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.api_endpoints[0].name, "api");
        assert_eq!(config.pipelines[0].api_endpoints.to_vec(), vec!["api"]);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config(Path::new("/nonexistent/gateway.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/gateway.toml"));
    }

    #[test]
    fn empty_config_has_no_listener() {
        let err = parse_config("", ConfigFormat::Toml).unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors, vec![ValidationError::NoListener]),
            other => panic!("unexpected error: {other}"),
        }
    }
}
