//! Route matching logic.
//!
//! # Responsibilities
//! - Match host (exact, `*`, `*.suffix`, or any when undefined)
//! - Match path patterns (exact, trailing wildcard, named segments, regex)
//! - Match methods (case-insensitive set, empty = all)
//! - Combine the three with AND semantics per matcher variant
//!
//! # Design Decisions
//! - Host matching is case-insensitive (RFC 9110)
//! - Path matching is case-sensitive
//! - A single trailing slash is ignored on both pattern and request
//! - Patterns are compiled once; no shape branching at match time

use axum::http::Method;
use regex::Regex;
use thiserror::Error;

use crate::config::schema::MatcherConfig;

/// Malformed endpoint matcher.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("path `{0}` must start with `/`")]
    MissingLeadingSlash(String),

    #[error("path `{0}` contains an empty segment")]
    EmptySegment(String),

    #[error("path `{0}`: `*` is only allowed as the last segment")]
    MisplacedWildcard(String),

    #[error("path `{0}`: invalid parameter name `{1}`")]
    InvalidParam(String, String),

    #[error("path `{0}`: duplicate parameter `{1}`")]
    DuplicateParam(String, String),

    #[error("invalid path regex `{0}`: {1}")]
    Regex(String, #[source] regex::Error),

    #[error("invalid method `{0}`")]
    Method(String),

    #[error("invalid host pattern `{0}`")]
    Host(String),
}

/// Captured named segments plus the trailing wildcard remainder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathMatch {
    pub params: Vec<(String, String)>,
    pub wildcard: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
}

/// Compiled path pattern.
#[derive(Debug, Clone)]
pub enum PathPattern {
    Segments {
        segments: Vec<Segment>,
        wildcard: bool,
    },
    Regex(Regex),
}

impl PathPattern {
    /// Compile a literal / wildcard / named-segment pattern.
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        if pattern == "*" {
            return Ok(Self::match_all());
        }
        let body = pattern
            .strip_prefix('/')
            .ok_or_else(|| PatternError::MissingLeadingSlash(pattern.to_string()))?;

        let (body, wildcard) = if body == "*" {
            ("", true)
        } else if let Some(prefix) = body.strip_suffix("/*") {
            (prefix, true)
        } else {
            (body.strip_suffix('/').unwrap_or(body), false)
        };

        let mut segments = Vec::new();
        if !body.is_empty() {
            for raw in body.split('/') {
                if raw.is_empty() {
                    return Err(PatternError::EmptySegment(pattern.to_string()));
                }
                if raw.contains('*') {
                    return Err(PatternError::MisplacedWildcard(pattern.to_string()));
                }
                if let Some(name) = raw.strip_prefix(':') {
                    let valid = !name.is_empty()
                        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
                    if !valid {
                        return Err(PatternError::InvalidParam(
                            pattern.to_string(),
                            name.to_string(),
                        ));
                    }
                    if segments.contains(&Segment::Param(name.to_string())) {
                        return Err(PatternError::DuplicateParam(
                            pattern.to_string(),
                            name.to_string(),
                        ));
                    }
                    segments.push(Segment::Param(name.to_string()));
                } else {
                    segments.push(Segment::Literal(raw.to_string()));
                }
            }
        }

        Ok(Self::Segments { segments, wildcard })
    }

    /// Compile a regex matched against the raw path. Anchoring is up to
    /// the author.
    pub fn regex(source: &str) -> Result<Self, PatternError> {
        Regex::new(source)
            .map(Self::Regex)
            .map_err(|e| PatternError::Regex(source.to_string(), e))
    }

    /// Matches every path.
    pub fn match_all() -> Self {
        Self::Segments {
            segments: Vec::new(),
            wildcard: true,
        }
    }

    pub fn matches(&self, path: &str) -> Option<PathMatch> {
        match self {
            Self::Regex(re) => re.is_match(path).then(PathMatch::default),
            Self::Segments { segments, wildcard } => {
                let parts = split_path(path);
                let fits = if *wildcard {
                    parts.len() >= segments.len()
                } else {
                    parts.len() == segments.len()
                };
                if !fits {
                    return None;
                }

                let mut params = Vec::new();
                for (segment, part) in segments.iter().zip(&parts) {
                    match segment {
                        Segment::Literal(lit) if lit == part => {}
                        Segment::Param(name) if !part.is_empty() => {
                            params.push((name.clone(), (*part).to_string()));
                        }
                        _ => return None,
                    }
                }

                let wildcard = wildcard.then(|| parts[segments.len()..].join("/"));
                Some(PathMatch { params, wildcard })
            }
        }
    }
}

/// Split a request path into segments, ignoring the leading slash and a
/// single trailing slash.
fn split_path(path: &str) -> Vec<&str> {
    let path = path.strip_prefix('/').unwrap_or(path);
    let path = path.strip_suffix('/').unwrap_or(path);
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('/').collect()
    }
}

/// Host condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostMatcher {
    Any,
    Exact(String),
    /// `*.example.com`; stores ".example.com".
    Subdomain(String),
}

impl HostMatcher {
    pub fn parse(host: Option<&str>) -> Result<Self, PatternError> {
        let Some(host) = host.map(str::trim) else {
            return Ok(Self::Any);
        };
        if host == "*" {
            return Ok(Self::Any);
        }
        if let Some(suffix) = host.strip_prefix("*.") {
            if suffix.is_empty() || suffix.contains('*') {
                return Err(PatternError::Host(host.to_string()));
            }
            return Ok(Self::Subdomain(format!(".{}", suffix.to_ascii_lowercase())));
        }
        if host.is_empty() || host.contains('*') {
            return Err(PatternError::Host(host.to_string()));
        }
        Ok(Self::Exact(host.to_ascii_lowercase()))
    }

    /// `host` must already be normalized (lowercase, no port).
    pub fn matches(&self, host: Option<&str>) -> bool {
        match (self, host) {
            (Self::Any, _) => true,
            (Self::Exact(expected), Some(h)) => h == expected,
            (Self::Subdomain(suffix), Some(h)) => h.len() > suffix.len() && h.ends_with(suffix.as_str()),
            (_, None) => false,
        }
    }
}

/// Method condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodMatcher {
    Any,
    Only(Vec<Method>),
}

impl MethodMatcher {
    /// Accepts entries that are themselves comma separated.
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self, PatternError> {
        let mut methods = Vec::new();
        for entry in entries {
            for name in entry.as_ref().split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let method = Method::from_bytes(name.to_ascii_uppercase().as_bytes())
                    .map_err(|_| PatternError::Method(name.to_string()))?;
                if !methods.contains(&method) {
                    methods.push(method);
                }
            }
        }
        Ok(if methods.is_empty() {
            Self::Any
        } else {
            Self::Only(methods)
        })
    }

    pub fn matches(&self, method: &Method) -> bool {
        match self {
            Self::Any => true,
            Self::Only(methods) => methods.contains(method),
        }
    }
}

/// One normalized matcher variant of an endpoint.
#[derive(Debug, Clone)]
pub struct MatcherVariant {
    host: HostMatcher,
    paths: Vec<PathPattern>,
    methods: MethodMatcher,
    scopes: Vec<String>,
}

impl MatcherVariant {
    /// Normalize one config variant. `path`, `paths` and `path_regex` are
    /// all accepted; none of them means any path.
    pub fn compile(config: &MatcherConfig) -> Result<Self, PatternError> {
        let mut paths = Vec::new();
        if let Some(path) = &config.path {
            paths.push(PathPattern::compile(path)?);
        }
        if let Some(list) = &config.paths {
            for path in list.to_vec() {
                paths.push(PathPattern::compile(&path)?);
            }
        }
        if let Some(re) = &config.path_regex {
            paths.push(PathPattern::regex(re)?);
        }
        if paths.is_empty() {
            paths.push(PathPattern::match_all());
        }

        let methods = match &config.methods {
            Some(list) => MethodMatcher::parse(&list.to_vec())?,
            None => MethodMatcher::Any,
        };

        Ok(Self {
            host: HostMatcher::parse(config.host.as_deref())?,
            paths,
            methods,
            scopes: config.scopes.clone(),
        })
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn matches(&self, host: Option<&str>, path: &str, method: &Method) -> Option<PathMatch> {
        if !self.host.matches(host) || !self.methods.matches(method) {
            return None;
        }
        self.paths.iter().find_map(|p| p.matches(path))
    }
}
