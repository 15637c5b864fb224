//! Policy factory registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::pipeline::builtin;
use crate::pipeline::credentials::CredentialService;
use crate::pipeline::policy::PolicyFactory;

/// Maps policy type names to their factories.
#[derive(Clone, Default)]
pub struct PolicyRegistry {
    factories: HashMap<String, Arc<dyn PolicyFactory>>,
}

impl PolicyRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `terminate`, `log`, `headers` and `proxy`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register(&mut registry);
        registry
    }

    /// Add `basic-auth` and `key-auth` backed by `service`.
    pub fn with_credentials(mut self, service: Arc<dyn CredentialService>) -> Self {
        builtin::auth::register(&mut self, service);
        self
    }

    /// Register (or replace) a factory.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: PolicyFactory + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn PolicyFactory>> {
        self.factories.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyRegistry")
            .field("policies", &self.names())
            .finish()
    }
}
