//! Credential service seam used by the authentication policies.
//!
//! Credential storage and password hashing live outside the gateway; a
//! deployment supplies an implementation when it builds the registry.

use std::fmt;

use async_trait::async_trait;

use crate::context::Consumer;
use crate::pipeline::PolicyError;

/// Credential type presented by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    BasicAuth,
    KeyAuth,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::BasicAuth => "basic-auth",
            CredentialKind::KeyAuth => "key-auth",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated principal with the scopes its credential grants.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub consumer: Consumer,
    pub scopes: Vec<String>,
}

#[async_trait]
pub trait CredentialService: Send + Sync + fmt::Debug {
    /// `Ok(None)` means the credential is unknown or the secret is wrong.
    async fn authenticate(
        &self,
        id: &str,
        secret: &str,
        kind: CredentialKind,
    ) -> Result<Option<Identity>, PolicyError>;

    /// Whether the identity holds every required scope.
    async fn authorize(
        &self,
        identity: &Identity,
        _kind: CredentialKind,
        required_scopes: &[String],
    ) -> Result<bool, PolicyError> {
        Ok(required_scopes.iter().all(|s| identity.scopes.contains(s)))
    }
}
