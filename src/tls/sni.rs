//! SNI hostname → certificate table.
//!
//! # Responsibilities
//! - Load PEM certificate chains, keys and client CA bundles
//! - Merge per-host options over the global options
//! - Build one rustls `ServerConfig` per host
//! - Answer `resolve_certificate(name)` with an exact, case-insensitive lookup

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::HandshakeSignatureValid;
use rustls::crypto::{self, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::server::WebPkiClientVerifier;
use rustls::{CertificateError, DigitallySignedStruct, DistinguishedName, RootCertStore, ServerConfig, SignatureScheme};

use crate::config::schema::{HttpsConfig, TlsHostConfig, TlsOptionsConfig};
use crate::tls::TlsError;

/// Effective client-certificate options for one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsOptions {
    pub request_cert: bool,
    pub reject_unauthorized: bool,
}

impl TlsOptions {
    /// Host values win; unset values fall back to the global ones.
    pub fn merge(global: &TlsOptionsConfig, host: &TlsOptionsConfig) -> Self {
        Self {
            request_cert: host.request_cert.or(global.request_cert).unwrap_or(false),
            reject_unauthorized: host
                .reject_unauthorized
                .or(global.reject_unauthorized)
                .unwrap_or(true),
        }
    }
}

/// Everything needed to finish a handshake for one hostname.
#[derive(Debug)]
pub struct HostBinding {
    host: String,
    options: TlsOptions,
    server_config: Arc<ServerConfig>,
    /// Present when the host trusts at least one client CA.
    client_roots: Option<Arc<dyn ClientCertVerifier>>,
}

impl HostBinding {
    fn load(config: &TlsHostConfig, global: &TlsOptionsConfig, provider: &Arc<CryptoProvider>) -> Result<Self, TlsError> {
        let host = config.host.to_ascii_lowercase();
        let options = TlsOptions::merge(global, &config.options);
        let certs = load_certs(Path::new(&config.cert))?;
        let key = load_key(Path::new(&config.key))?;

        let client_roots = if config.ca.is_empty() {
            None
        } else {
            let mut roots = RootCertStore::empty();
            for path in &config.ca {
                for cert in load_certs(Path::new(path))? {
                    roots.add(cert).map_err(|source| TlsError::Rustls {
                        host: host.clone(),
                        source,
                    })?;
                }
            }
            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::clone(provider))
                .allow_unauthenticated()
                .build()
                .map_err(|source| TlsError::ClientCa {
                    host: host.clone(),
                    source,
                })?;
            Some(verifier)
        };

        let builder = ServerConfig::builder_with_provider(Arc::clone(provider))
            .with_safe_default_protocol_versions()
            .map_err(|source| TlsError::Rustls {
                host: host.clone(),
                source,
            })?;
        let builder = if options.request_cert {
            builder.with_client_cert_verifier(Arc::new(PeerVerifier {
                roots: client_roots.clone(),
                provider: Arc::clone(provider),
                reject_unauthorized: options.reject_unauthorized,
            }))
        } else {
            builder.with_no_client_auth()
        };
        let mut server_config = builder
            .with_single_cert(certs, key)
            .map_err(|source| TlsError::Rustls {
                host: host.clone(),
                source,
            })?;
        server_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

        Ok(Self {
            host,
            options,
            server_config: Arc::new(server_config),
            client_roots,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn options(&self) -> TlsOptions {
        self.options
    }

    pub fn server_config(&self) -> Arc<ServerConfig> {
        Arc::clone(&self.server_config)
    }

    /// Whether the presented chain verifies against this host's client CAs.
    pub fn authorize_peer(&self, chain: &[CertificateDer<'_>]) -> bool {
        let (Some(roots), Some((end_entity, intermediates))) = (&self.client_roots, chain.split_first()) else {
            return false;
        };
        roots
            .verify_client_cert(end_entity, intermediates, UnixTime::now())
            .is_ok()
    }
}

/// Immutable SNI lookup table.
#[derive(Debug, Clone, Default)]
pub struct SniResolver {
    hosts: HashMap<String, Arc<HostBinding>>,
}

impl SniResolver {
    pub fn from_config(config: &HttpsConfig) -> Result<Self, TlsError> {
        let provider = Arc::new(crypto::ring::default_provider());
        let mut hosts = HashMap::with_capacity(config.tls.len());
        for host in &config.tls {
            let binding = HostBinding::load(host, &config.options, &provider)?;
            tracing::debug!(
                sni = %binding.host,
                request_cert = binding.options.request_cert,
                reject_unauthorized = binding.options.reject_unauthorized,
                client_ca = binding.client_roots.is_some(),
                "TLS host loaded"
            );
            hosts.insert(binding.host.clone(), Arc::new(binding));
        }
        Ok(Self { hosts })
    }

    /// Exact hostname lookup. `None` means the handshake must be refused.
    pub fn resolve_certificate(&self, server_name: &str) -> Option<Arc<HostBinding>> {
        self.hosts.get(&server_name.to_ascii_lowercase()).cloned()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Configured hostnames, sorted.
    pub fn hosts(&self) -> Vec<&str> {
        let mut hosts: Vec<&str> = self.hosts.keys().map(String::as_str).collect();
        hosts.sort_unstable();
        hosts
    }
}

/// Requests a client certificate and lets unverified ones through unless
/// `reject_unauthorized` is set.
#[derive(Debug)]
struct PeerVerifier {
    roots: Option<Arc<dyn ClientCertVerifier>>,
    provider: Arc<CryptoProvider>,
    reject_unauthorized: bool,
}

impl ClientCertVerifier for PeerVerifier {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        self.reject_unauthorized
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        match &self.roots {
            Some(roots) => roots.root_hint_subjects(),
            None => &[],
        }
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        let verified = match &self.roots {
            Some(roots) => roots.verify_client_cert(end_entity, intermediates, now),
            None => Err(rustls::Error::InvalidCertificate(CertificateError::UnknownIssuer)),
        };
        match verified {
            Err(e) if self.reject_unauthorized => Err(e),
            _ => Ok(ClientCertVerified::assertion()),
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}
