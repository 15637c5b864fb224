//! Handshake driver that picks the certificate from the ClientHello.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::server::TlsStream;
use tokio_rustls::LazyConfigAcceptor;

use crate::observability::metrics;
use crate::tls::{SniResolver, TlsError, TlsSession};

/// Read the ClientHello, select the host binding by SNI and finish the
/// handshake with it.
///
/// A missing or unknown server name returns an error before any
/// certificate is sent; dropping the stream then resets the connection.
pub async fn accept<IO>(resolver: &SniResolver, stream: IO) -> Result<(TlsStream<IO>, TlsSession), TlsError>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let start = LazyConfigAcceptor::new(rustls::server::Acceptor::default(), stream)
        .await
        .map_err(TlsError::Handshake)?;

    let Some(sni) = start.client_hello().server_name().map(str::to_ascii_lowercase) else {
        metrics::record_tls_refused("missing_sni");
        return Err(TlsError::MissingSni);
    };
    let Some(binding) = resolver.resolve_certificate(&sni) else {
        metrics::record_tls_refused("unknown_sni");
        return Err(TlsError::NoCertificate(sni));
    };

    let stream = start
        .into_stream(binding.server_config())
        .await
        .map_err(TlsError::Handshake)?;

    let authorized = stream
        .get_ref()
        .1
        .peer_certificates()
        .map(|chain| binding.authorize_peer(chain))
        .unwrap_or(false);

    Ok((stream, TlsSession { sni, authorized }))
}
