//! Plain and TLS stream types.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::config::TlsVerification;
use crate::status::Liveness;
use crate::{Error, Result};

/// A connected stream that is either plain TCP or TLS over TCP.
pub enum TransportStream {
    /// Plaintext TCP stream.
    Plain(TcpStream),
    /// TLS overlay on the TCP stream (boxed to reduce enum size).
    Tls(Box<TlsOverlay>),
}

/// TLS session layered over a connected socket.
pub struct TlsOverlay {
    stream: TlsStream<TcpStream>,
    /// Set once a TLS read reports end of stream.
    peer_closed: bool,
}

impl TransportStream {
    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Returns the underlying socket.
    #[must_use]
    pub fn socket(&self) -> &TcpStream {
        match self {
            Self::Plain(tcp) => tcp,
            Self::Tls(overlay) => overlay.stream.get_ref().0,
        }
    }

    /// Establishes TLS over a plaintext stream.
    ///
    /// The socket is consumed by the handshake; on failure it is closed and no
    /// TLS state survives.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SecureUpgrade`] if the handshake fails or the stream
    /// already carries TLS.
    pub async fn upgrade_to_tls(
        self,
        server_name: ServerName<'static>,
        verification: TlsVerification,
    ) -> Result<Self> {
        match self {
            Self::Plain(tcp) => {
                let connector = create_tls_connector(verification);
                let stream = connector
                    .connect(server_name, tcp)
                    .await
                    .map_err(Error::SecureUpgrade)?;
                Ok(Self::Tls(Box::new(TlsOverlay {
                    stream,
                    peer_closed: false,
                })))
            }
            Self::Tls(_) => Err(Error::SecureUpgrade(io::Error::other(
                "stream is already TLS",
            ))),
        }
    }

    /// Probes the TLS layer, if present.
    #[must_use]
    pub fn probe_tls(&self) -> Option<Liveness> {
        match self {
            Self::Plain(_) => None,
            Self::Tls(overlay) if overlay.peer_closed => Some(Liveness::PeerShutdown),
            Self::Tls(overlay) => Some(probe_socket(overlay.stream.get_ref().0)),
        }
    }

    /// Probes the TCP layer.
    #[must_use]
    pub fn probe_tcp(&self) -> Liveness {
        probe_socket(self.socket())
    }

    /// Sends a TLS close_notify and shuts down the write half.
    ///
    /// Plain streams are left untouched; the socket closes on teardown.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the alert could not be written.
    pub async fn shutdown_tls(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(_) => Ok(()),
            Self::Tls(overlay) => overlay.stream.shutdown().await,
        }
    }

    /// Releases the stream: TLS state first, then the socket.
    pub fn teardown(self) {
        match self {
            Self::Plain(tcp) => drop(tcp),
            Self::Tls(overlay) => {
                let (tcp, connection) = overlay.stream.into_inner();
                drop(connection);
                drop(tcp);
            }
        }
    }
}

impl AsyncRead for TransportStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(overlay) => {
                let before = buf.filled().len();
                let wanted = buf.remaining() > 0;
                let poll = Pin::new(&mut overlay.stream).poll_read(cx, buf);
                if wanted && matches!(poll, Poll::Ready(Ok(()))) && buf.filled().len() == before {
                    overlay.peer_closed = true;
                }
                poll
            }
        }
    }
}

impl AsyncWrite for TransportStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(overlay) => Pin::new(&mut overlay.stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(overlay) => Pin::new(&mut overlay.stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(overlay) => Pin::new(&mut overlay.stream).poll_shutdown(cx),
        }
    }
}

/// Peeks one byte without blocking.
///
/// Pending readiness carries no information. End of stream means the peer
/// shut down its side; an error means the connection is gone.
fn probe_socket(tcp: &TcpStream) -> Liveness {
    let mut cx = Context::from_waker(Waker::noop());
    let mut byte = [0u8; 1];
    let mut buf = ReadBuf::new(&mut byte);

    match tcp.poll_peek(&mut cx, &mut buf) {
        Poll::Pending => Liveness::NoNewInfo,
        Poll::Ready(Ok(0)) => Liveness::PeerShutdown,
        Poll::Ready(Ok(_)) => Liveness::Alive,
        Poll::Ready(Err(e)) if e.kind() == io::ErrorKind::WouldBlock => Liveness::NoNewInfo,
        Poll::Ready(Err(_)) => Liveness::Closed,
    }
}

/// Runs an I/O future under an optional timeout.
pub(crate) async fn with_timeout<F, T>(timeout: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Timeout(limit))?
            .map_err(Error::from),
        None => fut.await.map_err(Error::from),
    }
}

/// Creates a TLS connector for the given verification policy.
#[must_use]
pub fn create_tls_connector(verification: TlsVerification) -> TlsConnector {
    let config = match verification {
        TlsVerification::WebPki => {
            let root_store = rustls::RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            };
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth()
        }
        TlsVerification::Insecure => rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier))
            .with_no_client_auth(),
    };

    TlsConnector::from(Arc::new(config))
}

/// A certificate verifier that accepts all certificates.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_create_tls_connectors() {
        let _ = create_tls_connector(TlsVerification::WebPki);
        let _ = create_tls_connector(TlsVerification::Insecure);
    }

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let value = with_timeout(Some(Duration::from_secs(1)), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);

        let err = with_timeout(None, async {
            Err::<(), _>(io::Error::from(io::ErrorKind::ConnectionReset))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn test_plain_stream_probes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let stream = TransportStream::Plain(client.unwrap());
        let _server = accepted.unwrap();

        assert!(!stream.is_tls());
        assert_eq!(stream.probe_tls(), None);
        assert_eq!(stream.probe_tcp(), Liveness::NoNewInfo);
        stream.teardown();
    }
}
