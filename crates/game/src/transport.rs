//! Secure, connection-oriented transport adapter: a thin QUIC wrapper exposing
//! the reliable-ordered-stream-per-connection model this crate's wire format
//! assumes (see DESIGN.md).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use quinn::{ClientConfig, Connection as QuinnConnection, Endpoint, ServerConfig};
use thiserror::Error;

/// ALPN identifying this protocol; peers negotiating anything else are rejected
/// during the QUIC handshake.
pub const ALPN: &[u8] = b"physx-quic";

const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid bind address: {0}")]
    InvalidAddress(String),
    #[error("tls configuration error: {0}")]
    Tls(String),
    #[error("endpoint error: {0}")]
    Endpoint(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("stream error: {0}")]
    Stream(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Server-side QUIC listener bound to one UDP socket.
pub struct Listener {
    endpoint: Endpoint,
}

impl Listener {
    /// Bind with a PEM cert/key pair, or fall back to a self-signed certificate
    /// (logged at warn level; for local testing only).
    pub fn bind(
        addr: &str,
        cert_path: Option<&str>,
        key_path: Option<&str>,
    ) -> Result<Self, TransportError> {
        let socket_addr: SocketAddr = addr
            .parse()
            .map_err(|e| TransportError::InvalidAddress(format!("{addr}: {e}")))?;

        let server_config = match (cert_path, key_path) {
            (Some(cert), Some(key)) => load_tls_config(cert, key)?,
            _ => self_signed_config()?,
        };

        let endpoint = Endpoint::server(server_config, socket_addr)
            .map_err(|e| TransportError::Endpoint(e.to_string()))?;

        log::info!("physx-quic transport listening on {socket_addr}");
        Ok(Self { endpoint })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.endpoint
            .local_addr()
            .map_err(|e| TransportError::Endpoint(e.to_string()))
    }

    /// Accept the next incoming connection and its one bidirectional stream.
    pub async fn accept(&self) -> Result<Connection, TransportError> {
        let incoming = self
            .endpoint
            .accept()
            .await
            .ok_or_else(|| TransportError::Endpoint("endpoint closed".into()))?;

        let quinn_conn = incoming
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let (send, recv) = quinn_conn
            .accept_bi()
            .await
            .map_err(|e| TransportError::Stream(e.to_string()))?;

        Ok(Connection {
            inner: quinn_conn,
            send: Arc::new(tokio::sync::Mutex::new(send)),
            recv: Arc::new(tokio::sync::Mutex::new(recv)),
        })
    }
}

/// Client-side QUIC endpoint. `verify_peer = false` accepts any server
/// certificate (development only); production clients MUST set it `true`
/// with the server's CA trusted in the OS store or an explicit pinned root.
pub struct Client;

impl Client {
    pub async fn connect(
        host: &str,
        port: u16,
        verify_peer: bool,
    ) -> Result<Connection, TransportError> {
        let addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| TransportError::InvalidAddress(e.to_string()))?;

        let mut endpoint = Endpoint::client("0.0.0.0:0".parse().unwrap())
            .map_err(|e| TransportError::Endpoint(e.to_string()))?;
        endpoint.set_default_client_config(client_config(verify_peer)?);

        let quinn_conn = endpoint
            .connect(addr, host)
            .map_err(|e| TransportError::Connection(e.to_string()))?
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let (send, recv) = quinn_conn
            .open_bi()
            .await
            .map_err(|e| TransportError::Stream(e.to_string()))?;

        Ok(Connection {
            inner: quinn_conn,
            send: Arc::new(tokio::sync::Mutex::new(send)),
            recv: Arc::new(tokio::sync::Mutex::new(recv)),
        })
    }
}

/// One peer connection: a QUIC connection plus its single bidirectional
/// stream, shared cheaply across tasks via `Arc`.
#[derive(Clone)]
pub struct Connection {
    inner: QuinnConnection,
    send: Arc<tokio::sync::Mutex<quinn::SendStream>>,
    recv: Arc<tokio::sync::Mutex<quinn::RecvStream>>,
}

impl Connection {
    pub fn remote_addr(&self) -> SocketAddr {
        self.inner.remote_address()
    }

    pub fn state(&self) -> ConnectionState {
        if self.inner.close_reason().is_some() {
            ConnectionState::Closed
        } else {
            ConnectionState::Open
        }
    }

    /// Send an already-framed buffer (header + payload). Broadcasts share one
    /// `Bytes` across connections; cloning it is a refcount bump, not a copy.
    pub async fn send(&self, framed: bytes::Bytes) -> Result<(), TransportError> {
        let mut send = self.send.lock().await;
        send.write_all(&framed)
            .await
            .map_err(|e| TransportError::Stream(e.to_string()))
    }

    /// Read whatever bytes are currently available into `buf`, returning the
    /// number read (0 on stream end). Feeds directly into a [`crate::wire::Framer`].
    pub async fn recv(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut recv = self.recv.lock().await;
        match recv.read(buf).await {
            Ok(Some(n)) => Ok(n),
            Ok(None) => Ok(0),
            Err(e) => Err(TransportError::Stream(e.to_string())),
        }
    }

    pub fn disconnect(&self) {
        self.inner.close(0u32.into(), b"disconnect");
    }
}

fn load_tls_config(cert_path: &str, key_path: &str) -> Result<ServerConfig, TransportError> {
    let cert_pem = std::fs::read(cert_path)
        .map_err(|e| TransportError::Tls(format!("read cert '{cert_path}': {e}")))?;
    let key_pem = std::fs::read(key_path)
        .map_err(|e| TransportError::Tls(format!("read key '{key_path}': {e}")))?;

    let certs = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TransportError::Tls(e.to_string()))?;
    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| TransportError::Tls(e.to_string()))?
        .ok_or_else(|| TransportError::Tls("no private key found".into()))?;

    let mut tls = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| TransportError::Tls(e.to_string()))?;
    tls.alpn_protocols = vec![ALPN.to_vec()];

    build_server_config(tls)
}

fn self_signed_config() -> Result<ServerConfig, TransportError> {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .map_err(|e| TransportError::Tls(e.to_string()))?;

    let cert_der = cert.cert.der().clone();
    let key_der = rustls::pki_types::PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());

    let mut tls = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der], key_der.into())
        .map_err(|e| TransportError::Tls(e.to_string()))?;
    tls.alpn_protocols = vec![ALPN.to_vec()];

    log::warn!("physx-quic: using a self-signed certificate, not for production use");
    build_server_config(tls)
}

fn build_server_config(mut tls: rustls::ServerConfig) -> Result<ServerConfig, TransportError> {
    tls.max_early_data_size = u32::MAX; // enable 0-RTT
    let quic_crypto = quinn::crypto::rustls::QuicServerConfig::try_from(tls)
        .map_err(|e| TransportError::Tls(e.to_string()))?;
    let mut server_config = ServerConfig::with_crypto(Arc::new(quic_crypto));
    let mut transport = quinn::TransportConfig::default();
    transport.max_idle_timeout(Some(IDLE_TIMEOUT.try_into().unwrap()));
    server_config.transport_config(Arc::new(transport));
    Ok(server_config)
}

fn client_config(verify_peer: bool) -> Result<ClientConfig, TransportError> {
    let mut tls = if verify_peer {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots_or_empty());
        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth()
    } else {
        rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
            .with_no_client_auth()
    };
    tls.alpn_protocols = vec![ALPN.to_vec()];

    let quic_crypto = quinn::crypto::rustls::QuicClientConfig::try_from(tls)
        .map_err(|e| TransportError::Tls(e.to_string()))?;
    let mut config = ClientConfig::new(Arc::new(quic_crypto));
    let mut transport = quinn::TransportConfig::default();
    transport.max_idle_timeout(Some(IDLE_TIMEOUT.try_into().unwrap()));
    config.transport_config(Arc::new(transport));
    Ok(config)
}

/// No bundled CA store is vendored; callers that want peer verification supply
/// their own root store (e.g. via a pinned server certificate) in a future
/// revision. Returns an empty iterator so `verify_peer = true` fails closed
/// rather than silently trusting nothing-in-particular.
fn webpki_roots_or_empty() -> Vec<rustls::pki_types::CertificateDer<'static>> {
    Vec::new()
}

/// Accepts any certificate. Development/testing only — see [`Client::connect`].
#[derive(Debug)]
struct AcceptAnyCert;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listener_binds_with_self_signed_cert() {
        let listener = Listener::bind("127.0.0.1:0", None, None).unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn listener_rejects_bad_address() {
        let result = Listener::bind("not-an-address", None, None);
        assert!(result.is_err());
    }
}
