//! WebSocket transport to a real gateway, via `tokio-tungstenite`.
//!
//! The gateway only accepts clients that offer the `janus-protocol`
//! sub-protocol, so the upgrade request is built by hand to carry the
//! `Sec-WebSocket-Protocol` header.
//!
//! `wss://` connections use rustls.  Gateways on a private network usually
//! serve a self-signed certificate, so [`WebSocketConnector::from_config`]
//! can install a verifier that accepts any certificate chain and host name.
//! Handshake signatures are still checked, so the connection is encrypted
//! to whoever holds the presented key; it is not authenticated.
//! [`WebSocketConnector::new`] verifies against the Mozilla root store.
//!
//! After the upgrade the stream is split: the write half becomes the
//! session's [`FrameSink`], the read half its [`FrameSource`].

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use janus_core::protocol::messages::JANUS_SUBPROTOCOL;
use janus_core::GatewayEndpoint;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{
    connect_async_tls_with_config, Connector as TlsConnector, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::application::error::GatewayError;
use crate::application::ports::{Connector, FrameSink, FrameSource, TransportParts};

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens `ws://` and `wss://` connections to a gateway.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    /// Custom TLS setup; `None` uses tungstenite's webpki-roots default.
    tls: Option<Arc<ClientConfig>>,
}

impl WebSocketConnector {
    /// A connector that verifies server certificates against the Mozilla
    /// root store.
    pub fn new() -> Self {
        Self { tls: None }
    }

    /// A connector for the `[gateway] accept_invalid_certs` setting.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] if rustls cannot build a client
    /// configuration from the ring provider.
    pub fn from_config(accept_invalid_certs: bool) -> Result<Self, GatewayError> {
        if !accept_invalid_certs {
            return Ok(Self::new());
        }
        warn!("gateway TLS certificates will not be verified");
        Ok(Self {
            tls: Some(permissive_tls_config()?),
        })
    }

    /// Whether `wss://` connections skip certificate verification.
    pub fn accepts_invalid_certs(&self) -> bool {
        self.tls.is_some()
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(
        &self,
        endpoint: &GatewayEndpoint,
        secure: bool,
    ) -> Result<TransportParts, GatewayError> {
        let url = endpoint.url(secure);

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| GatewayError::Transport(format!("invalid gateway URL {url}: {e}")))?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(JANUS_SUBPROTOCOL));

        let tls = self.tls.clone().map(TlsConnector::Rustls);
        let (stream, response) = connect_async_tls_with_config(request, None, false, tls)
            .await
            .map_err(|e| GatewayError::Transport(format!("could not open {url}: {e}")))?;
        info!("WebSocket open to {url} (HTTP {})", response.status());

        let (write, read) = stream.split();
        Ok(TransportParts {
            sink: Box::new(WebSocketSink {
                write,
                closed: false,
            }),
            source: Box::new(WebSocketSource { read }),
        })
    }
}

fn permissive_tls_config() -> Result<Arc<ClientConfig>, GatewayError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = AcceptAnyCertificate {
        algorithms: provider.signature_verification_algorithms,
    };
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| GatewayError::Transport(format!("TLS setup failed: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Accepts any certificate chain for any name; handshake signatures are
/// still verified with the provider's algorithms.
#[derive(Debug)]
struct AcceptAnyCertificate {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

struct WebSocketSink {
    write: SplitSink<Stream, Message>,
    closed: bool,
}

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send(&mut self, frame: String) -> Result<(), GatewayError> {
        self.write
            .send(Message::Text(frame))
            .await
            .map_err(|e| GatewayError::Transport(format!("send failed: {e}")))
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.write.close().await {
            debug!("close handshake failed: {e}");
        }
    }
}

struct WebSocketSource {
    read: SplitStream<Stream>,
}

#[async_trait]
impl FrameSource for WebSocketSource {
    async fn next(&mut self) -> Option<Result<String, GatewayError>> {
        loop {
            let message = match self.read.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(GatewayError::Transport(format!("read failed: {e}")))),
            };
            match message {
                Message::Text(text) => return Some(Ok(text)),
                Message::Binary(bytes) => {
                    return Some(String::from_utf8(bytes).map_err(|e| {
                        GatewayError::Transport(format!("binary frame is not UTF-8: {e}"))
                    }))
                }
                Message::Close(frame) => {
                    debug!("gateway sent close: {frame:?}");
                    return None;
                }
                // Pings are answered by tungstenite itself.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }
}
