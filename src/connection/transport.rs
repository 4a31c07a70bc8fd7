//! Transport abstraction (plain TCP with one-shot TLS upgrade)

use crate::{Error, Result};
use bytes::BytesMut;
use rustls::ClientConfig;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Byte-stream to the server: plain TCP or TLS-encrypted.
///
/// The TLS upgrade consumes the plain variant — once negotiated, the
/// plaintext socket no longer exists as a separate entity.
#[allow(clippy::large_enum_variant)]
pub enum Transport {
    /// Plain TCP connection
    Plain(TcpStream),
    /// TLS-encrypted TCP connection
    Tls(tokio_rustls::client::TlsStream<TcpStream>),
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Plain(_) => f.write_str("Transport::Plain(TcpStream)"),
            Transport::Tls(_) => f.write_str("Transport::Tls(TlsStream)"),
        }
    }
}

impl Transport {
    /// Open a plain TCP connection
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(Error::TransportOpen)?;
        Ok(Transport::Plain(stream))
    }

    /// Write all bytes to the transport
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        match self {
            Transport::Plain(stream) => stream.write_all(buf).await?,
            Transport::Tls(stream) => stream.write_all(buf).await?,
        }
        Ok(())
    }

    /// Flush the transport
    pub async fn flush(&mut self) -> Result<()> {
        match self {
            Transport::Plain(stream) => stream.flush().await?,
            Transport::Tls(stream) => stream.flush().await?,
        }
        Ok(())
    }

    /// Read available bytes into the buffer, returning the count (0 = EOF)
    pub async fn read_buf(&mut self, buf: &mut BytesMut) -> Result<usize> {
        let n = match self {
            Transport::Plain(stream) => stream.read_buf(buf).await?,
            Transport::Tls(stream) => stream.read_buf(buf).await?,
        };
        Ok(n)
    }

    /// Upgrade a plain transport to TLS after SSLRequest negotiation.
    ///
    /// Consumes `self`; a failed handshake leaves the original socket in an
    /// indeterminate state, so there is no way back to the plain variant.
    /// Certificate rejections surface as [`Error::TlsHandshake`] with
    /// `invalid_certificate` set; transport failures as [`Error::TransportIo`].
    pub async fn upgrade_to_tls(
        self,
        config: Arc<ClientConfig>,
        hostname: &str,
    ) -> Result<Self> {
        match self {
            Transport::Plain(tcp_stream) => {
                let server_name = super::parse_server_name(hostname)?;
                let server_name =
                    rustls_pki_types::ServerName::try_from(server_name).map_err(|_| {
                        Error::Config(format!("invalid hostname for TLS: {}", hostname))
                    })?;

                let connector = tokio_rustls::TlsConnector::from(config);
                match connector.connect(server_name, tcp_stream).await {
                    Ok(tls_stream) => Ok(Transport::Tls(tls_stream)),
                    Err(e) if is_certificate_error(&e) => Err(Error::TlsHandshake {
                        message: format!(
                            "The certificate used to secure the TLS connection is invalid: {}",
                            e
                        ),
                        invalid_certificate: true,
                    }),
                    Err(e) => Err(Error::TransportIo(e)),
                }
            }
            Transport::Tls(_) => Err(Error::Config(
                "transport is already TLS-encrypted".into(),
            )),
        }
    }

    /// Shutdown the transport
    pub async fn shutdown(&mut self) -> Result<()> {
        match self {
            Transport::Plain(stream) => stream.shutdown().await?,
            Transport::Tls(stream) => stream.shutdown().await?,
        }
        Ok(())
    }
}

/// Whether a handshake I/O error wraps a rustls certificate rejection
fn is_certificate_error(e: &std::io::Error) -> bool {
    e.get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        .map(|tls_err| matches!(tls_err, rustls::Error::InvalidCertificate(_)))
        .unwrap_or(false)
}
