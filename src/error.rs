//! Error types for pglink

use crate::protocol::ErrorFields;

/// Convenience result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by connection establishment and session operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to open the TCP connection to the server.
    #[error("could not open connection: {0}")]
    TransportOpen(#[source] std::io::Error),

    /// Read or write failure on an established transport.
    #[error("transport error: {0}")]
    TransportIo(#[from] std::io::Error),

    /// The server's reply to SSLRequest was not 'S' or 'N', or the exchange
    /// could not be completed. Typically means the peer is not PostgreSQL.
    #[error("Could not check if server accepts SSL connections: {0}")]
    TlsAvailability(String),

    /// TLS handshake failed after the server accepted SSLRequest.
    #[error("{message}")]
    TlsHandshake {
        /// Human-readable failure description
        message: String,
        /// True when the server certificate was rejected (untrusted, expired,
        /// wrong hostname), false for refusals and other negotiation failures
        invalid_certificate: bool,
    },

    /// Server-sent ErrorResponse with structured fields.
    #[error("{0}")]
    Postgres(ErrorFields),

    /// Protocol violation during authentication (bad SCRAM nonce, invalid
    /// server signature, unexpected message) or missing credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The server requested an authentication method this client does not
    /// implement.
    #[error("unsupported authentication method requested by server: {0}")]
    UnsupportedAuthentication(u32),

    /// The backend terminated the session while an operation was in flight.
    #[error("The session was terminated by the database")]
    SessionTerminated,

    /// An operation was invoked on a client whose connection is gone and
    /// whose reconnection budget is exhausted.
    #[error("The client has been disconnected from the database")]
    Disconnected,

    /// Wire-protocol violation outside authentication.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the connect retry loop may try again after this error.
    ///
    /// Only transport-level failures qualify; server verdicts (auth failure,
    /// unknown database, certificate rejection) are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::TransportOpen(_) | Error::TransportIo(_) | Error::TlsAvailability(_)
        )
    }

    /// Whether this error means the connection is no longer usable.
    ///
    /// True for transport failures observed mid-operation and for the
    /// backend's administrative termination (FATAL, SQLSTATE 57P01). Higher
    /// layers use this to trigger [`Client::handle_unexpected_disconnect`].
    ///
    /// [`Client::handle_unexpected_disconnect`]: crate::Client::handle_unexpected_disconnect
    pub fn is_connection_lost(&self) -> bool {
        match self {
            Error::TransportIo(_) | Error::SessionTerminated => true,
            Error::Postgres(fields) => {
                fields.severity.as_deref() == Some("FATAL")
                    && fields.code.as_deref() == Some("57P01")
            }
            _ => false,
        }
    }
}
