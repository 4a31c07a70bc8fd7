//! Core connection type
//!
//! A [`Connection`] owns the transport and drives the handshake from TLS
//! negotiation through ReadyForQuery, accumulating the backend identity
//! (pid, secret key, server parameters) along the way.

use super::state::ConnectionState;
use super::transport::Transport;
use crate::auth::{self, ScramClient};
use crate::options::ConnectionOptions;
use crate::protocol::constants::{PROTOCOL_VERSION, SCRAM_SHA_256};
use crate::protocol::{
    decode_message, encode_message, AuthenticationMessage, BackendMessage, FrontendMessage,
};
use crate::session::{Session, TransactionStatus};
use crate::{Error, Result};
use bytes::{Buf, BytesMut};
use std::collections::HashMap;
use tracing::Instrument;

/// A single PostgreSQL connection
pub struct Connection {
    transport: Option<Transport>,
    state: ConnectionState,
    read_buf: BytesMut,
    tls_active: bool,
    process_id: Option<u32>,
    secret_key: Option<u32>,
    server_params: HashMap<String, String>,
    transaction_status: TransactionStatus,
    negotiated_minor: Option<u32>,
}

impl Connection {
    /// Create a connection over an open transport
    pub fn new(transport: Transport) -> Self {
        Self {
            transport: Some(transport),
            state: ConnectionState::Disconnected,
            read_buf: BytesMut::with_capacity(8192),
            tls_active: false,
            process_id: None,
            secret_key: None,
            server_params: HashMap::new(),
            transaction_status: TransactionStatus::Idle,
            negotiated_minor: None,
        }
    }

    /// Open a transport and run the full handshake to ReadyForQuery.
    ///
    /// When TLS is enabled but the server's certificate is rejected and the
    /// policy does not enforce TLS, a fresh plaintext connection is opened —
    /// the half-handshaken socket is never reused.
    pub async fn establish(options: &ConnectionOptions) -> Result<Self> {
        async {
            let transport = Transport::connect(&options.host, options.port).await?;
            let mut conn = Connection::new(transport);

            if options.tls.enabled {
                match conn.negotiate_tls(options).await {
                    Ok(()) => {}
                    Err(Error::TlsHandshake {
                        invalid_certificate: true,
                        ..
                    }) if !options.tls.enforce => {
                        tracing::debug!(
                            "server certificate rejected, reconnecting in plaintext"
                        );
                        let transport = Transport::connect(&options.host, options.port).await?;
                        conn = Connection::new(transport);
                    }
                    Err(e) => return Err(e),
                }
            }

            conn.startup(options).await?;
            Ok(conn)
        }
        .instrument(tracing::info_span!(
            "connect",
            host = %options.host,
            port = options.port,
            user = %options.user
        ))
        .await
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the transport is TLS-encrypted
    pub fn tls_active(&self) -> bool {
        self.tls_active
    }

    /// Minor protocol version from NegotiateProtocolVersion, if the server
    /// sent one
    pub fn negotiated_minor(&self) -> Option<u32> {
        self.negotiated_minor
    }

    /// Snapshot of the backend identity accumulated so far
    pub fn session_snapshot(&self) -> Session {
        Session {
            pid: self.process_id,
            secret_key: self.secret_key,
            tls: Some(self.tls_active),
            server_params: self.server_params.clone(),
            transaction_status: self.transaction_status,
        }
    }

    /// Negotiate TLS via the SSLRequest protocol.
    ///
    /// Sends the 8-byte SSLRequest and reads the server's single-byte reply.
    /// 'S' upgrades the transport; 'N' is accepted in plaintext unless the
    /// policy enforces TLS; anything else means the peer is not speaking the
    /// PostgreSQL protocol.
    async fn negotiate_tls(&mut self, options: &ConnectionOptions) -> Result<()> {
        self.state.transition(ConnectionState::Negotiating)?;

        let response = self.exchange_ssl_request().await?;

        match response {
            b'S' => {
                tracing::debug!("server accepted TLS, upgrading connection");
                let config = super::tls::client_config(&options.tls)?;
                let transport = self
                    .transport
                    .take()
                    .ok_or_else(|| Error::Protocol("transport missing during TLS upgrade".into()))?;
                let upgraded = transport.upgrade_to_tls(config, &options.host).await?;
                self.transport = Some(upgraded);
                self.tls_active = true;
                tracing::info!("TLS connection established");
                Ok(())
            }
            b'N' => {
                if options.tls.enforce {
                    Err(Error::TlsHandshake {
                        message: "server does not accept TLS connections".into(),
                        invalid_certificate: false,
                    })
                } else {
                    tracing::debug!("server refused TLS, continuing in plaintext");
                    self.tls_active = false;
                    Ok(())
                }
            }
            other => Err(Error::TlsAvailability(format!(
                "unexpected response byte 0x{:02X}",
                other
            ))),
        }
    }

    /// Send SSLRequest and read the one-byte verdict.
    ///
    /// Every failure in this exchange, including EOF, is reported as a TLS
    /// availability error: a peer that cannot answer SSLRequest is not a
    /// PostgreSQL server.
    async fn exchange_ssl_request(&mut self) -> Result<u8> {
        match self.ssl_request_roundtrip().await {
            Err(Error::TransportIo(e)) => Err(Error::TlsAvailability(e.to_string())),
            other => other,
        }
    }

    async fn ssl_request_roundtrip(&mut self) -> Result<u8> {
        let buf = encode_message(&FrontendMessage::SslRequest);
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| Error::Protocol("transport missing".into()))?;

        transport.write_all(&buf).await?;
        transport.flush().await?;

        let n = transport.read_buf(&mut self.read_buf).await?;
        if n == 0 {
            return Err(Error::TlsAvailability(
                "server closed the connection".into(),
            ));
        }
        let response = self.read_buf[0];
        self.read_buf.advance(1);
        Ok(response)
    }

    /// Send the startup message and drive authentication to ReadyForQuery
    async fn startup(&mut self, options: &ConnectionOptions) -> Result<()> {
        async {
            self.state.transition(ConnectionState::Starting)?;

            let mut params = vec![
                ("user".to_string(), options.user.clone()),
                ("database".to_string(), options.database_name().to_string()),
            ];
            if let Some(app_name) = &options.application_name {
                params.push(("application_name".to_string(), app_name.clone()));
            }
            for (k, v) in &options.runtime_params {
                params.push((k.clone(), v.clone()));
            }

            self.send_message(&FrontendMessage::Startup {
                version: PROTOCOL_VERSION,
                params,
            })
            .await?;

            loop {
                let msg = self.receive_message().await?;

                match msg {
                    BackendMessage::Authentication(auth_msg) => {
                        if self.state == ConnectionState::Starting {
                            self.state.transition(ConnectionState::Authenticating)?;
                        }
                        self.handle_authentication(auth_msg, options).await?;
                    }
                    BackendMessage::BackendKeyData {
                        process_id,
                        secret_key,
                    } => {
                        self.process_id = Some(process_id);
                        self.secret_key = Some(secret_key);
                    }
                    BackendMessage::ParameterStatus { name, value } => {
                        tracing::debug!("parameter status: {} = {}", name, value);
                        self.server_params.insert(name, value);
                    }
                    BackendMessage::NoticeResponse(notice) => {
                        tracing::debug!("notice during startup: {}", notice);
                    }
                    BackendMessage::NegotiateProtocolVersion {
                        newest_minor,
                        unsupported_options,
                    } => {
                        tracing::debug!(
                            newest_minor,
                            ?unsupported_options,
                            "server negotiated protocol version"
                        );
                        self.negotiated_minor = Some(newest_minor);
                    }
                    BackendMessage::ReadyForQuery { status } => {
                        self.apply_transaction_status(status)?;
                        self.state.transition(ConnectionState::Ready)?;
                        tracing::info!(pid = ?self.process_id, "startup complete");
                        return Ok(());
                    }
                    BackendMessage::ErrorResponse(fields) => {
                        return Err(Error::Postgres(fields));
                    }
                    other => {
                        return Err(Error::Protocol(format!(
                            "unexpected message during startup: {:?}",
                            other
                        )));
                    }
                }
            }
        }
        .instrument(tracing::info_span!(
            "startup",
            user = %options.user,
            database = %options.database_name()
        ))
        .await
    }

    /// Answer one authentication request
    async fn handle_authentication(
        &mut self,
        auth_msg: AuthenticationMessage,
        options: &ConnectionOptions,
    ) -> Result<()> {
        match auth_msg {
            AuthenticationMessage::Ok => {
                tracing::debug!("authentication successful");
                self.state.transition(ConnectionState::WaitingReady)?;
                Ok(())
            }
            AuthenticationMessage::CleartextPassword => {
                let password = require_password(options)?;
                self.send_message(&FrontendMessage::Password(password)).await
            }
            AuthenticationMessage::Md5Password { salt } => {
                let password = require_password(options)?;
                let digest = auth::md5_response(&options.user, &password, &salt);
                self.send_message(&FrontendMessage::Password(digest)).await
            }
            AuthenticationMessage::Sasl { mechanisms } => {
                self.handle_sasl(&mechanisms, options).await
            }
            AuthenticationMessage::SaslContinue { .. } | AuthenticationMessage::SaslFinal { .. } => {
                Err(Error::Authentication(
                    "unexpected SASL message outside of a SASL exchange".into(),
                ))
            }
            AuthenticationMessage::Unsupported(code) => {
                Err(Error::UnsupportedAuthentication(code))
            }
        }
    }

    /// Run the SCRAM-SHA-256 exchange to completion
    async fn handle_sasl(
        &mut self,
        mechanisms: &[String],
        options: &ConnectionOptions,
    ) -> Result<()> {
        if !mechanisms.iter().any(|m| m == SCRAM_SHA_256) {
            return Err(Error::Authentication(format!(
                "server does not support {}. Available: {}",
                SCRAM_SHA_256,
                mechanisms.join(", ")
            )));
        }

        let password = require_password(options)?;
        let mut scram = ScramClient::new(password);
        tracing::debug!("initiating SCRAM-SHA-256 authentication");

        let client_first = scram.client_first();
        self.send_message(&FrontendMessage::SaslInitialResponse {
            mechanism: SCRAM_SHA_256.to_string(),
            data: client_first.into_bytes(),
        })
        .await?;

        let server_first = match self.receive_message().await? {
            BackendMessage::Authentication(AuthenticationMessage::SaslContinue { data }) => {
                String::from_utf8(data).map_err(|e| {
                    Error::Authentication(format!("invalid UTF-8 in server first message: {}", e))
                })?
            }
            BackendMessage::ErrorResponse(fields) => return Err(Error::Postgres(fields)),
            other => {
                return Err(Error::Authentication(format!(
                    "expected SASL continuation, got {:?}",
                    other
                )));
            }
        };

        let (client_final, scram_state) = scram
            .client_final(&server_first)
            .map_err(|e| Error::Authentication(e.to_string()))?;

        self.send_message(&FrontendMessage::SaslResponse {
            data: client_final.into_bytes(),
        })
        .await?;

        let server_final = match self.receive_message().await? {
            BackendMessage::Authentication(AuthenticationMessage::SaslFinal { data }) => {
                String::from_utf8(data).map_err(|e| {
                    Error::Authentication(format!("invalid UTF-8 in server final message: {}", e))
                })?
            }
            BackendMessage::ErrorResponse(fields) => return Err(Error::Postgres(fields)),
            other => {
                return Err(Error::Authentication(format!(
                    "expected SASL final message, got {:?}",
                    other
                )));
            }
        };

        scram
            .verify_server_final(&server_final, &scram_state)
            .map_err(|e| Error::Authentication(e.to_string()))?;

        tracing::debug!("SCRAM-SHA-256 authentication successful");
        Ok(())
    }

    /// Execute a simple query and collect backend messages up to ReadyForQuery.
    ///
    /// A FATAL error response returns immediately — the backend closes the
    /// connection without a ReadyForQuery after one. Non-fatal errors are
    /// surfaced after the ReadyForQuery that follows them.
    pub async fn simple_query(&mut self, query: &str) -> Result<Vec<BackendMessage>> {
        if self.state != ConnectionState::Ready {
            return Err(Error::Protocol(format!(
                "connection is not ready (state: {})",
                self.state
            )));
        }

        self.send_message(&FrontendMessage::Query(query.to_string()))
            .await?;

        let mut messages = Vec::new();
        let mut error: Option<Error> = None;

        loop {
            let msg = self.receive_message().await?;
            let is_ready = matches!(msg, BackendMessage::ReadyForQuery { .. });

            match &msg {
                BackendMessage::ErrorResponse(fields) => {
                    if fields.severity.as_deref() == Some("FATAL") {
                        return Err(Error::Postgres(fields.clone()));
                    }
                    error = Some(Error::Postgres(fields.clone()));
                }
                BackendMessage::ParameterStatus { name, value } => {
                    self.server_params.insert(name.clone(), value.clone());
                }
                BackendMessage::ReadyForQuery { status } => {
                    self.apply_transaction_status(*status)?;
                }
                _ => {}
            }

            messages.push(msg);

            if is_ready {
                return match error {
                    Some(e) => Err(e),
                    None => Ok(messages),
                };
            }
        }
    }

    fn apply_transaction_status(&mut self, status: u8) -> Result<()> {
        self.transaction_status = TransactionStatus::from_byte(status).ok_or_else(|| {
            Error::Protocol(format!("unknown transaction status byte 0x{:02X}", status))
        })?;
        Ok(())
    }

    /// Send a frontend message
    async fn send_message(&mut self, msg: &FrontendMessage) -> Result<()> {
        let buf = encode_message(msg);
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| Error::Protocol("transport missing".into()))?;
        transport.write_all(&buf).await?;
        transport.flush().await?;
        Ok(())
    }

    /// Receive one backend message
    async fn receive_message(&mut self) -> Result<BackendMessage> {
        loop {
            if let Some((msg, consumed)) = decode_message(&mut self.read_buf)? {
                self.read_buf.advance(consumed);
                return Ok(msg);
            }

            let transport = self
                .transport
                .as_mut()
                .ok_or_else(|| Error::Protocol("transport missing".into()))?;
            let n = transport.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Error::TransportIo(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "server closed the connection",
                )));
            }
        }
    }

    /// Terminate the session and close the transport.
    ///
    /// The Terminate message is best-effort; shutdown failures after it are
    /// also ignored, since the intent is release, not delivery.
    pub async fn close(mut self) {
        let _ = self.state.transition(ConnectionState::Disconnected);
        let _ = self.send_message(&FrontendMessage::Terminate).await;
        if let Some(mut transport) = self.transport.take() {
            let _ = transport.shutdown().await;
        }
    }
}

fn require_password(options: &ConnectionOptions) -> Result<String> {
    options
        .password
        .clone()
        .ok_or_else(|| Error::Authentication("password required by server but none configured".into()))
}
