//! Connection controller
//!
//! [`Client`] owns at most one live [`Connection`] and the observable
//! [`Session`] snapshot, and applies the reconnection policy: a bounded retry
//! loop at connect time and a single recovery pass after a mid-operation
//! disconnect.

use crate::connection::Connection;
use crate::options::ConnectionOptions;
use crate::protocol::BackendMessage;
use crate::session::Session;
use crate::{Error, Result};

/// PostgreSQL client over a single connection
pub struct Client {
    options: ConnectionOptions,
    conn: Option<Connection>,
    session: Session,
}

impl Client {
    /// Create a client. Performs no I/O; call [`connect`](Self::connect) to
    /// establish the session.
    pub fn new(options: ConnectionOptions) -> Self {
        Self {
            options,
            conn: None,
            session: Session::default(),
        }
    }

    /// Whether a session is currently established
    pub fn connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Read-only snapshot of the current session
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The options this client was built with
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Establish the session. A no-op when already connected.
    ///
    /// Runs the handshake up to `max(1, attempts)` times, each try on a fresh
    /// transport. Only transport-level failures are retried; server verdicts
    /// (authentication failure, unknown database, certificate rejection)
    /// abort immediately. When every try fails, the last error is surfaced.
    pub async fn connect(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }

        let tries = self.options.connection.attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=tries {
            match Connection::establish(&self.options).await {
                Ok(conn) => {
                    self.session = conn.session_snapshot();
                    self.conn = Some(conn);
                    return Ok(());
                }
                Err(e) if e.is_retryable() => {
                    tracing::debug!(attempt, tries, error = %e, "connection attempt failed");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::Config("connection attempts must be at least one".into())
        }))
    }

    /// Terminate the session and release the transport. Idempotent.
    ///
    /// The session snapshot is cleared before the connection handle is
    /// dropped, so observers never see a stale identity on a closed client.
    pub async fn end(&mut self) -> Result<()> {
        self.session = Session::default();
        if let Some(conn) = self.conn.take() {
            conn.close().await;
            tracing::debug!("session ended");
        }
        Ok(())
    }

    /// Execute a simple query on the established session.
    ///
    /// Fails with [`Error::Disconnected`] when no session is live. When the
    /// backend terminates the session mid-operation (EOF, or a FATAL 57P01
    /// error response), the failure is surfaced exactly once as
    /// [`Error::SessionTerminated`], the query is not re-run, and the
    /// recovery pass of
    /// [`handle_unexpected_disconnect`](Self::handle_unexpected_disconnect)
    /// runs so the next operation sees a fresh session.
    pub async fn simple_query(&mut self, sql: &str) -> Result<Vec<BackendMessage>> {
        let conn = self.conn.as_mut().ok_or(Error::Disconnected)?;

        match conn.simple_query(sql).await {
            Ok(messages) => {
                self.session = conn.session_snapshot();
                Ok(messages)
            }
            Err(e) if e.is_connection_lost() => {
                tracing::debug!(error = %e, "session lost mid-operation");
                self.handle_unexpected_disconnect().await;
                Err(Error::SessionTerminated)
            }
            Err(e) => Err(e),
        }
    }

    /// React to a connection lost while an operation was in flight.
    ///
    /// Clears the session and drops the dead connection, then runs one
    /// [`connect`](Self::connect) pass (when the reconnection budget allows
    /// any retries at all) so the next operation finds a fresh backend. With
    /// a zero budget the client stays disconnected and subsequent operations
    /// fail with [`Error::Disconnected`].
    ///
    /// Query layers call this when they observe EOF or an administrative
    /// termination; the triggering operation itself is never re-run.
    pub async fn handle_unexpected_disconnect(&mut self) {
        self.session = Session::default();
        self.conn = None;

        if self.options.connection.attempts >= 1 {
            if let Err(e) = self.connect().await {
                tracing::debug!(error = %e, "reconnect after lost session failed");
            }
        }
    }
}
