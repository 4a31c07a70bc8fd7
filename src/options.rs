//! Connection options
//!
//! A resolved, immutable description of where and how to connect. Parsing
//! from URLs or the environment is a caller concern; the core only consumes
//! the finished value.

use std::collections::HashMap;

/// TLS negotiation policy
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// Attempt SSLRequest negotiation before startup
    pub enabled: bool,
    /// Refuse to proceed when TLS cannot be established
    pub enforce: bool,
    /// Extra trusted roots, PEM-encoded, added on top of the system store
    pub ca_certificates: Vec<Vec<u8>>,
}

/// Reconnection budget
#[derive(Debug, Clone, Default)]
pub struct RetryOptions {
    /// Total connection tries; 0 and 1 both mean a single try, no retries
    pub attempts: u32,
}

/// Resolved connection parameters, immutable once a connect starts
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Server hostname
    pub host: String,
    /// Server port
    pub port: u16,
    /// Role name
    pub user: String,
    /// Database name; defaults to the user name when unset
    pub database: Option<String>,
    /// Password for password-based authentication
    pub password: Option<String>,
    /// application_name reported in the startup message
    pub application_name: Option<String>,
    /// TLS policy
    pub tls: TlsOptions,
    /// Reconnection budget
    pub connection: RetryOptions,
    /// Additional startup parameters
    pub runtime_params: HashMap<String, String>,
}

impl ConnectionOptions {
    /// Create options for `user` with defaults (localhost:5432, no TLS,
    /// single connection try)
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: user.into(),
            database: None,
            password: None,
            application_name: None,
            tls: TlsOptions::default(),
            connection: RetryOptions::default(),
            runtime_params: HashMap::new(),
        }
    }

    /// Create a builder for fluent configuration
    pub fn builder(user: impl Into<String>) -> ConnectionOptionsBuilder {
        ConnectionOptionsBuilder {
            options: Self::new(user),
        }
    }

    /// Database name, falling back to the user name
    pub fn database_name(&self) -> &str {
        self.database.as_deref().unwrap_or(&self.user)
    }
}

/// Fluent builder for [`ConnectionOptions`]
#[derive(Debug, Clone)]
pub struct ConnectionOptionsBuilder {
    options: ConnectionOptions,
}

impl ConnectionOptionsBuilder {
    /// Set the server hostname
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.options.host = host.into();
        self
    }

    /// Set the server port
    pub fn port(mut self, port: u16) -> Self {
        self.options.port = port;
        self
    }

    /// Set the database name (default: the user name)
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.options.database = Some(database.into());
        self
    }

    /// Set the password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.options.password = Some(password.into());
        self
    }

    /// Set the application_name startup parameter
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.options.application_name = Some(name.into());
        self
    }

    /// Enable SSLRequest negotiation
    pub fn tls_enabled(mut self, enabled: bool) -> Self {
        self.options.tls.enabled = enabled;
        self
    }

    /// Refuse to proceed when TLS cannot be established
    pub fn tls_enforce(mut self, enforce: bool) -> Self {
        self.options.tls.enforce = enforce;
        self
    }

    /// Add a PEM-encoded CA certificate to the trusted roots
    pub fn ca_certificate(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.options.tls.ca_certificates.push(pem.into());
        self
    }

    /// Set the total connection tries (0 and 1 both mean a single try)
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.options.connection.attempts = attempts;
        self
    }

    /// Add an extra startup parameter
    pub fn runtime_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options
            .runtime_params
            .insert(key.into(), value.into());
        self
    }

    /// Build the options
    pub fn build(self) -> ConnectionOptions {
        self.options
    }
}
