//! pglink — PostgreSQL connection core
//!
//! Implements the frontend side of the PostgreSQL wire protocol (version 3)
//! up to and including a ready session: transport with optional TLS upgrade,
//! startup, authentication (cleartext, MD5, SCRAM-SHA-256), and the connected
//! session lifecycle with bounded reconnection.
//!
//! The entry point is [`Client`]:
//!
//! ```no_run
//! # async fn example() -> pglink::Result<()> {
//! use pglink::{Client, ConnectionOptions};
//!
//! let options = ConnectionOptions::builder("app_user")
//!     .host("db.internal")
//!     .password("secret")
//!     .database("appdb")
//!     .attempts(3)
//!     .build();
//!
//! let mut client = Client::new(options);
//! client.connect().await?;
//! assert!(client.connected());
//! println!("backend pid: {:?}", client.session().pid);
//! client.end().await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod connection;
pub mod error;
pub mod options;
pub mod protocol;
pub mod session;

pub use client::Client;
pub use error::{Error, Result};
pub use options::{ConnectionOptions, ConnectionOptionsBuilder, RetryOptions, TlsOptions};
pub use session::{Session, TransactionStatus};
