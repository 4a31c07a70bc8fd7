//! Connection management
//!
//! This module handles:
//! * Transport abstraction (plain TCP with in-place TLS upgrade)
//! * Connection lifecycle (TLS negotiation, startup, authentication)
//! * State machine enforcement

mod conn;
mod state;
mod tls;
mod transport;

pub use conn::Connection;
pub use state::ConnectionState;
pub use tls::{client_config, parse_server_name};
pub use transport::Transport;
