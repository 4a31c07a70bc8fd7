//! Authentication sub-protocols
//!
//! Each supported method turns the server's challenge into the frontend
//! message(s) that answer it. Dispatch on the authentication request subtype
//! lives in the connection's startup loop.

mod password;
pub mod scram;

pub use password::md5_response;
pub use scram::{ChannelBinding, ScramClient, ScramError, ScramState};
