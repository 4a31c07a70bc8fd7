//! PostgreSQL wire protocol (frontend/backend protocol version 3)
//!
//! Message framing: one-byte type tag (startup-phase frontend messages have
//! none), 4-byte big-endian length inclusive of itself, payload. The codec is
//! oblivious to TLS — after an upgrade the same framing flows over the
//! encrypted stream.

pub mod constants;
mod decode;
mod encode;
mod message;

pub use decode::decode_message;
pub use encode::encode_message;
pub use message::{
    AuthenticationMessage, BackendMessage, ErrorFields, FieldDescription, FrontendMessage,
};
