//! Protocol message encoding

use super::constants::SSL_REQUEST_CODE;
use super::message::FrontendMessage;
use bytes::{BufMut, BytesMut};

/// Encode a frontend message into bytes
pub fn encode_message(msg: &FrontendMessage) -> BytesMut {
    let mut buf = BytesMut::new();

    match msg {
        FrontendMessage::Startup { version, params } => {
            encode_startup(&mut buf, *version, params);
        }
        FrontendMessage::Password(password) => {
            encode_password(&mut buf, password);
        }
        FrontendMessage::Query(query) => {
            encode_query(&mut buf, query);
        }
        FrontendMessage::Terminate => {
            encode_terminate(&mut buf);
        }
        FrontendMessage::SaslInitialResponse { mechanism, data } => {
            encode_sasl_initial_response(&mut buf, mechanism, data);
        }
        FrontendMessage::SaslResponse { data } => {
            encode_sasl_response(&mut buf, data);
        }
        FrontendMessage::SslRequest => {
            encode_ssl_request(&mut buf);
        }
    }

    buf
}

fn encode_startup(buf: &mut BytesMut, version: u32, params: &[(String, String)]) {
    // Startup messages don't have a type byte
    let len_pos = buf.len();
    buf.put_u32(0);

    buf.put_u32(version);

    // Parameters (key-value pairs, null-terminated)
    for (key, value) in params {
        buf.put(key.as_bytes());
        buf.put_u8(0);
        buf.put(value.as_bytes());
        buf.put_u8(0);
    }

    // Final null terminator
    buf.put_u8(0);

    fill_length(buf, len_pos);
}

fn encode_password(buf: &mut BytesMut, password: &str) {
    buf.put_u8(b'p');
    let len_pos = buf.len();
    buf.put_u32(0);

    buf.put(password.as_bytes());
    buf.put_u8(0);

    fill_length(buf, len_pos);
}

fn encode_query(buf: &mut BytesMut, query: &str) {
    buf.put_u8(b'Q');
    let len_pos = buf.len();
    buf.put_u32(0);

    buf.put(query.as_bytes());
    buf.put_u8(0);

    fill_length(buf, len_pos);
}

fn encode_terminate(buf: &mut BytesMut) {
    buf.put_u8(b'X');
    buf.put_u32(4); // Length includes itself
}

fn encode_sasl_initial_response(buf: &mut BytesMut, mechanism: &str, data: &[u8]) {
    buf.put_u8(b'p');
    let len_pos = buf.len();
    buf.put_u32(0);

    // Mechanism name (null-terminated)
    buf.put(mechanism.as_bytes());
    buf.put_u8(0);

    // SASL data (length-prefixed bytes)
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);

    fill_length(buf, len_pos);
}

fn encode_sasl_response(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u8(b'p');
    let len_pos = buf.len();
    buf.put_u32(0);

    buf.put_slice(data);

    fill_length(buf, len_pos);
}

fn encode_ssl_request(buf: &mut BytesMut) {
    buf.put_u32(8); // Length (includes itself)
    buf.put_u32(SSL_REQUEST_CODE);
}

/// Backfill a 4-byte length field counted from `len_pos` to the buffer end
fn fill_length(buf: &mut BytesMut, len_pos: usize) {
    let len = (buf.len() - len_pos) as u32;
    buf[len_pos..len_pos + 4].copy_from_slice(&len.to_be_bytes());
}
