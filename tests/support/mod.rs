//! Scripted mock PostgreSQL server for integration tests
//!
//! Each test spawns a [`MockServer`] with a script that plays the backend
//! side of the protocol over a real TCP socket. Connections are handled
//! sequentially so multi-connection scenarios (retries, reconnects) stay
//! deterministic.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const PROTOCOL_VERSION: u32 = 196608;
pub const SSL_REQUEST_CODE: u32 = 80877103;

pub struct MockServer {
    pub addr: SocketAddr,
    accepts: Arc<AtomicU32>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockServer {
    /// Start a server that runs `script` for every accepted connection.
    /// The script receives the stream and the zero-based connection index.
    pub async fn start<F, Fut>(script: F) -> Self
    where
        F: Fn(TcpStream, u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let accepts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&accepts);

        let handle = tokio::spawn(async move {
            let mut index = 0u32;
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => break,
                };
                counter.fetch_add(1, Ordering::SeqCst);
                script(stream, index).await;
                index += 1;
            }
        });

        Self {
            addr,
            accepts,
            handle,
        }
    }

    pub fn accept_count(&self) -> u32 {
        self.accepts.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Spawn a server that accepts exactly one connection and runs `script` on
/// it. Await the returned handle at the end of the test so script panics
/// (failed assertions) fail the test.
pub async fn oneshot_server<F, Fut>(script: F) -> (SocketAddr, tokio::task::JoinHandle<()>)
where
    F: FnOnce(TcpStream) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        script(stream).await;
    });
    (addr, handle)
}

/// Spawn a server whose script drives the listener itself (for scenarios
/// spanning several sequential connections). Await the returned handle at
/// the end of the test.
pub async fn listener_server<F, Fut>(script: F) -> (SocketAddr, tokio::task::JoinHandle<()>)
where
    F: FnOnce(TcpListener) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let handle = tokio::spawn(script(listener));
    (addr, handle)
}

// ── Frame builders (backend → client) ────────────────────────────

pub fn msg(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 5);
    out.push(tag);
    out.extend_from_slice(&((body.len() as u32 + 4).to_be_bytes()));
    out.extend_from_slice(body);
    out
}

pub fn auth_request(subtype: u32, extra: &[u8]) -> Vec<u8> {
    let mut body = subtype.to_be_bytes().to_vec();
    body.extend_from_slice(extra);
    msg(b'R', &body)
}

pub fn auth_ok() -> Vec<u8> {
    auth_request(0, &[])
}

pub fn auth_cleartext() -> Vec<u8> {
    auth_request(3, &[])
}

pub fn auth_md5(salt: [u8; 4]) -> Vec<u8> {
    auth_request(5, &salt)
}

pub fn auth_sasl(mechanisms: &[&str]) -> Vec<u8> {
    let mut extra = Vec::new();
    for mechanism in mechanisms {
        extra.extend_from_slice(mechanism.as_bytes());
        extra.push(0);
    }
    extra.push(0);
    auth_request(10, &extra)
}

pub fn auth_sasl_continue(data: &[u8]) -> Vec<u8> {
    auth_request(11, data)
}

pub fn auth_sasl_final(data: &[u8]) -> Vec<u8> {
    auth_request(12, data)
}

pub fn parameter_status(name: &str, value: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(name.as_bytes());
    body.push(0);
    body.extend_from_slice(value.as_bytes());
    body.push(0);
    msg(b'S', &body)
}

pub fn backend_key_data(pid: u32, secret_key: u32) -> Vec<u8> {
    let mut body = pid.to_be_bytes().to_vec();
    body.extend_from_slice(&secret_key.to_be_bytes());
    msg(b'K', &body)
}

pub fn ready_for_query(status: u8) -> Vec<u8> {
    msg(b'Z', &[status])
}

pub fn error_response(severity: &str, code: &str, message: &str) -> Vec<u8> {
    let mut body = Vec::new();
    for (field, value) in [
        (b'S', severity),
        (b'V', severity),
        (b'C', code),
        (b'M', message),
    ] {
        body.push(field);
        body.extend_from_slice(value.as_bytes());
        body.push(0);
    }
    body.push(0);
    msg(b'E', &body)
}

pub fn row_description(names: &[&str]) -> Vec<u8> {
    let mut body = (names.len() as i16).to_be_bytes().to_vec();
    for name in names {
        body.extend_from_slice(name.as_bytes());
        body.push(0);
        body.extend_from_slice(&0u32.to_be_bytes()); // table oid
        body.extend_from_slice(&0i16.to_be_bytes()); // column attr
        body.extend_from_slice(&25u32.to_be_bytes()); // type oid (text)
        body.extend_from_slice(&(-1i16).to_be_bytes()); // type size
        body.extend_from_slice(&(-1i32).to_be_bytes()); // type modifier
        body.extend_from_slice(&0i16.to_be_bytes()); // format code (text)
    }
    msg(b'T', &body)
}

pub fn data_row(values: &[Option<&str>]) -> Vec<u8> {
    let mut body = (values.len() as i16).to_be_bytes().to_vec();
    for value in values {
        match value {
            Some(text) => {
                body.extend_from_slice(&(text.len() as i32).to_be_bytes());
                body.extend_from_slice(text.as_bytes());
            }
            None => body.extend_from_slice(&(-1i32).to_be_bytes()),
        }
    }
    msg(b'D', &body)
}

pub fn command_complete(tag: &str) -> Vec<u8> {
    let mut body = tag.as_bytes().to_vec();
    body.push(0);
    msg(b'C', &body)
}

// ── Readers (client → backend) ───────────────────────────────────

/// Read and validate the 8-byte SSLRequest
pub async fn read_ssl_request(stream: &mut TcpStream) {
    let mut buf = [0u8; 8];
    stream.read_exact(&mut buf).await.expect("read SSLRequest");
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let code = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
    assert_eq!(len, 8, "SSLRequest length");
    assert_eq!(code, SSL_REQUEST_CODE, "SSLRequest code");
}

/// Read a startup message, returning its key/value parameters
pub async fn read_startup(stream: &mut TcpStream) -> Vec<(String, String)> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.expect("startup length");
    let len = u32::from_be_bytes(len_buf) as usize;
    assert!(len >= 8, "startup message too short");

    let mut body = vec![0u8; len - 4];
    stream.read_exact(&mut body).await.expect("startup body");

    let version = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
    assert_eq!(version, PROTOCOL_VERSION, "protocol version");

    let mut params = Vec::new();
    let mut rest = &body[4..];
    loop {
        let (key, after_key) = split_cstr(rest);
        if key.is_empty() {
            break;
        }
        let (value, after_value) = split_cstr(after_key);
        params.push((key, value));
        rest = after_value;
    }
    params
}

/// Read one tagged frame (everything except startup/SSLRequest)
pub async fn read_frame(stream: &mut TcpStream) -> (u8, Vec<u8>) {
    let mut head = [0u8; 5];
    stream.read_exact(&mut head).await.expect("frame header");
    let tag = head[0];
    let len = u32::from_be_bytes([head[1], head[2], head[3], head[4]]) as usize;
    let mut body = vec![0u8; len - 4];
    stream.read_exact(&mut body).await.expect("frame body");
    (tag, body)
}

fn split_cstr(data: &[u8]) -> (String, &[u8]) {
    match data.iter().position(|&b| b == 0) {
        Some(end) => (
            String::from_utf8_lossy(&data[..end]).to_string(),
            &data[end + 1..],
        ),
        None => (String::new(), &[]),
    }
}

pub fn lookup<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Write the standard post-auth sequence: a couple of parameters, the
/// backend key data, and ReadyForQuery
pub async fn serve_session_start(stream: &mut TcpStream, pid: u32, secret_key: u32) {
    let mut out = Vec::new();
    out.extend_from_slice(&parameter_status("server_version", "17.2"));
    out.extend_from_slice(&parameter_status("server_encoding", "UTF8"));
    out.extend_from_slice(&backend_key_data(pid, secret_key));
    out.extend_from_slice(&ready_for_query(b'I'));
    stream.write_all(&out).await.expect("session start");
}

/// Serve one simple query returning a single text column/row
pub async fn serve_single_row_query(stream: &mut TcpStream, column: &str, value: &str) {
    let (tag, _body) = read_frame(stream).await;
    assert_eq!(tag, b'Q', "expected a simple query");
    let mut out = Vec::new();
    out.extend_from_slice(&row_description(&[column]));
    out.extend_from_slice(&data_row(&[Some(value)]));
    out.extend_from_slice(&command_complete("SELECT 1"));
    out.extend_from_slice(&ready_for_query(b'I'));
    stream.write_all(&out).await.expect("query response");
}

// ── TLS server side ──────────────────────────────────────────────

pub mod tls {
    use std::sync::Arc;
    use tokio_rustls::TlsAcceptor;

    // Self-signed localhost certificate, generated for these tests only.
    // No trust store contains it, so the client's verifier must reject it.
    const CERT_PEM: &[u8] = include_bytes!("certs/server.crt");
    const KEY_PEM: &[u8] = include_bytes!("certs/server.key");

    /// Acceptor presenting the untrusted self-signed certificate
    pub fn untrusted_acceptor() -> TlsAcceptor {
        let certs: Vec<_> = rustls_pemfile::certs(&mut &CERT_PEM[..])
            .collect::<Result<_, _>>()
            .expect("parse test certificate");
        let key = rustls_pemfile::private_key(&mut &KEY_PEM[..])
            .expect("parse test key")
            .expect("test key present");
        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .expect("server TLS config");
        TlsAcceptor::from(Arc::new(config))
    }
}

// ── SCRAM server side ────────────────────────────────────────────

pub mod scram {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use hmac::{Hmac, Mac};
    use pbkdf2::pbkdf2;
    use sha2::{Digest, Sha256};

    type HmacSha256 = Hmac<Sha256>;

    pub const ITERATIONS: u32 = 4096;
    pub const SALT: &[u8] = b"0123456789abcdef";

    /// Build the server-first message from the client-first message.
    /// Returns `(client_first_bare, server_first)`.
    pub fn server_first(client_first: &str) -> (String, String) {
        let bare = client_first
            .strip_prefix("n,,")
            .expect("gs2 header")
            .to_string();
        let client_nonce = bare
            .split(',')
            .find_map(|p| p.strip_prefix("r="))
            .expect("client nonce");
        let server_nonce = format!("{}srvext", client_nonce);
        let server_first = format!(
            "r={},s={},i={}",
            server_nonce,
            BASE64.encode(SALT),
            ITERATIONS
        );
        (bare, server_first)
    }

    /// Verify the client proof and compute the server signature.
    /// Returns `(proof_valid, server_signature_base64)`.
    pub fn verify_client_final(
        client_final: &str,
        password: &str,
        client_first_bare: &str,
        server_first: &str,
    ) -> (bool, String) {
        let (without_proof, proof_b64) =
            client_final.rsplit_once(",p=").expect("client proof");
        let auth_message = format!("{},{},{}", client_first_bare, server_first, without_proof);

        let mut salted = [0u8; 32];
        let _ = pbkdf2::<HmacSha256>(password.as_bytes(), SALT, ITERATIONS, &mut salted);

        let client_key = hmac(&salted, b"Client Key");
        let stored_key: [u8; 32] = Sha256::digest(client_key).into();
        let client_signature = hmac(&stored_key, auth_message.as_bytes());

        let mut expected_proof = client_key;
        for (byte, sig) in expected_proof.iter_mut().zip(client_signature.iter()) {
            *byte ^= sig;
        }
        let proof_valid = BASE64.encode(expected_proof) == proof_b64;

        let server_key = hmac(&salted, b"Server Key");
        let server_signature = hmac(&server_key, auth_message.as_bytes());

        (proof_valid, BASE64.encode(server_signature))
    }

    fn hmac(key: &[u8], data: &[u8]) -> [u8; 32] {
        let mut mac = HmacSha256::new_from_slice(key).expect("hmac key");
        mac.update(data);
        mac.finalize().into_bytes().into()
    }
}
