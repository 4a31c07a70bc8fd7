//! Integration tests against a real PostgreSQL instance
//!
//! These tests require a running server and are ignored by default.
//! Configure via environment:
//!
//! ```bash
//! export POSTGRES_HOST=localhost
//! export POSTGRES_PORT=5432
//! export POSTGRES_USER=postgres
//! export POSTGRES_PASSWORD=postgres
//! export POSTGRES_DB=postgres
//!
//! cargo test --test live_postgres -- --ignored --nocapture
//! ```
//!
//! For the TLS test the server must have ssl=on; set POSTGRES_TLS_ENFORCE=true
//! to require the handshake to succeed.

use pglink::protocol::BackendMessage;
use pglink::{Client, ConnectionOptions};

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn live_options() -> ConnectionOptions {
    ConnectionOptions::builder(env_or("POSTGRES_USER", "postgres"))
        .host(env_or("POSTGRES_HOST", "localhost"))
        .port(env_or("POSTGRES_PORT", "5432").parse().expect("port"))
        .password(env_or("POSTGRES_PASSWORD", "postgres"))
        .database(env_or("POSTGRES_DB", "postgres"))
        .application_name("pglink-live-test")
        .build()
}

#[tokio::test]
#[ignore] // Requires Postgres running
async fn connect_query_and_end() {
    let mut client = Client::new(live_options());
    client.connect().await.expect("connect");

    assert!(client.connected());
    assert!(client.session().pid.is_some());
    assert_eq!(client.session().tls, Some(false));

    let messages = client
        .simple_query("SELECT PG_BACKEND_PID()")
        .await
        .expect("query");
    let row = messages.iter().find_map(|m| match m {
        BackendMessage::DataRow(fields) => Some(fields.clone()),
        _ => None,
    });
    let pid_text = row.expect("data row")[0].clone().expect("pid column");
    let pid: u32 = std::str::from_utf8(&pid_text).unwrap().parse().unwrap();
    assert_eq!(client.session().pid, Some(pid));

    client.end().await.expect("end");
    assert!(!client.connected());
    assert_eq!(client.session().pid, None);
}

#[tokio::test]
#[ignore] // Requires Postgres with ssl=on
async fn connect_with_tls_upgrade() {
    let enforce = env_or("POSTGRES_TLS_ENFORCE", "false") == "true";

    let mut options = live_options();
    options.tls.enabled = true;
    options.tls.enforce = enforce;

    let mut client = Client::new(options);
    match client.connect().await {
        Ok(()) => {
            assert!(client.session().tls.is_some());
            println!("session.tls = {:?}", client.session().tls);
            client.end().await.expect("end");
        }
        Err(e) if !enforce => {
            // Without enforcement a refusing server is acceptable
            println!("TLS connect failed (server may not support TLS): {}", e);
        }
        Err(e) => panic!("TLS connect failed with enforcement: {}", e),
    }
}

#[tokio::test]
#[ignore] // Requires Postgres running
async fn unknown_database_yields_server_error() {
    let mut options = live_options();
    options.database = Some(format!("nope_{}", std::process::id()));

    let mut client = Client::new(options);
    let err = client.connect().await.unwrap_err();
    assert!(err.to_string().contains("does not exist"), "{}", err);
}
