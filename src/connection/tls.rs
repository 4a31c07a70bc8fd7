//! TLS configuration for secure connections
//!
//! Builds the rustls client configuration from [`TlsOptions`]: system root
//! certificates plus any caller-provided PEM roots. TLS is recommended for
//! all non-local connections to prevent credential interception.

use crate::options::TlsOptions;
use crate::{Error, Result};
use rustls::{ClientConfig, RootCertStore};
use rustls_pemfile::Item;
use std::sync::Arc;

/// Build a rustls `ClientConfig` for the given TLS options.
///
/// System root certificates are always loaded; `ca_certificates` adds extra
/// trusted roots (PEM-encoded). Fails when neither source yields a usable
/// root, or when a provided PEM blob cannot be parsed.
pub fn client_config(options: &TlsOptions) -> Result<Arc<ClientConfig>> {
    let mut root_store = RootCertStore::empty();

    // System roots via rustls-native-certs; per-certificate errors are
    // tolerated as long as something loads
    let native = rustls_native_certs::load_native_certs();
    for cert in native.certs {
        let _ = root_store.add_parsable_certificates(std::iter::once(cert));
    }

    for pem in &options.ca_certificates {
        add_pem_certificates(&mut root_store, pem)?;
    }

    if root_store.is_empty() {
        return Err(Error::Config(
            "no trusted root certificates available for TLS".to_string(),
        ));
    }

    Ok(Arc::new(
        ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    ))
}

/// Parse a PEM blob and add every certificate it contains to the store
fn add_pem_certificates(store: &mut RootCertStore, pem: &[u8]) -> Result<()> {
    let mut reader = std::io::Cursor::new(pem);
    let mut found = 0;

    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(Item::X509Certificate(cert))) => {
                let _ = store.add_parsable_certificates(std::iter::once(cert));
                found += 1;
            }
            Ok(Some(_)) => {
                // Skip non-certificate items (private keys, etc.)
            }
            Ok(None) => break,
            Err(_) => {
                return Err(Error::Config(
                    "failed to parse CA certificate from PEM data".to_string(),
                ));
            }
        }
    }

    if found == 0 {
        return Err(Error::Config(
            "no certificates found in provided PEM data".to_string(),
        ));
    }

    Ok(())
}

/// Normalize a hostname for TLS SNI (Server Name Indication).
///
/// Strips a trailing dot and rejects hostnames rustls cannot represent.
pub fn parse_server_name(hostname: &str) -> Result<String> {
    let hostname = hostname.trim_end_matches('.');

    if hostname.is_empty() || hostname.len() > 253 {
        return Err(Error::Config(format!(
            "invalid hostname for TLS: '{}'",
            hostname
        )));
    }

    if !hostname
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '.')
    {
        return Err(Error::Config(format!(
            "invalid hostname for TLS: '{}'",
            hostname
        )));
    }

    Ok(hostname.to_string())
}
