//! Observable session state
//!
//! A [`Session`] is a read-only snapshot of the connected backend's identity.
//! The controller publishes a fresh snapshot on every lifecycle transition
//! and resets it to the empty value on disconnect, so readers never observe a
//! half-populated session.

use std::collections::HashMap;

/// Transaction status reported by the backend in ReadyForQuery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Not inside a transaction block
    #[default]
    Idle,
    /// Inside a transaction block
    InTransaction,
    /// Inside a failed transaction block (queries rejected until rollback)
    InFailedTransaction,
}

impl TransactionStatus {
    /// Map a ReadyForQuery status byte
    pub fn from_byte(status: u8) -> Option<Self> {
        match status {
            crate::protocol::constants::tx_status::IDLE => Some(Self::Idle),
            crate::protocol::constants::tx_status::IN_TRANSACTION => Some(Self::InTransaction),
            crate::protocol::constants::tx_status::FAILED => Some(Self::InFailedTransaction),
            _ => None,
        }
    }
}

/// Snapshot of the current connection identity.
///
/// All fields are unset (`None` / empty) when no connection is live.
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Backend process identifier from BackendKeyData
    pub pid: Option<u32>,
    /// Cancellation secret key from BackendKeyData
    pub secret_key: Option<u32>,
    /// Whether the transport is TLS-encrypted; `None` while disconnected
    pub tls: Option<bool>,
    /// Accumulated ParameterStatus values
    pub server_params: HashMap<String, String>,
    /// Transaction status from the most recent ReadyForQuery
    pub transaction_status: TransactionStatus,
}

impl Session {
    /// Whether the snapshot describes a live connection
    pub fn is_populated(&self) -> bool {
        self.pid.is_some() && self.tls.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_session_is_unset() {
        let session = Session::default();
        assert_eq!(session.pid, None);
        assert_eq!(session.secret_key, None);
        assert_eq!(session.tls, None);
        assert!(session.server_params.is_empty());
        assert_eq!(session.transaction_status, TransactionStatus::Idle);
        assert!(!session.is_populated());
    }

    #[test]
    fn test_transaction_status_from_byte() {
        assert_eq!(
            TransactionStatus::from_byte(b'I'),
            Some(TransactionStatus::Idle)
        );
        assert_eq!(
            TransactionStatus::from_byte(b'T'),
            Some(TransactionStatus::InTransaction)
        );
        assert_eq!(
            TransactionStatus::from_byte(b'E'),
            Some(TransactionStatus::InFailedTransaction)
        );
        assert_eq!(TransactionStatus::from_byte(b'?'), None);
    }

    #[test]
    fn test_populated_requires_pid_and_tls() {
        let mut session = Session {
            pid: Some(4242),
            ..Default::default()
        };
        assert!(!session.is_populated());
        session.tls = Some(false);
        assert!(session.is_populated());
    }
}
