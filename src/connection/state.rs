//! Connection state machine

use crate::{Error, Result};

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No live transport
    Disconnected,

    /// SSLRequest sent, awaiting the server's S/N response
    Negotiating,

    /// Startup message sent, awaiting the first authentication request
    Starting,

    /// Authentication sub-protocol in progress
    Authenticating,

    /// Authentication complete, consuming parameters until ReadyForQuery
    WaitingReady,

    /// Connected and idle
    Ready,
}

impl ConnectionState {
    /// Check if a transition is valid
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Disconnected, Negotiating)
                | (Disconnected, Starting)
                | (Negotiating, Starting)
                | (Starting, Authenticating)
                | (Authenticating, WaitingReady)
                | (WaitingReady, Ready)
                | (_, Disconnected)
        )
    }

    /// Transition to a new state
    pub fn transition(&mut self, next: ConnectionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::Protocol(format!(
                "invalid connection state transition: {} -> {}",
                self, next
            )));
        }
        *self = next;
        Ok(())
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Negotiating => write!(f, "negotiating"),
            Self::Starting => write!(f, "starting"),
            Self::Authenticating => write!(f, "authenticating"),
            Self::WaitingReady => write!(f, "waiting_ready"),
            Self::Ready => write!(f, "ready"),
        }
    }
}
