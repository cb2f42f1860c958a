//! Transport collaborator boundary
//!
//! The session manager depends only on this narrow event/command contract,
//! never on protocol details of a particular messaging client.

use async_trait::async_trait;
use tokio::sync::mpsc;

use wr_core::InboundEvent;

use crate::error::Result;

/// Why the transport closed the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Explicit logout: terminal, reconnecting is forbidden
    LoggedOut,
    /// Anything else (network drop, server restart, stream error)
    Error(String),
}

impl CloseReason {
    /// Terminal-disconnect predicate
    pub fn is_terminal(&self) -> bool {
        matches!(self, CloseReason::LoggedOut)
    }
}

/// Signals delivered by a connected transport, in FIFO order
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Handshake completed, connection is live
    Opened,
    /// Connection closed; inspect the reason for terminality
    Closed { reason: CloseReason },
    /// The authentication state changed and must be persisted
    CredentialsUpdated(Vec<u8>),
    /// An inbound message event
    Inbound(InboundEvent),
}

/// A messaging transport (socket client)
///
/// `connect` performs the handshake with the given persisted credentials and
/// returns the connection's event stream. The stream ends at (or after) a
/// `Closed` event.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, credentials: Option<Vec<u8>>)
        -> Result<mpsc::Receiver<TransportEvent>>;

    /// Send a text message to a peer
    async fn send(&self, recipient: &str, text: &str) -> Result<()>;
}
