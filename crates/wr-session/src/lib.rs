//! wr-session: connection lifecycle for the responder bot
//!
//! One logical, auto-reconnecting session over a pluggable messaging
//! transport, with persisted credentials and terminal-logout handling.

pub mod credentials;
pub mod error;
pub mod manager;
pub mod transport;

pub use credentials::CredentialStore;
pub use error::{Result, SessionError};
pub use manager::{SessionEvent, SessionManager, SessionState};
pub use transport::{CloseReason, Transport, TransportEvent};
