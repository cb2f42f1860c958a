//! wr-core: WhatsApp Responder Core Library
//!
//! Domain types, the inbound-event admission filter, the built-in
//! auto-responder, and the SQLite conversation log.

pub mod admission;
pub mod config;
pub mod error;
pub mod event;
pub mod responder;
pub mod store;

pub use admission::{AdmissionConfig, AdmissionFilter, Decision, RejectReason, BROADCAST_ID};
pub use config::{AdmissionSettings, Config, SessionSettings, StoreSettings};
pub use error::{Error, Result};
pub use event::{InboundEvent, Payload};
pub use responder::{AutoResponder, Responder};
pub use store::{ConversationLog, ConversationStore};
