//! Inbound message events delivered by the transport

use chrono::{DateTime, Utc};

/// Message content plus its type tag
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Plain text message
    Text(String),
    /// Voice note / audio attachment (raw bytes)
    Audio(Vec<u8>),
    /// Anything else (stickers, reactions, protocol messages)
    Other,
}

impl Payload {
    /// Textual content, if any
    pub fn text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// A single inbound message event
///
/// Ephemeral: lives only for the duration of admission and dispatch.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Transport-assigned unique message id
    pub id: String,
    /// Conversation / peer identifier (JID)
    pub sender_id: String,
    /// Message content
    pub payload: Payload,
    /// Whether the message was sent by the bot's own account
    pub from_me: bool,
    /// Arrival timestamp
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    /// Create a text event
    pub fn text(id: impl Into<String>, sender_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sender_id: sender_id.into(),
            payload: Payload::Text(body.into()),
            from_me: false,
            received_at: Utc::now(),
        }
    }

    /// Textual content of the payload, if any
    pub fn text_content(&self) -> Option<&str> {
        self.payload.text()
    }
}
