//! Frame codec
//!
//! JSON-based bidirectional envelope using Serde's tagged enum
//! for type-safe serialization/deserialization. Stateless: one frame in,
//! one envelope out.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Wire envelope, one per WebSocket text frame
///
/// Tagged by `type` with snake_case naming. Types this client does not
/// know decode to `Unknown` instead of failing, so the dispatcher can log
/// and drop them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// A message was posted to the channel (inbound)
    NewMessage { message: ChatMessage },
    /// Presence signal (bidirectional)
    Typing(TypingEvent),
    /// Peer joined the channel (inbound)
    UserJoined(PresenceEvent),
    /// Peer left the channel (inbound)
    UserLeft(PresenceEvent),
    /// Heartbeat (outbound)
    Ping,
    /// Heartbeat reply (inbound, discarded)
    Pong,
    /// Any type not listed above
    #[serde(other)]
    Unknown,
}

impl Envelope {
    /// Wire name of this envelope's `type` tag
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::NewMessage { .. } => "new_message",
            Envelope::Typing(_) => "typing",
            Envelope::UserJoined(_) => "user_joined",
            Envelope::UserLeft(_) => "user_left",
            Envelope::Ping => "ping",
            Envelope::Pong => "pong",
            Envelope::Unknown => "unknown",
        }
    }
}

/// Full message record carried by `new_message`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub channel_id: u64,
    pub user_id: String,
    pub username: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Payload of a `typing` frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingEvent {
    pub user_id: String,
    pub username: String,
    pub is_typing: bool,
}

/// Payload of `user_joined` / `user_left` frames
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub user_id: String,
    pub username: String,
}

/// Decode one inbound text frame
pub fn decode(text: &str) -> Result<Envelope, AppError> {
    Ok(serde_json::from_str(text)?)
}

/// Encode one outbound envelope
///
/// The `Unknown` fallback has no wire form and is rejected.
pub fn encode(frame: &Envelope) -> Result<String, AppError> {
    if matches!(frame, Envelope::Unknown) {
        return Err(AppError::Unencodable("unknown"));
    }
    Ok(serde_json::to_string(frame)?)
}
