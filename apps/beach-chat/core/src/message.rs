use serde::{Deserialize, Serialize};
use std::fmt;

/// Sender name used for synthetic presence messages.
pub const SYSTEM_SENDER: &str = "System";

pub type MessageId = u64;

/// A single chat line, as rendered in a timeline and as carried on the wire.
///
/// The wire names (`username`, `message`) are the ones the chat server
/// already speaks; the Rust names describe the role of each field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    #[serde(rename = "username")]
    pub sender: String,
    #[serde(rename = "message")]
    pub body: String,
}

impl ChatMessage {
    pub fn new(id: MessageId, sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id,
            sender: sender.into(),
            body: body.into(),
        }
    }

    pub fn system(id: MessageId, body: impl Into<String>) -> Self {
        Self::new(id, SYSTEM_SENDER, body)
    }

    pub fn is_system(&self) -> bool {
        self.sender == SYSTEM_SENDER
    }

    /// Whether this message reads as sent or received from `viewer`'s seat.
    pub fn direction(&self, viewer: &SessionIdentity) -> Direction {
        if viewer.matches(&self.sender) {
            Direction::Sent
        } else {
            Direction::Received
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

/// The username a session presents to the server. Never validated or
/// rewritten here; the surrounding shell owns that decision.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionIdentity(String);

impl SessionIdentity {
    pub fn new(username: impl Into<String>) -> Self {
        Self(username.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, sender: &str) -> bool {
        self.0 == sender
    }
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SessionIdentity {
    fn from(value: String) -> Self {
        Self(value)
    }
}
