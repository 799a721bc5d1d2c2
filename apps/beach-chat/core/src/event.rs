//! Events exchanged with the chat server.
//!
//! An event is encoded the way socket.io carries it: a JSON array whose first
//! element is the event name and whose second element is the payload,
//! e.g. `["join","A"]`. Transports add their own packet framing around it.

use crate::message::ChatMessage;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;

/// Events sent from the client to the chat server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Handshake carrying the session's username.
    Join(String),
    ChatMessage(ChatMessage),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Join(_) => "join",
            ClientEvent::ChatMessage(_) => "chat message",
        }
    }
}

/// Events received from the chat server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Full backlog, usually sent right after `join`.
    MessageHistory(Vec<ChatMessage>),
    UserJoined(Presence),
    UserLeft(Presence),
    UsernameTaken(UsernameTaken),
    ChatMessage(ChatMessage),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::MessageHistory(_) => "message history",
            ServerEvent::UserJoined(_) => "user joined",
            ServerEvent::UserLeft(_) => "user left",
            ServerEvent::UsernameTaken(_) => "username taken",
            ServerEvent::ChatMessage(_) => "chat message",
        }
    }
}

/// Payload of `user joined` / `user left`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub username: String,
    #[serde(rename = "activeUsers", default)]
    pub active_users: BTreeSet<String>,
}

impl Presence {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            active_users: BTreeSet::new(),
        }
    }

    pub fn with_active_users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.active_users = users.into_iter().map(Into::into).collect();
        self
    }
}

/// Payload of `username taken`; `message` is shown to the user verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsernameTaken {
    pub message: String,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode {event} event: {source}")]
    Encode {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("malformed event frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("event frame has no name")]
    MissingName,
    #[error("unknown event {0:?}")]
    UnknownEvent(String),
    #[error("invalid payload for {event}: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

pub fn encode_client_event(event: &ClientEvent) -> Result<String, CodecError> {
    match event {
        ClientEvent::Join(username) => encode_frame(event.name(), username),
        ClientEvent::ChatMessage(message) => encode_frame(event.name(), message),
    }
}

pub fn decode_server_event(frame: &str) -> Result<ServerEvent, CodecError> {
    let (name, data) = split_frame(frame)?;
    Ok(match name.as_str() {
        "message history" => ServerEvent::MessageHistory(payload(&name, data)?),
        "user joined" => ServerEvent::UserJoined(payload(&name, data)?),
        "user left" => ServerEvent::UserLeft(payload(&name, data)?),
        "username taken" => ServerEvent::UsernameTaken(payload(&name, data)?),
        "chat message" => ServerEvent::ChatMessage(payload(&name, data)?),
        _ => return Err(CodecError::UnknownEvent(name)),
    })
}

/// Server-side encoding, for in-process servers and test doubles.
pub fn encode_server_event(event: &ServerEvent) -> Result<String, CodecError> {
    match event {
        ServerEvent::MessageHistory(messages) => encode_frame(event.name(), messages),
        ServerEvent::UserJoined(presence) | ServerEvent::UserLeft(presence) => {
            encode_frame(event.name(), presence)
        }
        ServerEvent::UsernameTaken(taken) => encode_frame(event.name(), taken),
        ServerEvent::ChatMessage(message) => encode_frame(event.name(), message),
    }
}

/// Server-side decoding of what a client emits.
pub fn decode_client_event(frame: &str) -> Result<ClientEvent, CodecError> {
    let (name, data) = split_frame(frame)?;
    Ok(match name.as_str() {
        "join" => ClientEvent::Join(payload(&name, data)?),
        "chat message" => ClientEvent::ChatMessage(payload(&name, data)?),
        _ => return Err(CodecError::UnknownEvent(name)),
    })
}

fn encode_frame<T: Serialize>(event: &'static str, data: &T) -> Result<String, CodecError> {
    serde_json::to_string(&(event, data)).map_err(|source| CodecError::Encode { event, source })
}

/// Splits `["name", payload, ...]`. Extra arguments are ignored and a
/// missing payload reads as `null`.
fn split_frame(frame: &str) -> Result<(String, Value), CodecError> {
    let mut parts = serde_json::from_str::<Vec<Value>>(frame)?.into_iter();
    let name = match parts.next() {
        Some(Value::String(name)) => name,
        _ => return Err(CodecError::MissingName),
    };
    Ok((name, parts.next().unwrap_or(Value::Null)))
}

fn payload<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, CodecError> {
    serde_json::from_value(data).map_err(|source| CodecError::Payload {
        event: event.to_string(),
        source,
    })
}
