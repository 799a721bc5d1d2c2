//! Ordered message list for one chat view and the rules that merge server
//! events into it.

use crate::event::{Presence, ServerEvent};
use crate::ids::IdGenerator;
use crate::message::{ChatMessage, MessageId, SessionIdentity};
use tracing::debug;

/// Messages in arrival order. Only a history snapshot may replace the
/// contents; everything else appends.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Timeline {
    messages: Vec<ChatMessage>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChatMessage> {
        self.messages.iter()
    }

    fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    fn replace(&mut self, messages: Vec<ChatMessage>) {
        self.messages = messages;
    }
}

impl<'a> IntoIterator for &'a Timeline {
    type Item = &'a ChatMessage;
    type IntoIter = std::slice::Iter<'a, ChatMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

/// What applying one server event did to the timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// A history snapshot replaced the timeline.
    Replaced { len: usize },
    Appended(ChatMessage),
    /// Our own message echoed back; already shown optimistically.
    Suppressed,
    /// The server rejected the username. Timeline untouched; the text is
    /// meant for the error sink.
    Conflict(String),
}

/// Owns a [`Timeline`] on behalf of one identity.
#[derive(Debug)]
pub struct TimelineReconciler {
    identity: SessionIdentity,
    timeline: Timeline,
    ids: IdGenerator,
}

impl TimelineReconciler {
    pub fn new(identity: SessionIdentity) -> Self {
        Self {
            identity,
            timeline: Timeline::new(),
            ids: IdGenerator::new(),
        }
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    /// Switches the identity used for self-suppression. The timeline is kept;
    /// the next history snapshot replaces it.
    pub fn set_identity(&mut self, identity: SessionIdentity) {
        self.identity = identity;
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn next_id(&mut self) -> MessageId {
        self.ids.next_id()
    }

    /// Optimistic append of a message this view just sent.
    pub fn append_local(&mut self, message: ChatMessage) {
        self.timeline.push(message);
    }

    pub fn apply(&mut self, event: ServerEvent) -> Reconciled {
        match event {
            ServerEvent::MessageHistory(messages) => {
                let len = messages.len();
                self.timeline.replace(messages);
                debug!(identity = %self.identity, len, "timeline replaced by history");
                Reconciled::Replaced { len }
            }
            ServerEvent::UserJoined(Presence { username, .. }) => {
                self.append_system(format!("{username} joined the chat"))
            }
            ServerEvent::UserLeft(Presence { username, .. }) => {
                self.append_system(format!("{username} left the chat"))
            }
            ServerEvent::UsernameTaken(taken) => Reconciled::Conflict(taken.message),
            ServerEvent::ChatMessage(message) => {
                if self.identity.matches(&message.sender) {
                    debug!(identity = %self.identity, id = message.id, "suppressed own echo");
                    Reconciled::Suppressed
                } else {
                    self.timeline.push(message.clone());
                    Reconciled::Appended(message)
                }
            }
        }
    }

    fn append_system(&mut self, body: String) -> Reconciled {
        let message = ChatMessage::system(self.ids.next_id(), body);
        self.timeline.push(message.clone());
        Reconciled::Appended(message)
    }
}
