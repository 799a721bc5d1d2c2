//! Shared primitives for the Beach chat client: the message model, the
//! event codec spoken with the chat server, and the synchronous state
//! (timeline reconciliation and send latching) that a chat view owns.
//! Nothing in here performs I/O; the client crate wires it to a transport.

pub mod event;
pub mod ids;
pub mod message;
pub mod send_guard;
pub mod timeline;

pub use event::{
    decode_client_event, decode_server_event, encode_client_event, encode_server_event,
    ClientEvent, CodecError, Presence, ServerEvent, UsernameTaken,
};
pub use ids::IdGenerator;
pub use message::{ChatMessage, Direction, MessageId, SessionIdentity, SYSTEM_SENDER};
pub use send_guard::{SendGuard, SubmitRejection};
pub use timeline::{Reconciled, Timeline, TimelineReconciler};
