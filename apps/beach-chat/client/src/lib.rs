//! Client side of Beach chat: opens a connection per chat view, reconciles
//! server events into that view's timeline, and latches outbound sends.

pub mod config;
pub mod room;
pub mod session;
pub mod transport;
pub mod view;

pub use config::{Cli, ClientConfig, Command, TransportKind};
pub use session::{ConnectionSession, SessionState, WriteReceipt};
pub use transport::{Connector, SocketIoConnector, TransportError, WebSocketConnector};
pub use view::{ChatView, ErrorSink, ViewUpdate};
