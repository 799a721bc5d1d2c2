//! Transport seam between a chat session and the chat server.
//!
//! A [`Connector`] turns an endpoint into a [`Link`]: a sink and a stream of
//! text frames, each frame one encoded event array. The session never sees
//! sockets or packet framing. [`socketio::SocketIoConnector`] speaks to
//! socket.io servers, [`websocket::WebSocketConnector`] sends bare event
//! arrays over a WebSocket, and [`local::LocalConnector`] stays in process.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub mod local;
pub mod socketio;
pub mod websocket;

pub use local::{local_pair, LocalConnector, LocalPeer, LocalServer};
pub use socketio::{engine_io_url, SocketIoConnector};
pub use websocket::{websocket_url, WebSocketConnector};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid chat endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("connecting to {endpoint} timed out after {timeout:?}")]
    ConnectTimeout { endpoint: String, timeout: Duration },
    #[error("socket.io handshake failed: {0}")]
    Handshake(String),
    #[error("chat server unavailable: {0}")]
    Unavailable(String),
    #[error("link closed")]
    Closed,
}

/// Outbound half of a link.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: String) -> Result<(), TransportError>;

    /// Disconnects. Called once, when the owning session shuts the link down.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Inbound half of a link. `None` means the remote side closed it.
#[async_trait]
pub trait FrameStream: Send {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>>;
}

pub struct Link {
    pub sink: Box<dyn FrameSink>,
    pub stream: Box<dyn FrameStream>,
}

impl Link {
    pub fn new(sink: impl FrameSink + 'static, stream: impl FrameStream + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            stream: Box::new(stream),
        }
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &Url) -> Result<Link, TransportError>;
}
