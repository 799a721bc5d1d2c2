//! In-memory links. The server side is driven by hand, which makes this the
//! transport for tests and for embedding the client next to an in-process
//! server.

use super::{Connector, FrameSink, FrameStream, Link, TransportError};
use async_trait::async_trait;
use beach_chat_core::{decode_client_event, encode_server_event, ClientEvent, ServerEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

#[derive(Debug, Default)]
struct LinkCounters {
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

/// Creates a connector and the server end that accepts its links.
pub fn local_pair() -> (LocalConnector, LocalServer) {
    let (accept_tx, accept_rx) = mpsc::unbounded_channel();
    let counters = Arc::new(LinkCounters::default());
    (
        LocalConnector {
            accept_tx,
            counters: Arc::clone(&counters),
        },
        LocalServer {
            accept_rx,
            counters,
        },
    )
}

#[derive(Clone)]
pub struct LocalConnector {
    accept_tx: mpsc::UnboundedSender<LocalPeer>,
    counters: Arc<LinkCounters>,
}

#[async_trait]
impl Connector for LocalConnector {
    async fn connect(&self, endpoint: &Url) -> Result<Link, TransportError> {
        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let peer = LocalPeer {
            endpoint: endpoint.clone(),
            from_client: client_rx,
            to_client: server_tx,
        };
        self.accept_tx
            .send(peer)
            .map_err(|_| TransportError::Unavailable("local server is gone".into()))?;
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        debug!(endpoint = %endpoint, "local link connected");
        Ok(Link::new(
            LocalSink {
                tx: Some(client_tx),
                counters: Arc::clone(&self.counters),
            },
            LocalStream { rx: server_rx },
        ))
    }
}

/// Accepting end of a [`LocalConnector`].
pub struct LocalServer {
    accept_rx: mpsc::UnboundedReceiver<LocalPeer>,
    counters: Arc<LinkCounters>,
}

impl LocalServer {
    /// Waits for the next client link. `None` once every connector is dropped.
    pub async fn accept(&mut self) -> Option<LocalPeer> {
        self.accept_rx.recv().await
    }

    pub fn connects(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    /// Number of links the client side has closed.
    pub fn disconnects(&self) -> usize {
        self.counters.disconnects.load(Ordering::SeqCst)
    }
}

/// Server view of one client link.
pub struct LocalPeer {
    pub endpoint: Url,
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<String>,
}

impl LocalPeer {
    /// Next raw frame from the client; `None` once the client disconnected.
    pub async fn recv_frame(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next decoded client event. Frames that do not decode end the read.
    pub async fn recv_event(&mut self) -> Option<ClientEvent> {
        let frame = self.recv_frame().await?;
        decode_client_event(&frame).ok()
    }

    /// Pushes a raw frame to the client. `false` once the client side is gone.
    pub fn push_frame(&self, frame: impl Into<String>) -> bool {
        self.to_client.send(frame.into()).is_ok()
    }

    pub fn push(&self, event: &ServerEvent) -> bool {
        match encode_server_event(event) {
            Ok(frame) => self.push_frame(frame),
            Err(_) => false,
        }
    }
}

struct LocalSink {
    tx: Option<mpsc::UnboundedSender<String>>,
    counters: Arc<LinkCounters>,
}

#[async_trait]
impl FrameSink for LocalSink {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.tx.take().is_some() {
            self.counters.disconnects.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

struct LocalStream {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl FrameStream for LocalStream {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        self.rx.recv().await.map(Ok)
    }
}
