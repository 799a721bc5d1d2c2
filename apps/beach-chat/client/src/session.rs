//! Connection lifecycle for one chat view.
//!
//! A session is either `Closed` or `Open` under one identity. Opening spawns a
//! driver task that owns the link: it connects, flushes queued events (the
//! `join` handshake first), and forwards decoded server events back to the
//! session. Closing stops the driver, which disconnects the link exactly once.
//! A link that ends on its own puts the session back to `Closed` as soon as
//! the end is observed.

use crate::transport::{Connector, Link};
use beach_chat_core::{
    decode_server_event, encode_client_event, ClientEvent, ServerEvent, SessionIdentity,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Open(SessionIdentity),
}

/// Resolves once the driver has written the frame; errors if the link went
/// away first.
pub type WriteReceipt = oneshot::Receiver<()>;

struct Outbound {
    event: ClientEvent,
    written: Option<oneshot::Sender<()>>,
}

struct OpenLink {
    identity: SessionIdentity,
    outbound: mpsc::UnboundedSender<Outbound>,
    inbound: mpsc::UnboundedReceiver<ServerEvent>,
    shutdown: Option<oneshot::Sender<()>>,
    driver: JoinHandle<()>,
}

impl OpenLink {
    fn signal_shutdown(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

pub struct ConnectionSession {
    connector: Arc<dyn Connector>,
    endpoint: Url,
    link: Option<OpenLink>,
}

impl ConnectionSession {
    pub fn new(connector: Arc<dyn Connector>, endpoint: Url) -> Self {
        Self {
            connector,
            endpoint,
            link: None,
        }
    }

    pub fn state(&self) -> SessionState {
        match &self.link {
            Some(link) => SessionState::Open(link.identity.clone()),
            None => SessionState::Closed,
        }
    }

    pub fn identity(&self) -> Option<&SessionIdentity> {
        self.link.as_ref().map(|link| &link.identity)
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    /// Opens a link under `identity` and queues the `join` handshake.
    ///
    /// Returns before the transport connects. Re-opening under the same
    /// identity is a no-op while the link is alive; a different identity, or
    /// a link whose driver has already exited, gets a fresh link. Must be
    /// called from within a tokio runtime.
    pub fn open(&mut self, identity: SessionIdentity) {
        if let Some(link) = &self.link {
            if link.identity == identity && !link.driver.is_finished() {
                return;
            }
        }
        self.close();

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        // Queued before the driver starts, so it is always the first frame.
        let _ = outbound_tx.send(Outbound {
            event: ClientEvent::Join(identity.as_str().to_string()),
            written: None,
        });

        let driver = tokio::spawn(drive(
            Arc::clone(&self.connector),
            self.endpoint.clone(),
            identity.clone(),
            outbound_rx,
            inbound_tx,
            shutdown_rx,
        ));
        debug!(identity = %identity, endpoint = %self.endpoint, "chat session opened");

        self.link = Some(OpenLink {
            identity,
            outbound: outbound_tx,
            inbound: inbound_rx,
            shutdown: Some(shutdown_tx),
            driver,
        });
    }

    /// Tears the link down. Returns `false` if the session was already closed.
    pub fn close(&mut self) -> bool {
        let Some(mut link) = self.link.take() else {
            return false;
        };
        link.signal_shutdown();
        debug!(identity = %link.identity, "chat session closed");
        true
    }

    /// Like [`close`](Self::close), but returns only once the driver has
    /// disconnected the link, so the transport's goodbye reaches the server.
    pub async fn shutdown(&mut self) -> bool {
        let Some(mut link) = self.link.take() else {
            return false;
        };
        link.signal_shutdown();
        if let Err(err) = link.driver.await {
            warn!(identity = %link.identity, error = %err, "session driver did not finish cleanly");
        }
        debug!(identity = %link.identity, "chat session shut down");
        true
    }

    /// Queues an event for the server without waiting on the transport.
    /// `None` when the session is closed.
    pub fn emit(&self, event: ClientEvent) -> Option<WriteReceipt> {
        let link = self.link.as_ref()?;
        let (written_tx, written_rx) = oneshot::channel();
        link.outbound
            .send(Outbound {
                event,
                written: Some(written_tx),
            })
            .ok()?;
        Some(written_rx)
    }

    /// Next server event for the current link. `None` when closed or once
    /// the link has ended; an ended link leaves the session `Closed`.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        let link = self.link.as_mut()?;
        let event = link.inbound.recv().await;
        if event.is_none() {
            if let Some(link) = self.link.take() {
                debug!(identity = %link.identity, "chat link ended");
            }
        }
        event
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        self.close();
    }
}

async fn drive(
    connector: Arc<dyn Connector>,
    endpoint: Url,
    identity: SessionIdentity,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    inbound: mpsc::UnboundedSender<ServerEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let link = tokio::select! {
        biased;
        _ = &mut shutdown => {
            debug!(identity = %identity, "session closed before the link connected");
            return;
        }
        result = connector.connect(&endpoint) => match result {
            Ok(link) => link,
            Err(err) => {
                warn!(identity = %identity, endpoint = %endpoint, error = %err, "chat server unavailable");
                return;
            }
        },
    };
    let Link {
        mut sink,
        mut stream,
    } = link;

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            next = outbound.recv() => {
                let Some(Outbound { event, written }) = next else {
                    break;
                };
                match encode_client_event(&event) {
                    Ok(frame) => {
                        if let Err(err) = sink.send(frame).await {
                            warn!(identity = %identity, error = %err, "chat link write failed");
                            break;
                        }
                        trace!(identity = %identity, ?event, "event written");
                    }
                    Err(err) => warn!(identity = %identity, error = %err, "dropping outbound event"),
                }
                if let Some(written) = written {
                    let _ = written.send(());
                }
            }
            frame = stream.next_frame() => match frame {
                Some(Ok(text)) => match decode_server_event(&text) {
                    Ok(event) => {
                        trace!(identity = %identity, event = event.name(), "event received");
                        if inbound.send(event).is_err() {
                            break;
                        }
                    }
                    Err(err) => debug!(identity = %identity, error = %err, "ignoring server frame"),
                },
                Some(Err(err)) => {
                    warn!(identity = %identity, error = %err, "chat link failed");
                    break;
                }
                None => {
                    debug!(identity = %identity, "chat server closed the link");
                    break;
                }
            },
        }
    }

    if let Err(err) = sink.close().await {
        debug!(identity = %identity, error = %err, "error while disconnecting");
    }
}
