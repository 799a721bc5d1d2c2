//! socket.io links: Engine.IO v4 packets over a WebSocket, joined to the
//! default namespace.
//!
//! After the upgrade the server sends an open packet (`0{...}`), the client
//! asks for the namespace with `40` and waits for the server's `40{...}`.
//! From then on events travel as `42["name",payload]`, the server pings with
//! `2` and expects `3` back. The link hands the bare event array to the
//! session, so the event codec never sees Engine.IO framing.

use super::websocket::{websocket_url, WebSocketConnector};
use super::{Connector, FrameSink, FrameStream, Link, TransportError};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::timeout;
use tracing::{debug, trace};
use url::Url;

const DEFAULT_PATH: &str = "/socket.io/";
const ENGINE_IO_VERSION: &str = "4";

type SharedSink = Arc<AsyncMutex<Box<dyn FrameSink>>>;

/// Body of the Engine.IO open packet. Only the fields the client acts on.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenPacket {
    sid: String,
    ping_interval: u64,
    ping_timeout: u64,
}

#[derive(Debug, Deserialize)]
struct ConnectErrorBody {
    message: String,
}

/// One Engine.IO packet, with socket.io packets for the default namespace
/// unpacked.
#[derive(Debug, PartialEq, Eq)]
enum Packet<'a> {
    Open(&'a str),
    Close,
    Ping,
    Pong,
    Connect,
    Disconnect,
    /// The JSON event array, ack id stripped.
    Event(&'a str),
    ConnectError(&'a str),
    Other,
}

fn parse_packet(text: &str) -> Packet<'_> {
    match text.as_bytes().first() {
        Some(b'0') => Packet::Open(&text[1..]),
        Some(b'1') => Packet::Close,
        Some(b'2') => Packet::Ping,
        Some(b'3') => Packet::Pong,
        Some(b'4') => parse_socket_packet(&text[1..]),
        _ => Packet::Other,
    }
}

fn parse_socket_packet(body: &str) -> Packet<'_> {
    let (Some(&kind), Some(rest)) = (body.as_bytes().first(), body.get(1..)) else {
        return Packet::Other;
    };
    // Packets for other namespaces carry a `/nsp,` prefix.
    if rest.starts_with('/') {
        return Packet::Other;
    }
    match kind {
        b'0' => Packet::Connect,
        b'1' => Packet::Disconnect,
        b'2' => Packet::Event(rest.trim_start_matches(|c: char| c.is_ascii_digit())),
        b'4' => Packet::ConnectError(rest),
        _ => Packet::Other,
    }
}

fn connect_error_message(body: &str) -> String {
    match serde_json::from_str::<ConnectErrorBody>(body) {
        Ok(error) => error.message,
        Err(_) => body.to_string(),
    }
}

/// Maps a chat endpoint to its Engine.IO WebSocket URL. A bare host gets the
/// default `/socket.io/` path; an explicit path is kept.
pub fn engine_io_url(endpoint: &Url) -> Result<Url, TransportError> {
    let mut url = websocket_url(endpoint)?;
    if url.path() == "/" {
        url.set_path(DEFAULT_PATH);
    }
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "EIO" && key != "transport")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("EIO", ENGINE_IO_VERSION)
        .append_pair("transport", "websocket");
    Ok(url)
}

/// Opens chat links against a socket.io server.
#[derive(Debug, Clone)]
pub struct SocketIoConnector {
    websocket: WebSocketConnector,
    handshake_timeout: Duration,
}

impl SocketIoConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            websocket: WebSocketConnector::new(connect_timeout),
            handshake_timeout: connect_timeout,
        }
    }
}

impl Default for SocketIoConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Connector for SocketIoConnector {
    async fn connect(&self, endpoint: &Url) -> Result<Link, TransportError> {
        let url = engine_io_url(endpoint)?;
        let Link { sink, mut stream } = self.websocket.connect(&url).await?;
        let sink: SharedSink = Arc::new(AsyncMutex::new(sink));

        let open = match timeout(self.handshake_timeout, handshake(&sink, stream.as_mut())).await {
            Ok(Ok(open)) => open,
            Ok(Err(err)) => {
                let _ = sink.lock().await.close().await;
                return Err(err);
            }
            Err(_) => {
                let _ = sink.lock().await.close().await;
                return Err(TransportError::ConnectTimeout {
                    endpoint: url.to_string(),
                    timeout: self.handshake_timeout,
                });
            }
        };
        debug!(url = %url, sid = %open.sid, "socket.io namespace joined");

        let liveness = Duration::from_millis(open.ping_interval.saturating_add(open.ping_timeout));
        Ok(Link::new(
            SocketIoSink {
                inner: Arc::clone(&sink),
            },
            SocketIoStream {
                inner: stream,
                sink,
                liveness,
                pong_owed: false,
            },
        ))
    }
}

async fn next_packet(stream: &mut dyn FrameStream) -> Result<String, TransportError> {
    match stream.next_frame().await {
        Some(result) => result,
        None => Err(TransportError::Closed),
    }
}

async fn handshake(
    sink: &SharedSink,
    stream: &mut dyn FrameStream,
) -> Result<OpenPacket, TransportError> {
    let first = next_packet(stream).await?;
    let open = match parse_packet(&first) {
        Packet::Open(body) => serde_json::from_str::<OpenPacket>(body)
            .map_err(|err| TransportError::Handshake(format!("bad open packet: {err}")))?,
        _ => {
            return Err(TransportError::Handshake(format!(
                "expected an open packet, got {first:?}"
            )))
        }
    };
    sink.lock().await.send("40".to_string()).await?;

    loop {
        let text = next_packet(stream).await?;
        match parse_packet(&text) {
            Packet::Connect => return Ok(open),
            Packet::Ping => sink.lock().await.send("3".to_string()).await?,
            Packet::ConnectError(body) => {
                return Err(TransportError::Handshake(connect_error_message(body)))
            }
            Packet::Close | Packet::Disconnect => return Err(TransportError::Closed),
            _ => trace!(packet = %text, "ignoring packet before namespace connect"),
        }
    }
}

struct SocketIoSink {
    inner: SharedSink,
}

#[async_trait]
impl FrameSink for SocketIoSink {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.inner.lock().await.send(format!("42{frame}")).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let mut sink = self.inner.lock().await;
        if let Err(err) = sink.send("41".to_string()).await {
            debug!(error = %err, "socket.io disconnect packet not sent");
        }
        sink.close().await
    }
}

struct SocketIoStream {
    inner: Box<dyn FrameStream>,
    sink: SharedSink,
    liveness: Duration,
    /// Set while a pong is outstanding, so a cancelled read still answers
    /// the ping on the next call.
    pong_owed: bool,
}

#[async_trait]
impl FrameStream for SocketIoStream {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            if self.pong_owed {
                if let Err(err) = self.sink.lock().await.send("3".to_string()).await {
                    return Some(Err(err));
                }
                self.pong_owed = false;
            }

            let text = match timeout(self.liveness, self.inner.next_frame()).await {
                Ok(Some(Ok(text))) => text,
                Ok(Some(Err(err))) => return Some(Err(err)),
                Ok(None) => return None,
                Err(_) => {
                    return Some(Err(TransportError::Unavailable(format!(
                        "no ping from server within {:?}",
                        self.liveness
                    ))))
                }
            };

            match parse_packet(&text) {
                Packet::Event(payload) => return Some(Ok(payload.to_string())),
                Packet::Ping => self.pong_owed = true,
                Packet::Close | Packet::Disconnect => {
                    debug!("server ended the socket.io session");
                    return None;
                }
                Packet::ConnectError(body) => {
                    return Some(Err(TransportError::Unavailable(connect_error_message(
                        body,
                    ))))
                }
                Packet::Open(_) | Packet::Pong | Packet::Connect | Packet::Other => {
                    trace!(packet = %text, "ignoring engine.io packet")
                }
            }
        }
    }
}
