use super::{Connector, FrameSink, FrameStream, Link, TransportError};
use async_trait::async_trait;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{error::ProtocolError, Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::debug;
use url::Url;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens chat links over a plain WebSocket: one text frame per event array,
/// no Engine.IO framing. Also the carrier for [`super::SocketIoConnector`].
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &Url) -> Result<Link, TransportError> {
        let url = websocket_url(endpoint)?;
        let (socket, _) = match timeout(self.connect_timeout, connect_async(url.as_str())).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                return Err(TransportError::Unavailable(format!(
                    "websocket connect to {url} failed: {err}"
                )))
            }
            Err(_) => {
                return Err(TransportError::ConnectTimeout {
                    endpoint: url.to_string(),
                    timeout: self.connect_timeout,
                })
            }
        };
        debug!(url = %url, "chat websocket connected");
        let (write, read) = socket.split();
        Ok(Link::new(WsSink { inner: write }, WsStream { inner: read }))
    }
}

/// Normalises a configured endpoint to a WebSocket URL: `http` becomes
/// `ws`, `https` becomes `wss`, fragments are dropped.
pub fn websocket_url(endpoint: &Url) -> Result<Url, TransportError> {
    let scheme = match endpoint.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => {
            return Err(TransportError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: format!("unsupported scheme {other}"),
            })
        }
    };
    let mut url = endpoint.clone();
    url.set_scheme(scheme)
        .map_err(|_| TransportError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: "cannot switch to a websocket scheme".into(),
        })?;
    url.set_fragment(None);
    Ok(url)
}

struct WsSink {
    inner: SplitSink<Socket, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.inner
            .send(Message::Text(frame))
            .await
            .map_err(map_ws_error)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.inner.close().await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(err) => Err(map_ws_error(err)),
        }
    }
}

struct WsStream {
    inner: SplitStream<Socket>,
}

#[async_trait]
impl FrameStream for WsStream {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(data)) => match String::from_utf8(data) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => debug!("ignoring non-utf8 binary frame"),
                },
                Ok(Message::Close(_)) => return None,
                Ok(_) => {}
                Err(
                    WsError::ConnectionClosed
                    | WsError::AlreadyClosed
                    | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake),
                ) => return None,
                Err(err) => return Some(Err(map_ws_error(err))),
            }
        }
    }
}

fn map_ws_error(err: WsError) -> TransportError {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
        other => TransportError::Unavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn http_endpoints_become_websocket_urls() {
        assert_eq!(
            websocket_url(&url("http://localhost:8080/ws#frag")).unwrap().as_str(),
            "ws://localhost:8080/ws"
        );
        assert_eq!(
            websocket_url(&url("https://chat.example.com/")).unwrap().as_str(),
            "wss://chat.example.com/"
        );
        assert_eq!(
            websocket_url(&url("ws://127.0.0.1:9000")).unwrap().as_str(),
            "ws://127.0.0.1:9000/"
        );
    }

    #[test]
    fn other_schemes_are_rejected() {
        assert!(matches!(
            websocket_url(&url("ftp://localhost/")),
            Err(TransportError::InvalidEndpoint { .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        // Port 9 (discard) is almost never listening on loopback.
        let connector = WebSocketConnector::new(Duration::from_secs(2));
        let result = connector.connect(&url("ws://127.0.0.1:9/")).await;
        assert!(matches!(
            result,
            Err(TransportError::Unavailable(_)) | Err(TransportError::ConnectTimeout { .. })
        ));
    }
}
