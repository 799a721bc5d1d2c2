use crate::transport::{websocket_url, Connector, SocketIoConnector, WebSocketConnector};
use anyhow::{bail, Context, Result};
use beach_chat_core::SessionIdentity;
use clap::{Parser, Subcommand, ValueEnum};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Debug, Parser)]
#[command(
    name = "beach-chat",
    author,
    version,
    about = "Terminal room for the Beach chat client"
)]
pub struct Cli {
    /// Chat server endpoint (http, https, ws or wss).
    #[arg(
        long,
        env = "BEACH_CHAT_SERVER_URL",
        default_value = "http://localhost:8080",
        global = true
    )]
    pub server_url: String,

    /// Wire protocol spoken with the server.
    #[arg(
        long,
        env = "BEACH_CHAT_TRANSPORT",
        value_enum,
        default_value_t = TransportKind::SocketIo,
        global = true
    )]
    pub transport: TransportKind,

    /// Seconds to wait for the WebSocket handshake before giving up.
    #[arg(
        long,
        env = "BEACH_CHAT_CONNECT_TIMEOUT_SECS",
        default_value_t = 5,
        global = true
    )]
    pub connect_timeout_secs: u64,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// Engine.IO v4 over WebSocket, as socket.io servers expect.
    #[value(name = "socket-io")]
    SocketIo,
    /// One bare event array per WebSocket text frame.
    #[value(name = "websocket")]
    WebSocket,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Open one chat view per user, side by side.
    Room {
        /// Username for a view; repeat for more views.
        #[arg(long = "user", default_values_t = default_users())]
        users: Vec<String>,
    },
}

fn default_users() -> Vec<String> {
    vec!["User A".to_string(), "User B".to_string()]
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: Url,
    pub transport: TransportKind,
    pub connect_timeout: Duration,
    pub users: Vec<SessionIdentity>,
}

impl ClientConfig {
    pub fn connector(&self) -> Arc<dyn Connector> {
        match self.transport {
            TransportKind::SocketIo => Arc::new(SocketIoConnector::new(self.connect_timeout)),
            TransportKind::WebSocket => Arc::new(WebSocketConnector::new(self.connect_timeout)),
        }
    }
}

impl TryFrom<Cli> for ClientConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let server_url = Url::parse(&cli.server_url)
            .with_context(|| format!("invalid server url: {}", cli.server_url))?;
        websocket_url(&server_url)?;

        if cli.connect_timeout_secs == 0 {
            bail!("connect timeout must be at least one second");
        }

        let users = match cli.command {
            Some(Command::Room { users }) => users,
            None => default_users(),
        };
        if users.is_empty() {
            bail!("at least one --user is required");
        }
        if let Some(blank) = users.iter().position(|name| name.trim().is_empty()) {
            bail!("username #{} is blank", blank + 1);
        }

        Ok(ClientConfig {
            server_url,
            transport: cli.transport,
            connect_timeout: Duration::from_secs(cli.connect_timeout_secs),
            users: users.into_iter().map(SessionIdentity::new).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<ClientConfig> {
        let cli = Cli::try_parse_from(std::iter::once("beach-chat").chain(args.iter().copied()))?;
        ClientConfig::try_from(cli)
    }

    #[test]
    fn defaults_open_two_views() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.server_url.as_str(), "http://localhost:8080/");
        assert_eq!(config.transport, TransportKind::SocketIo);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(
            config.users,
            vec![SessionIdentity::new("User A"), SessionIdentity::new("User B")]
        );
    }

    #[test]
    fn room_users_override_defaults() {
        let config = parse(&[
            "--server-url",
            "ws://chat.local:9000",
            "--transport",
            "websocket",
            "room",
            "--user",
            "alice",
            "--user",
            "bob",
        ])
        .unwrap();
        assert_eq!(config.server_url.as_str(), "ws://chat.local:9000/");
        assert_eq!(config.transport, TransportKind::WebSocket);
        assert_eq!(
            config.users,
            vec![SessionIdentity::new("alice"), SessionIdentity::new("bob")]
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse(&["--server-url", "not a url"]).is_err());
        assert!(parse(&["--server-url", "ftp://chat.local"]).is_err());
        assert!(parse(&["--connect-timeout-secs", "0"]).is_err());
        assert!(parse(&["--transport", "long-polling"]).is_err());
        assert!(parse(&["room", "--user", "  "]).is_err());
    }
}
