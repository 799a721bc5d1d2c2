use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use beach_chat_client::{
    ChatView, ConnectionSession, Connector, ErrorSink, SessionState, SocketIoConnector,
    ViewUpdate,
};
use beach_chat_core::{
    decode_client_event, encode_server_event, ChatMessage, ClientEvent, Presence, Reconciled,
    ServerEvent, SessionIdentity, UsernameTaken, SYSTEM_SENDER,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use url::Url;

/// Just enough of a socket.io chat server to exercise the client: one room,
/// a shared backlog, unique usernames, and `chat message` echoed to everyone
/// including the sender. Every connection is pinged once after it joins the
/// namespace.
#[derive(Default)]
struct FakeChatServer {
    next_conn: AtomicU64,
    pongs: AtomicUsize,
    users: Mutex<BTreeSet<String>>,
    history: Mutex<Vec<ChatMessage>>,
    room: Mutex<Option<broadcast::Sender<(Option<u64>, ServerEvent)>>>,
}

impl FakeChatServer {
    fn room(&self) -> broadcast::Sender<(Option<u64>, ServerEvent)> {
        self.room
            .lock()
            .unwrap()
            .get_or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }

    fn active_users(&self) -> BTreeSet<String> {
        self.users.lock().unwrap().clone()
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(server): State<Arc<FakeChatServer>>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, server))
}

type Sink = futures_util::stream::SplitSink<WebSocket, Message>;

async fn send_packet(sink: &mut Sink, packet: impl Into<String>) -> bool {
    sink.send(Message::Text(packet.into())).await.is_ok()
}

async fn send_event(sink: &mut Sink, event: &ServerEvent) -> bool {
    let frame = encode_server_event(event).expect("encode server event");
    send_packet(sink, format!("42{frame}")).await
}

async fn serve_socket(socket: WebSocket, server: Arc<FakeChatServer>) {
    let conn = server.next_conn.fetch_add(1, Ordering::SeqCst);
    let room = server.room();
    let mut events = room.subscribe();
    let (mut sink, mut stream) = socket.split();
    let mut username: Option<String> = None;

    let open = format!(
        r#"0{{"sid":"eio-{conn}","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}}"#
    );
    if !send_packet(&mut sink, open).await {
        return;
    }

    loop {
        tokio::select! {
            frame = stream.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };
                match text.as_str() {
                    "40" => {
                        send_packet(&mut sink, format!(r#"40{{"sid":"sio-{conn}"}}"#)).await;
                        send_packet(&mut sink, "2").await;
                        continue;
                    }
                    "3" => {
                        server.pongs.fetch_add(1, Ordering::SeqCst);
                        continue;
                    }
                    "41" => break,
                    _ => {}
                }
                let Some(Ok(event)) = text.strip_prefix("42").map(decode_client_event) else {
                    continue;
                };
                match event {
                    ClientEvent::Join(name) => {
                        let accepted = username.is_none() && server.users.lock().unwrap().insert(name.clone());
                        if !accepted {
                            let taken = ServerEvent::UsernameTaken(UsernameTaken {
                                message: format!("username {name} is already taken"),
                            });
                            send_event(&mut sink, &taken).await;
                            continue;
                        }
                        username = Some(name.clone());
                        let backlog = server.history.lock().unwrap().clone();
                        send_event(&mut sink, &ServerEvent::MessageHistory(backlog)).await;
                        let joined = Presence::new(name).with_active_users(server.active_users());
                        let _ = room.send((Some(conn), ServerEvent::UserJoined(joined)));
                    }
                    ClientEvent::ChatMessage(message) => {
                        if username.is_none() {
                            continue;
                        }
                        server.history.lock().unwrap().push(message.clone());
                        let _ = room.send((None, ServerEvent::ChatMessage(message)));
                    }
                }
            }
            event = events.recv() => {
                let Ok((skip, event)) = event else { break };
                if username.is_none() || skip == Some(conn) {
                    continue;
                }
                if !send_event(&mut sink, &event).await {
                    break;
                }
            }
        }
    }

    if let Some(name) = username {
        server.users.lock().unwrap().remove(&name);
        let left = Presence::new(name).with_active_users(server.active_users());
        let _ = room.send((Some(conn), ServerEvent::UserLeft(left)));
    }
}

async fn start_server() -> (Url, Arc<FakeChatServer>) {
    let state = Arc::new(FakeChatServer::default());
    let app = Router::new()
        .route("/socket.io/", get(ws_handler))
        .with_state(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake chat server");
    let addr: SocketAddr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let url = Url::parse(&format!("http://{addr}")).expect("server url");
    (url, state)
}

#[derive(Default)]
struct RecordingSink {
    reports: Mutex<Vec<String>>,
}

impl ErrorSink for RecordingSink {
    fn report(&self, message: &str) {
        self.reports.lock().unwrap().push(message.to_string());
    }
}

fn open_view(
    connector: &Arc<dyn Connector>,
    endpoint: &Url,
    name: &str,
) -> (ChatView, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let errors: Arc<dyn ErrorSink> = sink.clone();
    let session = ConnectionSession::new(Arc::clone(connector), endpoint.clone());
    let mut view = ChatView::new(SessionIdentity::new(name), session, errors);
    view.activate();
    (view, sink)
}

async fn pump_until<F>(view: &mut ChatView, mut done: F) -> ViewUpdate
where
    F: FnMut(&ViewUpdate) -> bool,
{
    loop {
        let update = view.pump().await.expect("link ended unexpectedly");
        if done(&update) {
            return update;
        }
    }
}

fn is_history(update: &ViewUpdate) -> bool {
    matches!(update, ViewUpdate::Timeline(Reconciled::Replaced { .. }))
}

fn appended_from(sender: &'static str) -> impl FnMut(&ViewUpdate) -> bool {
    move |update| {
        matches!(
            update,
            ViewUpdate::Timeline(Reconciled::Appended(message)) if message.sender == sender
        )
    }
}

#[test_timeout::tokio_timeout_test(20)]
async fn two_views_chat_through_a_live_server() {
    let (endpoint, server) = start_server().await;
    let connector: Arc<dyn Connector> = Arc::new(SocketIoConnector::new(Duration::from_secs(5)));

    let (mut alice, alice_errors) = open_view(&connector, &endpoint, "alice");
    pump_until(&mut alice, is_history).await;

    let (mut bob, _) = open_view(&connector, &endpoint, "bob");
    pump_until(&mut bob, is_history).await;
    pump_until(&mut alice, appended_from(SYSTEM_SENDER)).await;

    let sent = alice.submit("hi bob").expect("submit accepted");
    assert!(alice.submit("double press").is_none());
    pump_until(&mut alice, |update| {
        matches!(update, ViewUpdate::Timeline(Reconciled::Suppressed))
    })
    .await;

    match pump_until(&mut bob, appended_from("alice")).await {
        ViewUpdate::Timeline(Reconciled::Appended(message)) => assert_eq!(message, sent),
        other => panic!("unexpected update {other:?}"),
    }

    let alice_lines: Vec<(String, String)> = alice
        .timeline()
        .iter()
        .map(|m| (m.sender.clone(), m.body.clone()))
        .collect();
    assert_eq!(
        alice_lines,
        vec![
            (SYSTEM_SENDER.to_string(), "bob joined the chat".to_string()),
            ("alice".to_string(), "hi bob".to_string()),
        ]
    );

    bob.deactivate();
    assert_eq!(bob.session_state(), SessionState::Closed);
    match pump_until(&mut alice, appended_from(SYSTEM_SENDER)).await {
        ViewUpdate::Timeline(Reconciled::Appended(message)) => {
            assert_eq!(message.body, "bob left the chat")
        }
        other => panic!("unexpected update {other:?}"),
    }
    assert!(alice_errors.reports.lock().unwrap().is_empty());
    assert!(server.pongs.load(Ordering::SeqCst) >= 2);
}

#[test_timeout::tokio_timeout_test(20)]
async fn duplicate_username_reports_conflict_and_stays_connected() {
    let (endpoint, _server) = start_server().await;
    let connector: Arc<dyn Connector> = Arc::new(SocketIoConnector::new(Duration::from_secs(5)));

    let (mut first, _) = open_view(&connector, &endpoint, "carol");
    pump_until(&mut first, is_history).await;

    let (mut second, errors) = open_view(&connector, &endpoint, "carol");
    let update = pump_until(&mut second, |update| {
        matches!(update, ViewUpdate::Timeline(Reconciled::Conflict(_)))
    })
    .await;

    assert_eq!(
        update,
        ViewUpdate::Timeline(Reconciled::Conflict(
            "username carol is already taken".into()
        ))
    );
    assert_eq!(
        *errors.reports.lock().unwrap(),
        vec!["username carol is already taken".to_string()]
    );
    assert!(second.timeline().is_empty());
    assert_eq!(
        second.session_state(),
        SessionState::Open(SessionIdentity::new("carol"))
    );
}
