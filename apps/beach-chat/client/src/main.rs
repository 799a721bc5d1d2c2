mod telemetry;

use anyhow::{Context, Result};
use beach_chat_client::room::route_line;
use beach_chat_client::{ChatView, Cli, ClientConfig, ConnectionSession, ErrorSink, ViewUpdate};
use beach_chat_core::{ChatMessage, Direction, Reconciled, SessionIdentity};
use clap::Parser;
use futures_util::future::{join_all, select_all};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    telemetry::init()?;

    let cli = Cli::parse();
    let config = ClientConfig::try_from(cli)?;
    info!(
        server_url = %config.server_url,
        transport = ?config.transport,
        users = config.users.len(),
        "starting beach-chat room"
    );

    run_room(config).await
}

async fn run_room(config: ClientConfig) -> Result<()> {
    let connector = config.connector();
    let mut views: Vec<ChatView> = config
        .users
        .iter()
        .map(|identity| {
            let label = identity.to_string();
            let errors: Arc<dyn ErrorSink> =
                Arc::new(move |message: &str| eprintln!("[{label}] error: {message}"));
            let session = ConnectionSession::new(Arc::clone(&connector), config.server_url.clone());
            let mut view = ChatView::new(identity.clone(), session, errors);
            view.activate();
            view
        })
        .collect();
    let mut live = vec![true; views.len()];

    eprintln!("type `@<user or number> <text>` to send; a bare line sends as the first user");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            (index, update) = next_update(&mut views, &live) => match update {
                Some(update) => render(&views[index], update),
                None => {
                    live[index] = false;
                    eprintln!("[{}] disconnected", views[index].identity());
                    if live.iter().all(|alive| !alive) {
                        break;
                    }
                }
            },
            line = lines.next_line() => match line.context("failed to read stdin")? {
                Some(line) => submit_line(&mut views, &config.users, &line),
                None => break,
            },
        }
    }

    let goodbyes = join_all(views.iter_mut().map(|view| view.shutdown()));
    if tokio::time::timeout(SHUTDOWN_GRACE, goodbyes).await.is_err() {
        warn!("chat links did not close within {SHUTDOWN_GRACE:?}");
    }
    Ok(())
}

async fn next_update(views: &mut [ChatView], live: &[bool]) -> (usize, Option<ViewUpdate>) {
    let pumps: Vec<_> = views
        .iter_mut()
        .enumerate()
        .filter(|(index, _)| live[*index])
        .map(|(index, view)| Box::pin(async move { (index, view.pump().await) }))
        .collect();
    if pumps.is_empty() {
        return std::future::pending().await;
    }
    let (result, _, _) = select_all(pumps).await;
    result
}

fn submit_line(views: &mut [ChatView], users: &[SessionIdentity], line: &str) {
    let Some((index, text)) = route_line(users, line) else {
        eprintln!("no user matches {line:?}");
        return;
    };

    let view = &mut views[index];
    view.set_draft(text);
    if view.submit_draft().is_some() && view.take_scroll_request() {
        if let Some(latest) = view.timeline().last() {
            print_message(view, latest);
        }
    }
}

fn render(view: &ChatView, update: ViewUpdate) {
    match update {
        ViewUpdate::Timeline(Reconciled::Replaced { len }) => {
            println!("[{}] -- history ({len} messages) --", view.identity());
            for message in view.timeline() {
                print_message(view, message);
            }
        }
        ViewUpdate::Timeline(Reconciled::Appended(message)) => print_message(view, &message),
        ViewUpdate::Timeline(Reconciled::Suppressed | Reconciled::Conflict(_))
        | ViewUpdate::SendSettled { .. } => {}
    }
}

fn print_message(view: &ChatView, message: &ChatMessage) {
    let marker = if message.is_system() {
        '*'
    } else {
        match message.direction(view.identity()) {
            Direction::Sent => '>',
            Direction::Received => '<',
        }
    };
    println!(
        "[{}] {marker} {}: {}",
        view.identity(),
        message.sender,
        message.body
    );
}
