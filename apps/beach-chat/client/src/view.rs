use crate::session::{ConnectionSession, SessionState, WriteReceipt};
use beach_chat_core::{
    ChatMessage, ClientEvent, Reconciled, SendGuard, ServerEvent, SessionIdentity, Timeline,
    TimelineReconciler,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Receives human-readable errors meant for the user, such as a rejected
/// username.
pub trait ErrorSink: Send + Sync {
    fn report(&self, message: &str);
}

impl<F> ErrorSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn report(&self, message: &str) {
        self(message)
    }
}

/// Something the shell may want to re-render for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewUpdate {
    Timeline(Reconciled),
    /// The in-flight send finished; `written` is false if the link dropped
    /// before the frame went out.
    SendSettled { written: bool },
}

/// One chat pane: a connection session, its timeline and its send latch.
///
/// Everything is mutated through `&mut self` by a single owner, so two views
/// side by side never share state.
pub struct ChatView {
    session: ConnectionSession,
    reconciler: TimelineReconciler,
    guard: SendGuard,
    draft: String,
    pending_write: Option<WriteReceipt>,
    scroll_requested: bool,
    errors: Arc<dyn ErrorSink>,
}

impl ChatView {
    pub fn new(
        identity: SessionIdentity,
        session: ConnectionSession,
        errors: Arc<dyn ErrorSink>,
    ) -> Self {
        Self {
            session,
            reconciler: TimelineReconciler::new(identity),
            guard: SendGuard::new(),
            draft: String::new(),
            pending_write: None,
            scroll_requested: false,
            errors,
        }
    }

    pub fn identity(&self) -> &SessionIdentity {
        self.reconciler.identity()
    }

    pub fn timeline(&self) -> &Timeline {
        self.reconciler.timeline()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn is_sending(&self) -> bool {
        self.guard.is_in_flight()
    }

    /// Opens the session. Also revives a view whose link has ended; an open,
    /// live session is left alone.
    pub fn activate(&mut self) {
        self.session.open(self.reconciler.identity().clone());
    }

    pub fn deactivate(&mut self) {
        self.session.close();
        self.settle_send();
    }

    /// Deactivates and waits for the transport to say goodbye to the server.
    pub async fn shutdown(&mut self) {
        self.session.shutdown().await;
        self.settle_send();
    }

    /// Switches identity. An open session is re-bound under the new name.
    pub fn set_identity(&mut self, identity: SessionIdentity) {
        if self.reconciler.identity() == &identity {
            return;
        }
        self.reconciler.set_identity(identity.clone());
        if self.session.is_open() {
            self.session.open(identity);
            self.settle_send();
        }
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn submit_draft(&mut self) -> Option<ChatMessage> {
        let text = std::mem::take(&mut self.draft);
        let sent = self.submit(&text);
        if sent.is_none() {
            self.draft = text;
        }
        sent
    }

    /// Sends `text` as this view's identity and appends it to the timeline
    /// right away. Blank text, or a send still in flight, makes this a no-op.
    pub fn submit(&mut self, text: &str) -> Option<ChatMessage> {
        let message = match self.guard.begin(text, &mut self.reconciler) {
            Ok(message) => message,
            Err(reason) => {
                debug!(identity = %self.identity(), %reason, "submit ignored");
                return None;
            }
        };

        let receipt = self
            .session
            .emit(ClientEvent::ChatMessage(message.clone()));
        self.reconciler.append_local(message.clone());
        self.draft.clear();
        match receipt {
            Some(receipt) => self.pending_write = Some(receipt),
            None => {
                debug!(identity = %self.identity(), "session closed; message kept locally");
                self.guard.release();
            }
        }
        self.scroll_requested = true;
        Some(message)
    }

    /// Returns `true` once after each successful submit.
    pub fn take_scroll_request(&mut self) -> bool {
        std::mem::take(&mut self.scroll_requested)
    }

    /// Merges one server event into the timeline, routing a username
    /// conflict to the error sink.
    pub fn apply(&mut self, event: ServerEvent) -> Reconciled {
        let outcome = self.reconciler.apply(event);
        if let Reconciled::Conflict(message) = &outcome {
            warn!(identity = %self.identity(), %message, "username rejected by server");
            self.errors.report(message);
        }
        outcome
    }

    /// Waits for the next server event or send completion and applies it.
    /// `None` when the session is closed or its link has ended.
    pub async fn pump(&mut self) -> Option<ViewUpdate> {
        tokio::select! {
            written = wait_written(&mut self.pending_write) => {
                self.pending_write = None;
                self.guard.release();
                Some(ViewUpdate::SendSettled { written })
            }
            event = self.session.next_event() => match event {
                Some(event) => Some(ViewUpdate::Timeline(self.apply(event))),
                None => {
                    self.settle_send();
                    None
                }
            },
        }
    }

    fn settle_send(&mut self) {
        self.pending_write = None;
        self.guard.release();
    }
}

async fn wait_written(slot: &mut Option<WriteReceipt>) -> bool {
    match slot {
        Some(receipt) => receipt.await.is_ok(),
        None => std::future::pending().await,
    }
}
