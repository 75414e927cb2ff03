use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use scrim_common::event::ServerEvent;
use scrim_common::identity::UserId;
use scrim_common::message::{ClientKey, Message, MessageId};

use crate::bus::EventBus;
use crate::error::ClientError;
use crate::rest::MessageApi;
use crate::transport::PushTransport;
use crate::typing::{TypingSignaler, TYPING_EXPIRY};

/// Where a conversation instance is in its lifecycle. "Closed" is not a
/// variant: a closed conversation is a dropped controller, and the next
/// open starts a fresh instance from `Loading`.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationPhase {
    /// History fetch in flight.
    Loading,
    /// Messages populated; sends and live events are applied.
    Ready,
    /// History fetch failed; retry only by re-opening.
    Error(String),
}

/// Observable snapshot of one open two-party conversation.
#[derive(Debug, Clone)]
pub struct ConversationView {
    pub peer: UserId,
    pub phase: ConversationPhase,
    pub messages: Vec<Message>,
    pub peer_typing: bool,
    /// A REST fallback send is in flight.
    pub sending: bool,
    /// Inline error from the last failed send, cleared by the next
    /// successful one.
    pub send_error: Option<String>,
}

impl ConversationView {
    fn loading(peer: UserId) -> Self {
        ConversationView {
            peer,
            phase: ConversationPhase::Loading,
            messages: Vec::new(),
            peer_typing: false,
            sending: false,
            send_error: None,
        }
    }
}

/// One open conversation: reconciles the history fetch, live push
/// events, and locally-originated sends into a single ordered message
/// list, surfaced through a watch channel.
///
/// Dropping the controller tears the conversation down: the event
/// subscription and timers go away, and any still-in-flight response is
/// ignored.
pub struct ConversationController {
    me: UserId,
    peer: UserId,
    api: Arc<MessageApi>,
    transport: Arc<dyn PushTransport>,
    view: watch::Sender<ConversationView>,
    signaler: TypingSignaler,
    task: JoinHandle<()>,
}

impl ConversationController {
    /// Open a conversation with `peer`: signal mark-as-read, start the
    /// history fetch, and begin filtering the shared event stream.
    pub fn open(
        me: UserId,
        peer: UserId,
        api: Arc<MessageApi>,
        transport: Arc<dyn PushTransport>,
        bus: &EventBus,
    ) -> Self {
        // Read receipt goes out immediately; no acknowledgment awaited.
        if let Err(e) = transport.mark_read(&peer) {
            tracing::debug!(%peer, "mark-read not sent: {e}");
        }

        let (view, _) = watch::channel(ConversationView::loading(peer.clone()));
        let events = bus.subscribe();
        let signaler = TypingSignaler::spawn(peer.clone(), transport.clone());

        let task = tokio::spawn(run(
            me.clone(),
            peer.clone(),
            api.clone(),
            view.clone(),
            events,
            TYPING_EXPIRY,
        ));

        ConversationController {
            me,
            peer,
            api,
            transport,
            view,
            signaler,
            task,
        }
    }

    pub fn peer(&self) -> &UserId {
        &self.peer
    }

    /// Watch the conversation. Receivers see every state change.
    pub fn subscribe(&self) -> watch::Receiver<ConversationView> {
        self.view.subscribe()
    }

    pub fn snapshot(&self) -> ConversationView {
        self.view.borrow().clone()
    }

    /// Report the input box's content after a keystroke, driving the
    /// outbound typing signals.
    pub fn input_changed(&self, text: &str) {
        self.signaler.input_changed(text);
    }

    /// Send a message to the peer.
    ///
    /// Trimmed-empty content and sends outside `Ready` are no-ops. With
    /// the push transport connected the local copy is appended
    /// optimistically and this returns without touching the network;
    /// otherwise the REST fallback runs and the server's copy is
    /// appended on success. A failed fallback sets `send_error` on the
    /// view and appends nothing.
    pub async fn send(&self, content: &str) -> Result<(), ClientError> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(());
        }
        if self.view.borrow().phase != ConversationPhase::Ready {
            return Ok(());
        }

        if self.transport.is_connected() {
            let key = ClientKey::generate();
            match self
                .transport
                .send_message(&self.peer, content, key.clone())
            {
                Ok(()) => {
                    let message =
                        Message::outgoing(self.me.clone(), self.peer.clone(), content, key);
                    self.view.send_modify(|v| {
                        v.send_error = None;
                        v.messages.push(message);
                    });
                    return Ok(());
                }
                // Lost the channel between the check and the send; use REST.
                Err(ClientError::TransportClosed) => {}
                Err(e) => return Err(e),
            }
        }

        self.view.send_modify(|v| v.sending = true);
        match self.api.send(&self.peer, content).await {
            Ok(message) => {
                self.view.send_modify(|v| {
                    v.sending = false;
                    v.send_error = None;
                    v.messages.push(message);
                });
                Ok(())
            }
            Err(err) => {
                tracing::warn!(peer = %self.peer, "send failed: {err}");
                self.view.send_modify(|v| {
                    v.sending = false;
                    v.send_error = Some(err.user_message());
                });
                Err(err)
            }
        }
    }
}

impl Drop for ConversationController {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    me: UserId,
    peer: UserId,
    api: Arc<MessageApi>,
    view: watch::Sender<ConversationView>,
    mut events: broadcast::Receiver<ServerEvent>,
    typing_expiry: Duration,
) {
    match api.history(&peer).await {
        Ok(messages) => {
            view.send_modify(|v| {
                v.phase = ConversationPhase::Ready;
                // The fetch result is authoritative at this point; a push
                // event that raced it may be displaced (accepted
                // limitation, no cross-source reordering).
                v.messages = messages;
            });
        }
        Err(err) => {
            tracing::warn!(%peer, "failed to load history: {err}");
            view.send_modify(|v| v.phase = ConversationPhase::Error(err.user_message()));
        }
    }

    let mut typing_deadline: Option<Instant> = None;
    loop {
        let typing_timer = async move {
            match typing_deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            event = events.recv() => match event {
                Ok(ServerEvent::NewMessage { sender_id, content, timestamp, client_key }) => {
                    let accepted = accepts(
                        &view.borrow().messages,
                        &peer,
                        &sender_id,
                        client_key.as_ref(),
                    );
                    if accepted {
                        let message =
                            pushed_message(sender_id, me.clone(), content, timestamp, client_key);
                        view.send_modify(|v| {
                            v.messages.push(message);
                            // A delivered message implies the peer is done typing it.
                            v.peer_typing = false;
                        });
                        typing_deadline = None;
                    }
                }
                Ok(ServerEvent::TypingStart { user_id }) if user_id == peer => {
                    typing_deadline = Some(Instant::now() + typing_expiry);
                    view.send_modify(|v| v.peer_typing = true);
                }
                Ok(ServerEvent::TypingStop { user_id }) if user_id == peer => {
                    typing_deadline = None;
                    view.send_modify(|v| v.peer_typing = false);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(%peer, "dropped {missed} push events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = typing_timer => {
                typing_deadline = None;
                view.send_modify(|v| v.peer_typing = false);
            }
        }
    }
}

/// Whether a pushed message belongs in this conversation's list: it must
/// come from the peer, and must not be an echo of a message already
/// appended (matching idempotency key).
fn accepts(
    messages: &[Message],
    peer: &UserId,
    sender_id: &UserId,
    client_key: Option<&ClientKey>,
) -> bool {
    if sender_id != peer {
        return false;
    }
    if let Some(key) = client_key {
        if messages.iter().any(|m| m.client_key.as_ref() == Some(key)) {
            return false;
        }
    }
    true
}

fn pushed_message(
    sender: UserId,
    receiver: UserId,
    content: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    client_key: Option<ClientKey>,
) -> Message {
    // Push events carry no persisted id; synthesize a list-unique one.
    let id = match &client_key {
        Some(key) => MessageId(format!("push-{}", key.0)),
        None => MessageId(format!("push-{:016x}", rand::random::<u64>())),
    };
    Message {
        id,
        sender_id: sender,
        receiver_id: receiver,
        content,
        created_at: timestamp,
        sender_name: None,
        sender_avatar: None,
        receiver_name: None,
        receiver_avatar: None,
        client_key,
    }
}
