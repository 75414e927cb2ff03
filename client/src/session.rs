use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tokio::task::JoinHandle;

use scrim_common::event::ServerEvent;
use scrim_common::identity::UserId;
use scrim_common::message::ConversationSummary;

use crate::bus::EventBus;
use crate::cart::CartStore;
use crate::conversation::ConversationController;
use crate::error::ClientError;
use crate::rest::MessageApi;
use crate::transport::{OfflineTransport, PushTransport, WsTransport};

/// Connection settings for one signed-in session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// REST base url, e.g. `http://host/api`.
    pub api_url: String,
    /// Push endpoint, e.g. `ws://host/ws`. `None` runs REST-only.
    pub ws_url: Option<String>,
    /// Bearer credential for both channels.
    pub token: String,
    /// The signed-in user.
    pub user_id: UserId,
}

/// Everything one signed-in client session owns: the REST client, the
/// singleton push transport and its event bus, the cart store, and the
/// set of open conversations with live unread accounting.
pub struct Session {
    me: UserId,
    api: Arc<MessageApi>,
    transport: Arc<dyn PushTransport>,
    bus: EventBus,
    cart: CartStore,
    open_peers: Arc<DashSet<UserId>>,
    unread: Arc<DashMap<UserId, u32>>,
    unread_task: JoinHandle<()>,
}

impl Session {
    /// Establish a session. A failed WebSocket connect is not fatal:
    /// the session comes up REST-only and sends fall back accordingly.
    pub async fn connect(config: SessionConfig) -> Session {
        let bus = EventBus::new();
        let api = Arc::new(MessageApi::new(&config.api_url, &config.token));

        let transport: Arc<dyn PushTransport> = match &config.ws_url {
            Some(url) => match WsTransport::connect(url, &config.token, bus.clone()).await {
                Ok(transport) => Arc::new(transport),
                Err(err) => {
                    tracing::warn!("push channel unavailable, running REST-only: {err}");
                    Arc::new(OfflineTransport)
                }
            },
            None => Arc::new(OfflineTransport),
        };

        let open_peers: Arc<DashSet<UserId>> = Arc::new(DashSet::new());
        let unread: Arc<DashMap<UserId, u32>> = Arc::new(DashMap::new());

        // Live unread accounting: messages for conversations that are
        // not open bump their counter; open ones are read on arrival.
        let mut events = bus.subscribe();
        let task_open = open_peers.clone();
        let task_unread = unread.clone();
        let unread_task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ServerEvent::NewMessage { sender_id, .. }) => {
                        if !task_open.contains(&sender_id) {
                            *task_unread.entry(sender_id).or_insert(0) += 1;
                        }
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!("unread accounting dropped {missed} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Session {
            me: config.user_id,
            api,
            transport,
            bus,
            cart: CartStore::new(),
            open_peers,
            unread,
            unread_task,
        }
    }

    pub fn me(&self) -> &UserId {
        &self.me
    }

    /// The session cart. Exactly one per session.
    pub fn cart(&self) -> &CartStore {
        &self.cart
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn transport(&self) -> &Arc<dyn PushTransport> {
        &self.transport
    }

    pub fn transport_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Live unread count for a peer (messages received over the push
    /// channel while that conversation was not open).
    pub fn unread_count(&self, peer: &UserId) -> u32 {
        self.unread.get(peer).map(|c| *c).unwrap_or(0)
    }

    /// Fetch the conversation list, overlaying live unread counts on the
    /// server's snapshot.
    pub async fn conversations(&self) -> Result<Vec<ConversationSummary>, ClientError> {
        let mut list = self.api.conversations().await?;
        for summary in &mut list {
            if self.open_peers.contains(&summary.peer_id) {
                summary.unread = 0;
            } else {
                // Events that arrived after the server built its snapshot.
                summary.unread += self.unread_count(&summary.peer_id);
            }
        }
        Ok(list)
    }

    /// Open a conversation with `peer` and reset its unread counter.
    /// Opening the same peer twice returns independent controllers; the
    /// caller is expected to close the old one first.
    pub fn open_conversation(&self, peer: UserId) -> ConversationController {
        self.open_peers.insert(peer.clone());
        self.unread.insert(peer.clone(), 0);
        ConversationController::open(
            self.me.clone(),
            peer,
            self.api.clone(),
            self.transport.clone(),
            &self.bus,
        )
    }

    /// Close a conversation, discarding its state. The next open starts
    /// over from the history fetch.
    pub fn close_conversation(&self, conversation: ConversationController) {
        self.open_peers.remove(conversation.peer());
        drop(conversation);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.unread_task.abort();
    }
}
