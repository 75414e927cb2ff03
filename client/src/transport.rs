use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsFrame;

use scrim_common::event::{ClientCommand, ServerEvent};
use scrim_common::identity::UserId;
use scrim_common::message::ClientKey;

use crate::bus::EventBus;
use crate::error::ClientError;

/// The live push channel shared by every conversation in a session.
///
/// Publishing is enqueue-only: callers never wait for delivery or
/// acknowledgment. `Err` means the command was not queued at all.
pub trait PushTransport: Send + Sync {
    /// Whether the channel is currently usable.
    fn is_connected(&self) -> bool;

    /// Queue a command for delivery.
    fn publish(&self, command: ClientCommand) -> Result<(), ClientError>;

    fn send_message(
        &self,
        receiver: &UserId,
        content: &str,
        client_key: ClientKey,
    ) -> Result<(), ClientError> {
        self.publish(ClientCommand::SendMessage {
            receiver_id: receiver.clone(),
            content: content.to_string(),
            client_key,
        })
    }

    fn typing_start(&self, peer: &UserId) -> Result<(), ClientError> {
        self.publish(ClientCommand::TypingStart {
            receiver_id: peer.clone(),
        })
    }

    fn typing_stop(&self, peer: &UserId) -> Result<(), ClientError> {
        self.publish(ClientCommand::TypingStop {
            receiver_id: peer.clone(),
        })
    }

    fn mark_read(&self, peer: &UserId) -> Result<(), ClientError> {
        self.publish(ClientCommand::MarkRead {
            peer_id: peer.clone(),
        })
    }
}

/// WebSocket-backed transport.
///
/// One writer task drains the command queue onto the socket; one reader
/// task parses inbound frames into [`ServerEvent`]s and publishes them on
/// the session bus. The connectivity flag flips off as soon as either
/// side of the socket dies.
pub struct WsTransport {
    connected: Arc<AtomicBool>,
    commands: mpsc::UnboundedSender<ClientCommand>,
}

impl WsTransport {
    /// Connect to the push endpoint and spawn the socket tasks.
    pub async fn connect(url: &str, token: &str, bus: EventBus) -> Result<Self, ClientError> {
        let request_url = format!("{url}?token={token}");
        let (stream, _) = tokio_tungstenite::connect_async(request_url.as_str())
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        tracing::info!(%url, "push channel connected");

        let (mut write, mut read) = stream.split();
        let connected = Arc::new(AtomicBool::new(true));
        let (commands, mut pending) = mpsc::unbounded_channel::<ClientCommand>();

        let writer_connected = connected.clone();
        tokio::spawn(async move {
            while let Some(command) = pending.recv().await {
                let frame = match serde_json::to_string(&command) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!("dropping unencodable command: {e}");
                        continue;
                    }
                };
                if write.send(WsFrame::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            writer_connected.store(false, Ordering::SeqCst);
        });

        let reader_connected = connected.clone();
        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(WsFrame::Text(text)) => {
                        match serde_json::from_str::<ServerEvent>(text.as_str()) {
                            Ok(event) => bus.publish(event),
                            Err(e) => tracing::warn!("unparseable push frame: {e}"),
                        }
                    }
                    Ok(WsFrame::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("push channel error: {e}");
                        break;
                    }
                }
            }
            reader_connected.store(false, Ordering::SeqCst);
            tracing::info!("push channel closed");
        });

        Ok(WsTransport {
            connected,
            commands,
        })
    }
}

impl PushTransport for WsTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn publish(&self, command: ClientCommand) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::TransportClosed);
        }
        self.commands
            .send(command)
            .map_err(|_| ClientError::TransportClosed)
    }
}

/// Stand-in transport for sessions without a live channel. Every send
/// reports [`ClientError::TransportClosed`], pushing callers onto the
/// REST fallback.
pub struct OfflineTransport;

impl PushTransport for OfflineTransport {
    fn is_connected(&self) -> bool {
        false
    }

    fn publish(&self, _command: ClientCommand) -> Result<(), ClientError> {
        Err(ClientError::TransportClosed)
    }
}
