use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use scrim_common::identity::UserId;

use crate::transport::PushTransport;

/// How long a peer's typing indicator stays visible without a refresh.
pub const TYPING_EXPIRY: Duration = Duration::from_secs(3);

/// Idle time after the last keystroke before "stopped typing" is sent.
pub const TYPING_IDLE: Duration = Duration::from_secs(2);

/// Emits typing signals for the local user's input box.
///
/// Feed it every input change via [`TypingSignaler::input_changed`]:
/// an empty→non-empty transition emits "typing start" once, a rolling
/// idle timer emits "typing stop" after the user pauses, and clearing
/// the input emits "typing stop" immediately. The timer is owned by a
/// single task and re-armed on each keystroke, so rapid bursts never
/// leak timers.
pub struct TypingSignaler {
    input: mpsc::UnboundedSender<String>,
}

impl TypingSignaler {
    pub fn spawn(peer: UserId, transport: Arc<dyn PushTransport>) -> Self {
        Self::spawn_with_idle(peer, transport, TYPING_IDLE)
    }

    pub fn spawn_with_idle(
        peer: UserId,
        transport: Arc<dyn PushTransport>,
        idle: Duration,
    ) -> Self {
        let (input, mut changes) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            let mut active = false;
            let mut deadline: Option<Instant> = None;
            loop {
                let idle_timer = async move {
                    match deadline {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                };
                tokio::select! {
                    change = changes.recv() => match change {
                        None => break,
                        Some(text) if text.is_empty() => {
                            deadline = None;
                            if active {
                                active = false;
                                let _ = transport.typing_stop(&peer);
                            }
                        }
                        Some(_) => {
                            if !active {
                                active = true;
                                let _ = transport.typing_start(&peer);
                            }
                            deadline = Some(Instant::now() + idle);
                        }
                    },
                    _ = idle_timer => {
                        deadline = None;
                        active = false;
                        let _ = transport.typing_stop(&peer);
                    }
                }
            }
            // Input box went away mid-typing; tell the peer.
            if active {
                let _ = transport.typing_stop(&peer);
            }
        });
        TypingSignaler { input }
    }

    /// Report the input box's current content after a keystroke.
    pub fn input_changed(&self, text: &str) {
        let _ = self.input.send(text.to_string());
    }
}
