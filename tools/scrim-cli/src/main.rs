//! scrim terminal client.
//!
//! Drives a live session against a running platform instance: lists
//! conversations or opens an interactive chat, with the same optimistic
//! send / REST fallback behavior the web client has.

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;

use scrim_client::conversation::ConversationPhase;
use scrim_client::session::{Session, SessionConfig};
use scrim_common::identity::UserId;

#[derive(Parser)]
#[command(name = "scrim-cli", about = "scrim messaging terminal client")]
struct Cli {
    /// REST base URL (falls back to SCRIM_API_URL).
    #[arg(long)]
    api_url: Option<String>,

    /// Push endpoint URL (falls back to SCRIM_WS_URL; omit both to run
    /// REST-only).
    #[arg(long)]
    ws_url: Option<String>,

    /// Bearer credential (falls back to SCRIM_TOKEN).
    #[arg(long)]
    token: Option<String>,

    /// Signed-in user id (falls back to SCRIM_USER_ID).
    #[arg(long)]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List conversations with unread counts.
    Conversations,
    /// Open an interactive chat with a peer. Type a line to send it,
    /// `/quit` to leave.
    Chat {
        #[arg(long)]
        peer: String,
    },
}

fn flag_or_env(flag: Option<String>, var: &str) -> Option<String> {
    flag.or_else(|| std::env::var(var).ok())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = SessionConfig {
        api_url: flag_or_env(cli.api_url, "SCRIM_API_URL")
            .context("missing --api-url (or SCRIM_API_URL)")?,
        ws_url: flag_or_env(cli.ws_url, "SCRIM_WS_URL"),
        token: flag_or_env(cli.token, "SCRIM_TOKEN")
            .context("missing --token (or SCRIM_TOKEN)")?,
        user_id: UserId(
            flag_or_env(cli.user, "SCRIM_USER_ID")
                .context("missing --user (or SCRIM_USER_ID)")?,
        ),
    };

    let session = Session::connect(config).await;
    if session.transport_connected() {
        println!("live channel up");
    } else {
        println!("live channel down, sends will use REST");
    }

    match cli.command {
        Command::Conversations => list_conversations(&session).await,
        Command::Chat { peer } => chat(&session, UserId(peer)).await,
    }
}

async fn list_conversations(session: &Session) -> anyhow::Result<()> {
    let conversations = session.conversations().await?;
    if conversations.is_empty() {
        println!("no conversations");
        return Ok(());
    }
    for summary in conversations {
        let unread = if summary.unread > 0 {
            format!(" [{} unread]", summary.unread)
        } else {
            String::new()
        };
        let preview = summary.last_message.unwrap_or_default();
        println!("{:20} {}{}", summary.peer_id, preview, unread);
    }
    Ok(())
}

async fn chat(session: &Session, peer: UserId) -> anyhow::Result<()> {
    tracing::debug!(%peer, "opening conversation");
    let conversation = session.open_conversation(peer.clone());
    let mut view_rx = conversation.subscribe();

    let printer = tokio::spawn(async move {
        let mut printed = 0usize;
        let mut typing_shown = false;
        let mut last_error: Option<String> = None;
        loop {
            let view = view_rx.borrow_and_update().clone();
            match &view.phase {
                ConversationPhase::Loading => {}
                ConversationPhase::Ready => {
                    for message in view.messages.iter().skip(printed) {
                        println!(
                            "[{}] {}: {}",
                            message.created_at.format("%H:%M:%S"),
                            message.sender_id,
                            message.content
                        );
                    }
                    printed = view.messages.len();
                    if view.peer_typing && !typing_shown {
                        println!("... {} is typing", view.peer);
                    }
                    typing_shown = view.peer_typing;
                    if view.send_error != last_error {
                        if let Some(err) = &view.send_error {
                            println!("! {err}");
                        }
                        last_error = view.send_error.clone();
                    }
                }
                ConversationPhase::Error(err) => {
                    println!("! {err}");
                    break;
                }
            }
            if view_rx.changed().await.is_err() {
                break;
            }
        }
    });

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim() == "/quit" {
            break;
        }
        conversation.input_changed(&line);
        let _ = conversation.send(&line).await;
        conversation.input_changed("");
    }

    session.close_conversation(conversation);
    printer.abort();
    Ok(())
}
