use std::time::Duration;

use chrono::Utc;

use scrim_client::conversation::ConversationPhase;
use scrim_client_integration::harness::StubServer;
use scrim_client_integration::{live_session, wait_until, wait_view, TIMEOUT};
use scrim_common::event::{ClientCommand, ServerEvent};
use scrim_common::identity::UserId;

fn bob() -> UserId {
    UserId::from("bob")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn typing_start_shows_then_expires() {
    let server = StubServer::spawn().await;
    let session = live_session(&server).await;
    let conversation = session.open_conversation(bob());
    let mut view = conversation.subscribe();
    wait_view(&mut view, |v| v.phase == ConversationPhase::Ready).await;

    server.push(ServerEvent::TypingStart { user_id: bob() });
    wait_view(&mut view, |v| v.peer_typing).await;

    // No further signal: the indicator clears itself after 3 seconds.
    wait_view(&mut view, |v| !v.peer_typing).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn typing_stop_clears_immediately() {
    let server = StubServer::spawn().await;
    let session = live_session(&server).await;
    let conversation = session.open_conversation(bob());
    let mut view = conversation.subscribe();
    wait_view(&mut view, |v| v.phase == ConversationPhase::Ready).await;

    server.push(ServerEvent::TypingStart { user_id: bob() });
    wait_view(&mut view, |v| v.peer_typing).await;

    server.push(ServerEvent::TypingStop { user_id: bob() });
    let cleared = tokio::time::timeout(
        Duration::from_millis(500),
        view.wait_for(|v| !v.peer_typing),
    )
    .await;
    assert!(cleared.is_ok(), "explicit stop should clear right away");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn typing_from_another_user_is_ignored() {
    let server = StubServer::spawn().await;
    let session = live_session(&server).await;
    let conversation = session.open_conversation(bob());
    let mut view = conversation.subscribe();
    wait_view(&mut view, |v| v.phase == ConversationPhase::Ready).await;

    server.push(ServerEvent::TypingStart {
        user_id: UserId::from("carol"),
    });
    // Force a later event through so the first one has been processed.
    server.push(ServerEvent::NewMessage {
        sender_id: bob(),
        content: "gg".into(),
        timestamp: Utc::now(),
        client_key: None,
    });

    let v = wait_view(&mut view, |v| !v.messages.is_empty()).await;
    assert!(!v.peer_typing);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repeated_typing_signals_extend_the_window() {
    let server = StubServer::spawn().await;
    let session = live_session(&server).await;
    let conversation = session.open_conversation(bob());
    let mut view = conversation.subscribe();
    wait_view(&mut view, |v| v.phase == ConversationPhase::Ready).await;

    server.push(ServerEvent::TypingStart { user_id: bob() });
    wait_view(&mut view, |v| v.peer_typing).await;

    // Refresh at the 2 s mark; at 4 s the original window would have
    // expired but the refreshed one has not.
    tokio::time::sleep(Duration::from_secs(2)).await;
    server.push(ServerEvent::TypingStart { user_id: bob() });
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(conversation.snapshot().peer_typing);

    wait_view(&mut view, |v| !v.peer_typing).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn local_input_emits_typing_signals() {
    let server = StubServer::spawn().await;
    let session = live_session(&server).await;
    let conversation = session.open_conversation(bob());
    let mut view = conversation.subscribe();
    wait_view(&mut view, |v| v.phase == ConversationPhase::Ready).await;

    conversation.input_changed("g");
    conversation.input_changed("gl");
    assert!(
        wait_until(
            || {
                server.ws_commands().iter().any(|c| {
                    matches!(c, ClientCommand::TypingStart { receiver_id } if *receiver_id == bob())
                })
            },
            TIMEOUT
        )
        .await,
        "typing start never reached the push channel"
    );
    // One burst, one start.
    let starts = server
        .ws_commands()
        .iter()
        .filter(|c| matches!(c, ClientCommand::TypingStart { .. }))
        .count();
    assert_eq!(starts, 1);

    conversation.input_changed("");
    assert!(
        wait_until(
            || {
                server.ws_commands().iter().any(|c| {
                    matches!(c, ClientCommand::TypingStop { receiver_id } if *receiver_id == bob())
                })
            },
            TIMEOUT
        )
        .await,
        "typing stop never reached the push channel"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn idle_input_emits_stop_without_clearing() {
    let server = StubServer::spawn().await;
    let session = live_session(&server).await;
    let conversation = session.open_conversation(bob());
    let mut view = conversation.subscribe();
    wait_view(&mut view, |v| v.phase == ConversationPhase::Ready).await;

    conversation.input_changed("glh");
    // The rolling 2 s idle timer fires on its own.
    assert!(
        wait_until(
            || {
                server
                    .ws_commands()
                    .iter()
                    .any(|c| matches!(c, ClientCommand::TypingStop { .. }))
            },
            TIMEOUT
        )
        .await,
        "idle stop never reached the push channel"
    );
}
