use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;

use scrim_client::conversation::ConversationPhase;
use scrim_client::session::Session;
use scrim_client_integration::harness::StubServer;
use scrim_client_integration::{
    live_session, offline_config, stored_message, summary, wait_until, wait_view, TIMEOUT,
};
use scrim_common::event::{ClientCommand, ServerEvent};
use scrim_common::identity::UserId;
use scrim_common::message::ClientKey;

fn bob() -> UserId {
    UserId::from("bob")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn history_loads_into_ready() {
    let server = StubServer::spawn().await;
    server.seed_history(vec![
        stored_message("m-1", "bob", "alice", "hey"),
        stored_message("m-2", "alice", "bob", "yo"),
        stored_message("m-3", "carol", "alice", "hi"),
    ]);

    let session = live_session(&server).await;
    let conversation = session.open_conversation(bob());
    let mut view = conversation.subscribe();

    let v = wait_view(&mut view, |v| v.phase == ConversationPhase::Ready).await;
    // Only the two-party history with bob; carol's message is not in it.
    assert_eq!(v.messages.len(), 2);
    assert_eq!(v.messages[0].content, "hey");
    assert_eq!(v.messages[1].content, "yo");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn expired_session_surfaces_specific_error() {
    let server = StubServer::spawn().await;
    server.state.expire_sessions.store(true, Ordering::SeqCst);

    let session = live_session(&server).await;
    let conversation = session.open_conversation(bob());
    let mut view = conversation.subscribe();

    let v = wait_view(&mut view, |v| {
        matches!(v.phase, ConversationPhase::Error(_))
    })
    .await;
    assert!(v.messages.is_empty());
    match v.phase {
        ConversationPhase::Error(text) => assert!(text.contains("session has expired")),
        phase => panic!("unexpected phase: {phase:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn push_appends_only_for_the_open_peer() {
    let server = StubServer::spawn().await;
    let session = live_session(&server).await;
    let conversation = session.open_conversation(bob());
    let mut view = conversation.subscribe();
    wait_view(&mut view, |v| v.phase == ConversationPhase::Ready).await;

    server.push(ServerEvent::NewMessage {
        sender_id: UserId::from("carol"),
        content: "wrong window".into(),
        timestamp: Utc::now(),
        client_key: None,
    });
    server.push(ServerEvent::NewMessage {
        sender_id: bob(),
        content: "gg".into(),
        timestamp: Utc::now(),
        client_key: None,
    });

    // Events are delivered in order, so once bob's message shows up
    // carol's has already been dropped.
    let v = wait_view(&mut view, |v| !v.messages.is_empty()).await;
    assert_eq!(v.messages.len(), 1);
    assert_eq!(v.messages[0].sender_id, bob());
    assert_eq!(v.messages[0].content, "gg");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connected_send_appends_optimistically() {
    let server = StubServer::spawn().await;
    let session = live_session(&server).await;
    let conversation = session.open_conversation(bob());
    let mut view = conversation.subscribe();
    wait_view(&mut view, |v| v.phase == ConversationPhase::Ready).await;

    conversation.send("glhf").await.unwrap();

    // Appended before the server has seen anything.
    let snapshot = conversation.snapshot();
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.messages[0].sender_id, server.me());
    assert!(snapshot.messages[0].id.0.starts_with("local-"));
    assert!(snapshot.messages[0].client_key.is_some());
    assert!(server.rest_sends().is_empty());

    assert!(
        wait_until(
            || {
                server
                    .ws_commands()
                    .iter()
                    .any(|c| matches!(c, ClientCommand::SendMessage { .. }))
            },
            TIMEOUT
        )
        .await,
        "send never reached the push channel"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnected_send_falls_back_to_rest() {
    let server = StubServer::spawn().await;
    let session = Session::connect(offline_config(&server)).await;
    assert!(!session.transport_connected());

    let conversation = session.open_conversation(bob());
    let mut view = conversation.subscribe();
    wait_view(&mut view, |v| v.phase == ConversationPhase::Ready).await;

    conversation.send("  clutch play  ").await.unwrap();

    let snapshot = conversation.snapshot();
    assert_eq!(snapshot.messages.len(), 1);
    // The server-assigned copy, with trimmed content.
    assert!(snapshot.messages[0].id.0.starts_with("srv-"));
    assert_eq!(snapshot.messages[0].content, "clutch play");
    assert_eq!(server.rest_sends().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_rest_send_sets_inline_error() {
    let server = StubServer::spawn().await;
    server.state.fail_sends.store(true, Ordering::SeqCst);
    let session = Session::connect(offline_config(&server)).await;

    let conversation = session.open_conversation(bob());
    let mut view = conversation.subscribe();
    wait_view(&mut view, |v| v.phase == ConversationPhase::Ready).await;

    assert!(conversation.send("glhf").await.is_err());

    let snapshot = conversation.snapshot();
    assert!(snapshot.messages.is_empty());
    assert!(!snapshot.sending);
    let error = snapshot.send_error.expect("send error should be set");
    assert!(error.contains("Something went wrong"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn expired_session_on_send_is_distinguished() {
    let server = StubServer::spawn().await;
    let session = Session::connect(offline_config(&server)).await;

    let conversation = session.open_conversation(bob());
    let mut view = conversation.subscribe();
    wait_view(&mut view, |v| v.phase == ConversationPhase::Ready).await;

    server.state.expire_sessions.store(true, Ordering::SeqCst);
    assert!(conversation.send("glhf").await.is_err());

    let snapshot = conversation.snapshot();
    assert!(snapshot.messages.is_empty());
    let error = snapshot.send_error.expect("send error should be set");
    assert!(error.contains("session has expired"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn whitespace_send_is_a_noop() {
    let server = StubServer::spawn().await;
    let session = live_session(&server).await;
    let conversation = session.open_conversation(bob());
    let mut view = conversation.subscribe();
    wait_view(&mut view, |v| v.phase == ConversationPhase::Ready).await;

    conversation.send("   \t ").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(conversation.snapshot().messages.is_empty());
    assert!(server.rest_sends().is_empty());
    assert!(!server
        .ws_commands()
        .iter()
        .any(|c| matches!(c, ClientCommand::SendMessage { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn opening_signals_mark_read() {
    let server = StubServer::spawn().await;
    let session = live_session(&server).await;
    let _conversation = session.open_conversation(bob());

    assert!(
        wait_until(
            || {
                server.ws_commands().iter().any(|c| {
                    matches!(c, ClientCommand::MarkRead { peer_id } if *peer_id == bob())
                })
            },
            TIMEOUT
        )
        .await,
        "mark-read never reached the push channel"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn echoed_client_key_is_not_duplicated() {
    let server = StubServer::spawn().await;
    let session = live_session(&server).await;
    let conversation = session.open_conversation(bob());
    let mut view = conversation.subscribe();
    wait_view(&mut view, |v| v.phase == ConversationPhase::Ready).await;

    let key = ClientKey("feedbeef00000001".into());
    let event = ServerEvent::NewMessage {
        sender_id: bob(),
        content: "first".into(),
        timestamp: Utc::now(),
        client_key: Some(key),
    };
    server.push(event.clone());
    wait_view(&mut view, |v| v.messages.len() == 1).await;

    // Redelivery of the same keyed event is dropped.
    server.push(event);
    server.push(ServerEvent::NewMessage {
        sender_id: bob(),
        content: "second".into(),
        timestamp: Utc::now(),
        client_key: None,
    });

    let v = wait_view(&mut view, |v| v.messages.len() >= 2).await;
    assert_eq!(v.messages.len(), 2);
    assert_eq!(v.messages[0].content, "first");
    assert_eq!(v.messages[1].content, "second");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn own_send_echo_is_filtered() {
    let server = StubServer::spawn().await;
    let session = live_session(&server).await;
    let conversation = session.open_conversation(bob());
    let mut view = conversation.subscribe();
    wait_view(&mut view, |v| v.phase == ConversationPhase::Ready).await;

    conversation.send("glhf").await.unwrap();
    let key = conversation.snapshot().messages[0]
        .client_key
        .clone()
        .expect("optimistic message carries a key");

    // The server broadcasting our own message back must not duplicate it.
    server.push(ServerEvent::NewMessage {
        sender_id: server.me(),
        content: "glhf".into(),
        timestamp: Utc::now(),
        client_key: Some(key),
    });
    server.push(ServerEvent::NewMessage {
        sender_id: bob(),
        content: "gg".into(),
        timestamp: Utc::now(),
        client_key: None,
    });

    let v = wait_view(&mut view, |v| v.messages.len() >= 2).await;
    assert_eq!(v.messages.len(), 2);
    let glhf_count = v.messages.iter().filter(|m| m.content == "glhf").count();
    assert_eq!(glhf_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unread_counters_track_closed_conversations() {
    let server = StubServer::spawn().await;
    server.seed_conversations(vec![summary("carol", 0), summary("bob", 2)]);
    let session = live_session(&server).await;
    let carol = UserId::from("carol");

    server.push(ServerEvent::NewMessage {
        sender_id: carol.clone(),
        content: "hi".into(),
        timestamp: Utc::now(),
        client_key: None,
    });
    assert!(wait_until(|| session.unread_count(&carol) == 1, TIMEOUT).await);

    let list = session.conversations().await.unwrap();
    let carol_entry = list.iter().find(|c| c.peer_id == carol).unwrap();
    assert_eq!(carol_entry.unread, 1);
    let bob_entry = list.iter().find(|c| c.peer_id == bob()).unwrap();
    assert_eq!(bob_entry.unread, 2);

    // Opening resets the counter and zeroes the listing.
    let conversation = session.open_conversation(carol.clone());
    assert_eq!(session.unread_count(&carol), 0);
    let list = session.conversations().await.unwrap();
    assert_eq!(list.iter().find(|c| c.peer_id == carol).unwrap().unread, 0);

    session.close_conversation(conversation);
}
