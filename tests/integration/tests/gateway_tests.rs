//! WebSocket gateway tests
//!
//! Each test starts its own server on an ephemeral port with in-memory
//! stores, so nothing external is needed:
//!
//! ```bash
//! cargo test -p integration-tests --test gateway_tests
//! ```

use std::time::Duration;

use integration_tests::{
    assert_json, expect_close, open_socket, send_json, Frame, TestServer,
    TEST_TYPING_TIMEOUT,
};
use reqwest::StatusCode;
use serde_json::{json, Value};

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::start().await.unwrap();
    let response = server.get("/health").await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_hello_then_ready() {
    let server = TestServer::start().await.unwrap();
    let alice = server.create_user("alice").await.unwrap();

    let (_, hello) = open_socket(&server.gateway_url()).await.unwrap();
    assert_eq!(hello["d"]["heartbeatInterval"], 45_000);

    let client = server.connect(&alice).await.unwrap();
    assert_eq!(client.user_id, alice.id.to_string());
    assert!(!client.connection_id.is_empty());
    assert_eq!(client.online_users, vec![alice.id.to_string()]);
}

#[tokio::test]
async fn test_invalid_token_is_rejected() {
    let server = TestServer::start().await.unwrap();
    let (mut socket, _) = open_socket(&server.gateway_url()).await.unwrap();

    send_json(&mut socket, &json!({ "op": 2, "d": { "token": "not-a-jwt" } }))
        .await
        .unwrap();
    assert_eq!(expect_close(&mut socket).await.unwrap(), Some(4004));
}

#[tokio::test]
async fn test_unknown_user_is_rejected() {
    let server = TestServer::start().await.unwrap();
    let token = server.stranger_token().unwrap();
    let (mut socket, _) = open_socket(&server.gateway_url()).await.unwrap();

    send_json(&mut socket, &json!({ "op": 2, "d": { "token": token } }))
        .await
        .unwrap();
    assert_eq!(expect_close(&mut socket).await.unwrap(), Some(4004));
}

#[tokio::test]
async fn test_event_before_identify_is_rejected() {
    let server = TestServer::start().await.unwrap();
    let (mut socket, _) = open_socket(&server.gateway_url()).await.unwrap();

    send_json(&mut socket, &json!({ "op": 1 })).await.unwrap();
    assert_eq!(expect_close(&mut socket).await.unwrap(), Some(4003));
}

#[tokio::test]
async fn test_second_identify_closes_connection() {
    let server = TestServer::start().await.unwrap();
    let alice = server.create_user("alice").await.unwrap();
    let mut client = server.connect(&alice).await.unwrap();

    client
        .send_raw(&json!({ "op": 2, "d": { "token": alice.token } }))
        .await
        .unwrap();
    assert_eq!(client.expect_close().await.unwrap(), Some(4005));
}

#[tokio::test]
async fn test_heartbeat_is_acknowledged() {
    let server = TestServer::start().await.unwrap();
    let alice = server.create_user("alice").await.unwrap();
    let mut client = server.connect(&alice).await.unwrap();

    client.heartbeat().await.unwrap();
    match client.next_frame(Duration::from_secs(5)).await.unwrap() {
        Frame::Json(value) => assert_eq!(value["op"], 11),
        Frame::Closed(code) => panic!("closed: {code:?}"),
    }
}

#[tokio::test]
async fn test_malformed_event_keeps_connection_open() {
    let server = TestServer::start().await.unwrap();
    let alice = server.create_user("alice").await.unwrap();
    let mut client = server.connect(&alice).await.unwrap();

    client
        .send_event("mark-read", json!({ "chatId": "1" }))
        .await
        .unwrap();
    let error = client.expect("error").await.unwrap();
    assert_eq!(error["code"], "INVALID_PAYLOAD");
    assert_eq!(error["event"], "mark-read");

    // Still usable
    client.sync().await.unwrap();
}

// ============================================================================
// Presence
// ============================================================================

#[tokio::test]
async fn test_presence_follows_connections() {
    let server = TestServer::start().await.unwrap();
    let alice = server.create_user("alice").await.unwrap();
    let bob = server.create_user("bob").await.unwrap();

    let mut alice_ws = server.connect(&alice).await.unwrap();
    let bob_ws = server.connect(&bob).await.unwrap();
    assert!(bob_ws.online_users.contains(&alice.id.to_string()));

    let online = alice_ws.expect("presence-changed").await.unwrap();
    assert_eq!(online["userId"], bob.id.to_string());
    assert_eq!(online["online"], true);

    bob_ws.close().await.unwrap();
    let offline = alice_ws.expect("presence-changed").await.unwrap();
    assert_eq!(offline["userId"], bob.id.to_string());
    assert_eq!(offline["online"], false);
    assert!(offline["lastSeenAt"].is_string());
}

#[tokio::test]
async fn test_second_connection_is_not_announced() {
    let server = TestServer::start().await.unwrap();
    let alice = server.create_user("alice").await.unwrap();
    let bob = server.create_user("bob").await.unwrap();

    let mut alice_ws = server.connect(&alice).await.unwrap();
    let bob_first = server.connect(&bob).await.unwrap();
    let bob_second = server.connect(&bob).await.unwrap();

    let seen = alice_ws.sync().await.unwrap();
    let presence: Vec<_> = seen.iter().filter(|d| d.event == "presence-changed").collect();
    assert_eq!(presence.len(), 1);

    // Closing one of two connections keeps bob online.
    bob_first.close().await.unwrap();
    let status = server
        .get_auth(&format!("/api/users/{}/presence", bob.id), &alice.token)
        .await
        .unwrap();
    let body: Value = assert_json(status, StatusCode::OK).await.unwrap();
    assert_eq!(body["online"], true);

    drop(bob_second);
}

// ============================================================================
// Rooms and typing
// ============================================================================

#[tokio::test]
async fn test_join_room_requires_membership() {
    let server = TestServer::start().await.unwrap();
    let alice = server.create_user("alice").await.unwrap();
    let bob = server.create_user("bob").await.unwrap();
    let carol = server.create_user("carol").await.unwrap();
    let chat = server.create_direct_chat(&alice, &bob).await.unwrap();

    let mut carol_ws = server.connect(&carol).await.unwrap();
    let seen = carol_ws.join(chat).await.unwrap();

    let error = seen
        .iter()
        .find(|d| d.event == "error")
        .expect("join should be refused");
    assert_eq!(error.data["code"], "NOT_A_MEMBER");
    assert_eq!(error.data["event"], "join-room");
}

#[tokio::test]
async fn test_typing_reaches_room_members_only() {
    let server = TestServer::start().await.unwrap();
    let alice = server.create_user("alice").await.unwrap();
    let bob = server.create_user("bob").await.unwrap();
    let carol = server.create_user("carol").await.unwrap();
    let chat = server.create_direct_chat(&alice, &bob).await.unwrap();

    let mut alice_ws = server.connect(&alice).await.unwrap();
    let mut bob_ws = server.connect(&bob).await.unwrap();
    let mut carol_ws = server.connect(&carol).await.unwrap();
    alice_ws.join(chat).await.unwrap();
    bob_ws.join(chat).await.unwrap();

    alice_ws
        .send_event(
            "typing-start",
            json!({ "chatId": chat.to_string(), "userDisplayName": "Alice" }),
        )
        .await
        .unwrap();
    let started = bob_ws.expect("typing-start").await.unwrap();
    assert_eq!(started["chatId"], chat.to_string());
    assert_eq!(started["userId"], alice.id.to_string());
    assert_eq!(started["userDisplayName"], "Alice");

    alice_ws
        .send_event("typing-stop", json!({ "chatId": chat.to_string() }))
        .await
        .unwrap();
    let stopped = bob_ws.expect("typing-stop").await.unwrap();
    assert_eq!(stopped["userId"], alice.id.to_string());

    // The typist and outsiders see nothing.
    let alice_seen = alice_ws.sync().await.unwrap();
    assert!(alice_seen.iter().all(|d| !d.event.starts_with("typing")));
    let carol_seen = carol_ws.sync().await.unwrap();
    assert!(carol_seen.iter().all(|d| !d.event.starts_with("typing")));
}

#[tokio::test]
async fn test_repeated_typing_start_is_broadcast_once() {
    let server = TestServer::start().await.unwrap();
    let alice = server.create_user("alice").await.unwrap();
    let bob = server.create_user("bob").await.unwrap();
    let chat = server.create_direct_chat(&alice, &bob).await.unwrap();

    let mut alice_ws = server.connect(&alice).await.unwrap();
    let mut bob_ws = server.connect(&bob).await.unwrap();
    alice_ws.join(chat).await.unwrap();
    bob_ws.join(chat).await.unwrap();

    for _ in 0..2 {
        alice_ws
            .send_event(
                "typing-start",
                json!({ "chatId": chat.to_string(), "userDisplayName": "Alice" }),
            )
            .await
            .unwrap();
    }
    alice_ws.sync().await.unwrap();

    let seen = bob_ws.sync().await.unwrap();
    let starts = seen.iter().filter(|d| d.event == "typing-start").count();
    assert_eq!(starts, 1);
}

#[tokio::test]
async fn test_typing_expires_without_stop() {
    let server = TestServer::start().await.unwrap();
    let alice = server.create_user("alice").await.unwrap();
    let bob = server.create_user("bob").await.unwrap();
    let chat = server.create_direct_chat(&alice, &bob).await.unwrap();

    let mut alice_ws = server.connect(&alice).await.unwrap();
    let mut bob_ws = server.connect(&bob).await.unwrap();
    alice_ws.join(chat).await.unwrap();
    bob_ws.join(chat).await.unwrap();

    alice_ws
        .send_event(
            "typing-start",
            json!({ "chatId": chat.to_string(), "userDisplayName": "Alice" }),
        )
        .await
        .unwrap();
    bob_ws.expect("typing-start").await.unwrap();

    tokio::time::sleep(TEST_TYPING_TIMEOUT).await;
    let stopped = bob_ws.expect("typing-stop").await.unwrap();
    assert_eq!(stopped, json!({ "chatId": chat.to_string(), "userId": alice.id.to_string() }));
}

#[tokio::test]
async fn test_disconnect_cleans_up_rooms_and_typing() {
    let server = TestServer::start().await.unwrap();
    let alice = server.create_user("alice").await.unwrap();
    let bob = server.create_user("bob").await.unwrap();
    let first = server.create_direct_chat(&alice, &bob).await.unwrap();
    let second = server.create_group_chat(&alice, &[&bob]).await.unwrap();

    let mut alice_ws = server.connect(&alice).await.unwrap();
    let mut bob_ws = server.connect(&bob).await.unwrap();
    alice_ws.join(first).await.unwrap();
    alice_ws.join(second).await.unwrap();
    bob_ws.join(first).await.unwrap();
    bob_ws.join(second).await.unwrap();

    bob_ws
        .send_event(
            "typing-start",
            json!({ "chatId": first.to_string(), "userDisplayName": "Bob" }),
        )
        .await
        .unwrap();
    alice_ws.expect("typing-start").await.unwrap();

    bob_ws.close().await.unwrap();

    let stopped = alice_ws.expect("typing-stop").await.unwrap();
    assert_eq!(stopped["chatId"], first.to_string());
    assert_eq!(stopped["userId"], bob.id.to_string());
    let offline = alice_ws.expect("presence-changed").await.unwrap();
    assert_eq!(offline["online"], false);

    // Nothing else follows for the second room.
    let rest = alice_ws.sync().await.unwrap();
    assert!(rest.iter().all(|d| d.event != "typing-stop"));
}

// ============================================================================
// Receipts
// ============================================================================

#[tokio::test]
async fn test_delivery_and_read_receipts() {
    let server = TestServer::start().await.unwrap();
    let alice = server.create_user("alice").await.unwrap();
    let bob = server.create_user("bob").await.unwrap();
    let chat = server.create_direct_chat(&alice, &bob).await.unwrap();

    let mut alice_ws = server.connect(&alice).await.unwrap();
    let mut bob_ws = server.connect(&bob).await.unwrap();
    alice_ws.join(chat).await.unwrap();
    bob_ws.join(chat).await.unwrap();

    let response = server
        .post_auth(
            &format!("/api/chats/{chat}/messages"),
            &alice.token,
            &json!({ "content": "hello" }),
        )
        .await
        .unwrap();
    let message: Value = assert_json(response, StatusCode::CREATED).await.unwrap();
    let message_id = message["id"].as_str().unwrap().to_string();

    let forwarded = bob_ws.expect("new-message").await.unwrap();
    assert_eq!(forwarded["id"], message_id);
    assert_eq!(forwarded["content"], "hello");

    bob_ws
        .send_event("mark-delivered", json!({ "messageId": message_id }))
        .await
        .unwrap();
    let delivered = alice_ws.expect("message-delivered").await.unwrap();
    assert_eq!(delivered["messageId"], message_id);
    assert_eq!(delivered["userId"], bob.id.to_string());
    assert_eq!(delivered["chatId"], chat.to_string());

    bob_ws
        .send_event(
            "mark-read",
            json!({ "chatId": chat.to_string(), "messageIds": [message_id] }),
        )
        .await
        .unwrap();
    let read = alice_ws.expect("messages-read").await.unwrap();
    assert_eq!(read["messageIds"], json!([message_id]));
    assert_eq!(read["userId"], bob.id.to_string());

    let status_path = format!("/api/messages/{message_id}/status");
    let status: Value = assert_json(
        server.get_auth(&status_path, &alice.token).await.unwrap(),
        StatusCode::OK,
    )
    .await
    .unwrap();
    assert_eq!(status["deliveredCount"], 2);
    assert_eq!(status["readCount"], 2);

    // A repeated receipt changes nothing and is not announced.
    bob_ws
        .send_event("mark-delivered", json!({ "messageId": message_id }))
        .await
        .unwrap();
    bob_ws.sync().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let seen = alice_ws.sync().await.unwrap();
    assert!(seen.iter().all(|d| d.event != "message-delivered"));

    let again: Value = assert_json(
        server.get_auth(&status_path, &alice.token).await.unwrap(),
        StatusCode::OK,
    )
    .await
    .unwrap();
    assert_eq!(again["delivered"], status["delivered"]);
}

#[tokio::test]
async fn test_mark_delivered_unknown_message_is_silent() {
    let server = TestServer::start().await.unwrap();
    let alice = server.create_user("alice").await.unwrap();
    let mut alice_ws = server.connect(&alice).await.unwrap();

    alice_ws
        .send_event("mark-delivered", json!({ "messageId": "123456789" }))
        .await
        .unwrap();
    alice_ws.sync().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let seen = alice_ws.sync().await.unwrap();
    assert!(seen.is_empty());
}

#[tokio::test]
async fn test_store_outage_is_reported_to_sender() {
    let server = TestServer::start().await.unwrap();
    let alice = server.create_user("alice").await.unwrap();
    let mut alice_ws = server.connect(&alice).await.unwrap();

    server.messages.set_unavailable(true);
    alice_ws
        .send_event("mark-delivered", json!({ "messageId": "42" }))
        .await
        .unwrap();

    let error = alice_ws.expect("error").await.unwrap();
    assert_eq!(error["code"], "STORE_UNAVAILABLE");
    assert_eq!(error["event"], "mark-delivered");
    assert_eq!(error["messageIds"], json!(["42"]));

    // The connection survives.
    server.messages.set_unavailable(false);
    alice_ws.sync().await.unwrap();
}

#[tokio::test]
async fn test_server_only_op_closes_connection() {
    let server = TestServer::start().await.unwrap();
    let alice = server.create_user("alice").await.unwrap();
    let mut client = server.connect(&alice).await.unwrap();

    client.send_raw(&json!({ "op": 0, "t": "ready" })).await.unwrap();
    assert_eq!(client.expect_close().await.unwrap(), Some(4001));
}
