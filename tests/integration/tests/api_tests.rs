//! REST API tests
//!
//! Run with: cargo test -p integration-tests --test api_tests

use integration_tests::{assert_json, assert_status, TestServer};
use reqwest::StatusCode;
use serde_json::{json, Value};

async fn send(server: &TestServer, token: &str, chat: impl std::fmt::Display, content: &str) -> String {
    let response = server
        .post_auth(
            &format!("/api/chats/{chat}/messages"),
            token,
            &json!({ "content": content }),
        )
        .await
        .unwrap();
    let message: Value = assert_json(response, StatusCode::CREATED).await.unwrap();
    message["id"].as_str().unwrap().to_string()
}

fn ids(messages: &Value) -> Vec<String> {
    messages
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap().to_string())
        .collect()
}

// ============================================================================
// Auth and input errors
// ============================================================================

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let server = TestServer::start().await.unwrap();
    let response = server.get("/api/chats/1/messages").await.unwrap();
    let body: Value = assert_json(response, StatusCode::UNAUTHORIZED).await.unwrap();
    assert_eq!(body["error"]["code"], "MISSING_AUTHORIZATION");
}

#[tokio::test]
async fn test_invalid_token_is_unauthorized() {
    let server = TestServer::start().await.unwrap();
    let response = server
        .get_auth("/api/chats/1/messages", "garbage")
        .await
        .unwrap();
    let body: Value = assert_json(response, StatusCode::UNAUTHORIZED).await.unwrap();
    assert_eq!(body["error"]["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_malformed_path_id() {
    let server = TestServer::start().await.unwrap();
    let alice = server.create_user("alice").await.unwrap();

    let response = server
        .get_auth("/api/messages/not-an-id/status", &alice.token)
        .await
        .unwrap();
    let body: Value = assert_json(response, StatusCode::BAD_REQUEST).await.unwrap();
    assert_eq!(body["error"]["code"], "INVALID_PATH_PARAMETER");
}

#[tokio::test]
async fn test_unknown_chat_is_not_found() {
    let server = TestServer::start().await.unwrap();
    let alice = server.create_user("alice").await.unwrap();

    let response = server
        .get_auth("/api/chats/987654321/unread", &alice.token)
        .await
        .unwrap();
    let body: Value = assert_json(response, StatusCode::NOT_FOUND).await.unwrap();
    assert_eq!(body["error"]["code"], "UNKNOWN_CHAT");
}

// ============================================================================
// Messages
// ============================================================================

#[tokio::test]
async fn test_non_member_cannot_send() {
    let server = TestServer::start().await.unwrap();
    let alice = server.create_user("alice").await.unwrap();
    let bob = server.create_user("bob").await.unwrap();
    let carol = server.create_user("carol").await.unwrap();
    let chat = server.create_direct_chat(&alice, &bob).await.unwrap();

    let response = server
        .post_auth(
            &format!("/api/chats/{chat}/messages"),
            &carol.token,
            &json!({ "content": "let me in" }),
        )
        .await
        .unwrap();
    let body: Value = assert_json(response, StatusCode::FORBIDDEN).await.unwrap();
    assert_eq!(body["error"]["code"], "NOT_A_MEMBER");
}

#[tokio::test]
async fn test_empty_message_is_rejected() {
    let server = TestServer::start().await.unwrap();
    let alice = server.create_user("alice").await.unwrap();
    let bob = server.create_user("bob").await.unwrap();
    let chat = server.create_direct_chat(&alice, &bob).await.unwrap();

    let response = server
        .post_auth(
            &format!("/api/chats/{chat}/messages"),
            &alice.token,
            &json!({ "content": "" }),
        )
        .await
        .unwrap();
    assert_status(response, StatusCode::BAD_REQUEST).await.unwrap();
}

#[tokio::test]
async fn test_new_message_starts_delivered_and_read_by_sender() {
    let server = TestServer::start().await.unwrap();
    let alice = server.create_user("alice").await.unwrap();
    let bob = server.create_user("bob").await.unwrap();
    let chat = server.create_direct_chat(&alice, &bob).await.unwrap();

    let response = server
        .post_auth(
            &format!("/api/chats/{chat}/messages"),
            &alice.token,
            &json!({ "content": "hi bob" }),
        )
        .await
        .unwrap();
    let message: Value = assert_json(response, StatusCode::CREATED).await.unwrap();

    assert_eq!(message["chatId"], chat.to_string());
    assert_eq!(message["senderId"], alice.id.to_string());
    assert_eq!(message["deliveredTo"], json!([alice.id.to_string()]));
    assert_eq!(message["readBy"], json!([alice.id.to_string()]));
    assert_eq!(message["deleted"], false);
}

#[tokio::test]
async fn test_history_marks_messages_read() {
    let server = TestServer::start().await.unwrap();
    let alice = server.create_user("alice").await.unwrap();
    let bob = server.create_user("bob").await.unwrap();
    let chat = server.create_direct_chat(&alice, &bob).await.unwrap();

    let first = send(&server, &alice.token, chat, "one").await;
    let second = send(&server, &alice.token, chat, "two").await;

    let unread_path = format!("/api/chats/{chat}/unread");
    let unread: Value = assert_json(
        server.get_auth(&unread_path, &bob.token).await.unwrap(),
        StatusCode::OK,
    )
    .await
    .unwrap();
    assert_eq!(unread["unreadCount"], 2);

    let mut alice_ws = server.connect(&alice).await.unwrap();
    alice_ws.join(chat).await.unwrap();

    let history: Value = assert_json(
        server
            .get_auth(&format!("/api/chats/{chat}/messages"), &bob.token)
            .await
            .unwrap(),
        StatusCode::OK,
    )
    .await
    .unwrap();
    assert_eq!(ids(&history), vec![first.clone(), second.clone()]);

    let read = alice_ws.expect("messages-read").await.unwrap();
    assert_eq!(read["userId"], bob.id.to_string());
    assert_eq!(read["messageIds"], json!([first, second]));

    let unread: Value = assert_json(
        server.get_auth(&unread_path, &bob.token).await.unwrap(),
        StatusCode::OK,
    )
    .await
    .unwrap();
    assert_eq!(unread["unreadCount"], 0);
}

#[tokio::test]
async fn test_history_pagination() {
    let server = TestServer::start().await.unwrap();
    let alice = server.create_user("alice").await.unwrap();
    let bob = server.create_user("bob").await.unwrap();
    let chat = server.create_direct_chat(&alice, &bob).await.unwrap();

    let mut sent = Vec::new();
    for i in 0..5 {
        sent.push(send(&server, &alice.token, chat, &format!("message {i}")).await);
    }

    let page: Value = assert_json(
        server
            .get_auth(&format!("/api/chats/{chat}/messages?limit=2"), &alice.token)
            .await
            .unwrap(),
        StatusCode::OK,
    )
    .await
    .unwrap();
    assert_eq!(ids(&page), sent[3..].to_vec());

    let older: Value = assert_json(
        server
            .get_auth(
                &format!("/api/chats/{chat}/messages?limit=2&before={}", sent[3]),
                &alice.token,
            )
            .await
            .unwrap(),
        StatusCode::OK,
    )
    .await
    .unwrap();
    assert_eq!(ids(&older), sent[1..3].to_vec());
}

#[tokio::test]
async fn test_delete_for_me_and_for_everyone() {
    let server = TestServer::start().await.unwrap();
    let alice = server.create_user("alice").await.unwrap();
    let bob = server.create_user("bob").await.unwrap();
    let chat = server.create_direct_chat(&alice, &bob).await.unwrap();

    let hidden = send(&server, &alice.token, chat, "hide me").await;
    let deleted = send(&server, &alice.token, chat, "delete me").await;
    let kept = send(&server, &alice.token, chat, "keep me").await;

    // Only the author may delete for everyone.
    let response = server
        .delete_auth(&format!("/api/messages/{deleted}?forEveryone=true"), &bob.token)
        .await
        .unwrap();
    let body: Value = assert_json(response, StatusCode::FORBIDDEN).await.unwrap();
    assert_eq!(body["error"]["code"], "NOT_MESSAGE_AUTHOR");

    let response = server
        .delete_auth(&format!("/api/messages/{hidden}"), &bob.token)
        .await
        .unwrap();
    assert_status(response, StatusCode::NO_CONTENT).await.unwrap();

    let mut bob_ws = server.connect(&bob).await.unwrap();
    bob_ws.join(chat).await.unwrap();

    let response = server
        .delete_auth(&format!("/api/messages/{deleted}?forEveryone=true"), &alice.token)
        .await
        .unwrap();
    assert_status(response, StatusCode::NO_CONTENT).await.unwrap();

    let event = bob_ws.expect("message-deleted").await.unwrap();
    assert_eq!(event["messageId"], deleted);
    assert_eq!(event["chatId"], chat.to_string());

    let bob_view: Value = assert_json(
        server
            .get_auth(&format!("/api/chats/{chat}/messages"), &bob.token)
            .await
            .unwrap(),
        StatusCode::OK,
    )
    .await
    .unwrap();
    assert_eq!(ids(&bob_view), vec![kept.clone()]);

    let alice_view: Value = assert_json(
        server
            .get_auth(&format!("/api/chats/{chat}/messages"), &alice.token)
            .await
            .unwrap(),
        StatusCode::OK,
    )
    .await
    .unwrap();
    assert_eq!(ids(&alice_view), vec![hidden, kept]);
}

#[tokio::test]
async fn test_status_requires_membership() {
    let server = TestServer::start().await.unwrap();
    let alice = server.create_user("alice").await.unwrap();
    let bob = server.create_user("bob").await.unwrap();
    let carol = server.create_user("carol").await.unwrap();
    let chat = server.create_direct_chat(&alice, &bob).await.unwrap();
    let message = send(&server, &alice.token, chat, "private").await;

    let response = server
        .get_auth(&format!("/api/messages/{message}/status"), &carol.token)
        .await
        .unwrap();
    assert_status(response, StatusCode::FORBIDDEN).await.unwrap();

    let response = server
        .get_auth("/api/messages/111111/status", &alice.token)
        .await
        .unwrap();
    let body: Value = assert_json(response, StatusCode::NOT_FOUND).await.unwrap();
    assert_eq!(body["error"]["code"], "UNKNOWN_MESSAGE");
}

// ============================================================================
// Presence
// ============================================================================

#[tokio::test]
async fn test_presence_endpoint() {
    let server = TestServer::start().await.unwrap();
    let alice = server.create_user("alice").await.unwrap();
    let bob = server.create_user("bob").await.unwrap();
    let path = format!("/api/users/{}/presence", bob.id);

    let offline: Value = assert_json(
        server.get_auth(&path, &alice.token).await.unwrap(),
        StatusCode::OK,
    )
    .await
    .unwrap();
    assert_eq!(offline["userId"], bob.id.to_string());
    assert_eq!(offline["online"], false);

    let _bob_ws = server.connect(&bob).await.unwrap();
    let online: Value = assert_json(
        server.get_auth(&path, &alice.token).await.unwrap(),
        StatusCode::OK,
    )
    .await
    .unwrap();
    assert_eq!(online["online"], true);
    assert!(online.get("lastSeenAt").is_none());

    let stranger = format!("/api/users/{}/presence", 424_242);
    let response = server.get_auth(&stranger, &alice.token).await.unwrap();
    let body: Value = assert_json(response, StatusCode::NOT_FOUND).await.unwrap();
    assert_eq!(body["error"]["code"], "UNKNOWN_USER");
}
