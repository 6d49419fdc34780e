//! The chat controller driving a live server: optimistic send, polling for the
//! reply, fallback reload and background refresh.

mod common;

use std::time::Duration;

use common::TestServer;
use relaychat::client::poll::is_optimistic;
use relaychat::client::{ApiClient, ChatController, ClientError, PollPolicy, SendOutcome};
use relaychat::models::MessageRole;
use wiremock::ResponseTemplate;

fn fast_policy() -> PollPolicy {
    PollPolicy {
        settle_delay: Duration::from_millis(10),
        max_tries: 20,
        retry_delay: Duration::from_millis(10),
        refresh_interval: Duration::from_millis(50),
    }
}

fn controller_for(server: &TestServer, token: &str, policy: PollPolicy) -> ChatController {
    let api = ApiClient::new(&server.base_url).unwrap().with_token(token);
    ChatController::new(api, policy)
}

#[tokio::test]
async fn first_message_opens_a_session_and_waits_for_the_reply() {
    let server = TestServer::start().await;
    server.webhook_replies("Sure, here you go").await;
    let (_, token) = server.sign_in("ana@example.com");
    let controller = controller_for(&server, &token, fast_policy());

    let outcome = controller
        .send_message("Plan a weekend in Lisbon for two people please")
        .await
        .unwrap();
    assert_eq!(outcome, SendOutcome::Replied);

    let state = controller.snapshot();
    assert!(!state.is_loading);
    let active = state.active_session_id.clone().expect("session opened");
    assert_eq!(state.messages.len(), 2);
    assert!(state.messages.iter().all(|m| !is_optimistic(m)));
    assert_eq!(state.messages[0].role, MessageRole::User);
    assert_eq!(state.messages[1].content, "Sure, here you go");

    assert_eq!(state.sessions.len(), 1);
    assert_eq!(state.sessions[0].id, active);
    assert_eq!(
        state.sessions[0].title.as_deref(),
        Some("Plan a weekend in Lisbon for two people ")
    );
}

#[tokio::test]
async fn follow_up_reuses_the_active_session() {
    let server = TestServer::start().await;
    server.webhook_replies("noted").await;
    let (_, token) = server.sign_in("ana@example.com");
    let controller = controller_for(&server, &token, fast_policy());

    controller.send_message("first").await.unwrap();
    let session = controller.active_session_id().unwrap();
    controller.send_message("second").await.unwrap();

    let state = controller.snapshot();
    assert_eq!(state.active_session_id.as_deref(), Some(session.as_str()));
    assert_eq!(state.messages.len(), 4);
    assert_eq!(state.sessions[0].title.as_deref(), Some("first"));
}

#[tokio::test]
async fn failed_turn_drops_the_optimistic_message() {
    let server = TestServer::start().await;
    server
        .webhook_responds(ResponseTemplate::new(500).set_body_string("boom"))
        .await;
    let (_, token) = server.sign_in("ana@example.com");
    let controller = controller_for(&server, &token, fast_policy());
    controller.new_chat().await.unwrap();

    let err = controller.send_message("hello?").await.unwrap_err();
    match err {
        ClientError::Api { status, error, details } => {
            assert_eq!(status, 500);
            assert_eq!(error, "Failed to get AI response");
            assert!(details.unwrap_or_default().contains("boom"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let state = controller.snapshot();
    assert!(!state.is_loading);
    // Reloaded from the server: the stored user turn, no temp copy
    assert_eq!(state.messages.len(), 1);
    assert!(!is_optimistic(&state.messages[0]));
}

#[tokio::test]
async fn exhausted_polling_falls_back_to_a_reload() {
    let server = TestServer::start().await;
    server.webhook_replies("late but here").await;
    let (_, token) = server.sign_in("ana@example.com");
    let policy = PollPolicy {
        max_tries: 0,
        ..fast_policy()
    };
    let controller = controller_for(&server, &token, policy);

    let outcome = controller.send_message("anyone there").await.unwrap();
    assert_eq!(outcome, SendOutcome::TimedOut);

    let state = controller.snapshot();
    assert_eq!(state.messages.len(), 2);
    assert!(state.messages.iter().all(|m| !is_optimistic(m)));
}

#[tokio::test]
async fn switching_and_deleting_sessions() {
    let server = TestServer::start().await;
    server.webhook_replies("ok").await;
    let (_, token) = server.sign_in("ana@example.com");
    let controller = controller_for(&server, &token, fast_policy());

    controller.send_message("in the first chat").await.unwrap();
    let first = controller.active_session_id().unwrap();
    let second = controller.new_chat().await.unwrap();
    assert!(controller.snapshot().messages.is_empty());

    controller.select_session(&first).await.unwrap();
    assert_eq!(controller.snapshot().messages.len(), 2);

    controller.delete_session(&first).await.unwrap();
    let state = controller.snapshot();
    assert!(state.active_session_id.is_none());
    assert!(state.messages.is_empty());
    assert_eq!(state.sessions.len(), 1);
    assert_eq!(state.sessions[0].id, second.id);

    controller.load_sessions().await.unwrap();
    assert_eq!(controller.snapshot().sessions.len(), 1);
}

#[tokio::test]
async fn auto_refresh_picks_up_messages_written_elsewhere() {
    let server = TestServer::start().await;
    let (user_id, token) = server.sign_in("ana@example.com");
    let controller = controller_for(&server, &token, fast_policy());
    let session = controller.new_chat().await.unwrap();

    let refresh = controller.start_auto_refresh();
    relaychat::store::create_message(
        &server.state.db,
        &session.id,
        &user_id,
        MessageRole::Assistant,
        "pushed by the workflow",
    )
    .unwrap();

    let mut seen = false;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(25)).await;
        if controller.snapshot().messages.len() == 1 {
            seen = true;
            break;
        }
    }
    assert!(seen, "refresh never applied the new message");
    refresh.stop();
}

#[tokio::test]
async fn rejected_token_surfaces_as_401() {
    let server = TestServer::start().await;
    let controller = controller_for(&server, "bogus", fast_policy());
    let err = controller.load_sessions().await.unwrap_err();
    assert_eq!(err.status(), Some(401));
}
