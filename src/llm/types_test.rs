// ABOUTME: Tests for chat types - serialization, builders, usage helpers.
// ABOUTME: Verifies JSON format matches provider APIs.

use super::*;

#[test]
fn test_role_serialization() {
    assert_eq!(serde_json::to_string(&Role::System).unwrap(), "\"system\"");
    assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
    assert_eq!(
        serde_json::to_string(&Role::Assistant).unwrap(),
        "\"assistant\""
    );
}

#[test]
fn test_role_deserialization() {
    assert_eq!(
        serde_json::from_str::<Role>("\"system\"").unwrap(),
        Role::System
    );
    assert_eq!(
        serde_json::from_str::<Role>("\"user\"").unwrap(),
        Role::User
    );
}

#[test]
fn test_message_helpers() {
    let msg = Message::user("Hello");
    assert_eq!(msg.role, Role::User);
    assert_eq!(msg.content, "Hello");
    assert_eq!(Message::system("x").role, Role::System);
    assert_eq!(Message::assistant("y").role, Role::Assistant);
}

#[test]
fn test_request_builder() {
    let req = ChatRequest::new("llama-3.1-8b-instant")
        .message(Message::user("Hi"))
        .system("You are helpful")
        .max_tokens(1024)
        .temperature(0.7);

    assert_eq!(req.model, "llama-3.1-8b-instant");
    assert_eq!(req.messages.len(), 2);
    assert_eq!(req.messages[0], Message::system("You are helpful"));
    assert_eq!(req.messages[1], Message::user("Hi"));
    assert_eq!(req.max_tokens, Some(1024));
    assert_eq!(req.temperature, Some(0.7));
}

#[test]
fn test_system_replaces_previous_preamble() {
    let req = ChatRequest::new("m").system("first").system("second");
    assert_eq!(req.messages, vec![Message::system("second")]);
}

#[test]
fn test_billed_tokens_prefers_total() {
    let response = ChatResponse::text("ok").with_usage(Usage {
        prompt_tokens: 10,
        completion_tokens: 20,
        total_tokens: 35,
    });
    assert_eq!(response.billed_tokens(), Some(35));
}

#[test]
fn test_billed_tokens_sums_parts_without_total() {
    let response = ChatResponse::text("ok").with_usage(Usage {
        prompt_tokens: 10,
        completion_tokens: 20,
        total_tokens: 0,
    });
    assert_eq!(response.billed_tokens(), Some(30));
}

#[test]
fn test_billed_tokens_absent() {
    assert_eq!(ChatResponse::text("ok").billed_tokens(), None);
    let empty = ChatResponse::text("ok").with_usage(Usage::default());
    assert_eq!(empty.billed_tokens(), None);
}
