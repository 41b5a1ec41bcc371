//! Context-window assembly against a live store

use unigate::core::context::{ContextAssembler, ContextStrategy, ERROR_SENTINEL, limits_for};
use unigate::core::types::{ChatMessage, MessageRole};
use unigate::storage::SessionStore;
use unigate::storage::sessions::{NewMessage, NewSummary, SessionPatch};

use crate::common::{seed_messages, test_db, test_user};

fn current_turn() -> Vec<ChatMessage> {
    vec![ChatMessage::user("next question")]
}

#[tokio::test]
async fn test_limits_per_provider_family() {
    assert_eq!(limits_for("openai").max_messages, 50);
    assert_eq!(limits_for("openai").max_chars, 30_000);
    assert_eq!(limits_for("anthropic").max_messages, 100);
    assert_eq!(limits_for("anthropic").max_chars, 80_000);
    assert_eq!(limits_for("openai-compatible").max_messages, 20);
    assert_eq!(limits_for("local").max_messages, 10);
    assert_eq!(limits_for("local").max_chars, 6_000);
    // Unknown families ride the compat budget
    assert_eq!(limits_for("whatever").max_messages, 20);
}

#[tokio::test]
async fn test_short_history_passes_through() {
    let db = test_db().await;
    let store = SessionStore::new(db);
    let user = test_user();
    let session = store.create_session(user, "short", None, None).await.unwrap();
    seed_messages(&store, session.id, 4).await;

    let assembler = ContextAssembler::new(store, ContextStrategy::Recent);
    let context = assembler
        .assemble(&session, "openai", &current_turn())
        .await
        .unwrap();

    assert!(!context.using_summary);
    assert_eq!(context.omitted, 0);
    // 4 history + current turn, no notes
    assert_eq!(context.messages.len(), 5);
    assert_eq!(context.messages[0].content, "question 0");
    assert_eq!(context.messages.last().unwrap().content, "next question");
}

#[tokio::test]
async fn test_error_sentinel_messages_are_dropped() {
    let db = test_db().await;
    let store = SessionStore::new(db);
    let user = test_user();
    let session = store.create_session(user, "errors", None, None).await.unwrap();

    store
        .append_message(session.id, NewMessage::text(MessageRole::User, "works"))
        .await
        .unwrap();
    store
        .append_message(
            session.id,
            NewMessage::text(
                MessageRole::Assistant,
                format!("{ERROR_SENTINEL} upstream fell over"),
            ),
        )
        .await
        .unwrap();

    let assembler = ContextAssembler::new(store, ContextStrategy::Recent);
    let context = assembler
        .assemble(&session, "openai", &current_turn())
        .await
        .unwrap();

    assert!(!context
        .messages
        .iter()
        .any(|m| m.content.starts_with(ERROR_SENTINEL)));
    assert_eq!(context.messages.len(), 2);
}

#[tokio::test]
async fn test_summary_path_compresses_old_history() {
    let db = test_db().await;
    let store = SessionStore::new(db);
    let user = test_user();
    let session = store.create_session(user, "long", None, None).await.unwrap();

    // 40 messages, then a summary covering them, then 20 more
    seed_messages(&store, session.id, 40).await;
    let covered = store.list_messages(session.id).await.unwrap();
    store
        .upsert_summary(
            session.id,
            NewSummary {
                summary_text: "the first forty messages, condensed".to_string(),
                message_count: 40,
                start_message_id: covered[0].id,
                end_message_id: covered[39].id,
                tokens_saved: 500,
                model_used: "gpt-3.5-turbo".to_string(),
            },
        )
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    seed_messages(&store, session.id, 20).await;

    let assembler = ContextAssembler::new(store, ContextStrategy::Recent);

    // Compat budget (20): preamble + newest 19 of the tail + current turn
    let context = assembler
        .assemble(&session, "openai-compatible", &current_turn())
        .await
        .unwrap();
    assert!(context.using_summary);
    assert_eq!(context.messages.len(), 1 + 19 + 1);
    assert!(context.messages[0].content.contains("condensed"));
    assert_eq!(context.messages[0].role, MessageRole::System);
    assert_eq!(context.messages.last().unwrap().content, "next question");

    // OpenAI budget (50): the whole 20-message tail fits
    let context = assembler
        .assemble(&session, "openai", &current_turn())
        .await
        .unwrap();
    assert!(context.using_summary);
    assert_eq!(context.messages.len(), 1 + 20 + 1);
}

#[tokio::test]
async fn test_summary_with_no_candidates_still_applies() {
    let db = test_db().await;
    let store = SessionStore::new(db);
    let user = test_user();
    let session = store.create_session(user, "wiped", None, None).await.unwrap();

    // Only error-sentinel messages remain, so the candidate list is empty
    store
        .append_message(
            session.id,
            NewMessage::text(MessageRole::Assistant, format!("{ERROR_SENTINEL} boom")),
        )
        .await
        .unwrap();
    store
        .upsert_summary(
            session.id,
            NewSummary {
                summary_text: "everything so far".to_string(),
                message_count: 2,
                start_message_id: uuid::Uuid::new_v4(),
                end_message_id: uuid::Uuid::new_v4(),
                tokens_saved: 10,
                model_used: "gpt-3.5-turbo".to_string(),
            },
        )
        .await
        .unwrap();

    let assembler = ContextAssembler::new(store, ContextStrategy::Recent);
    let context = assembler
        .assemble(&session, "openai", &current_turn())
        .await
        .unwrap();

    assert!(context.using_summary);
    assert_eq!(context.messages.len(), 2);
    assert!(context.messages[0].content.contains("everything so far"));
    assert_eq!(context.messages[1].content, "next question");
}

#[tokio::test]
async fn test_sliding_window_caps_and_notes_omission() {
    let db = test_db().await;
    let store = SessionStore::new(db);
    let user = test_user();
    let session = store.create_session(user, "window", None, None).await.unwrap();
    seed_messages(&store, session.id, 30).await;

    let assembler = ContextAssembler::new(store, ContextStrategy::Recent);
    let context = assembler
        .assemble(&session, "openai-compatible", &current_turn())
        .await
        .unwrap();

    assert!(!context.using_summary);
    assert_eq!(context.omitted, 10);
    let note = &context.messages[0];
    assert_eq!(note.role, MessageRole::System);
    assert_eq!(
        note.content,
        "[Note: Previous 10 messages omitted to fit context window]"
    );
    // note + 20 window + current turn; never over the cap before the turn
    assert_eq!(context.messages.len(), 1 + 20 + 1);
    let history = &context.messages[..context.messages.len() - 1];
    assert!(history.len() <= limits_for("openai-compatible").max_messages + 1);
}

#[tokio::test]
async fn test_character_budget_trims_from_oldest() {
    let db = test_db().await;
    let store = SessionStore::new(db);
    let user = test_user();
    let session = store.create_session(user, "chars", None, None).await.unwrap();

    let big = "x".repeat(4_000);
    for _ in 0..5 {
        store
            .append_message(session.id, NewMessage::text(MessageRole::User, big.clone()))
            .await
            .unwrap();
    }

    let assembler = ContextAssembler::new(store, ContextStrategy::Recent);
    let context = assembler
        .assemble(&session, "local", &current_turn())
        .await
        .unwrap();

    // 6000-char budget fits one 4000-char message, but two always survive
    let history: Vec<_> = context
        .messages
        .iter()
        .filter(|m| m.role == MessageRole::User && m.content.len() == 4_000)
        .collect();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn test_smart_strategy_keeps_important_messages() {
    let db = test_db().await;
    let store = SessionStore::new(db);
    let user = test_user();
    let session = store.create_session(user, "smart", None, None).await.unwrap();

    // An old high-importance turn a sliding window would lose
    store
        .append_message(
            session.id,
            NewMessage::text(
                MessageRole::Assistant,
                "the fix:\n```rust\nretry(connect)\n```",
            ),
        )
        .await
        .unwrap();
    seed_messages(&store, session.id, 25).await;

    let assembler = ContextAssembler::new(store.clone(), ContextStrategy::Smart);
    let context = assembler
        .assemble(&session, "openai-compatible", &current_turn())
        .await
        .unwrap();

    assert!(context.messages.iter().any(|m| m.content.contains("retry(connect)")));

    let recent = ContextAssembler::new(store, ContextStrategy::Recent);
    let context = recent
        .assemble(&session, "openai-compatible", &current_turn())
        .await
        .unwrap();
    assert!(!context.messages.iter().any(|m| m.content.contains("retry(connect)")));
}

#[tokio::test]
async fn test_preference_prompt_prepended() {
    let db = test_db().await;
    let store = SessionStore::new(db);
    let user = test_user();
    let session = store.create_session(user, "styled", None, None).await.unwrap();
    store
        .update_session(
            user,
            session.id,
            SessionPatch {
                metadata: Some(serde_json::json!({ "response_style": "concise" })),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let session = store.get_session(user, session.id).await.unwrap();
    seed_messages(&store, session.id, 2).await;

    let assembler = ContextAssembler::new(store, ContextStrategy::Recent);
    let context = assembler
        .assemble(&session, "openai", &current_turn())
        .await
        .unwrap();

    assert_eq!(context.messages[0].role, MessageRole::System);
    assert!(context.messages[0].content.contains("concise"));
}
