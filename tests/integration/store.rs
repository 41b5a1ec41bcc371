//! Store invariants: ordering, isolation, default linearization

use serde_json::json;
use uuid::Uuid;

use unigate::core::types::MessageRole;
use unigate::storage::connections::{ConnectionPatch, NewConnection};
use unigate::storage::sessions::NewMessage;
use unigate::storage::{ConnectionRegistry, SessionStore};

use crate::common::{mock_connection, test_db, test_user};

// ==================== Sessions & messages ====================

#[tokio::test]
async fn test_message_order_is_non_decreasing() {
    let db = test_db().await;
    let store = SessionStore::new(db);
    let user = test_user();
    let session = store
        .create_session(user, "ordering", None, None)
        .await
        .unwrap();

    store
        .append_message(session.id, NewMessage::text(MessageRole::User, "first"))
        .await
        .unwrap();
    store
        .append_message(session.id, NewMessage::text(MessageRole::Assistant, "second"))
        .await
        .unwrap();
    store
        .append_message(session.id, NewMessage::text(MessageRole::User, "third"))
        .await
        .unwrap();

    let messages = store.list_messages(session.id).await.unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].content, "first");
    assert_eq!(messages[1].content, "second");
    assert_eq!(messages[2].content, "third");
    for pair in messages.windows(2) {
        assert!(pair[0].created_at <= pair[1].created_at);
    }
}

#[tokio::test]
async fn test_sessions_are_user_scoped() {
    let db = test_db().await;
    let store = SessionStore::new(db);
    let owner = test_user();
    let stranger = test_user();

    let session = store.create_session(owner, "private", None, None).await.unwrap();

    assert!(store.get_session(owner, session.id).await.is_ok());
    let err = store.get_session(stranger, session.id).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(store.delete_session(stranger, session.id).await.is_err());
    assert!(store.list_sessions(stranger).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_importance_is_scored_at_write_time() {
    let db = test_db().await;
    let store = SessionStore::new(db);
    let user = test_user();
    let session = store.create_session(user, "scores", None, None).await.unwrap();

    store
        .append_message(
            session.id,
            NewMessage::text(MessageRole::Assistant, "```rust\nfn f() {}\n```"),
        )
        .await
        .unwrap();
    store
        .append_message(session.id, NewMessage::text(MessageRole::User, "plain words"))
        .await
        .unwrap();

    let messages = store.list_messages(session.id).await.unwrap();
    assert!(messages[0].importance > messages[1].importance);
    assert_eq!(messages[0].importance_flags["has_code"], json!(true));
    assert_eq!(messages[1].importance, 0.5);
}

#[tokio::test]
async fn test_summaries_list_newest_first() {
    let db = test_db().await;
    let store = SessionStore::new(db);
    let user = test_user();
    let session = store.create_session(user, "sums", None, None).await.unwrap();
    seed(&store, session.id, 4).await;
    let messages = store.list_messages(session.id).await.unwrap();

    store
        .upsert_summary(
            session.id,
            unigate::storage::sessions::NewSummary {
                summary_text: "older".to_string(),
                message_count: 2,
                start_message_id: messages[0].id,
                end_message_id: messages[1].id,
                tokens_saved: 10,
                model_used: "gpt-3.5-turbo".to_string(),
            },
        )
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    store
        .upsert_summary(
            session.id,
            unigate::storage::sessions::NewSummary {
                summary_text: "newer".to_string(),
                message_count: 4,
                start_message_id: messages[0].id,
                end_message_id: messages[3].id,
                tokens_saved: 20,
                model_used: "gpt-3.5-turbo".to_string(),
            },
        )
        .await
        .unwrap();

    let summaries = store.list_summaries(session.id).await.unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].summary_text, "newer");
    let latest = store.latest_summary(session.id).await.unwrap().unwrap();
    assert_eq!(latest.summary_text, "newer");
}

async fn seed(store: &SessionStore, session_id: Uuid, count: usize) {
    crate::common::seed_messages(store, session_id, count).await;
}

// ==================== Connections & defaults ====================

#[tokio::test]
async fn test_connection_crud_is_user_scoped() {
    let db = test_db().await;
    let registry = ConnectionRegistry::new(db);
    let owner = test_user();
    let stranger = test_user();

    let connection = registry
        .create(
            owner,
            NewConnection {
                provider_id: "openai".to_string(),
                name: "work".to_string(),
                config: json!({ "api_key": "sk-1" }),
                metadata: json!({}),
            },
        )
        .await
        .unwrap();

    assert!(registry.get(owner, connection.id).await.is_ok());
    assert!(registry.get(stranger, connection.id).await.is_err());
    assert!(registry.set_default(stranger, connection.id).await.is_err());

    let updated = registry
        .update(
            owner,
            connection.id,
            ConnectionPatch {
                name: Some("renamed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "renamed");

    registry.delete(owner, connection.id).await.unwrap();
    assert!(registry.get(owner, connection.id).await.is_err());
}

#[tokio::test]
async fn test_set_default_leaves_exactly_one_marked() {
    let db = test_db().await;
    let registry = ConnectionRegistry::new(db);
    let user = test_user();

    let first = mock_connection(&registry, user, "openai", "http://one", &["gpt-4"]).await;
    let second = mock_connection(&registry, user, "openai", "http://two", &["gpt-4"]).await;

    registry.set_default(user, first.id).await.unwrap();
    assert_eq!(registry.count_defaults(user, "openai").await.unwrap(), 1);
    assert_eq!(registry.get_default(user, "openai").await.unwrap().id, first.id);

    registry.set_default(user, second.id).await.unwrap();
    assert_eq!(registry.count_defaults(user, "openai").await.unwrap(), 1);
    assert_eq!(registry.get_default(user, "openai").await.unwrap().id, second.id);

    // The displaced row's flag is gone
    let displaced = registry.get(user, first.id).await.unwrap();
    assert!(!displaced.is_default);
}

#[tokio::test]
async fn test_concurrent_set_default_linearizes_to_one_winner() {
    let db = test_db().await;
    let registry = ConnectionRegistry::new(db);
    let user = test_user();

    let c1 = mock_connection(&registry, user, "openai", "http://one", &["gpt-4"]).await;
    let c2 = mock_connection(&registry, user, "openai", "http://two", &["gpt-4"]).await;

    let (r1, r2) = tokio::join!(
        {
            let registry = registry.clone();
            async move { registry.set_default(user, c1.id).await }
        },
        {
            let registry = registry.clone();
            async move { registry.set_default(user, c2.id).await }
        }
    );
    r1.unwrap();
    r2.unwrap();

    assert_eq!(registry.count_defaults(user, "openai").await.unwrap(), 1);
    let winner = registry.get_default(user, "openai").await.unwrap();
    assert!(winner.id == c1.id || winner.id == c2.id);
}

#[tokio::test]
async fn test_get_default_falls_back_to_oldest_enabled() {
    let db = test_db().await;
    let registry = ConnectionRegistry::new(db);
    let user = test_user();

    let oldest = mock_connection(&registry, user, "anthropic", "http://a", &[]).await;
    let _newer = mock_connection(&registry, user, "anthropic", "http://b", &[]).await;

    // Nothing marked: oldest enabled wins
    assert_eq!(
        registry.get_default(user, "anthropic").await.unwrap().id,
        oldest.id
    );

    // Disabled rows never resolve
    registry
        .update(
            user,
            oldest.id,
            ConnectionPatch {
                enabled: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_ne!(
        registry.get_default(user, "anthropic").await.unwrap().id,
        oldest.id
    );

    let err = registry.get_default(user, "mistral").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_global_default_prefers_most_recent_pointer() {
    let db = test_db().await;
    let registry = ConnectionRegistry::new(db);
    let user = test_user();

    let openai = mock_connection(&registry, user, "openai", "http://o", &[]).await;
    let anthropic = mock_connection(&registry, user, "anthropic", "http://a", &[]).await;

    registry.set_default(user, openai.id).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    registry.set_default(user, anthropic.id).await.unwrap();

    assert_eq!(
        registry.get_global_default(user).await.unwrap().id,
        anthropic.id
    );
}
