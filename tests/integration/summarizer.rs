//! Background summarization against a mocked provider

use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use unigate::core::adapters::AdapterRegistry;
use unigate::core::context::Summarizer;
use unigate::storage::{ConnectionRegistry, SessionStore};

use crate::common::{mock_connection, openai_completion_body, seed_messages, test_db, test_user};

#[tokio::test]
async fn test_summary_written_after_threshold() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_completion_body(
            "gpt-3.5-turbo",
            "They debugged a flaky connection pool.",
        )))
        .expect(1)
        .mount(&upstream)
        .await;

    let db = test_db().await;
    let store = SessionStore::new(db.clone());
    let connections = ConnectionRegistry::new(db);
    let user = test_user();
    mock_connection(&connections, user, "openai", &upstream.uri(), &["gpt-3.5-turbo"]).await;

    let session = store.create_session(user, "busy", None, None).await.unwrap();
    seed_messages(&store, session.id, 24).await;

    let summarizer = Summarizer::new(store.clone(), connections, Arc::new(AdapterRegistry::new()));
    let summary = summarizer
        .run_if_due(&session)
        .await
        .unwrap()
        .expect("summary due");

    assert_eq!(summary.message_count, 24);
    assert!(summary.summary_text.contains("connection pool"));
    assert_eq!(summary.model_used, "gpt-3.5-turbo");
    assert!(summary.tokens_saved >= 0);

    let messages = store.list_messages(session.id).await.unwrap();
    assert_eq!(summary.start_message_id, messages[0].id);
    assert_eq!(summary.end_message_id, messages[23].id);

    let stored = store.latest_summary(session.id).await.unwrap().unwrap();
    assert_eq!(stored.id, summary.id);
}

#[tokio::test]
async fn test_no_summary_below_threshold() {
    let db = test_db().await;
    let store = SessionStore::new(db.clone());
    let connections = ConnectionRegistry::new(db);
    let user = test_user();

    let session = store.create_session(user, "quiet", None, None).await.unwrap();
    seed_messages(&store, session.id, 5).await;

    let summarizer = Summarizer::new(store, connections, Arc::new(AdapterRegistry::new()));
    assert!(summarizer.run_if_due(&session).await.unwrap().is_none());
}

#[tokio::test]
async fn test_only_messages_after_last_summary_count() {
    let db = test_db().await;
    let store = SessionStore::new(db.clone());
    let connections = ConnectionRegistry::new(db);
    let user = test_user();

    let session = store.create_session(user, "resumed", None, None).await.unwrap();
    seed_messages(&store, session.id, 20).await;
    let covered = store.list_messages(session.id).await.unwrap();
    store
        .upsert_summary(
            session.id,
            unigate::storage::sessions::NewSummary {
                summary_text: "first twenty".to_string(),
                message_count: 20,
                start_message_id: covered[0].id,
                end_message_id: covered[19].id,
                tokens_saved: 100,
                model_used: "gpt-3.5-turbo".to_string(),
            },
        )
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    seed_messages(&store, session.id, 5).await;

    // Five new messages since the summary: nothing due yet
    let summarizer = Summarizer::new(store, connections, Arc::new(AdapterRegistry::new()));
    assert!(summarizer.run_if_due(&session).await.unwrap().is_none());
}
