//! Shared test infrastructure

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use serde_json::json;
use uuid::Uuid;

use unigate::core::context::ContextStrategy;
use unigate::core::orchestrator::Orchestrator;
use unigate::storage::connections::NewConnection;
use unigate::storage::migrations::Migrator;
use unigate::storage::{Connection, ConnectionRegistry, SessionStore};

/// Fresh in-memory database with the schema applied
///
/// One pooled connection, so every handle sees the same memory database and
/// transactions serialize the way a single Postgres row lock would.
pub async fn test_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1);
    let db = Database::connect(options)
        .await
        .expect("in-memory database");
    Migrator::up(&db, None).await.expect("migrations");
    db
}

/// Orchestrator over a fresh database, rate limit wide open
pub async fn test_orchestrator() -> Orchestrator {
    let db = test_db().await;
    Orchestrator::new(db, ContextStrategy::Recent, 100_000)
}

pub fn test_user() -> Uuid {
    Uuid::new_v4()
}

/// Connection whose endpoint points at a mocked upstream
pub async fn mock_connection(
    registry: &ConnectionRegistry,
    user_id: Uuid,
    provider_id: &str,
    base_url: &str,
    models: &[&str],
) -> Connection {
    registry
        .create(
            user_id,
            NewConnection {
                provider_id: provider_id.to_string(),
                name: format!("{provider_id} (mock)"),
                config: json!({
                    "base_url": base_url,
                    "api_key": "sk-test",
                    "models": models,
                }),
                metadata: json!({}),
            },
        )
        .await
        .expect("mock connection")
}

/// Standard OpenAI-format unary completion body
pub fn openai_completion_body(model: &str, content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1700000000,
        "model": model,
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 12, "completion_tokens": 7, "total_tokens": 19 }
    })
}

/// SSE body for an OpenAI-format stream: meta, content deltas, finish, done
pub fn openai_sse_body(model: &str, deltas: &[&str]) -> String {
    let mut body = format!(
        "data: {}\n\n",
        json!({
            "id": "chatcmpl-test",
            "model": model,
            "choices": [{ "index": 0, "delta": { "role": "assistant" }, "finish_reason": null }]
        })
    );
    for delta in deltas {
        body.push_str(&format!(
            "data: {}\n\n",
            json!({
                "id": "chatcmpl-test",
                "model": model,
                "choices": [{ "index": 0, "delta": { "content": delta }, "finish_reason": null }]
            })
        ));
    }
    body.push_str(&format!(
        "data: {}\n\n",
        json!({
            "id": "chatcmpl-test",
            "model": model,
            "choices": [{ "index": 0, "delta": {}, "finish_reason": "stop" }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 7, "total_tokens": 19 }
        })
    ));
    body.push_str("data: [DONE]\n\n");
    body
}

/// Seed `count` plain alternating messages into a session
pub async fn seed_messages(store: &SessionStore, session_id: Uuid, count: usize) {
    use unigate::core::types::MessageRole;
    use unigate::storage::sessions::NewMessage;

    for i in 0..count {
        let (role, text) = if i % 2 == 0 {
            (MessageRole::User, format!("question {i}"))
        } else {
            (MessageRole::Assistant, format!("answer {i}"))
        };
        store
            .append_message(session_id, NewMessage::text(role, text))
            .await
            .expect("seed message");
    }
}
