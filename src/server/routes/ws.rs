//! WebSocket chat endpoint
//!
//! Bidirectional variant of the stream route: each client text frame is a
//! `UnifiedChatRequest`, each server frame one `UnifiedStreamChunk` as JSON.
//! A close frame or a failed send cancels the in-flight relay.

use actix_web::{HttpRequest, HttpResponse, Result as ActixResult, web};
use actix_ws::Message;
use futures_util::StreamExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use super::authenticated_user;
use crate::core::types::UnifiedChatRequest;
use crate::server::state::AppState;

pub async fn chat_socket(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Payload,
) -> ActixResult<HttpResponse> {
    let user_id = authenticated_user(&req)?;
    let (response, session, stream) = actix_ws::handle(&req, body)?;
    actix_web::rt::spawn(drive_socket(
        state.get_ref().clone(),
        user_id,
        session,
        stream,
    ));
    Ok(response)
}

async fn drive_socket(
    state: AppState,
    user_id: Uuid,
    mut session: actix_ws::Session,
    mut stream: actix_ws::MessageStream,
) {
    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                let mut request: UnifiedChatRequest = match serde_json::from_str(&text) {
                    Ok(request) => request,
                    Err(e) => {
                        let _ = session
                            .text(
                                json!({
                                    "type": "error",
                                    "error": { "type": "invalid", "message": format!("malformed request: {e}") }
                                })
                                .to_string(),
                            )
                            .await;
                        continue;
                    }
                };
                request.user_id = user_id;

                let cancel = CancellationToken::new();
                match state.orchestrator.chat_stream(request, cancel.clone()).await {
                    Ok(mut chunks) => {
                        while let Some(chunk) = chunks.next().await {
                            let terminal = chunk.is_terminal();
                            let Ok(frame) = serde_json::to_string(&chunk) else {
                                continue;
                            };
                            if session.text(frame).await.is_err() {
                                cancel.cancel();
                                return;
                            }
                            if terminal {
                                break;
                            }
                        }
                    }
                    Err(error) => {
                        let body = match error.as_unified() {
                            Some(unified) => json!({ "type": "error", "error": unified }),
                            None => json!({
                                "type": "error",
                                "error": { "type": "unknown", "message": error.to_string() }
                            }),
                        };
                        if session.text(body.to_string()).await.is_err() {
                            return;
                        }
                    }
                }
            }
            Message::Ping(bytes) => {
                if session.pong(&bytes).await.is_err() {
                    return;
                }
            }
            Message::Close(reason) => {
                debug!(?reason, "websocket closed by client");
                break;
            }
            _ => {}
        }
    }
    let _ = session.close(None).await;
}
