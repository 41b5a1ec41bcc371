//! Unified chat endpoints
//!
//! `POST /chat` answers unary; `POST /chat/stream` relays tagged chunks as
//! Server-Sent Events (`message` per chunk, a trailing `done` event). Client
//! disconnect drops the SSE stream, which cancels the relay upstream.

use actix_web::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use actix_web::{HttpRequest, HttpResponse, Result as ActixResult, web};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use super::{authenticated_user, gateway_error_response};
use crate::core::types::{GatewayError, UnifiedChatRequest};
use crate::server::state::AppState;

pub async fn chat(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<UnifiedChatRequest>,
) -> ActixResult<HttpResponse> {
    let user_id = authenticated_user(&req)?;
    let mut request = body.into_inner();
    request.user_id = user_id;

    match state.orchestrator.chat(request, CancellationToken::new()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(response)),
        Err(error) => Ok(gateway_error_response(&error)),
    }
}

pub async fn chat_stream(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<UnifiedChatRequest>,
) -> ActixResult<HttpResponse> {
    let user_id = authenticated_user(&req)?;
    let mut request = body.into_inner();
    request.user_id = user_id;

    let cancel = CancellationToken::new();
    let mut chunks = match state.orchestrator.chat_stream(request, cancel).await {
        Ok(chunks) => chunks,
        Err(error) => return Ok(gateway_error_response(&error)),
    };

    let sse = async_stream::stream! {
        while let Some(chunk) = chunks.next().await {
            let terminal = chunk.is_terminal();
            if let Ok(json) = serde_json::to_string(&chunk) {
                yield Ok::<_, GatewayError>(web::Bytes::from(format!(
                    "event: message\ndata: {json}\n\n"
                )));
            }
            if terminal {
                break;
            }
        }
        yield Ok(web::Bytes::from("event: done\ndata: [DONE]\n\n"));
    };

    Ok(HttpResponse::Ok()
        .insert_header((CONTENT_TYPE, "text/event-stream"))
        .insert_header((CACHE_CONTROL, "no-cache"))
        .streaming(sse))
}
