//! Route wiring and shared handler helpers

pub mod chat;
pub mod completions;
pub mod connections;
pub mod sessions;
pub mod ws;

use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, web};
use serde_json::json;
use uuid::Uuid;

use crate::core::types::GatewayError;
use crate::storage::StorageError;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/chat", web::post().to(chat::chat))
        .route("/chat/stream", web::post().to(chat::chat_stream))
        .route("/chat/completions", web::post().to(completions::chat_completions))
        .route("/ws/chat", web::get().to(ws::chat_socket))
        .service(
            web::scope("/connections")
                .route("", web::get().to(connections::list))
                .route("", web::post().to(connections::create))
                .route("/{id}", web::get().to(connections::get))
                .route("/{id}", web::put().to(connections::update))
                .route("/{id}", web::delete().to(connections::delete))
                .route("/{id}/default", web::post().to(connections::set_default))
                .route("/{id}/test", web::post().to(connections::test))
                .route("/{id}/models", web::get().to(connections::models)),
        )
        .service(
            web::scope("/sessions")
                .route("", web::get().to(sessions::list))
                .route("", web::post().to(sessions::create))
                .route("/{id}", web::get().to(sessions::get))
                .route("/{id}", web::delete().to(sessions::delete))
                .route("/{id}/messages", web::get().to(sessions::messages)),
        );
}

/// The authenticated identity installed by the auth collaborator
pub(super) fn authenticated_user(req: &HttpRequest) -> Result<Uuid, actix_web::Error> {
    req.headers()
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| actix_web::error::ErrorUnauthorized("missing or malformed x-user-id"))
}

/// Gateway error → JSON error body with the taxonomy status
pub(super) fn gateway_error_response(error: &GatewayError) -> HttpResponse {
    let status = StatusCode::from_u16(error.to_http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = match error.as_unified() {
        Some(unified) => json!({ "error": unified }),
        None => json!({ "error": { "type": "unknown", "message": error.to_string() } }),
    };
    HttpResponse::build(status).json(body)
}

/// Storage error → JSON error body for the CRUD routes
pub(super) fn storage_error_response(error: &StorageError) -> HttpResponse {
    if error.is_not_found() {
        HttpResponse::NotFound().json(json!({ "error": { "type": "not_found", "message": error.to_string() } }))
    } else {
        HttpResponse::InternalServerError()
            .json(json!({ "error": { "type": "unknown", "message": error.to_string() } }))
    }
}

/// Path segment → Uuid, rejecting malformed ids uniformly
pub(super) fn parse_id(raw: &str) -> Result<Uuid, actix_web::Error> {
    Uuid::parse_str(raw).map_err(|_| actix_web::error::ErrorBadRequest("malformed id"))
}
