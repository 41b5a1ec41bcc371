//! Session management endpoints

use actix_web::{HttpRequest, HttpResponse, Result as ActixResult, web};
use serde::Deserialize;

use super::{authenticated_user, parse_id, storage_error_response};
use crate::server::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct CreateSessionBody {
    pub title: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
}

pub async fn list(state: web::Data<AppState>, req: HttpRequest) -> ActixResult<HttpResponse> {
    let user_id = authenticated_user(&req)?;
    match state.orchestrator.sessions().list_sessions(user_id).await {
        Ok(sessions) => Ok(HttpResponse::Ok().json(sessions)),
        Err(e) => Ok(storage_error_response(&e)),
    }
}

pub async fn create(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreateSessionBody>,
) -> ActixResult<HttpResponse> {
    let user_id = authenticated_user(&req)?;
    let body = body.into_inner();
    let title = body.title.unwrap_or_else(|| "New conversation".to_string());
    match state
        .orchestrator
        .sessions()
        .create_session(user_id, title, body.provider, body.model)
        .await
    {
        Ok(session) => Ok(HttpResponse::Created().json(session)),
        Err(e) => Ok(storage_error_response(&e)),
    }
}

pub async fn get(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let user_id = authenticated_user(&req)?;
    let id = parse_id(&path)?;
    match state.orchestrator.sessions().get_session(user_id, id).await {
        Ok(session) => Ok(HttpResponse::Ok().json(session)),
        Err(e) => Ok(storage_error_response(&e)),
    }
}

pub async fn delete(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let user_id = authenticated_user(&req)?;
    let id = parse_id(&path)?;
    match state.orchestrator.sessions().delete_session(user_id, id).await {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(e) => Ok(storage_error_response(&e)),
    }
}

pub async fn messages(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let user_id = authenticated_user(&req)?;
    let id = parse_id(&path)?;
    // Ownership check rides the session load
    if let Err(e) = state.orchestrator.sessions().get_session(user_id, id).await {
        return Ok(storage_error_response(&e));
    }
    match state.orchestrator.sessions().list_messages(id).await {
        Ok(messages) => Ok(HttpResponse::Ok().json(messages)),
        Err(e) => Ok(storage_error_response(&e)),
    }
}
