//! Connection management endpoints

use actix_web::{HttpRequest, HttpResponse, Result as ActixResult, web};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{authenticated_user, gateway_error_response, parse_id, storage_error_response};
use crate::server::state::AppState;
use crate::storage::connections::{ConnectionPatch, NewConnection};

#[derive(Debug, Deserialize)]
pub struct CreateConnectionBody {
    pub provider_id: String,
    pub name: String,
    #[serde(default = "empty_object")]
    pub config: Value,
    #[serde(default = "empty_object")]
    pub metadata: Value,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateConnectionBody {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub config: Option<Value>,
    pub metadata: Option<Value>,
}

fn empty_object() -> Value {
    json!({})
}

pub async fn list(state: web::Data<AppState>, req: HttpRequest) -> ActixResult<HttpResponse> {
    let user_id = authenticated_user(&req)?;
    match state.orchestrator.connections().list(user_id).await {
        Ok(connections) => Ok(HttpResponse::Ok().json(connections)),
        Err(e) => Ok(storage_error_response(&e)),
    }
}

pub async fn create(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreateConnectionBody>,
) -> ActixResult<HttpResponse> {
    let user_id = authenticated_user(&req)?;
    let body = body.into_inner();
    let input = NewConnection {
        provider_id: body.provider_id,
        name: body.name,
        config: body.config,
        metadata: body.metadata,
    };
    match state.orchestrator.connections().create(user_id, input).await {
        Ok(connection) => Ok(HttpResponse::Created().json(connection)),
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
    match state.orchestrator.connections().get(user_id, id).await {
        Ok(connection) => Ok(HttpResponse::Ok().json(connection)),
        Err(e) => Ok(storage_error_response(&e)),
    }
}

pub async fn update(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<UpdateConnectionBody>,
) -> ActixResult<HttpResponse> {
    let user_id = authenticated_user(&req)?;
    let id = parse_id(&path)?;
    let body = body.into_inner();
    let patch = ConnectionPatch {
        name: body.name,
        enabled: body.enabled,
        config: body.config,
        metadata: body.metadata,
    };
    match state.orchestrator.connections().update(user_id, id, patch).await {
        Ok(connection) => Ok(HttpResponse::Ok().json(connection)),
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
    match state.orchestrator.connections().delete(user_id, id).await {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(e) => Ok(storage_error_response(&e)),
    }
}

pub async fn set_default(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let user_id = authenticated_user(&req)?;
    let id = parse_id(&path)?;
    match state.orchestrator.connections().set_default(user_id, id).await {
        Ok(connection) => Ok(HttpResponse::Ok().json(connection)),
        Err(e) => Ok(storage_error_response(&e)),
    }
}

pub async fn test(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let user_id = authenticated_user(&req)?;
    let id = parse_id(&path)?;
    match state.orchestrator.test_connection(user_id, id).await {
        Ok(report) => Ok(HttpResponse::Ok().json(report)),
        Err(error) => Ok(gateway_error_response(&error)),
    }
}

pub async fn models(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let user_id = authenticated_user(&req)?;
    let id = parse_id(&path)?;
    match state.orchestrator.list_models(user_id, id).await {
        Ok(models) => Ok(HttpResponse::Ok().json(json!({ "data": models }))),
        Err(error) => Ok(gateway_error_response(&error)),
    }
}
