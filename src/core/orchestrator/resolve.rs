//! Connection and model resolution
//!
//! Routing preference order: an explicit connection id, then the user's
//! default for the named provider, then the user's global default. A chain
//! ending with nothing is an `invalid` request, not a server fault.

use serde_json::Value;

use crate::core::types::{GatewayError, UnifiedChatRequest, UnifiedError};
use crate::storage::{Connection, ConnectionRegistry, StorageError};

/// Resolve the connection a request should ride
pub async fn resolve_connection(
    connections: &ConnectionRegistry,
    request: &UnifiedChatRequest,
) -> Result<Connection, GatewayError> {
    let user_id = request.user_id;

    if let Some(connection_id) = request.preferences.connection_id {
        let connection = connections
            .get(user_id, connection_id)
            .await
            .map_err(not_found_is_invalid("requested connection does not exist"))?;
        if !connection.enabled {
            return Err(UnifiedError::invalid("requested connection is disabled").into());
        }
        return Ok(connection);
    }

    if let Some(provider) = &request.preferences.provider {
        return connections
            .get_default(user_id, provider)
            .await
            .map_err(not_found_is_invalid(
                "no enabled connection for the requested provider",
            ));
    }

    connections
        .get_global_default(user_id)
        .await
        .map_err(not_found_is_invalid("user has no configured connections"))
}

fn not_found_is_invalid(message: &'static str) -> impl Fn(StorageError) -> GatewayError {
    move |e| {
        if e.is_not_found() {
            UnifiedError::invalid(message).into()
        } else {
            GatewayError::Storage(e)
        }
    }
}

/// Model for a call: explicit preference, connection config, family default
pub fn pick_model(provider_id: &str, config: &Value, explicit: Option<&str>) -> Option<String> {
    if let Some(model) = explicit.filter(|m| !m.is_empty()) {
        return Some(model.to_string());
    }
    if let Some(model) = config
        .get("models")
        .and_then(Value::as_array)
        .and_then(|list| list.first())
        .and_then(Value::as_str)
    {
        return Some(model.to_string());
    }
    match provider_id {
        "openai" => Some("gpt-3.5-turbo".to_string()),
        "anthropic" => Some("claude-3-haiku-20240307".to_string()),
        _ => None,
    }
}
