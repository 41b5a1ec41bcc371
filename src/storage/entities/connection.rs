use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Provider connection database model
///
/// A user-owned binding to one provider: credentials, base URL, model list.
/// At most one row per `(user_id, provider_id)` carries `is_default = true`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "provider_connections")]
pub struct Model {
    /// Connection ID
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    /// Provider family ("openai", "anthropic", "openai-compatible", ...)
    pub provider_id: String,

    /// User-facing connection name
    pub name: String,

    pub enabled: bool,

    pub is_default: bool,

    /// Wire configuration: base_url, api_key, models, timeout_secs
    #[sea_orm(column_type = "Json")]
    #[serde(skip_serializing)]
    pub config: Json,

    #[sea_orm(column_type = "Json")]
    pub metadata: Json,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
