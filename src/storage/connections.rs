//! Connection registry
//!
//! Per-user CRUD over provider connections plus default resolution. The
//! default invariant: at most one row per `(user_id, provider_id)` carries
//! `is_default = true`, and the `default_connections` pointer table mirrors
//! that flag. `set_default` rewrites both inside one transaction, so
//! concurrent calls serialize at the database and exactly one wins.

use chrono::Utc;
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveValue::Set, DatabaseConnection, QueryOrder, TransactionTrait};
use serde_json::json;
use uuid::Uuid;

use super::entities::{connection, default_connection, Connection};
use super::StorageError;

/// Input for a new provider connection
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub provider_id: String,
    pub name: String,
    pub config: serde_json::Value,
    pub metadata: serde_json::Value,
}

/// Partial connection update
#[derive(Debug, Clone, Default)]
pub struct ConnectionPatch {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub config: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct ConnectionRegistry {
    db: DatabaseConnection,
}

impl ConnectionRegistry {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        input: NewConnection,
    ) -> Result<Connection, StorageError> {
        let now = Utc::now().fixed_offset();
        let row = connection::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            provider_id: Set(input.provider_id),
            name: Set(input.name),
            enabled: Set(true),
            is_default: Set(false),
            config: Set(input.config),
            metadata: Set(input.metadata),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(row.insert(&self.db).await?)
    }

    pub async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Connection, StorageError> {
        connection::Entity::find()
            .filter(connection::Column::Id.eq(id))
            .filter(connection::Column::UserId.eq(user_id))
            .one(&self.db)
            .await?
            .ok_or(StorageError::not_found("connection"))
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<Connection>, StorageError> {
        Ok(connection::Entity::find()
            .filter(connection::Column::UserId.eq(user_id))
            .order_by_asc(connection::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    /// Update name, enablement, config, or metadata; one atomic row write
    pub async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        patch: ConnectionPatch,
    ) -> Result<Connection, StorageError> {
        let existing = self.get(user_id, id).await?;
        let mut row: connection::ActiveModel = existing.into();
        if let Some(name) = patch.name {
            row.name = Set(name);
        }
        if let Some(enabled) = patch.enabled {
            row.enabled = Set(enabled);
        }
        if let Some(config) = patch.config {
            row.config = Set(config);
        }
        if let Some(metadata) = patch.metadata {
            row.metadata = Set(metadata);
        }
        row.updated_at = Set(Utc::now().fixed_offset());
        Ok(row.update(&self.db).await?)
    }

    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), StorageError> {
        let existing = self.get(user_id, id).await?;
        default_connection::Entity::delete_many()
            .filter(default_connection::Column::ConnectionId.eq(existing.id))
            .exec(&self.db)
            .await?;
        connection::Entity::delete_by_id(existing.id)
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Mark one connection as its provider's default for this user
    ///
    /// Clears the flag across the `(user, provider)` pair, sets it on the
    /// target, and rewrites the pointer row, all in one transaction.
    pub async fn set_default(&self, user_id: Uuid, id: Uuid) -> Result<Connection, StorageError> {
        let txn = self.db.begin().await?;

        let target = connection::Entity::find()
            .filter(connection::Column::Id.eq(id))
            .filter(connection::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
            .ok_or(StorageError::not_found("connection"))?;

        connection::Entity::update_many()
            .col_expr(connection::Column::IsDefault, Expr::value(false))
            .filter(connection::Column::UserId.eq(user_id))
            .filter(connection::Column::ProviderId.eq(target.provider_id.clone()))
            .exec(&txn)
            .await?;

        connection::Entity::update_many()
            .col_expr(connection::Column::IsDefault, Expr::value(true))
            .col_expr(
                connection::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(connection::Column::Id.eq(target.id))
            .exec(&txn)
            .await?;

        default_connection::Entity::delete_many()
            .filter(default_connection::Column::UserId.eq(user_id))
            .filter(default_connection::Column::ProviderId.eq(target.provider_id.clone()))
            .exec(&txn)
            .await?;
        let pointer = default_connection::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            provider_id: Set(target.provider_id.clone()),
            connection_id: Set(target.id),
            updated_at: Set(Utc::now().fixed_offset()),
        };
        pointer.insert(&txn).await?;

        txn.commit().await?;
        self.get(user_id, id).await
    }

    /// The user's default for one provider
    ///
    /// The marked row wins; without one, the oldest enabled connection for
    /// that provider; with neither, not-found.
    pub async fn get_default(
        &self,
        user_id: Uuid,
        provider_id: &str,
    ) -> Result<Connection, StorageError> {
        let marked = connection::Entity::find()
            .filter(connection::Column::UserId.eq(user_id))
            .filter(connection::Column::ProviderId.eq(provider_id))
            .filter(connection::Column::IsDefault.eq(true))
            .filter(connection::Column::Enabled.eq(true))
            .one(&self.db)
            .await?;
        if let Some(found) = marked {
            return Ok(found);
        }

        connection::Entity::find()
            .filter(connection::Column::UserId.eq(user_id))
            .filter(connection::Column::ProviderId.eq(provider_id))
            .filter(connection::Column::Enabled.eq(true))
            .order_by_asc(connection::Column::CreatedAt)
            .one(&self.db)
            .await?
            .ok_or(StorageError::not_found("connection"))
    }

    /// The user's global default, provider unspecified
    ///
    /// Most recently set default pointer wins; without any, the user's
    /// oldest enabled connection.
    pub async fn get_global_default(&self, user_id: Uuid) -> Result<Connection, StorageError> {
        let pointers = default_connection::Entity::find()
            .filter(default_connection::Column::UserId.eq(user_id))
            .order_by_desc(default_connection::Column::UpdatedAt)
            .all(&self.db)
            .await?;
        for pointer in pointers {
            if let Ok(found) = self.get(user_id, pointer.connection_id).await {
                if found.enabled {
                    return Ok(found);
                }
            }
        }

        connection::Entity::find()
            .filter(connection::Column::UserId.eq(user_id))
            .filter(connection::Column::Enabled.eq(true))
            .order_by_asc(connection::Column::CreatedAt)
            .one(&self.db)
            .await?
            .ok_or(StorageError::not_found("connection"))
    }

    /// Count of rows flagged default for a pair; test and invariant support
    pub async fn count_defaults(
        &self,
        user_id: Uuid,
        provider_id: &str,
    ) -> Result<u64, StorageError> {
        use sea_orm::PaginatorTrait;
        Ok(connection::Entity::find()
            .filter(connection::Column::UserId.eq(user_id))
            .filter(connection::Column::ProviderId.eq(provider_id))
            .filter(connection::Column::IsDefault.eq(true))
            .count(&self.db)
            .await?)
    }
}

/// Convenience for building a config JSON in one expression
pub fn connection_config(
    base_url: Option<&str>,
    api_key: Option<&str>,
    models: &[&str],
) -> serde_json::Value {
    let mut config = json!({});
    if let Some(url) = base_url {
        config["base_url"] = json!(url);
    }
    if let Some(key) = api_key {
        config["api_key"] = json!(key);
    }
    if !models.is_empty() {
        config["models"] = json!(models);
    }
    config
}
