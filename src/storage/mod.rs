//! Persistence layer
//!
//! Two stores over one relational database: the session store (sessions,
//! messages, summaries) and the connection registry (per-user provider
//! bindings). Every user-scoped query carries `user_id` in its predicate;
//! isolation is enforced here, not left to callers.

pub mod connections;
pub mod entities;
pub mod migrations;
pub mod sessions;

pub use connections::ConnectionRegistry;
pub use entities::{Connection, Message, Session, Summary};
pub use sessions::SessionStore;

use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

/// Persistence failure
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("{entity} not found")]
    NotFound { entity: &'static str },
}

impl StorageError {
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Open the database and bring the schema up to date
pub async fn connect_and_migrate(url: &str) -> Result<DatabaseConnection, StorageError> {
    let db = Database::connect(url).await?;
    migrations::Migrator::up(&db, None).await?;
    Ok(db)
}
