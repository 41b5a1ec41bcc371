use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Conversation message database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "messages")]
pub struct Model {
    /// Message ID
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Session this message belongs to
    pub session_id: Uuid,

    /// Author role as its wire name
    pub role: String,

    /// Message text
    #[sea_orm(column_type = "Text")]
    pub content: String,

    /// Tool calls issued by an assistant turn
    pub tool_calls: Option<Json>,

    /// Tool call a tool-role message responds to
    pub tool_call_id: Option<String>,

    /// Context-assembly weight in [0, 1]
    pub importance: f64,

    /// Signals behind the importance score
    #[sea_orm(column_type = "Json")]
    pub importance_flags: Json,

    /// Delivery facts (`truncated` after a cancelled stream, and the like)
    #[sea_orm(column_type = "Json")]
    pub metadata: Json,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::session::Entity",
        from = "Column::SessionId",
        to = "super::session::Column::Id"
    )]
    Session,
}

impl Related<super::session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Session.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
