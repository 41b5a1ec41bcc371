use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Session summary database model
///
/// Each summary stands in for a contiguous prefix of its session's messages.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "session_summaries")]
pub struct Model {
    /// Summary ID
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Session the summary condenses
    pub session_id: Uuid,

    /// Generated summary text
    #[sea_orm(column_type = "Text")]
    pub summary_text: String,

    /// How many messages the summary covers
    pub message_count: i32,

    /// First covered message
    pub start_message_id: Uuid,

    /// Last covered message
    pub end_message_id: Uuid,

    /// Token estimate the summary saves during assembly
    pub tokens_saved: i32,

    /// Model that produced the summary
    pub model_used: String,

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
