use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Sessions::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Sessions::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Sessions::UserId).uuid().not_null())
                    .col(ColumnDef::new(Sessions::Title).string().not_null())
                    .col(ColumnDef::new(Sessions::Provider).string().null())
                    .col(ColumnDef::new(Sessions::Model).string().null())
                    .col(ColumnDef::new(Sessions::Metadata).json().not_null())
                    .col(
                        ColumnDef::new(Sessions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Sessions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sessions_user_id")
                    .table(Sessions::Table)
                    .col(Sessions::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Messages::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Messages::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Messages::SessionId).uuid().not_null())
                    .col(ColumnDef::new(Messages::Role).string_len(16).not_null())
                    .col(ColumnDef::new(Messages::Content).text().not_null())
                    .col(ColumnDef::new(Messages::ToolCalls).json().null())
                    .col(ColumnDef::new(Messages::ToolCallId).string().null())
                    .col(
                        ColumnDef::new(Messages::Importance)
                            .double()
                            .not_null()
                            .default(0.5),
                    )
                    .col(ColumnDef::new(Messages::ImportanceFlags).json().not_null())
                    .col(ColumnDef::new(Messages::Metadata).json().not_null())
                    .col(
                        ColumnDef::new(Messages::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_messages_session_id")
                            .from(Messages::Table, Messages::SessionId)
                            .to(Sessions::Table, Sessions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_messages_session_created")
                    .table(Messages::Table)
                    .col(Messages::SessionId)
                    .col(Messages::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SessionSummaries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SessionSummaries::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SessionSummaries::SessionId).uuid().not_null())
                    .col(ColumnDef::new(SessionSummaries::SummaryText).text().not_null())
                    .col(
                        ColumnDef::new(SessionSummaries::MessageCount)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SessionSummaries::StartMessageId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SessionSummaries::EndMessageId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SessionSummaries::TokensSaved)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(SessionSummaries::ModelUsed).string().not_null())
                    .col(
                        ColumnDef::new(SessionSummaries::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_session_summaries_session_id")
                            .from(SessionSummaries::Table, SessionSummaries::SessionId)
                            .to(Sessions::Table, Sessions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_session_summaries_session_created")
                    .table(SessionSummaries::Table)
                    .col(SessionSummaries::SessionId)
                    .col(SessionSummaries::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProviderConnections::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProviderConnections::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProviderConnections::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(ProviderConnections::ProviderId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ProviderConnections::Name).string().not_null())
                    .col(
                        ColumnDef::new(ProviderConnections::Enabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(ProviderConnections::IsDefault)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(ProviderConnections::Config).json().not_null())
                    .col(
                        ColumnDef::new(ProviderConnections::Metadata)
                            .json()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProviderConnections::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProviderConnections::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_provider_connections_user_provider")
                    .table(ProviderConnections::Table)
                    .col(ProviderConnections::UserId)
                    .col(ProviderConnections::ProviderId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DefaultConnections::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DefaultConnections::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DefaultConnections::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(DefaultConnections::ProviderId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DefaultConnections::ConnectionId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DefaultConnections::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_default_connections_connection_id")
                            .from(DefaultConnections::Table, DefaultConnections::ConnectionId)
                            .to(ProviderConnections::Table, ProviderConnections::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One default per (user, provider)
        manager
            .create_index(
                Index::create()
                    .name("uq_default_connections_user_provider")
                    .table(DefaultConnections::Table)
                    .col(DefaultConnections::UserId)
                    .col(DefaultConnections::ProviderId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DefaultConnections::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProviderConnections::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SessionSummaries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Messages::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Sessions::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Sessions {
    Table,
    Id,
    UserId,
    Title,
    Provider,
    Model,
    Metadata,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Messages {
    Table,
    Id,
    SessionId,
    Role,
    Content,
    ToolCalls,
    ToolCallId,
    Importance,
    ImportanceFlags,
    Metadata,
    CreatedAt,
}

#[derive(DeriveIden)]
enum SessionSummaries {
    Table,
    Id,
    SessionId,
    SummaryText,
    MessageCount,
    StartMessageId,
    EndMessageId,
    TokensSaved,
    ModelUsed,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ProviderConnections {
    Table,
    Id,
    UserId,
    ProviderId,
    Name,
    Enabled,
    IsDefault,
    Config,
    Metadata,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum DefaultConnections {
    Table,
    Id,
    UserId,
    ProviderId,
    ConnectionId,
    UpdatedAt,
}
