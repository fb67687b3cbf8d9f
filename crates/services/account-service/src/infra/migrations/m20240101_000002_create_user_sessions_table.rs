//! Migration: Create the user_sessions table, its owner foreign key and indexes.

use domain::{
    MAX_IP_ADDRESS_LENGTH, MAX_REFRESH_TOKEN_LENGTH, SESSION_STATUS_ACTIVE, VALID_SESSION_STATUSES,
};
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// (name, columns, unique)
fn indexes() -> Vec<(&'static str, Vec<UserSessions>, bool)> {
    vec![
        (
            "idx_user_sessions_refresh_token",
            vec![UserSessions::RefreshToken],
            true,
        ),
        ("idx_user_sessions_user_id", vec![UserSessions::UserId], false),
        ("idx_user_sessions_status", vec![UserSessions::Status], false),
        ("idx_user_sessions_expires_at", vec![UserSessions::ExpiresAt], false),
        (
            "idx_user_sessions_last_activity_at",
            vec![UserSessions::LastActivityAt],
            false,
        ),
        ("idx_user_sessions_created_at", vec![UserSessions::CreatedAt], false),
        ("idx_user_sessions_ip_address", vec![UserSessions::IpAddress], false),
        // Active sessions for a user
        (
            "idx_user_sessions_user_id_status",
            vec![UserSessions::UserId, UserSessions::Status],
            false,
        ),
        // Expired-but-still-active sweep
        (
            "idx_user_sessions_status_expires_at",
            vec![UserSessions::Status, UserSessions::ExpiresAt],
            false,
        ),
    ]
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UserSessions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserSessions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(UserSessions::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(UserSessions::RefreshToken)
                            .string_len(MAX_REFRESH_TOKEN_LENGTH)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserSessions::Status)
                            .string_len(20)
                            .not_null()
                            .default(SESSION_STATUS_ACTIVE)
                            .check(
                                Expr::col(UserSessions::Status)
                                    .is_in(VALID_SESSION_STATUSES.iter().copied()),
                            ),
                    )
                    .col(
                        ColumnDef::new(UserSessions::DeviceInfo)
                            .json_binary()
                            .not_null()
                            .default("{}"),
                    )
                    .col(
                        ColumnDef::new(UserSessions::LocationInfo)
                            .json_binary()
                            .not_null()
                            .default("{}"),
                    )
                    .col(
                        ColumnDef::new(UserSessions::IpAddress)
                            .string_len(MAX_IP_ADDRESS_LENGTH)
                            .null(),
                    )
                    .col(ColumnDef::new(UserSessions::UserAgent).text().null())
                    .col(
                        ColumnDef::new(UserSessions::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserSessions::LastActivityAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(UserSessions::RevokedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(UserSessions::RevokeReason)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(UserSessions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(UserSessions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_sessions_user_id")
                            .from(UserSessions::Table, UserSessions::UserId)
                            .to(Users::Table, Users::Id)
                            .on_update(ForeignKeyAction::Cascade)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        for (name, columns, unique) in indexes() {
            let mut index = Index::create();
            index.name(name).table(UserSessions::Table).if_not_exists();
            for column in columns {
                index.col(column);
            }
            if unique {
                index.unique();
            }
            manager.create_index(index.to_owned()).await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for (name, _, _) in indexes().into_iter().rev() {
            manager
                .drop_index(
                    Index::drop()
                        .name(name)
                        .table(UserSessions::Table)
                        .to_owned(),
                )
                .await?;
        }

        manager
            .drop_table(Table::drop().table(UserSessions::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum UserSessions {
    Table,
    Id,
    UserId,
    RefreshToken,
    Status,
    DeviceInfo,
    LocationInfo,
    IpAddress,
    UserAgent,
    ExpiresAt,
    LastActivityAt,
    RevokedAt,
    RevokeReason,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Users {
    Table,
    Id,
}
