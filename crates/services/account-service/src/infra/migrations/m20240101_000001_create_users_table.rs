//! Migration: Create the users table and its indexes.

use domain::{
    MAX_EMAIL_LENGTH, MAX_USERNAME_LENGTH, ROLE_USER, USER_STATUS_PENDING, VALID_ROLES,
    VALID_USER_STATUSES,
};
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// (name, column, unique)
fn indexes() -> Vec<(&'static str, Users, bool)> {
    vec![
        ("idx_users_email", Users::Email, true),
        ("idx_users_username", Users::Username, true),
        ("idx_users_status", Users::Status, false),
        ("idx_users_role", Users::Role, false),
        ("idx_users_email_verified", Users::EmailVerified, false),
        ("idx_users_created_at", Users::CreatedAt, false),
        // Every default query filters on deleted_at IS NULL
        ("idx_users_deleted_at", Users::DeletedAt, false),
    ]
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Users::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Users::Username)
                            .string_len(MAX_USERNAME_LENGTH)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Users::Email)
                            .string_len(MAX_EMAIL_LENGTH)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Users::PasswordHash).string_len(255).not_null())
                    .col(ColumnDef::new(Users::FirstName).string_len(100).null())
                    .col(ColumnDef::new(Users::LastName).string_len(100).null())
                    .col(
                        ColumnDef::new(Users::Role)
                            .string_len(20)
                            .not_null()
                            .default(ROLE_USER)
                            .check(Expr::col(Users::Role).is_in(VALID_ROLES.iter().copied())),
                    )
                    .col(
                        ColumnDef::new(Users::Status)
                            .string_len(20)
                            .not_null()
                            .default(USER_STATUS_PENDING)
                            .check(
                                Expr::col(Users::Status)
                                    .is_in(VALID_USER_STATUSES.iter().copied()),
                            ),
                    )
                    .col(
                        ColumnDef::new(Users::EmailVerified)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Users::EmailVerificationToken)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Users::EmailVerificationExpires)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Users::PasswordResetToken).string_len(255).null())
                    .col(
                        ColumnDef::new(Users::PasswordResetExpires)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Users::LastLoginAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Users::LoginAttempts)
                            .integer()
                            .not_null()
                            .default(0)
                            .check(Expr::col(Users::LoginAttempts).gte(0)),
                    )
                    .col(
                        ColumnDef::new(Users::LockedUntil)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Users::Preferences)
                            .json_binary()
                            .not_null()
                            .default("{}"),
                    )
                    .col(
                        ColumnDef::new(Users::Metadata)
                            .json_binary()
                            .not_null()
                            .default("{}"),
                    )
                    .col(
                        ColumnDef::new(Users::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Users::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Users::DeletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        for (name, column, unique) in indexes() {
            let mut index = Index::create();
            index
                .name(name)
                .table(Users::Table)
                .col(column)
                .if_not_exists();
            if unique {
                index.unique();
            }
            manager.create_index(index.to_owned()).await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop the indexes first
        for (name, _, _) in indexes().into_iter().rev() {
            manager
                .drop_index(Index::drop().name(name).table(Users::Table).to_owned())
                .await?;
        }

        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Users {
    Table,
    Id,
    Username,
    Email,
    PasswordHash,
    FirstName,
    LastName,
    Role,
    Status,
    EmailVerified,
    EmailVerificationToken,
    EmailVerificationExpires,
    PasswordResetToken,
    PasswordResetExpires,
    LastLoginAt,
    LoginAttempts,
    LockedUntil,
    Preferences,
    Metadata,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}
