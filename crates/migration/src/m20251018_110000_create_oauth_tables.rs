//! Creates the OAuth lifecycle tables:
//! - oauth_authorizations: consent records (append-only, soft revocation)
//! - oauth_codes: one-time authorization codes
//! - oauth_tokens: access/refresh token pairs
//! - oauth_logs: audit trail

use crate::m20251018_100000_create_accounts_and_apps::{Apps, Users};
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OAuthAuthorizations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuthAuthorizations::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OAuthAuthorizations::UserId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuthAuthorizations::AppId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuthAuthorizations::AuthorizedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(OAuthAuthorizations::Revoked)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_oauth_authorizations_user_id")
                            .from(OAuthAuthorizations::Table, OAuthAuthorizations::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_oauth_authorizations_app_id")
                            .from(OAuthAuthorizations::Table, OAuthAuthorizations::AppId)
                            .to(Apps::Table, Apps::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OAuthCodes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuthCodes::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OAuthCodes::Code)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(OAuthCodes::UserId).integer().not_null())
                    .col(ColumnDef::new(OAuthCodes::AppId).integer().not_null())
                    .col(ColumnDef::new(OAuthCodes::RedirectUri).text().not_null())
                    .col(ColumnDef::new(OAuthCodes::Scope).text().null())
                    .col(
                        ColumnDef::new(OAuthCodes::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuthCodes::Used)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_oauth_codes_user_id")
                            .from(OAuthCodes::Table, OAuthCodes::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_oauth_codes_app_id")
                            .from(OAuthCodes::Table, OAuthCodes::AppId)
                            .to(Apps::Table, Apps::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OAuthTokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuthTokens::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OAuthTokens::UserId).integer().not_null())
                    .col(ColumnDef::new(OAuthTokens::AppId).integer().not_null())
                    .col(
                        ColumnDef::new(OAuthTokens::AccessToken)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(OAuthTokens::RefreshToken)
                            .string()
                            .null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(OAuthTokens::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuthTokens::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(OAuthTokens::Revoked)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_oauth_tokens_user_id")
                            .from(OAuthTokens::Table, OAuthTokens::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_oauth_tokens_app_id")
                            .from(OAuthTokens::Table, OAuthTokens::AppId)
                            .to(Apps::Table, Apps::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OAuthLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuthLogs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OAuthLogs::UserId).integer().null())
                    .col(ColumnDef::new(OAuthLogs::AppId).integer().null())
                    .col(ColumnDef::new(OAuthLogs::Action).string().not_null())
                    .col(
                        ColumnDef::new(OAuthLogs::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_oauth_logs_user_id")
                            .from(OAuthLogs::Table, OAuthLogs::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_oauth_logs_app_id")
                            .from(OAuthLogs::Table, OAuthLogs::AppId)
                            .to(Apps::Table, Apps::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth_tokens_user_id")
                    .table(OAuthTokens::Table)
                    .col(OAuthTokens::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth_authorizations_app_id")
                    .table(OAuthAuthorizations::Table)
                    .col(OAuthAuthorizations::AppId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_oauth_authorizations_app_id")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(Index::drop().name("idx_oauth_tokens_user_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(OAuthLogs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuthTokens::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuthCodes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuthAuthorizations::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum OAuthAuthorizations {
    #[sea_orm(iden = "oauth_authorizations")]
    Table,
    Id,
    UserId,
    AppId,
    AuthorizedAt,
    Revoked,
}

#[derive(DeriveIden)]
enum OAuthCodes {
    #[sea_orm(iden = "oauth_codes")]
    Table,
    Id,
    Code,
    UserId,
    AppId,
    RedirectUri,
    Scope,
    ExpiresAt,
    Used,
}

#[derive(DeriveIden)]
enum OAuthTokens {
    #[sea_orm(iden = "oauth_tokens")]
    Table,
    Id,
    UserId,
    AppId,
    AccessToken,
    RefreshToken,
    ExpiresAt,
    CreatedAt,
    Revoked,
}

#[derive(DeriveIden)]
enum OAuthLogs {
    #[sea_orm(iden = "oauth_logs")]
    Table,
    Id,
    UserId,
    AppId,
    Action,
    Timestamp,
}
