//! Creates the account side of the schema:
//! - users: credentials, role and the static app password
//! - app_requests: developer submissions awaiting admin review
//! - apps: registered OAuth clients, created from approved requests

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Users::Username)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Users::Email).string().not_null().unique_key())
                    .col(ColumnDef::new(Users::Password).string().not_null())
                    .col(ColumnDef::new(Users::Name).string().null())
                    .col(ColumnDef::new(Users::AppPassword).string().not_null())
                    .col(ColumnDef::new(Users::Phone).string().null())
                    .col(
                        ColumnDef::new(Users::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Users::Role)
                            .string()
                            .not_null()
                            .default("user"),
                    )
                    .col(
                        ColumnDef::new(Users::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AppRequests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AppRequests::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AppRequests::UserId).integer().not_null())
                    .col(ColumnDef::new(AppRequests::AppName).string().not_null())
                    .col(ColumnDef::new(AppRequests::RedirectUri).text().not_null())
                    .col(ColumnDef::new(AppRequests::Description).text().null())
                    .col(
                        ColumnDef::new(AppRequests::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(AppRequests::SubmittedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_app_requests_user_id")
                            .from(AppRequests::Table, AppRequests::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Apps::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Apps::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Apps::OwnerId).integer().not_null())
                    .col(ColumnDef::new(Apps::Name).string().not_null())
                    .col(
                        ColumnDef::new(Apps::ClientId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Apps::ClientSecret).string().not_null())
                    .col(ColumnDef::new(Apps::RedirectUri).text().not_null())
                    .col(ColumnDef::new(Apps::Description).text().null())
                    .col(
                        ColumnDef::new(Apps::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Apps::Status)
                            .string()
                            .not_null()
                            .default("active"),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_apps_owner_id")
                            .from(Apps::Table, Apps::OwnerId)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Apps::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AppRequests::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
pub(crate) enum Users {
    Table,
    Id,
    Username,
    Email,
    Password,
    Name,
    AppPassword,
    Phone,
    IsActive,
    Role,
    CreatedAt,
}

#[derive(DeriveIden)]
enum AppRequests {
    Table,
    Id,
    UserId,
    AppName,
    RedirectUri,
    Description,
    Status,
    SubmittedAt,
}

#[derive(DeriveIden)]
pub(crate) enum Apps {
    Table,
    Id,
    OwnerId,
    Name,
    ClientId,
    ClientSecret,
    RedirectUri,
    Description,
    CreatedAt,
    Status,
}
