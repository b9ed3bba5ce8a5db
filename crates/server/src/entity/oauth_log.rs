//! OAuth audit log entity. Written by the core, read only by the admin listing.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: Option<i32>,
    pub app_id: Option<i32>,
    pub action: String,
    pub timestamp: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Actions recorded in `oauth_logs.action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Login,
    Deny,
    TokenIssued,
    Revoke,
    RevokeUser,
    DeleteApp,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Login => "login",
            Action::Deny => "deny",
            Action::TokenIssued => "token_issued",
            Action::Revoke => "revoke",
            Action::RevokeUser => "revoke_user",
            Action::DeleteApp => "delete_app",
        }
    }
}

/// Appends an audit row. Callers pass their transaction when the entry must
/// commit or roll back with the surrounding change.
pub async fn append<C: ConnectionTrait>(
    db: &C,
    user_id: Option<i32>,
    app_id: Option<i32>,
    action: Action,
) -> Result<Model, DbErr> {
    use sea_orm::ActiveValue::{NotSet, Set};

    ActiveModel {
        id: NotSet,
        user_id: Set(user_id),
        app_id: Set(app_id),
        action: Set(action.as_str().to_string()),
        timestamp: Set(OffsetDateTime::now_utc()),
    }
    .insert(db)
    .await
}
