//! App entity - a registered OAuth client owned by a developer.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const STATUS_ACTIVE: &str = "active";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "apps")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub owner_id: i32,
    pub name: String,
    #[sea_orm(unique)]
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: String,
    /// Whitespace-separated list of registered redirect URIs
    pub redirect_uri: String,
    pub description: Option<String>,
    pub created_at: OffsetDateTime,
    pub status: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::OwnerId",
        to = "super::user::Column::Id"
    )]
    Owner,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Owner.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Registered redirect URIs, in registration order
    pub fn redirect_uris_list(&self) -> Vec<&str> {
        self.redirect_uri.split_whitespace().collect()
    }

    /// Exact string membership; no normalisation, prefix or wildcard matching.
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uri.split_whitespace().any(|allowed| allowed == uri)
    }

    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_with_uris(uris: &str) -> Model {
        Model {
            id: 1,
            owner_id: 1,
            name: "Demo".into(),
            client_id: "client".into(),
            client_secret: "secret".into(),
            redirect_uri: uris.into(),
            description: None,
            created_at: OffsetDateTime::now_utc(),
            status: STATUS_ACTIVE.into(),
        }
    }

    #[test]
    fn redirect_uri_membership_is_exact() {
        let app = app_with_uris("https://a.example/cb https://b.example/cb");
        assert!(app.is_redirect_uri_allowed("https://a.example/cb"));
        assert!(app.is_redirect_uri_allowed("https://b.example/cb"));
        assert!(!app.is_redirect_uri_allowed("https://a.example/cb/"));
        assert!(!app.is_redirect_uri_allowed("https://a.example"));
        assert!(!app.is_redirect_uri_allowed("https://evil.example/cb"));
        assert!(!app.is_redirect_uri_allowed(""));
    }

    #[test]
    fn redirect_uris_accept_newline_separators() {
        let app = app_with_uris("https://a.example/cb\nhttps://b.example/cb\n");
        assert_eq!(
            app.redirect_uris_list(),
            vec!["https://a.example/cb", "https://b.example/cb"]
        );
    }
}
