//! App onboarding: developers request apps, administrators approve them.

use crate::entity::{app, app_request, oauth_authorization};
use crate::error::OAuthError;
use crate::oauth2::password::{generate_client_id, generate_token};
use crate::oauth2::principal::{Capability, Principal, can, require};
use sea_orm::{
    ActiveModelTrait,
    ActiveValue::{NotSet, Set},
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use url::Url;
use utoipa::ToSchema;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewAppRequest {
    pub app_name: String,
    /// One or more absolute URIs separated by whitespace
    pub redirect_uri: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AppUpdate {
    pub name: String,
    pub redirect_uri: String,
    pub description: Option<String>,
}

/// An app as seen by its owner or an administrator, credentials included.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AppCredentials {
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uris: Vec<String>,
    pub description: Option<String>,
    pub status: String,
    pub owner_id: i32,
}

impl From<app::Model> for AppCredentials {
    fn from(app: app::Model) -> Self {
        Self {
            redirect_uris: app
                .redirect_uris_list()
                .into_iter()
                .map(str::to_string)
                .collect(),
            name: app.name,
            client_id: app.client_id,
            client_secret: app.client_secret,
            description: app.description,
            status: app.status,
            owner_id: app.owner_id,
        }
    }
}

/// Normalises a redirect URI list to single spaces, rejecting anything that
/// is not an absolute URI.
pub fn normalize_redirect_uris(raw: &str) -> Result<String, OAuthError> {
    let uris: Vec<&str> = raw.split_whitespace().collect();
    if uris.is_empty() {
        return Err(OAuthError::MissingParameter("redirect_uri"));
    }
    for uri in &uris {
        let parsed = Url::parse(uri)
            .map_err(|e| OAuthError::InvalidRequest(format!("invalid redirect_uri {uri}: {e}")))?;
        if parsed.fragment().is_some() {
            return Err(OAuthError::InvalidRequest(format!(
                "redirect_uri {uri} must not contain a fragment"
            )));
        }
    }
    Ok(uris.join(" "))
}

fn required(value: &str, field: &'static str) -> Result<String, OAuthError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(OAuthError::MissingParameter(field))
    } else {
        Ok(trimmed.to_string())
    }
}

fn description(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Clone)]
pub struct AppService {
    db: Arc<DatabaseConnection>,
}

impl AppService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[tracing::instrument(skip(self, principal, request), fields(user_id = principal.user_id))]
    pub async fn submit_request(
        &self,
        principal: &Principal,
        request: NewAppRequest,
    ) -> Result<app_request::Model, OAuthError> {
        require(principal, Capability::RequestApp)?;
        let app_name = required(&request.app_name, "app_name")?;
        let redirect_uri = normalize_redirect_uris(&request.redirect_uri)?;

        let created = app_request::ActiveModel {
            id: NotSet,
            user_id: Set(principal.user_id),
            app_name: Set(app_name),
            redirect_uri: Set(redirect_uri),
            description: Set(description(request.description)),
            status: Set(app_request::STATUS_PENDING.to_string()),
            submitted_at: Set(OffsetDateTime::now_utc()),
        }
        .insert(self.db.as_ref())
        .await?;
        tracing::info!(request_id = created.id, "app request submitted");
        Ok(created)
    }

    pub async fn pending_requests(
        &self,
        principal: &Principal,
    ) -> Result<Vec<app_request::Model>, OAuthError> {
        require(principal, Capability::Administer)?;
        Ok(app_request::Entity::find()
            .filter(app_request::Column::Status.eq(app_request::STATUS_PENDING))
            .order_by_asc(app_request::Column::SubmittedAt)
            .all(self.db.as_ref())
            .await?)
    }

    /// The newest pending request of a user, if any.
    pub async fn latest_pending_request(
        &self,
        user_id: i32,
    ) -> Result<Option<app_request::Model>, OAuthError> {
        Ok(app_request::Entity::find()
            .filter(app_request::Column::UserId.eq(user_id))
            .filter(app_request::Column::Status.eq(app_request::STATUS_PENDING))
            .order_by_desc(app_request::Column::SubmittedAt)
            .order_by_desc(app_request::Column::Id)
            .one(self.db.as_ref())
            .await?)
    }

    /// Creates the app for a pending request with freshly generated credentials.
    #[tracing::instrument(skip(self, principal), fields(admin = principal.user_id))]
    pub async fn approve_request(
        &self,
        principal: &Principal,
        request_id: i32,
    ) -> Result<app::Model, OAuthError> {
        require(principal, Capability::Administer)?;
        let client_id = generate_client_id()?;
        let client_secret = generate_token()?;

        let txn = self.db.begin().await?;
        let request = app_request::Entity::find_by_id(request_id)
            .one(&txn)
            .await?
            .filter(app_request::Model::is_pending)
            .ok_or_else(|| OAuthError::NotFound(format!("pending app request {request_id}")))?;

        let created = app::ActiveModel {
            id: NotSet,
            owner_id: Set(request.user_id),
            name: Set(request.app_name.clone()),
            client_id: Set(client_id),
            client_secret: Set(client_secret),
            redirect_uri: Set(request.redirect_uri.clone()),
            description: Set(request.description.clone()),
            created_at: Set(OffsetDateTime::now_utc()),
            status: Set(app::STATUS_ACTIVE.to_string()),
        }
        .insert(&txn)
        .await?;

        let mut approved: app_request::ActiveModel = request.into();
        approved.status = Set(app_request::STATUS_APPROVED.to_string());
        approved.update(&txn).await?;
        txn.commit().await?;

        tracing::info!(app_id = created.id, client_id = %created.client_id, "app approved");
        Ok(created)
    }

    #[tracing::instrument(skip(self, principal), fields(admin = principal.user_id))]
    pub async fn deny_request(
        &self,
        principal: &Principal,
        request_id: i32,
    ) -> Result<app_request::Model, OAuthError> {
        require(principal, Capability::Administer)?;
        let request = app_request::Entity::find_by_id(request_id)
            .one(self.db.as_ref())
            .await?
            .filter(app_request::Model::is_pending)
            .ok_or_else(|| OAuthError::NotFound(format!("pending app request {request_id}")))?;
        let mut denied: app_request::ActiveModel = request.into();
        denied.status = Set(app_request::STATUS_DENIED.to_string());
        Ok(denied.update(self.db.as_ref()).await?)
    }

    pub async fn list_apps(&self, principal: &Principal) -> Result<Vec<app::Model>, OAuthError> {
        require(principal, Capability::Administer)?;
        Ok(app::Entity::find()
            .order_by_asc(app::Column::Id)
            .all(self.db.as_ref())
            .await?)
    }

    pub async fn owned_apps(&self, owner_id: i32) -> Result<Vec<app::Model>, OAuthError> {
        Ok(app::Entity::find()
            .filter(app::Column::OwnerId.eq(owner_id))
            .order_by_asc(app::Column::Id)
            .all(self.db.as_ref())
            .await?)
    }

    /// Consent rows of a user joined with their apps, newest first.
    pub async fn authorized_apps(
        &self,
        user_id: i32,
    ) -> Result<Vec<(oauth_authorization::Model, app::Model)>, OAuthError> {
        let rows = oauth_authorization::Entity::find()
            .filter(oauth_authorization::Column::UserId.eq(user_id))
            .order_by_desc(oauth_authorization::Column::AuthorizedAt)
            .find_also_related(app::Entity)
            .all(self.db.as_ref())
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(consent, app)| app.map(|app| (consent, app)))
            .collect())
    }

    /// Owner edit of name, redirect URIs and description.
    ///
    /// Apps the principal does not own are reported as not found.
    #[tracing::instrument(skip(self, principal, update), fields(user_id = principal.user_id))]
    pub async fn update_app(
        &self,
        principal: &Principal,
        client_id: &str,
        update: AppUpdate,
    ) -> Result<app::Model, OAuthError> {
        require(principal, Capability::ManageOwnApps)?;
        let name = required(&update.name, "name")?;
        let redirect_uri = normalize_redirect_uris(&update.redirect_uri)?;

        let existing = app::Entity::find()
            .filter(app::Column::ClientId.eq(client_id))
            .one(self.db.as_ref())
            .await?
            .filter(|app| {
                app.owner_id == principal.user_id || can(principal, Capability::Administer)
            })
            .ok_or_else(|| OAuthError::NotFound(format!("app {client_id}")))?;

        let mut active: app::ActiveModel = existing.into();
        active.name = Set(name);
        active.redirect_uri = Set(redirect_uri);
        active.description = Set(description(update.description));
        Ok(active.update(self.db.as_ref()).await?)
    }
}
