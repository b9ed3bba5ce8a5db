//! Credential store: account registration, password login and account administration.

use crate::config::AdminBootstrapConfig;
use crate::entity::{
    oauth_log::{self, Action},
    user::{self, Role},
};
use crate::error::OAuthError;
use crate::oauth2::password::{generate_token, hash_password, verify_password};
use crate::oauth2::principal::{Capability, Principal, require};
use sea_orm::{
    ActiveModelTrait,
    ActiveValue::{NotSet, Set},
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use serde::Deserialize;
use std::sync::Arc;
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Registration form.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    /// Secondary credential handed to apps the user authorizes
    pub app_password: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    /// `user` (default) or `developer`
    #[serde(default)]
    pub role: Option<Role>,
}

/// Administrative account change. Absent fields are left as they are.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct AccountUpdate {
    pub role: Option<Role>,
    pub active: Option<bool>,
}

struct AccountRow {
    username: String,
    email: String,
    app_password: String,
    name: Option<String>,
    phone: Option<String>,
    role: Role,
}

fn non_empty(value: &str, field: &'static str) -> Result<String, OAuthError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(OAuthError::MissingParameter(field))
    } else {
        Ok(trimmed.to_string())
    }
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Clone)]
pub struct CredentialStore {
    db: Arc<DatabaseConnection>,
}

impl CredentialStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn ensure_unique(&self, username: &str, email: &str) -> Result<(), OAuthError> {
        let taken = user::Entity::find()
            .filter(
                Condition::any()
                    .add(user::Column::Username.eq(username))
                    .add(user::Column::Email.eq(email)),
            )
            .one(self.db.as_ref())
            .await?;
        match taken {
            Some(existing) if existing.username == username => {
                Err(OAuthError::Conflict("username already taken".into()))
            }
            Some(_) => Err(OAuthError::Conflict("email already registered".into())),
            None => Ok(()),
        }
    }

    async fn insert(&self, row: AccountRow, password: &str) -> Result<user::Model, OAuthError> {
        let hashed = hash_password(password)?;
        let created = user::ActiveModel {
            id: NotSet,
            username: Set(row.username),
            email: Set(row.email),
            password: Set(hashed),
            name: Set(row.name),
            app_password: Set(row.app_password),
            phone: Set(row.phone),
            is_active: Set(true),
            role: Set(row.role.as_str().to_string()),
            created_at: Set(OffsetDateTime::now_utc()),
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(created)
    }

    /// Creates a `user` or `developer` account.
    #[tracing::instrument(skip(self, account), fields(username = %account.username))]
    pub async fn register(&self, account: NewAccount) -> Result<user::Model, OAuthError> {
        let username = non_empty(&account.username, "username")?;
        let email = non_empty(&account.email, "email")?;
        let app_password = non_empty(&account.app_password, "app_password")?;
        if account.password.is_empty() {
            return Err(OAuthError::MissingParameter("password"));
        }
        if !email.contains('@') {
            return Err(OAuthError::InvalidRequest("email is not valid".into()));
        }
        let role = account.role.unwrap_or(Role::User);
        if !matches!(role, Role::User | Role::Developer) {
            return Err(OAuthError::InvalidRequest(
                "role must be user or developer".into(),
            ));
        }

        self.ensure_unique(&username, &email).await?;
        let created = self
            .insert(
                AccountRow {
                    username,
                    email,
                    app_password,
                    name: optional(account.name),
                    phone: optional(account.phone),
                    role,
                },
                &account.password,
            )
            .await?;
        tracing::info!(user_id = created.id, role = %role, "account registered");
        Ok(created)
    }

    /// Password login by username or email.
    ///
    /// Revoked and disabled accounts are refused after the password check.
    #[tracing::instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        username_or_email: &str,
        password: &str,
    ) -> Result<user::Model, OAuthError> {
        let login = username_or_email.trim();
        if login.is_empty() {
            return Err(OAuthError::InvalidCredentials);
        }
        let user = user::Entity::find()
            .filter(
                Condition::any()
                    .add(user::Column::Username.eq(login))
                    .add(user::Column::Email.eq(login)),
            )
            .one(self.db.as_ref())
            .await?
            .ok_or(OAuthError::InvalidCredentials)?;

        if !verify_password(password, &user.password) {
            return Err(OAuthError::InvalidCredentials);
        }
        if user.is_revoked() {
            return Err(OAuthError::AccountRevoked);
        }

        oauth_log::append(self.db.as_ref(), Some(user.id), None, Action::Login).await?;
        Ok(user)
    }

    pub async fn find_by_username(&self, username: &str) -> Result<user::Model, OAuthError> {
        user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| OAuthError::NotFound(format!("user {username}")))
    }

    pub async fn find_by_id(&self, user_id: i32) -> Result<user::Model, OAuthError> {
        user::Entity::find_by_id(user_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| OAuthError::NotFound(format!("user {user_id}")))
    }

    pub async fn list_users(&self, principal: &Principal) -> Result<Vec<user::Model>, OAuthError> {
        require(principal, Capability::Administer)?;
        Ok(user::Entity::find()
            .order_by_asc(user::Column::Id)
            .all(self.db.as_ref())
            .await?)
    }

    /// Changes an account's role or active flag.
    ///
    /// Revocation has its own operation; this refuses to set the `revoked` role.
    #[tracing::instrument(skip(self, principal), fields(admin = principal.user_id))]
    pub async fn update_account(
        &self,
        principal: &Principal,
        user_id: i32,
        update: AccountUpdate,
    ) -> Result<user::Model, OAuthError> {
        require(principal, Capability::Administer)?;
        if update.role == Some(Role::Revoked) {
            return Err(OAuthError::InvalidRequest(
                "use the revoke operation to revoke an account".into(),
            ));
        }
        if principal.user_id == user_id && update.active == Some(false) {
            return Err(OAuthError::InvalidRequest(
                "you cannot disable your own account".into(),
            ));
        }

        let target = self.find_by_id(user_id).await?;
        let mut active: user::ActiveModel = target.into();
        if let Some(role) = update.role {
            active.role = Set(role.as_str().to_string());
        }
        if let Some(is_active) = update.active {
            active.is_active = Set(is_active);
        }
        Ok(active.update(self.db.as_ref()).await?)
    }

    /// Creates the configured administrator unless the username already exists.
    ///
    /// Returns the account when it was created.
    pub async fn ensure_admin(
        &self,
        admin: &AdminBootstrapConfig,
    ) -> Result<Option<user::Model>, OAuthError> {
        let exists = user::Entity::find()
            .filter(user::Column::Username.eq(admin.username.as_str()))
            .one(self.db.as_ref())
            .await?
            .is_some();
        if exists {
            return Ok(None);
        }
        self.ensure_unique(&admin.username, &admin.email).await?;
        let created = self
            .insert(
                AccountRow {
                    username: admin.username.clone(),
                    email: admin.email.clone(),
                    app_password: generate_token()?,
                    name: None,
                    phone: None,
                    role: Role::Admin,
                },
                &admin.password,
            )
            .await?;
        Ok(Some(created))
    }
}
