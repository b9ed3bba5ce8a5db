//! Shared fixtures: an in-memory database with the full schema, seeded
//! accounts and apps, and state/session helpers.

#![allow(dead_code)]

use axum::http::HeaderValue;
use sea_orm::{
    ActiveModelTrait,
    ActiveValue::{NotSet, Set},
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement,
};
use std::{
    path::Path,
    sync::{Arc, OnceLock},
};
use stybase_oauth::{
    config::{AppConfig, OAuthConfig, RevocationMode, SessionConfig},
    entity::{
        app,
        user::{self, Role},
    },
    oauth2::{OAuth2State, Principal, hash_password},
};
use time::OffsetDateTime;

pub const PASSWORD: &str = "correct horse battery staple";
pub const REDIRECT_URI: &str = "https://client.example/callback";
pub const CLIENT_SECRET: &str = "s3cr3t-client-secret";

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL,
        name TEXT NULL,
        app_password TEXT NOT NULL,
        phone TEXT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        role TEXT NOT NULL DEFAULT 'user',
        created_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE app_requests (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        app_name TEXT NOT NULL,
        redirect_uri TEXT NOT NULL,
        description TEXT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        submitted_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE apps (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        client_id TEXT NOT NULL UNIQUE,
        client_secret TEXT NOT NULL,
        redirect_uri TEXT NOT NULL,
        description TEXT NULL,
        created_at TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'active'
    );"#,
    r#"CREATE TABLE oauth_authorizations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        app_id INTEGER NOT NULL,
        authorized_at TEXT NOT NULL,
        revoked INTEGER NOT NULL DEFAULT 0
    );"#,
    r#"CREATE TABLE oauth_codes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        code TEXT NOT NULL UNIQUE,
        user_id INTEGER NOT NULL,
        app_id INTEGER NOT NULL,
        redirect_uri TEXT NOT NULL,
        scope TEXT NULL,
        expires_at TEXT NOT NULL,
        used INTEGER NOT NULL DEFAULT 0
    );"#,
    r#"CREATE TABLE oauth_tokens (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        app_id INTEGER NOT NULL,
        access_token TEXT NOT NULL UNIQUE,
        refresh_token TEXT NULL UNIQUE,
        expires_at TEXT NOT NULL,
        created_at TEXT NOT NULL,
        revoked INTEGER NOT NULL DEFAULT 0
    );"#,
    r#"CREATE TABLE oauth_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NULL,
        app_id INTEGER NULL,
        action TEXT NOT NULL,
        timestamp TEXT NOT NULL
    );"#,
];

async fn create_schema(db: &DatabaseConnection) {
    for ddl in SCHEMA {
        db.execute(Statement::from_string(DbBackend::Sqlite, *ddl))
            .await
            .expect("create table");
    }
}

/// Create a test database with the authorization server tables
pub async fn create_test_db() -> Arc<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await.expect("connect");
    create_schema(&db).await;
    Arc::new(db)
}

/// File-backed database whose pool hands out several connections, so
/// transactions from different tasks really overlap.
pub async fn create_pooled_test_db(dir: &Path) -> Arc<DatabaseConnection> {
    let url = format!("sqlite://{}?mode=rwc", dir.join("stybase.db").display());
    let mut options = ConnectOptions::new(url);
    options.max_connections(8).min_connections(2).sqlx_logging(false);
    let db = Database::connect(options).await.expect("connect");
    create_schema(&db).await;
    Arc::new(db)
}

pub fn create_test_config(mode: RevocationMode) -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        listen_addr: "127.0.0.1:0".into(),
        session: SessionConfig {
            secret: "12345678901234567890123456789012".into(),
            cookie_name: "stybase_session".into(),
            lifetime_days: 7,
        },
        oauth: OAuthConfig {
            revocation_mode: mode,
            ..OAuthConfig::default()
        },
        admin: None,
    }
}

pub async fn create_test_state(mode: RevocationMode) -> OAuth2State {
    let db = create_test_db().await;
    OAuth2State::new(db, &create_test_config(mode))
}

/// Argon2 is slow in debug builds, so every seeded account shares one hash.
fn password_hash() -> String {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password(PASSWORD).expect("hash password"))
        .clone()
}

pub async fn seed_user(db: &DatabaseConnection, username: &str, role: Role) -> user::Model {
    user::ActiveModel {
        id: NotSet,
        username: Set(username.to_string()),
        email: Set(format!("{username}@example.org")),
        password: Set(password_hash()),
        name: Set(Some(format!("{username} name"))),
        app_password: Set(format!("{username}-app-password")),
        phone: Set(None),
        is_active: Set(true),
        role: Set(role.as_str().to_string()),
        created_at: Set(OffsetDateTime::now_utc()),
    }
    .insert(db)
    .await
    .expect("insert user")
}

pub async fn seed_app(
    db: &DatabaseConnection,
    owner_id: i32,
    client_id: &str,
    redirect_uris: &str,
) -> app::Model {
    app::ActiveModel {
        id: NotSet,
        owner_id: Set(owner_id),
        name: Set(format!("{client_id} app")),
        client_id: Set(client_id.to_string()),
        client_secret: Set(CLIENT_SECRET.to_string()),
        redirect_uri: Set(redirect_uris.to_string()),
        description: Set(Some("Test app".into())),
        created_at: Set(OffsetDateTime::now_utc()),
        status: Set(app::STATUS_ACTIVE.to_string()),
    }
    .insert(db)
    .await
    .expect("insert app")
}

pub fn principal(user: &user::Model) -> Principal {
    Principal::from(user)
}

/// `Cookie` header value carrying a fresh session for `user_id`.
pub fn session_cookie(state: &OAuth2State, user_id: i32) -> HeaderValue {
    let session = state.sessions.issue(user_id).expect("issue session");
    HeaderValue::from_str(&format!("{}={}", state.sessions.cookie_name, session.token))
        .expect("cookie header")
}

/// A developer owning one app and an ordinary user, the usual cast of a flow test.
pub struct Fixture {
    pub state: OAuth2State,
    pub developer: user::Model,
    pub user: user::Model,
    pub admin: user::Model,
    pub app: app::Model,
}

pub async fn fixture(mode: RevocationMode) -> Fixture {
    fixture_on(create_test_db().await, mode).await
}

pub async fn fixture_on(db: Arc<DatabaseConnection>, mode: RevocationMode) -> Fixture {
    let state = OAuth2State::new(db, &create_test_config(mode));
    let db = state.db.as_ref();
    let admin = seed_user(db, "root", Role::Admin).await;
    let developer = seed_user(db, "dev", Role::Developer).await;
    let user = seed_user(db, "alice", Role::User).await;
    let app = seed_app(db, developer.id, "client-a", REDIRECT_URI).await;
    Fixture {
        state,
        developer,
        user,
        admin,
        app,
    }
}
