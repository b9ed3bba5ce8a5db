//! Authorization code and access token lifecycle tests.
//!
//! Drives the issuers, validator and revocation manager directly against an
//! in-memory database.

mod common;

use common::{
    CLIENT_SECRET, REDIRECT_URI, create_pooled_test_db, fixture, fixture_on, principal, seed_app,
    seed_user,
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DbBackend, EntityTrait,
    PaginatorTrait, QueryFilter, Statement,
};
use std::sync::Arc;
use stybase_oauth::{
    config::RevocationMode,
    entity::{oauth_authorization, oauth_code, oauth_log, oauth_token, user::Role},
    error::OAuthError,
    oauth2::tokens::GRANT_AUTHORIZATION_CODE,
};
use time::{Duration, OffsetDateTime};
use tokio::sync::Barrier;

async fn approve(f: &common::Fixture) -> String {
    f.state
        .codes
        .issue_code(&principal(&f.user), &f.app, REDIRECT_URI, Some("profile"))
        .await
        .expect("issue code")
}

async fn exchange(f: &common::Fixture, code: &str) -> Result<String, OAuthError> {
    f.state
        .tokens
        .exchange_code(
            &f.app.client_id,
            CLIENT_SECRET,
            code,
            GRANT_AUTHORIZATION_CODE,
            Some(REDIRECT_URI),
        )
        .await
        .map(|response| response.access_token)
}

// =============================================================================
// Code issuance
// =============================================================================

#[tokio::test]
async fn test_issue_code_records_consent_and_code() {
    let f = fixture(RevocationMode::Legacy).await;
    let code = approve(&f).await;
    assert_eq!(code.len(), 43);

    let db = f.state.db.as_ref();
    let consents = oauth_authorization::Entity::find().all(db).await.unwrap();
    assert_eq!(consents.len(), 1);
    assert_eq!(consents[0].user_id, f.user.id);
    assert_eq!(consents[0].app_id, f.app.id);
    assert!(!consents[0].revoked);

    let row = oauth_code::Entity::find()
        .filter(oauth_code::Column::Code.eq(code.as_str()))
        .one(db)
        .await
        .unwrap()
        .expect("code row");
    assert!(!row.used);
    assert_eq!(row.redirect_uri, REDIRECT_URI);
    assert_eq!(row.scope.as_deref(), Some("profile"));
    let lifetime = row.expires_at - OffsetDateTime::now_utc();
    assert!(lifetime > Duration::seconds(590) && lifetime <= Duration::seconds(600));
}

#[tokio::test]
async fn test_repeated_consent_is_not_deduplicated() {
    let f = fixture(RevocationMode::Legacy).await;
    let first = approve(&f).await;
    let second = approve(&f).await;
    assert_ne!(first, second);

    let consents = oauth_authorization::Entity::find()
        .count(f.state.db.as_ref())
        .await
        .unwrap();
    assert_eq!(consents, 2);
}

#[tokio::test]
async fn test_unregistered_redirect_creates_nothing() {
    let f = fixture(RevocationMode::Legacy).await;
    let err = f
        .state
        .codes
        .issue_code(
            &principal(&f.user),
            &f.app,
            "https://client.example/callback/evil",
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OAuthError::RedirectMismatch));

    let db = f.state.db.as_ref();
    assert_eq!(oauth_code::Entity::find().count(db).await.unwrap(), 0);
    assert_eq!(oauth_authorization::Entity::find().count(db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_any_registered_redirect_uri_is_accepted() {
    let f = fixture(RevocationMode::Legacy).await;
    let multi = seed_app(
        f.state.db.as_ref(),
        f.developer.id,
        "client-multi",
        "https://a.example/cb https://b.example/cb",
    )
    .await;

    for uri in ["https://a.example/cb", "https://b.example/cb"] {
        f.state
            .codes
            .issue_code(&principal(&f.user), &multi, uri, None)
            .await
            .expect("registered uri");
    }
    let err = f
        .state
        .codes
        .issue_code(&principal(&f.user), &multi, "https://evil.example/cb", None)
        .await
        .unwrap_err();
    assert!(matches!(err, OAuthError::RedirectMismatch));
}

#[tokio::test]
async fn test_revoked_account_cannot_authorize() {
    let f = fixture(RevocationMode::Legacy).await;
    let revoked = seed_user(f.state.db.as_ref(), "mallory", Role::Revoked).await;
    let err = f
        .state
        .codes
        .issue_code(&principal(&revoked), &f.app, REDIRECT_URI, None)
        .await
        .unwrap_err();
    assert!(matches!(err, OAuthError::Forbidden));
}

// =============================================================================
// Code exchange
// =============================================================================

#[tokio::test]
async fn test_code_is_single_use() {
    let f = fixture(RevocationMode::Legacy).await;
    let code = approve(&f).await;

    let response = f
        .state
        .tokens
        .exchange_code(
            &f.app.client_id,
            CLIENT_SECRET,
            &code,
            GRANT_AUTHORIZATION_CODE,
            None,
        )
        .await
        .expect("first exchange");
    assert_eq!(response.token_type, "bearer");
    assert_eq!(response.expires_in, 3600);
    assert_ne!(response.access_token, response.refresh_token);

    let second = exchange(&f, &code).await.unwrap_err();
    assert!(matches!(second, OAuthError::InvalidCode));

    let db = f.state.db.as_ref();
    assert_eq!(oauth_token::Entity::find().count(db).await.unwrap(), 1);
    let issued = oauth_log::Entity::find()
        .filter(oauth_log::Column::Action.eq("token_issued"))
        .count(db)
        .await
        .unwrap();
    assert_eq!(issued, 1);
}

#[tokio::test]
async fn test_concurrent_exchanges_have_one_winner() {
    let f = fixture(RevocationMode::Legacy).await;
    let code = approve(&f).await;

    let (a, b) = tokio::join!(exchange(&f, &code), exchange(&f, &code));
    let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "got {a:?} and {b:?}");
    let loser = if a.is_err() { a } else { b };
    assert!(matches!(loser, Err(OAuthError::InvalidCode)));

    assert_eq!(
        oauth_token::Entity::find()
            .count(f.state.db.as_ref())
            .await
            .unwrap(),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_exchanges_on_pooled_connections_have_one_winner() {
    const CONTENDERS: usize = 8;
    let dir = tempfile::tempdir().expect("temp dir");
    let f = fixture_on(
        create_pooled_test_db(dir.path()).await,
        RevocationMode::Legacy,
    )
    .await;
    let code = approve(&f).await;

    let start = Arc::new(Barrier::new(CONTENDERS));
    let handles: Vec<_> = (0..CONTENDERS)
        .map(|_| {
            let tokens = f.state.tokens.clone();
            let client_id = f.app.client_id.clone();
            let code = code.clone();
            let start = start.clone();
            tokio::spawn(async move {
                start.wait().await;
                tokens
                    .exchange_code(
                        &client_id,
                        CLIENT_SECRET,
                        &code,
                        GRANT_AUTHORIZATION_CODE,
                        Some(REDIRECT_URI),
                    )
                    .await
            })
        })
        .collect();

    let mut results = Vec::with_capacity(CONTENDERS);
    for handle in handles {
        results.push(handle.await.expect("exchange task"));
    }

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "{results:?}");
    assert!(
        results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(OAuthError::InvalidCode))),
        "{results:?}"
    );
    assert_eq!(
        oauth_token::Entity::find()
            .count(f.state.db.as_ref())
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_code_marked_used_elsewhere_is_not_claimed() {
    let f = fixture(RevocationMode::Legacy).await;
    let code = approve(&f).await;

    let db = f.state.db.as_ref();
    let row = oauth_code::Entity::find()
        .filter(oauth_code::Column::Code.eq(code.as_str()))
        .one(db)
        .await
        .unwrap()
        .unwrap();
    let mut taken: oauth_code::ActiveModel = row.into();
    taken.used = Set(true);
    taken.update(db).await.unwrap();

    let err = exchange(&f, &code).await.unwrap_err();
    assert!(matches!(err, OAuthError::InvalidCode));
    assert_eq!(oauth_token::Entity::find().count(db).await.unwrap(), 0);
    let issued = oauth_log::Entity::find()
        .filter(oauth_log::Column::Action.eq("token_issued"))
        .count(db)
        .await
        .unwrap();
    assert_eq!(issued, 0);
}

#[tokio::test]
async fn test_failed_log_append_rolls_back_the_exchange() {
    let f = fixture(RevocationMode::Legacy).await;
    let code = approve(&f).await;

    let db = f.state.db.as_ref();
    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        "DROP TABLE oauth_logs;",
    ))
    .await
    .unwrap();

    let err = exchange(&f, &code).await.unwrap_err();
    assert!(matches!(err, OAuthError::Store(_)), "{err:?}");

    let row = oauth_code::Entity::find()
        .filter(oauth_code::Column::Code.eq(code.as_str()))
        .one(db)
        .await
        .unwrap()
        .unwrap();
    assert!(!row.used);
    assert_eq!(oauth_token::Entity::find().count(db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_expired_code_is_rejected_and_stays_unused() {
    let f = fixture(RevocationMode::Legacy).await;
    let code = approve(&f).await;

    let db = f.state.db.as_ref();
    let row = oauth_code::Entity::find()
        .filter(oauth_code::Column::Code.eq(code.as_str()))
        .one(db)
        .await
        .unwrap()
        .unwrap();
    let mut stale: oauth_code::ActiveModel = row.into();
    stale.expires_at = Set(OffsetDateTime::now_utc() - Duration::seconds(1));
    stale.update(db).await.unwrap();

    let err = exchange(&f, &code).await.unwrap_err();
    assert!(matches!(err, OAuthError::ExpiredCode));
    assert_eq!(err.error_code(), "invalid_code");

    let row = oauth_code::Entity::find()
        .filter(oauth_code::Column::Code.eq(code.as_str()))
        .one(db)
        .await
        .unwrap()
        .unwrap();
    assert!(!row.used);
    assert_eq!(oauth_token::Entity::find().count(db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_unsupported_grant_touches_nothing() {
    let f = fixture(RevocationMode::Legacy).await;
    let code = approve(&f).await;

    let err = f
        .state
        .tokens
        .exchange_code(&f.app.client_id, CLIENT_SECRET, &code, "refresh_token", None)
        .await
        .unwrap_err();
    assert!(matches!(err, OAuthError::UnsupportedGrantType));

    let row = oauth_code::Entity::find()
        .filter(oauth_code::Column::Code.eq(code.as_str()))
        .one(f.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert!(!row.used);
    exchange(&f, &code).await.expect("code still redeemable");
}

#[tokio::test]
async fn test_client_authentication_failures_are_uniform() {
    let f = fixture(RevocationMode::Legacy).await;
    let code = approve(&f).await;

    let wrong_secret = f
        .state
        .tokens
        .exchange_code(
            &f.app.client_id,
            "not-the-secret",
            &code,
            GRANT_AUTHORIZATION_CODE,
            None,
        )
        .await
        .unwrap_err();
    let unknown_client = f
        .state
        .tokens
        .exchange_code(
            "no-such-client",
            CLIENT_SECRET,
            &code,
            GRANT_AUTHORIZATION_CODE,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(wrong_secret, OAuthError::InvalidClient));
    assert!(matches!(unknown_client, OAuthError::InvalidClient));
    assert_eq!(wrong_secret.description(), unknown_client.description());

    exchange(&f, &code).await.expect("code survives failed auth");
}

#[tokio::test]
async fn test_code_cannot_be_redeemed_by_another_app() {
    let f = fixture(RevocationMode::Legacy).await;
    let other = seed_app(f.state.db.as_ref(), f.developer.id, "client-b", REDIRECT_URI).await;
    let code = approve(&f).await;

    let err = f
        .state
        .tokens
        .exchange_code(
            &other.client_id,
            CLIENT_SECRET,
            &code,
            GRANT_AUTHORIZATION_CODE,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OAuthError::InvalidCode));
    exchange(&f, &code).await.expect("owner can still redeem");
}

#[tokio::test]
async fn test_redirect_uri_must_match_when_presented() {
    let f = fixture(RevocationMode::Legacy).await;
    let code = approve(&f).await;

    let err = f
        .state
        .tokens
        .exchange_code(
            &f.app.client_id,
            CLIENT_SECRET,
            &code,
            GRANT_AUTHORIZATION_CODE,
            Some("https://client.example/other"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OAuthError::InvalidCode));
}

#[tokio::test]
async fn test_unknown_and_empty_codes_are_invalid() {
    let f = fixture(RevocationMode::Legacy).await;
    for code in ["", "never-issued"] {
        let err = exchange(&f, code).await.unwrap_err();
        assert!(matches!(err, OAuthError::InvalidCode), "code {code:?}");
    }
}

// =============================================================================
// Token resolution
// =============================================================================

#[tokio::test]
async fn test_token_resolves_to_profile() {
    let f = fixture(RevocationMode::Legacy).await;
    let code = approve(&f).await;
    let token = exchange(&f, &code).await.unwrap();

    let info = f.state.validator.resolve(&token).await.expect("resolve");
    assert_eq!(info.username, "alice");
    assert_eq!(info.email, "alice@example.org");
    assert_eq!(info.app_password, "alice-app-password");
}

#[tokio::test]
async fn test_token_resolution_errors() {
    let f = fixture(RevocationMode::Legacy).await;
    assert!(matches!(
        f.state.validator.resolve("").await,
        Err(OAuthError::MissingToken)
    ));
    assert!(matches!(
        f.state.validator.resolve("unknown").await,
        Err(OAuthError::InvalidToken)
    ));
}

#[tokio::test]
async fn test_expired_token_is_refreshable_revoked_is_not() {
    let f = fixture(RevocationMode::Legacy).await;
    let db = f.state.db.as_ref();

    let expired = exchange(&f, &approve(&f).await).await.unwrap();
    let row = oauth_token::Entity::find()
        .filter(oauth_token::Column::AccessToken.eq(expired.as_str()))
        .one(db)
        .await
        .unwrap()
        .unwrap();
    let mut stale: oauth_token::ActiveModel = row.into();
    stale.expires_at = Set(OffsetDateTime::now_utc() - Duration::seconds(1));
    stale.update(db).await.unwrap();

    let err = f.state.validator.resolve(&expired).await.unwrap_err();
    assert!(matches!(err, OAuthError::ExpiredToken));
    assert!(err.is_token_refreshable());

    let revoked = exchange(&f, &approve(&f).await).await.unwrap();
    oauth_token::Entity::update_many()
        .col_expr(
            oauth_token::Column::Revoked,
            sea_orm::sea_query::Expr::value(true),
        )
        .filter(oauth_token::Column::AccessToken.eq(revoked.as_str()))
        .exec(db)
        .await
        .unwrap();

    let err = f.state.validator.resolve(&revoked).await.unwrap_err();
    assert!(matches!(err, OAuthError::RevokedToken));
    assert!(!err.is_token_refreshable());
}

// =============================================================================
// Revocation
// =============================================================================

#[tokio::test]
async fn test_consent_revocation_leaves_tokens_valid_in_legacy_mode() {
    let f = fixture(RevocationMode::Legacy).await;
    let token = exchange(&f, &approve(&f).await).await.unwrap();

    let revoked = f
        .state
        .revocation
        .revoke_authorization(&principal(&f.admin), &f.app.client_id, None)
        .await
        .unwrap();
    assert_eq!(revoked, 1);

    let consents = oauth_authorization::Entity::find()
        .all(f.state.db.as_ref())
        .await
        .unwrap();
    assert!(consents.iter().all(|c| c.revoked));

    // Tokens issued before the revocation keep resolving until they expire.
    f.state
        .validator
        .resolve(&token)
        .await
        .expect("token still valid");

    let again = f
        .state
        .revocation
        .revoke_authorization(&principal(&f.admin), &f.app.client_id, None)
        .await
        .unwrap();
    assert_eq!(again, 0);
}

#[tokio::test]
async fn test_consent_revocation_cascades_when_configured() {
    let f = fixture(RevocationMode::Cascade).await;
    let token = exchange(&f, &approve(&f).await).await.unwrap();

    f.state
        .revocation
        .revoke_authorization(&principal(&f.admin), &f.app.client_id, Some(f.user.id))
        .await
        .unwrap();

    let err = f.state.validator.resolve(&token).await.unwrap_err();
    assert!(matches!(err, OAuthError::RevokedToken));
}

#[tokio::test]
async fn test_consent_revocation_can_target_one_user() {
    let f = fixture(RevocationMode::Legacy).await;
    let bob = seed_user(f.state.db.as_ref(), "bob", Role::User).await;
    approve(&f).await;
    f.state
        .codes
        .issue_code(&principal(&bob), &f.app, REDIRECT_URI, None)
        .await
        .unwrap();

    let revoked = f
        .state
        .revocation
        .revoke_authorization(&principal(&f.admin), &f.app.client_id, Some(bob.id))
        .await
        .unwrap();
    assert_eq!(revoked, 1);

    let alice_consent = oauth_authorization::Entity::find()
        .filter(oauth_authorization::Column::UserId.eq(f.user.id))
        .one(f.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert!(!alice_consent.revoked);
}

#[tokio::test]
async fn test_consent_revocation_requires_admin_and_known_client() {
    let f = fixture(RevocationMode::Legacy).await;
    let forbidden = f
        .state
        .revocation
        .revoke_authorization(&principal(&f.developer), &f.app.client_id, None)
        .await
        .unwrap_err();
    assert!(matches!(forbidden, OAuthError::Forbidden));

    let unknown = f
        .state
        .revocation
        .revoke_authorization(&principal(&f.admin), "no-such-client", None)
        .await
        .unwrap_err();
    assert!(matches!(unknown, OAuthError::UnknownClient));
}

#[tokio::test]
async fn test_revoked_user_tokens_stop_resolving() {
    let f = fixture(RevocationMode::Legacy).await;
    let token = exchange(&f, &approve(&f).await).await.unwrap();

    let revoked = f
        .state
        .revocation
        .revoke_user(&principal(&f.admin), f.user.id)
        .await
        .unwrap();
    assert_eq!(revoked.role(), Role::Revoked);

    let err = f.state.validator.resolve(&token).await.unwrap_err();
    assert!(matches!(err, OAuthError::RevokedToken));

    // The token row itself is untouched in legacy mode.
    let row = oauth_token::Entity::find()
        .filter(oauth_token::Column::AccessToken.eq(token.as_str()))
        .one(f.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert!(!row.revoked);
}

#[tokio::test]
async fn test_admin_cannot_revoke_self() {
    let f = fixture(RevocationMode::Legacy).await;
    let err = f
        .state
        .revocation
        .revoke_user(&principal(&f.admin), f.admin.id)
        .await
        .unwrap_err();
    assert!(matches!(err, OAuthError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_app_deletion_removes_dependents() {
    let f = fixture(RevocationMode::Legacy).await;
    let token = exchange(&f, &approve(&f).await).await.unwrap();
    approve(&f).await;

    let removal = f
        .state
        .revocation
        .revoke_app(&principal(&f.admin), &f.app.client_id)
        .await
        .unwrap();
    assert_eq!(removal.authorizations, 2);
    assert_eq!(removal.codes, 2);
    assert_eq!(removal.tokens, 1);

    assert!(matches!(
        f.state.validator.resolve(&token).await,
        Err(OAuthError::InvalidToken)
    ));
    assert!(matches!(
        f.state.registry.find_client(&f.app.client_id).await,
        Err(OAuthError::UnknownClient)
    ));

    let missing = f
        .state
        .revocation
        .revoke_app(&principal(&f.admin), &f.app.client_id)
        .await
        .unwrap_err();
    assert!(matches!(missing, OAuthError::NotFound(_)));
}
