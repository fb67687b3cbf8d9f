//! End-to-end service flows over the SQLite-backed stores.

mod support;

use chrono::{Duration, Utc};

use account_service_lib::config::AccountServiceConfig;
use account_service_lib::repository::SessionRepository;
use account_service_lib::AccountServices;
use common::AppError;
use domain::{
    CreateUser, LoginPolicy, NewSession, SessionStatus, REVOKE_REASON_ACCOUNT_DELETED,
    REVOKE_REASON_PASSWORD_CHANGED,
};
use support::{setup_db, PASSWORD};

fn registration(username: &str, email: &str) -> CreateUser {
    CreateUser {
        username: username.to_string(),
        email: email.to_string(),
        password: PASSWORD.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_register_authenticate_and_refresh() {
    let db = setup_db().await;
    let services = AccountServices::new(&db, &AccountServiceConfig::default());

    let user = services
        .users
        .register(registration("alice", "Alice@Example.com"))
        .await
        .unwrap();
    let token = services.users.issue_email_verification(user.id).await.unwrap();
    services.users.confirm_email(&token).await.unwrap();

    let authed = services
        .users
        .authenticate("ALICE@example.com", PASSWORD)
        .await
        .unwrap();
    assert_eq!(authed.id, user.id);

    let session = services
        .sessions
        .open_session(NewSession::new(user.id, "refresh-a", Utc::now() + Duration::days(7)))
        .await
        .unwrap();
    let validated = services
        .sessions
        .validate_refresh_token("refresh-a")
        .await
        .unwrap();
    assert_eq!(validated.id, session.id);
}

#[tokio::test]
async fn test_repeated_failures_lock_the_account() {
    let db = setup_db().await;
    let config = AccountServiceConfig::default();
    let services = AccountServices::new(&db, &config);
    let user = services
        .users
        .register(registration("bob", "bob@example.com"))
        .await
        .unwrap();

    for _ in 0..config.login_policy.max_attempts {
        let result = services
            .users
            .authenticate("bob@example.com", "WrongHorse1")
            .await;
        assert!(matches!(result, Err(AppError::InvalidCredentials)));
    }

    let result = services.users.authenticate("bob@example.com", PASSWORD).await;
    assert!(matches!(result, Err(AppError::AccountLocked)));

    let stored = services.users.get_user(user.id).await.unwrap();
    assert_eq!(stored.login_attempts, config.login_policy.max_attempts);
    assert!(stored.is_locked());
}

#[tokio::test]
async fn test_expired_lock_gives_a_fresh_set_of_attempts() {
    let db = setup_db().await;
    let config = AccountServiceConfig {
        login_policy: LoginPolicy {
            max_attempts: 3,
            lockout_duration: Duration::seconds(1),
        },
        ..AccountServiceConfig::default()
    };
    let services = AccountServices::new(&db, &config);
    let user = services
        .users
        .register(registration("bella", "bella@example.com"))
        .await
        .unwrap();

    for _ in 0..3 {
        let result = services
            .users
            .authenticate("bella@example.com", "WrongHorse1")
            .await;
        assert!(matches!(result, Err(AppError::InvalidCredentials)));
    }
    assert!(services.users.get_user(user.id).await.unwrap().is_locked());

    tokio::time::sleep(std::time::Duration::from_millis(1200)).await;

    // One miss after the lock runs out must not lock the account again
    let result = services
        .users
        .authenticate("bella@example.com", "WrongHorse1")
        .await;
    assert!(matches!(result, Err(AppError::InvalidCredentials)));

    let stored = services.users.get_user(user.id).await.unwrap();
    assert_eq!(stored.login_attempts, 1);
    assert!(stored.locked_until.is_none());

    let authed = services
        .users
        .authenticate("bella@example.com", PASSWORD)
        .await
        .unwrap();
    assert_eq!(authed.login_attempts, 0);
}

#[tokio::test]
async fn test_change_password_ends_sessions() {
    let db = setup_db().await;
    let services = AccountServices::new(&db, &AccountServiceConfig::default());
    let user = services
        .users
        .register(registration("carol", "carol@example.com"))
        .await
        .unwrap();
    let session = services
        .sessions
        .open_session(NewSession::new(user.id, "refresh-c", Utc::now() + Duration::days(7)))
        .await
        .unwrap();

    services
        .users
        .change_password(user.id, PASSWORD, "BatteryStaple2")
        .await
        .unwrap();

    let (_, sessions) = support::stores(&db);
    let stored = sessions.find_by_id(session.id).await.unwrap().unwrap();
    assert_eq!(stored.revoke_reason.as_deref(), Some(REVOKE_REASON_PASSWORD_CHANGED));
    assert!(services
        .users
        .authenticate("carol@example.com", "BatteryStaple2")
        .await
        .is_ok());

    let result = services.sessions.validate_refresh_token("refresh-c").await;
    assert!(matches!(result, Err(AppError::Unauthorized)));
    assert!(services
        .sessions
        .list_active_sessions(user.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_delete_user_revokes_and_blocks_new_sessions() {
    let db = setup_db().await;
    let services = AccountServices::new(&db, &AccountServiceConfig::default());
    let user = services
        .users
        .register(registration("dave", "dave@example.com"))
        .await
        .unwrap();
    let session = services
        .sessions
        .open_session(NewSession::new(user.id, "refresh-d", Utc::now() + Duration::days(7)))
        .await
        .unwrap();

    services.users.delete_user(user.id).await.unwrap();

    let (_, sessions) = support::stores(&db);
    let stored = sessions
        .find_by_id(session.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, SessionStatus::Revoked);
    assert_eq!(stored.revoke_reason.as_deref(), Some(REVOKE_REASON_ACCOUNT_DELETED));

    let result = services
        .sessions
        .open_session(NewSession::new(user.id, "refresh-d2", Utc::now() + Duration::days(7)))
        .await;
    assert!(matches!(result, Err(AppError::InvalidReference(_))));

    assert!(services.users.find_by_email("dave@example.com").await.unwrap().is_none());
    let restored = services.users.restore_user(user.id).await.unwrap();
    assert!(!restored.is_deleted());
}
