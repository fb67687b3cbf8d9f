//! Schema migration tests against in-memory SQLite.

mod support;

use support::{setup_db, sqlite_objects};

const USER_INDEXES: &[&str] = &[
    "idx_users_created_at",
    "idx_users_deleted_at",
    "idx_users_email",
    "idx_users_email_verified",
    "idx_users_role",
    "idx_users_status",
    "idx_users_username",
];

const SESSION_INDEXES: &[&str] = &[
    "idx_user_sessions_created_at",
    "idx_user_sessions_expires_at",
    "idx_user_sessions_ip_address",
    "idx_user_sessions_last_activity_at",
    "idx_user_sessions_refresh_token",
    "idx_user_sessions_status",
    "idx_user_sessions_status_expires_at",
    "idx_user_sessions_user_id",
    "idx_user_sessions_user_id_status",
];

#[tokio::test]
async fn test_apply_creates_tables_and_indexes() {
    let db = setup_db().await;

    let tables = sqlite_objects(&db, "table").await;
    assert!(tables.contains(&"users".to_string()));
    assert!(tables.contains(&"user_sessions".to_string()));

    let indexes = sqlite_objects(&db, "index").await;
    for name in USER_INDEXES.iter().chain(SESSION_INDEXES) {
        assert!(indexes.contains(&name.to_string()), "missing index {}", name);
    }
}

#[tokio::test]
async fn test_revert_drops_everything() {
    let db = setup_db().await;

    db.revert_migrations().await.unwrap();

    let tables = sqlite_objects(&db, "table").await;
    assert!(!tables.contains(&"users".to_string()));
    assert!(!tables.contains(&"user_sessions".to_string()));

    let indexes = sqlite_objects(&db, "index").await;
    assert!(indexes.iter().all(|name| !name.starts_with("idx_user")));
}

#[tokio::test]
async fn test_revert_then_apply_restores_schema() {
    let db = setup_db().await;
    let tables_before = sqlite_objects(&db, "table").await;
    let indexes_before = sqlite_objects(&db, "index").await;

    db.revert_migrations().await.unwrap();
    db.run_migrations().await.unwrap();

    assert_eq!(sqlite_objects(&db, "table").await, tables_before);
    assert_eq!(sqlite_objects(&db, "index").await, indexes_before);
}

#[tokio::test]
async fn test_migration_status_tracks_rollback() {
    let db = setup_db().await;

    let status = db.migration_status().await.unwrap();
    assert_eq!(status.len(), 2);
    assert!(status.iter().all(|(_, applied)| *applied));

    db.rollback_migration().await.unwrap();

    let status = db.migration_status().await.unwrap();
    assert_eq!(
        status,
        vec![
            ("m20240101_000001_create_users_table".to_string(), true),
            ("m20240101_000002_create_user_sessions_table".to_string(), false),
        ]
    );
    assert!(!sqlite_objects(&db, "table")
        .await
        .contains(&"user_sessions".to_string()));
}

#[tokio::test]
async fn test_apply_is_idempotent() {
    let db = setup_db().await;

    db.run_migrations().await.unwrap();

    let status = db.migration_status().await.unwrap();
    assert!(status.iter().all(|(_, applied)| *applied));
}
