//! Shared helpers for the SQLite-backed integration tests.

#![allow(dead_code)]

use account_service_lib::infra::Database;
use account_service_lib::repository::{SessionStore, UserStore};
use chrono::{Duration, Utc};
use common::DatabaseConfig;
use domain::{CreateUser, NewSession, NewUser, User};
use sea_orm::{ConnectionTrait, DbBackend, Statement};
use uuid::Uuid;

use account_service_lib::repository::{SessionRepository, UserRepository};

pub const PASSWORD: &str = "CorrectHorse1";

/// Single-connection in-memory database with every migration applied.
///
/// One connection keeps every query on the same in-memory database.
pub async fn setup_db() -> Database {
    let config = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        ..DatabaseConfig::default()
    };

    Database::connect(&config)
        .await
        .expect("in-memory database should open")
}

pub fn stores(db: &Database) -> (UserStore, SessionStore) {
    (
        UserStore::new(db.get_connection()),
        SessionStore::new(db.get_connection()),
    )
}

pub fn new_user(username: &str, email: &str) -> NewUser {
    NewUser::from_input(CreateUser {
        username: username.to_string(),
        email: email.to_string(),
        password: PASSWORD.to_string(),
        ..Default::default()
    })
    .expect("test user input is valid")
}

pub async fn create_user(users: &UserStore, username: &str, email: &str) -> User {
    users
        .create(new_user(username, email))
        .await
        .expect("user should be created")
}

pub fn new_session(user_id: Uuid, token: &str) -> NewSession {
    NewSession::new(user_id, token, Utc::now() + Duration::hours(1))
        .with_client(Some("10.0.0.1".to_string()), Some("integration-test".to_string()))
}

pub async fn count_sessions(sessions: &SessionStore, user_id: Uuid) -> usize {
    sessions
        .list_for_user(user_id)
        .await
        .expect("session listing should succeed")
        .len()
}

/// Names of objects of `kind` ("table" or "index") in the SQLite catalog.
pub async fn sqlite_objects(db: &Database, kind: &str) -> Vec<String> {
    let rows = db
        .connection()
        .query_all(Statement::from_sql_and_values(
            DbBackend::Sqlite,
            "SELECT name FROM sqlite_master WHERE type = ? ORDER BY name",
            [kind.into()],
        ))
        .await
        .expect("catalog query should succeed");

    rows.iter()
        .map(|row| row.try_get::<String>("", "name").expect("name column"))
        .collect()
}
