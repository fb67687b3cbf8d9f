//! Account Service Library
//!
//! Persistence for user accounts and their refresh-token sessions:
//! schema migrations, SeaORM repositories and the services composed
//! over them.

pub mod config;
pub mod infra;
pub mod repository;
pub mod service;

use std::sync::Arc;

use tracing::info;

use crate::config::AccountServiceConfig;
use crate::infra::Database;
use crate::repository::{SessionStore, UserStore};
use crate::service::{SessionManager, SessionService, UserManager, UserService};

/// Services wired to one connection pool.
#[derive(Clone)]
pub struct AccountServices {
    pub users: Arc<dyn UserService>,
    pub sessions: Arc<dyn SessionService>,
}

impl AccountServices {
    pub fn new(db: &Database, config: &AccountServiceConfig) -> Self {
        let user_repo = Arc::new(UserStore::new(db.get_connection()));
        let session_repo = Arc::new(SessionStore::new(db.get_connection()));

        Self {
            users: Arc::new(UserManager::new(user_repo, config.login_policy)),
            sessions: Arc::new(SessionManager::new(session_repo)),
        }
    }
}

/// Run migrations (for CLI commands).
pub async fn run_migrations(action: MigrateAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = AccountServiceConfig::from_env();
    let db = Database::connect_without_migrations(&config.database).await?;

    match action {
        MigrateAction::Up => {
            db.run_migrations().await?;
            info!("Migrations applied successfully");
        }
        MigrateAction::Down => {
            db.rollback_migration().await?;
            info!("Rolled back last migration");
        }
        MigrateAction::Status => {
            let status = db.migration_status().await?;
            for (name, applied) in status {
                let marker = if applied { "[x]" } else { "[ ]" };
                println!("{} {}", marker, name);
            }
        }
        MigrateAction::Fresh => {
            db.fresh_migrations().await?;
            info!("Database reset and migrations applied");
        }
        MigrateAction::Reset => {
            db.revert_migrations().await?;
            info!("All migrations rolled back");
        }
    }

    Ok(())
}

/// Migration action type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrateAction {
    Up,
    Down,
    Status,
    Fresh,
    Reset,
}

/// Expire every active session whose deadline has passed.
pub async fn sweep_expired_sessions() -> Result<u64, Box<dyn std::error::Error>> {
    let config = AccountServiceConfig::from_env();
    let db = Database::connect(&config.database).await?;
    let services = AccountServices::new(&db, &config);

    let expired = services.sessions.sweep_expired().await?;
    info!(expired, "Session sweep finished");
    Ok(expired)
}
