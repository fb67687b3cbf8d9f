//! User session repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use uuid::Uuid;

use super::entities::document_json;
use super::entities::user::{self, Entity as UserEntity};
use super::entities::user_session::{self, ActiveModel, Entity as SessionEntity};
use common::{AppError, AppResult};
use domain::{NewSession, SessionStatus, UserSession};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Session repository trait for dependency injection.
///
/// Status changes only ever move a session out of `active`; rows already
/// expired or revoked are never touched by the bulk operations.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert a session for a live user
    async fn create(&self, session: NewSession) -> AppResult<UserSession>;

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<UserSession>>;

    async fn find_by_refresh_token(&self, refresh_token: &str) -> AppResult<Option<UserSession>>;

    /// Every session of a user, newest first
    async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<UserSession>>;

    /// Sessions still valid at `now`, most recently used first
    async fn list_active_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<UserSession>>;

    /// Stamp `last_activity_at` on an active session
    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()>;

    /// Move one active session to `revoked`
    async fn revoke(&self, id: Uuid, reason: String) -> AppResult<UserSession>;

    /// Revoke every active session of a user; returns how many changed
    async fn revoke_all_for_user(&self, user_id: Uuid, reason: String) -> AppResult<u64>;

    /// Move active sessions whose deadline has passed to `expired`
    async fn expire_stale(&self, now: DateTime<Utc>) -> AppResult<u64>;
}

/// SeaORM-backed session store
pub struct SessionStore {
    db: DatabaseConnection,
}

impl SessionStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

/// Revoke every active session of `user_id` on `conn`.
///
/// Shared with the user store so account changes can end sessions in the
/// same transaction.
pub(super) async fn revoke_active_sessions<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<u64, DbErr> {
    let result = SessionEntity::update_many()
        .col_expr(
            user_session::Column::Status,
            Expr::value(SessionStatus::Revoked.as_str()),
        )
        .col_expr(user_session::Column::RevokedAt, Expr::value(now))
        .col_expr(user_session::Column::RevokeReason, Expr::value(reason))
        .col_expr(user_session::Column::UpdatedAt, Expr::value(now))
        .filter(user_session::Column::UserId.eq(user_id))
        .filter(user_session::Column::Status.eq(SessionStatus::Active.as_str()))
        .exec(conn)
        .await?;

    Ok(result.rows_affected)
}

fn to_domain(model: user_session::Model) -> AppResult<UserSession> {
    Ok(UserSession::try_from(model)?)
}

fn to_domain_list(models: Vec<user_session::Model>) -> AppResult<Vec<UserSession>> {
    models.into_iter().map(to_domain).collect()
}

#[async_trait]
impl SessionRepository for SessionStore {
    async fn create(&self, session: NewSession) -> AppResult<UserSession> {
        let now = Utc::now();
        session.validate_at(now)?;
        let device_info = document_json(session.device_info)?;
        let location_info = document_json(session.location_info)?;

        // Rolled back on drop if any step below fails
        let txn = self.db.begin().await?;

        let owner = UserEntity::find_by_id(session.user_id)
            .filter(user::Column::DeletedAt.is_null())
            .one(&txn)
            .await?;
        if owner.is_none() {
            return Err(AppError::invalid_reference(format!(
                "user {} does not exist",
                session.user_id
            )));
        }

        let active_model = ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(session.user_id),
            refresh_token: Set(session.refresh_token),
            status: Set(SessionStatus::Active.to_string()),
            device_info: Set(device_info),
            location_info: Set(location_info),
            ip_address: Set(session.ip_address),
            user_agent: Set(session.user_agent),
            expires_at: Set(session.expires_at),
            last_activity_at: Set(now),
            revoked_at: Set(None),
            revoke_reason: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let model = active_model.insert(&txn).await?;
        txn.commit().await?;

        tracing::debug!(session_id = %model.id, user_id = %model.user_id, "Session opened");
        to_domain(model)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<UserSession>> {
        SessionEntity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(to_domain)
            .transpose()
    }

    async fn find_by_refresh_token(&self, refresh_token: &str) -> AppResult<Option<UserSession>> {
        SessionEntity::find()
            .filter(user_session::Column::RefreshToken.eq(refresh_token))
            .one(&self.db)
            .await?
            .map(to_domain)
            .transpose()
    }

    async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<UserSession>> {
        let models = SessionEntity::find()
            .filter(user_session::Column::UserId.eq(user_id))
            .order_by_desc(user_session::Column::CreatedAt)
            .all(&self.db)
            .await?;

        to_domain_list(models)
    }

    async fn list_active_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<UserSession>> {
        let models = SessionEntity::find()
            .filter(user_session::Column::UserId.eq(user_id))
            .filter(user_session::Column::Status.eq(SessionStatus::Active.as_str()))
            .filter(user_session::Column::ExpiresAt.gt(now))
            .order_by_desc(user_session::Column::LastActivityAt)
            .all(&self.db)
            .await?;

        to_domain_list(models)
    }

    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        let result = SessionEntity::update_many()
            .col_expr(user_session::Column::LastActivityAt, Expr::value(at))
            .col_expr(user_session::Column::UpdatedAt, Expr::value(at))
            .filter(user_session::Column::Id.eq(id))
            .filter(user_session::Column::Status.eq(SessionStatus::Active.as_str()))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn revoke(&self, id: Uuid, reason: String) -> AppResult<UserSession> {
        let mut session = self.find_by_id(id).await?.ok_or(AppError::NotFound)?;
        session.status.transition_to(SessionStatus::Revoked)?;

        let now = Utc::now();
        let result = SessionEntity::update_many()
            .col_expr(
                user_session::Column::Status,
                Expr::value(SessionStatus::Revoked.as_str()),
            )
            .col_expr(user_session::Column::RevokedAt, Expr::value(now))
            .col_expr(user_session::Column::RevokeReason, Expr::value(reason.clone()))
            .col_expr(user_session::Column::UpdatedAt, Expr::value(now))
            .filter(user_session::Column::Id.eq(id))
            .filter(user_session::Column::Status.eq(SessionStatus::Active.as_str()))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            // Another writer ended the session between the read and the update
            let current = self.find_by_id(id).await?.ok_or(AppError::NotFound)?;
            current.status.transition_to(SessionStatus::Revoked)?;
            return Err(AppError::internal("Session revoke lost a concurrent update"));
        }

        session.status = SessionStatus::Revoked;
        session.revoked_at = Some(now);
        session.revoke_reason = Some(reason);
        session.updated_at = now;

        tracing::debug!(session_id = %id, "Session revoked");
        Ok(session)
    }

    async fn revoke_all_for_user(&self, user_id: Uuid, reason: String) -> AppResult<u64> {
        Ok(revoke_active_sessions(&self.db, user_id, &reason, Utc::now()).await?)
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = SessionEntity::update_many()
            .col_expr(
                user_session::Column::Status,
                Expr::value(SessionStatus::Expired.as_str()),
            )
            .col_expr(user_session::Column::UpdatedAt, Expr::value(now))
            .filter(user_session::Column::Status.eq(SessionStatus::Active.as_str()))
            .filter(user_session::Column::ExpiresAt.lte(now))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }
}
