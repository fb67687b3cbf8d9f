//! Session service - refresh token sessions for live users.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use common::{AppError, AppResult};
use domain::{NewSession, UserSession};

use crate::repository::SessionRepository;

#[async_trait]
pub trait SessionService: Send + Sync {
    /// Open a session; the owner must be a live user
    async fn open_session(&self, session: NewSession) -> AppResult<UserSession>;

    /// Resolve a refresh token to a valid session and record the activity
    async fn validate_refresh_token(&self, refresh_token: &str) -> AppResult<UserSession>;

    async fn list_active_sessions(&self, user_id: Uuid) -> AppResult<Vec<UserSession>>;

    async fn revoke_session(&self, id: Uuid, reason: &str) -> AppResult<UserSession>;

    /// Revoke every active session of a user; returns how many changed
    async fn revoke_all_sessions(&self, user_id: Uuid, reason: &str) -> AppResult<u64>;

    /// Mark active sessions past their deadline as expired
    async fn sweep_expired(&self) -> AppResult<u64>;
}

pub struct SessionManager {
    sessions: Arc<dyn SessionRepository>,
}

impl SessionManager {
    pub fn new(sessions: Arc<dyn SessionRepository>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl SessionService for SessionManager {
    async fn open_session(&self, session: NewSession) -> AppResult<UserSession> {
        let session = self.sessions.create(session).await?;
        tracing::info!(session_id = %session.id, user_id = %session.user_id, "Session opened");
        Ok(session)
    }

    async fn validate_refresh_token(&self, refresh_token: &str) -> AppResult<UserSession> {
        let mut session = self
            .sessions
            .find_by_refresh_token(refresh_token)
            .await?
            .ok_or(AppError::Unauthorized)?;

        let now = Utc::now();
        if !session.is_valid_at(now) {
            tracing::debug!(session_id = %session.id, status = %session.status, "Rejected refresh token");
            return Err(AppError::Unauthorized);
        }

        self.sessions.touch(session.id, now).await?;
        session.last_activity_at = now;
        session.updated_at = now;
        Ok(session)
    }

    async fn list_active_sessions(&self, user_id: Uuid) -> AppResult<Vec<UserSession>> {
        self.sessions.list_active_for_user(user_id, Utc::now()).await
    }

    async fn revoke_session(&self, id: Uuid, reason: &str) -> AppResult<UserSession> {
        self.sessions.revoke(id, reason.to_string()).await
    }

    async fn revoke_all_sessions(&self, user_id: Uuid, reason: &str) -> AppResult<u64> {
        let revoked = self
            .sessions
            .revoke_all_for_user(user_id, reason.to_string())
            .await?;
        tracing::info!(user_id = %user_id, revoked, reason, "Sessions revoked");
        Ok(revoked)
    }

    async fn sweep_expired(&self) -> AppResult<u64> {
        let expired = self.sessions.expire_stale(Utc::now()).await?;
        if expired > 0 {
            tracing::info!(expired, "Expired stale sessions");
        }
        Ok(expired)
    }
}
