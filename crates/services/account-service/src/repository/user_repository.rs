//! User repository implementation with soft delete support.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use uuid::Uuid;

use super::entities::document_json;
use super::session_repository::revoke_active_sessions;
use super::entities::user::{self, ActiveModel, Entity as UserEntity};
use common::{AppError, AppResult};
use domain::{
    normalize_email, NewUser, UpdateUser, User, UserStatus, REVOKE_REASON_ACCOUNT_DELETED,
    REVOKE_REASON_PASSWORD_CHANGED,
};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// User repository trait for dependency injection.
///
/// By default, all query methods exclude soft-deleted records.
/// Use `*_with_deleted` variants to include them. Email arguments are
/// normalized before they reach the store.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find live user by ID
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>>;

    /// Find user by ID including soft-deleted
    async fn find_by_id_with_deleted(&self, id: Uuid) -> AppResult<Option<User>>;

    /// Find live user by email, ignoring case. Absent is `Ok(None)`.
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;

    /// Find user by email including soft-deleted
    async fn find_by_email_with_deleted(&self, email: &str) -> AppResult<Option<User>>;

    /// Find live user by exact username
    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>>;

    /// Insert a new user. Duplicate email or username is a conflict.
    async fn create(&self, user: NewUser) -> AppResult<User>;

    /// Apply a partial update to a live user
    async fn update(&self, id: Uuid, changes: UpdateUser) -> AppResult<User>;

    /// Replace the password hash, clear any reset token and revoke active
    /// sessions in one transaction. Returns how many sessions were revoked.
    async fn update_password(&self, id: Uuid, password_hash: String) -> AppResult<u64>;

    /// Count a failed login, optionally locking the account.
    ///
    /// A lock that has already run out is cleared and the count restarts at 1.
    async fn record_login_failure(
        &self,
        id: Uuid,
        locked_until: Option<DateTime<Utc>>,
    ) -> AppResult<()>;

    /// Reset the attempt counter, clear the lock and stamp `last_login_at`
    async fn record_login_success(&self, id: Uuid) -> AppResult<()>;

    /// Store an email verification token with its deadline
    async fn set_email_verification_token(
        &self,
        id: Uuid,
        token: String,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Mark the owner of an unexpired verification token as verified
    async fn confirm_email(&self, token: &str) -> AppResult<Option<User>>;

    /// Store a password reset token with its deadline
    async fn set_password_reset_token(
        &self,
        id: Uuid,
        token: String,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Find the live owner of an unexpired reset token
    async fn find_by_password_reset_token(&self, token: &str) -> AppResult<Option<User>>;

    /// Soft delete user by ID and revoke its active sessions in one
    /// transaction. Returns how many sessions were revoked.
    async fn delete(&self, id: Uuid) -> AppResult<u64>;

    /// Permanently delete user; sessions go with it
    async fn hard_delete(&self, id: Uuid) -> AppResult<()>;

    /// Restore a soft-deleted user
    async fn restore(&self, id: Uuid) -> AppResult<User>;

    /// List all live users
    async fn list(&self) -> AppResult<Vec<User>>;

    /// List only soft-deleted users
    async fn list_deleted(&self) -> AppResult<Vec<User>>;
}

/// Concrete implementation of UserRepository with soft delete
pub struct UserStore {
    db: DatabaseConnection,
}

impl UserStore {
    /// Create new repository instance
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn find_live_model(&self, id: Uuid) -> AppResult<user::Model> {
        find_live_model(&self.db, id).await
    }
}

async fn find_live_model<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<user::Model> {
    UserEntity::find_by_id(id)
        .filter(user::Column::DeletedAt.is_null())
        .one(conn)
        .await?
        .ok_or(AppError::NotFound)
}

fn to_domain(model: user::Model) -> AppResult<User> {
    Ok(User::try_from(model)?)
}

fn to_domain_list(models: Vec<user::Model>) -> AppResult<Vec<User>> {
    models.into_iter().map(to_domain).collect()
}

fn ensure_future(expires_at: DateTime<Utc>, what: &str) -> AppResult<()> {
    if expires_at <= Utc::now() {
        return Err(AppError::validation(format!(
            "{} expiry must be in the future",
            what
        )));
    }
    Ok(())
}

#[async_trait]
impl UserRepository for UserStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        UserEntity::find_by_id(id)
            .filter(user::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?
            .map(to_domain)
            .transpose()
    }

    async fn find_by_id_with_deleted(&self, id: Uuid) -> AppResult<Option<User>> {
        UserEntity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(to_domain)
            .transpose()
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        UserEntity::find()
            .filter(user::Column::Email.eq(normalize_email(email)))
            .filter(user::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?
            .map(to_domain)
            .transpose()
    }

    async fn find_by_email_with_deleted(&self, email: &str) -> AppResult<Option<User>> {
        UserEntity::find()
            .filter(user::Column::Email.eq(normalize_email(email)))
            .one(&self.db)
            .await?
            .map(to_domain)
            .transpose()
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        UserEntity::find()
            .filter(user::Column::Username.eq(username.trim()))
            .filter(user::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?
            .map(to_domain)
            .transpose()
    }

    async fn create(&self, user: NewUser) -> AppResult<User> {
        let preferences = document_json(user.preferences)?;
        let metadata = document_json(user.metadata)?;
        let now = Utc::now();
        let active_model = ActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(user.username),
            email: Set(normalize_email(&user.email)),
            password_hash: Set(user.password_hash),
            first_name: Set(user.first_name),
            last_name: Set(user.last_name),
            role: Set(user.role.to_string()),
            status: Set(user.status.to_string()),
            email_verified: Set(false),
            email_verification_token: Set(None),
            email_verification_expires: Set(None),
            password_reset_token: Set(None),
            password_reset_expires: Set(None),
            last_login_at: Set(None),
            login_attempts: Set(0),
            locked_until: Set(None),
            preferences: Set(preferences),
            metadata: Set(metadata),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
        };

        let model = active_model.insert(&self.db).await?;
        tracing::info!(user_id = %model.id, "User created");
        to_domain(model)
    }

    async fn update(&self, id: Uuid, changes: UpdateUser) -> AppResult<User> {
        let preferences = changes.preferences.map(document_json).transpose()?;
        let metadata = changes.metadata.map(document_json).transpose()?;

        // Only allow updating live (non-deleted) users
        let mut active: ActiveModel = self.find_live_model(id).await?.into();

        if let Some(username) = changes.username {
            active.username = Set(username);
        }
        if let Some(email) = changes.email {
            active.email = Set(normalize_email(&email));
        }
        if let Some(first_name) = changes.first_name {
            active.first_name = Set(Some(first_name));
        }
        if let Some(last_name) = changes.last_name {
            active.last_name = Set(Some(last_name));
        }
        if let Some(role) = changes.role {
            active.role = Set(role.to_string());
        }
        if let Some(status) = changes.status {
            active.status = Set(status.to_string());
        }
        if let Some(preferences) = preferences {
            active.preferences = Set(preferences);
        }
        if let Some(metadata) = metadata {
            active.metadata = Set(metadata);
        }
        active.updated_at = Set(Utc::now());

        to_domain(active.update(&self.db).await?)
    }

    async fn update_password(&self, id: Uuid, password_hash: String) -> AppResult<u64> {
        // Rolled back on drop if any step below fails
        let txn = self.db.begin().await?;

        let mut active: ActiveModel = find_live_model(&txn, id).await?.into();
        let now = Utc::now();
        active.password_hash = Set(password_hash);
        active.password_reset_token = Set(None);
        active.password_reset_expires = Set(None);
        active.updated_at = Set(now);
        active.update(&txn).await?;

        let revoked =
            revoke_active_sessions(&txn, id, REVOKE_REASON_PASSWORD_CHANGED, now).await?;
        txn.commit().await?;

        Ok(revoked)
    }

    async fn record_login_failure(
        &self,
        id: Uuid,
        locked_until: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        let now = Utc::now();
        let lock_expired = user::Column::LockedUntil.lte(now);

        let mut update = UserEntity::update_many()
            .col_expr(
                user::Column::LoginAttempts,
                Expr::case(lock_expired.clone(), Expr::value(1))
                    .finally(Expr::col(user::Column::LoginAttempts).add(1))
                    .into(),
            )
            .col_expr(user::Column::UpdatedAt, Expr::value(now));
        update = match locked_until {
            Some(until) => update.col_expr(user::Column::LockedUntil, Expr::value(until)),
            None => update.col_expr(
                user::Column::LockedUntil,
                Expr::case(lock_expired, Expr::value(Option::<DateTime<Utc>>::None))
                    .finally(Expr::col(user::Column::LockedUntil))
                    .into(),
            ),
        };

        let result = update
            .filter(user::Column::Id.eq(id))
            .filter(user::Column::DeletedAt.is_null())
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn record_login_success(&self, id: Uuid) -> AppResult<()> {
        let now = Utc::now();
        let result = UserEntity::update_many()
            .col_expr(user::Column::LoginAttempts, Expr::value(0))
            .col_expr(
                user::Column::LockedUntil,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(user::Column::LastLoginAt, Expr::value(now))
            .col_expr(user::Column::UpdatedAt, Expr::value(now))
            .filter(user::Column::Id.eq(id))
            .filter(user::Column::DeletedAt.is_null())
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn set_email_verification_token(
        &self,
        id: Uuid,
        token: String,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        ensure_future(expires_at, "Email verification")?;

        let mut active: ActiveModel = self.find_live_model(id).await?.into();
        active.email_verification_token = Set(Some(token));
        active.email_verification_expires = Set(Some(expires_at));
        active.updated_at = Set(Utc::now());

        active.update(&self.db).await?;
        Ok(())
    }

    async fn confirm_email(&self, token: &str) -> AppResult<Option<User>> {
        let now = Utc::now();
        let Some(model) = UserEntity::find()
            .filter(user::Column::EmailVerificationToken.eq(token))
            .filter(user::Column::EmailVerificationExpires.gt(now))
            .filter(user::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        let was_pending = model.status == UserStatus::Pending.as_str();
        let mut active: ActiveModel = model.into();
        active.email_verified = Set(true);
        active.email_verification_token = Set(None);
        active.email_verification_expires = Set(None);
        if was_pending {
            active.status = Set(UserStatus::Active.to_string());
        }
        active.updated_at = Set(now);

        to_domain(active.update(&self.db).await?).map(Some)
    }

    async fn set_password_reset_token(
        &self,
        id: Uuid,
        token: String,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        ensure_future(expires_at, "Password reset")?;

        let mut active: ActiveModel = self.find_live_model(id).await?.into();
        active.password_reset_token = Set(Some(token));
        active.password_reset_expires = Set(Some(expires_at));
        active.updated_at = Set(Utc::now());

        active.update(&self.db).await?;
        Ok(())
    }

    async fn find_by_password_reset_token(&self, token: &str) -> AppResult<Option<User>> {
        UserEntity::find()
            .filter(user::Column::PasswordResetToken.eq(token))
            .filter(user::Column::PasswordResetExpires.gt(Utc::now()))
            .filter(user::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?
            .map(to_domain)
            .transpose()
    }

    async fn delete(&self, id: Uuid) -> AppResult<u64> {
        let txn = self.db.begin().await?;

        // Soft delete: set deleted_at timestamp
        let mut active: ActiveModel = find_live_model(&txn, id).await?.into();
        let now = Utc::now();
        active.deleted_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(&txn).await?;

        let revoked =
            revoke_active_sessions(&txn, id, REVOKE_REASON_ACCOUNT_DELETED, now).await?;
        txn.commit().await?;

        tracing::info!(user_id = %id, revoked, "User soft deleted");
        Ok(revoked)
    }

    async fn hard_delete(&self, id: Uuid) -> AppResult<()> {
        let result = UserEntity::delete_by_id(id).exec(&self.db).await?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound);
        }

        tracing::info!(user_id = %id, "User permanently deleted");
        Ok(())
    }

    async fn restore(&self, id: Uuid) -> AppResult<User> {
        let user = UserEntity::find_by_id(id)
            .filter(user::Column::DeletedAt.is_not_null())
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::validation("User is not deleted or does not exist"))?;

        let mut active: ActiveModel = user.into();
        active.deleted_at = Set(None);
        active.updated_at = Set(Utc::now());

        to_domain(active.update(&self.db).await?)
    }

    async fn list(&self) -> AppResult<Vec<User>> {
        let models = UserEntity::find()
            .filter(user::Column::DeletedAt.is_null())
            .order_by_asc(user::Column::CreatedAt)
            .all(&self.db)
            .await?;

        to_domain_list(models)
    }

    async fn list_deleted(&self) -> AppResult<Vec<User>> {
        let models = UserEntity::find()
            .filter(user::Column::DeletedAt.is_not_null())
            .order_by_desc(user::Column::DeletedAt)
            .all(&self.db)
            .await?;

        to_domain_list(models)
    }
}
