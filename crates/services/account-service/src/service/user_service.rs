//! User service - account lifecycle and login bookkeeping.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use common::{AppError, AppResult, OptionExt};
use domain::{
    CreateUser, LoginPolicy, NewUser, Password, UpdateUser, User, EMAIL_VERIFICATION_TTL_HOURS,
};

use crate::repository::UserRepository;

/// Verified when the email is unknown so both paths pay for a hash check.
const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$ZHVtbXlzYWx0MTIzNDU2$b2JmdXNjYXRlZGR1bW15aGFzaHZhbHVlMDAwMDA";

/// User service trait for dependency injection.
///
/// By default, operations exclude soft-deleted users.
/// Use `*_with_deleted` variants to include them.
#[async_trait]
pub trait UserService: Send + Sync {
    /// Validate, hash and store a new account
    async fn register(&self, input: CreateUser) -> AppResult<User>;

    /// Get live user by ID
    async fn get_user(&self, id: Uuid) -> AppResult<User>;

    /// Get user by ID including soft-deleted
    async fn get_user_with_deleted(&self, id: Uuid) -> AppResult<User>;

    /// Case-insensitive lookup; absent is `Ok(None)`
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;

    /// Case-insensitive lookup; absent is `NotFound`
    async fn get_user_by_email(&self, email: &str) -> AppResult<User>;

    /// Check credentials and record the outcome. Issues no tokens.
    async fn authenticate(&self, email: &str, password: &str) -> AppResult<User>;

    /// Update user details (only live users)
    async fn update_user(&self, id: Uuid, changes: UpdateUser) -> AppResult<User>;

    /// Replace the password and end every open session
    async fn change_password(
        &self,
        id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> AppResult<()>;

    /// Create a verification token; the caller delivers it
    async fn issue_email_verification(&self, id: Uuid) -> AppResult<String>;

    /// Redeem a verification token
    async fn confirm_email(&self, token: &str) -> AppResult<User>;

    /// Soft delete user and revoke its sessions
    async fn delete_user(&self, id: Uuid) -> AppResult<()>;

    /// Permanently delete user; sessions cascade
    async fn hard_delete_user(&self, id: Uuid) -> AppResult<()>;

    /// Restore a soft-deleted user
    async fn restore_user(&self, id: Uuid) -> AppResult<User>;

    /// List all live users
    async fn list_users(&self) -> AppResult<Vec<User>>;

    /// List only soft-deleted users
    async fn list_deleted_users(&self) -> AppResult<Vec<User>>;
}

/// Concrete implementation of UserService over the repositories.
pub struct UserManager {
    users: Arc<dyn UserRepository>,
    policy: LoginPolicy,
}

impl UserManager {
    pub fn new(users: Arc<dyn UserRepository>, policy: LoginPolicy) -> Self {
        Self { users, policy }
    }
}

#[async_trait]
impl UserService for UserManager {
    async fn register(&self, input: CreateUser) -> AppResult<User> {
        let new_user = NewUser::from_input(input)?;

        // Soft-deleted accounts keep their address reserved
        if self
            .users
            .find_by_email_with_deleted(&new_user.email)
            .await?
            .is_some()
        {
            return Err(AppError::conflict("Email"));
        }

        self.users.create(new_user).await
    }

    async fn get_user(&self, id: Uuid) -> AppResult<User> {
        self.users.find_by_id(id).await?.ok_or_not_found()
    }

    async fn get_user_with_deleted(&self, id: Uuid) -> AppResult<User> {
        self.users.find_by_id_with_deleted(id).await?.ok_or_not_found()
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.users.find_by_email(email).await
    }

    async fn get_user_by_email(&self, email: &str) -> AppResult<User> {
        self.users.find_by_email(email).await?.ok_or_not_found()
    }

    async fn authenticate(&self, email: &str, password: &str) -> AppResult<User> {
        let Some(mut user) = self.users.find_by_email(email).await? else {
            let _ = Password::from_hash(DUMMY_HASH.to_string()).verify(password);
            return Err(AppError::InvalidCredentials);
        };

        let now = Utc::now();
        if user.is_locked_at(now) {
            tracing::warn!(user_id = %user.id, "Login attempt on locked account");
            return Err(AppError::AccountLocked);
        }

        if !user.verify_password(password) {
            let attempts = user.failed_attempts_after_failure_at(now);
            let locked_until = self.policy.lock_deadline(attempts, now);
            self.users.record_login_failure(user.id, locked_until).await?;

            if locked_until.is_some() {
                tracing::warn!(user_id = %user.id, attempts, "Account locked after failed logins");
            }
            return Err(AppError::InvalidCredentials);
        }

        if !user.status.allows_login() {
            return Err(AppError::Forbidden);
        }

        self.users.record_login_success(user.id).await?;
        user.login_attempts = 0;
        user.locked_until = None;
        user.last_login_at = Some(now);

        tracing::info!(user_id = %user.id, "User authenticated");
        Ok(user)
    }

    async fn update_user(&self, id: Uuid, changes: UpdateUser) -> AppResult<User> {
        let changes = changes.normalized()?;
        self.users.update(id, changes).await
    }

    async fn change_password(
        &self,
        id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> AppResult<()> {
        let user = self.get_user(id).await?;
        if !user.verify_password(current_password) {
            return Err(AppError::InvalidCredentials);
        }

        let password = Password::new(new_password)?;
        let revoked = self.users.update_password(id, password.into_string()).await?;
        tracing::info!(user_id = %id, revoked, "Password changed");
        Ok(())
    }

    async fn issue_email_verification(&self, id: Uuid) -> AppResult<String> {
        let user = self.get_user(id).await?;
        if user.email_verified {
            return Err(AppError::validation("Email is already verified"));
        }

        let token = Uuid::new_v4().simple().to_string();
        let expires_at = Utc::now() + Duration::hours(EMAIL_VERIFICATION_TTL_HOURS);
        self.users
            .set_email_verification_token(id, token.clone(), expires_at)
            .await?;

        Ok(token)
    }

    async fn confirm_email(&self, token: &str) -> AppResult<User> {
        self.users
            .confirm_email(token)
            .await?
            .ok_or_else(|| AppError::validation("Invalid or expired verification token"))
    }

    async fn delete_user(&self, id: Uuid) -> AppResult<()> {
        self.users.delete(id).await?;
        Ok(())
    }

    async fn hard_delete_user(&self, id: Uuid) -> AppResult<()> {
        self.users.hard_delete(id).await
    }

    async fn restore_user(&self, id: Uuid) -> AppResult<User> {
        self.users.restore(id).await
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        self.users.list().await
    }

    async fn list_deleted_users(&self) -> AppResult<Vec<User>> {
        self.users.list_deleted().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockUserRepository;
    use domain::{Document, UserRole, UserStatus};
    use mockall::predicate::eq;

    const PASSWORD: &str = "CorrectHorse1";

    fn create_test_user(id: Uuid) -> User {
        let now = Utc::now();
        User {
            id,
            username: "tester".to_string(),
            email: "test@example.com".to_string(),
            password_hash: Password::hash(PASSWORD).unwrap().into_string(),
            first_name: None,
            last_name: None,
            role: UserRole::User,
            status: UserStatus::Active,
            email_verified: false,
            email_verification_token: None,
            email_verification_expires: None,
            password_reset_token: None,
            password_reset_expires: None,
            last_login_at: None,
            login_attempts: 0,
            locked_until: None,
            preferences: Document::new(),
            metadata: Document::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    fn service(users: MockUserRepository) -> UserManager {
        UserManager::new(Arc::new(users), LoginPolicy::default())
    }

    fn registration() -> CreateUser {
        CreateUser {
            username: "new_user".to_string(),
            email: "  New.User@Example.COM ".to_string(),
            password: PASSWORD.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_get_user_success() {
        let user_id = Uuid::new_v4();

        let mut users = MockUserRepository::new();
        users
            .expect_find_by_id()
            .with(eq(user_id))
            .returning(|id| Ok(Some(create_test_user(id))));

        let result = service(users)
            .get_user(user_id)
            .await;

        assert_eq!(result.unwrap().id, user_id);
    }

    #[tokio::test]
    async fn test_get_user_not_found() {
        let mut users = MockUserRepository::new();
        users.expect_find_by_id().returning(|_| Ok(None));

        let result = service(users)
            .get_user(Uuid::new_v4())
            .await;

        assert!(matches!(result.unwrap_err(), AppError::NotFound));
    }

    #[tokio::test]
    async fn test_find_by_email_absent_is_none() {
        let mut users = MockUserRepository::new();
        users.expect_find_by_email().returning(|_| Ok(None));

        let result = service(users)
            .find_by_email("nobody@example.com")
            .await;

        assert!(result.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_register_hashes_password_and_normalizes_email() {
        let mut users = MockUserRepository::new();
        users
            .expect_find_by_email_with_deleted()
            .withf(|email| email == "new.user@example.com")
            .returning(|_| Ok(None));
        users
            .expect_create()
            .withf(|new_user| {
                new_user.email == "new.user@example.com"
                    && new_user.password_hash.starts_with("$argon2id$")
                    && new_user.status == UserStatus::Pending
            })
            .returning(|new_user| {
                let mut user = create_test_user(Uuid::new_v4());
                user.email = new_user.email;
                user.username = new_user.username;
                Ok(user)
            });

        let user = service(users)
            .register(registration())
            .await
            .unwrap();

        assert_eq!(user.email, "new.user@example.com");
        assert_eq!(user.username, "new_user");
    }

    #[tokio::test]
    async fn test_register_duplicate_email_conflicts() {
        let mut users = MockUserRepository::new();
        users
            .expect_find_by_email_with_deleted()
            .returning(|_| Ok(Some(create_test_user(Uuid::new_v4()))));
        users.expect_create().never();

        let result = service(users)
            .register(registration())
            .await;

        assert!(matches!(result.unwrap_err(), AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_register_rejects_short_password() {
        let mut users = MockUserRepository::new();
        users.expect_create().never();

        let mut input = registration();
        input.password = "short".to_string();

        let result = service(users)
            .register(input)
            .await;

        assert!(matches!(result.unwrap_err(), AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_authenticate_success_resets_attempts() {
        let user_id = Uuid::new_v4();

        let mut users = MockUserRepository::new();
        users.expect_find_by_email().returning(move |_| {
            let mut user = create_test_user(user_id);
            user.login_attempts = 2;
            Ok(Some(user))
        });
        users
            .expect_record_login_success()
            .with(eq(user_id))
            .times(1)
            .returning(|_| Ok(()));

        let user = service(users)
            .authenticate("TEST@example.com", PASSWORD)
            .await
            .unwrap();

        assert_eq!(user.login_attempts, 0);
        assert!(user.last_login_at.is_some());
    }

    #[tokio::test]
    async fn test_authenticate_wrong_password_records_failure() {
        let mut users = MockUserRepository::new();
        users
            .expect_find_by_email()
            .returning(|_| Ok(Some(create_test_user(Uuid::new_v4()))));
        users
            .expect_record_login_failure()
            .withf(|_, locked_until| locked_until.is_none())
            .times(1)
            .returning(|_, _| Ok(()));
        users.expect_record_login_success().never();

        let result = service(users)
            .authenticate("test@example.com", "WrongHorse1")
            .await;

        assert!(matches!(result.unwrap_err(), AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_authenticate_locks_after_max_attempts() {
        let mut users = MockUserRepository::new();
        users.expect_find_by_email().returning(|_| {
            let mut user = create_test_user(Uuid::new_v4());
            user.login_attempts = LoginPolicy::default().max_attempts - 1;
            Ok(Some(user))
        });
        users
            .expect_record_login_failure()
            .withf(|_, locked_until| locked_until.is_some_and(|until| until > Utc::now()))
            .times(1)
            .returning(|_, _| Ok(()));

        let result = service(users)
            .authenticate("test@example.com", "WrongHorse1")
            .await;

        assert!(matches!(result.unwrap_err(), AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_authenticate_after_lock_expiry_restarts_count() {
        let mut users = MockUserRepository::new();
        users.expect_find_by_email().returning(|_| {
            let mut user = create_test_user(Uuid::new_v4());
            user.login_attempts = LoginPolicy::default().max_attempts;
            user.locked_until = Some(Utc::now() - Duration::seconds(1));
            Ok(Some(user))
        });
        users
            .expect_record_login_failure()
            .withf(|_, locked_until| locked_until.is_none())
            .times(1)
            .returning(|_, _| Ok(()));

        let result = service(users)
            .authenticate("test@example.com", "WrongHorse1")
            .await;

        assert!(matches!(result.unwrap_err(), AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_authenticate_locked_account() {
        let mut users = MockUserRepository::new();
        users.expect_find_by_email().returning(|_| {
            let mut user = create_test_user(Uuid::new_v4());
            user.locked_until = Some(Utc::now() + Duration::minutes(5));
            Ok(Some(user))
        });
        users.expect_record_login_failure().never();
        users.expect_record_login_success().never();

        let result = service(users)
            .authenticate("test@example.com", PASSWORD)
            .await;

        assert!(matches!(result.unwrap_err(), AppError::AccountLocked));
    }

    #[tokio::test]
    async fn test_authenticate_unknown_email() {
        let mut users = MockUserRepository::new();
        users.expect_find_by_email().returning(|_| Ok(None));
        users.expect_record_login_failure().never();

        let result = service(users)
            .authenticate("ghost@example.com", PASSWORD)
            .await;

        assert!(matches!(result.unwrap_err(), AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_authenticate_suspended_account_forbidden() {
        let mut users = MockUserRepository::new();
        users.expect_find_by_email().returning(|_| {
            let mut user = create_test_user(Uuid::new_v4());
            user.status = UserStatus::Suspended;
            Ok(Some(user))
        });
        users.expect_record_login_success().never();

        let result = service(users)
            .authenticate("test@example.com", PASSWORD)
            .await;

        assert!(matches!(result.unwrap_err(), AppError::Forbidden));
    }

    #[tokio::test]
    async fn test_change_password_stores_new_hash() {
        let user_id = Uuid::new_v4();

        let mut users = MockUserRepository::new();
        users
            .expect_find_by_id()
            .returning(|id| Ok(Some(create_test_user(id))));
        users
            .expect_update_password()
            .withf(move |id, hash| {
                *id == user_id
                    && hash.starts_with("$argon2id$")
                    && Password::from_hash(hash.clone()).verify("BatteryStaple2")
            })
            .times(1)
            .returning(|_, _| Ok(2));

        let result = service(users)
            .change_password(user_id, PASSWORD, "BatteryStaple2")
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_change_password_wrong_current() {
        let mut users = MockUserRepository::new();
        users
            .expect_find_by_id()
            .returning(|id| Ok(Some(create_test_user(id))));
        users.expect_update_password().never();

        let result = service(users)
            .change_password(Uuid::new_v4(), "WrongHorse1", "BatteryStaple2")
            .await;

        assert!(matches!(result.unwrap_err(), AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_issue_email_verification_stores_token() {
        let user_id = Uuid::new_v4();

        let mut users = MockUserRepository::new();
        users
            .expect_find_by_id()
            .returning(|id| Ok(Some(create_test_user(id))));
        users
            .expect_set_email_verification_token()
            .withf(|_, token, expires_at| !token.is_empty() && *expires_at > Utc::now())
            .times(1)
            .returning(|_, _, _| Ok(()));

        let token = service(users)
            .issue_email_verification(user_id)
            .await
            .unwrap();

        assert_eq!(token.len(), 32);
    }

    #[tokio::test]
    async fn test_issue_email_verification_already_verified() {
        let mut users = MockUserRepository::new();
        users.expect_find_by_id().returning(|id| {
            let mut user = create_test_user(id);
            user.email_verified = true;
            Ok(Some(user))
        });
        users.expect_set_email_verification_token().never();

        let result = service(users)
            .issue_email_verification(Uuid::new_v4())
            .await;

        assert!(matches!(result.unwrap_err(), AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_confirm_email_unknown_token() {
        let mut users = MockUserRepository::new();
        users.expect_confirm_email().returning(|_| Ok(None));

        let result = service(users)
            .confirm_email("missing")
            .await;

        assert!(matches!(result.unwrap_err(), AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_user_rejects_invalid_email() {
        let mut users = MockUserRepository::new();
        users.expect_update().never();

        let changes = UpdateUser {
            email: Some("not-an-email".to_string()),
            ..Default::default()
        };
        let result = service(users)
            .update_user(Uuid::new_v4(), changes)
            .await;

        assert!(matches!(result.unwrap_err(), AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_user_soft_deletes() {
        let user_id = Uuid::new_v4();

        let mut users = MockUserRepository::new();
        users
            .expect_delete()
            .with(eq(user_id))
            .times(1)
            .returning(|_| Ok(1));

        let result = service(users).delete_user(user_id).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_delete_missing_user() {
        let mut users = MockUserRepository::new();
        users.expect_delete().returning(|_| Err(AppError::NotFound));

        let result = service(users).delete_user(Uuid::new_v4()).await;

        assert!(matches!(result.unwrap_err(), AppError::NotFound));
    }

    #[tokio::test]
    async fn test_restore_user_success() {
        let user_id = Uuid::new_v4();

        let mut users = MockUserRepository::new();
        users
            .expect_restore()
            .with(eq(user_id))
            .returning(|id| Ok(create_test_user(id)));

        let result = service(users)
            .restore_user(user_id)
            .await;

        assert!(!result.unwrap().is_deleted());
    }

    #[tokio::test]
    async fn test_list_deleted_users() {
        let mut users = MockUserRepository::new();
        users.expect_list_deleted().returning(|| {
            let mut user = create_test_user(Uuid::new_v4());
            user.deleted_at = Some(Utc::now());
            Ok(vec![user])
        });

        let result = service(users)
            .list_deleted_users()
            .await;

        assert!(result.unwrap()[0].is_deleted());
    }
}
