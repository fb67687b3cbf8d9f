//! User domain entity and related types.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::constants::*;
use crate::document::Document;
use crate::error::{DomainError, DomainResult};
use crate::password::Password;

static USERNAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("username pattern is valid"));

/// Lowercase and trim an email address.
///
/// Applied before every store and every comparison so lookups are
/// case-insensitive.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_username(username: &str) -> Result<(), ValidationError> {
    let len = username.chars().count();
    if len < MIN_USERNAME_LENGTH || len > MAX_USERNAME_LENGTH as usize {
        return Err(ValidationError::new("username_length"));
    }
    if !USERNAME_REGEX.is_match(username) {
        return Err(ValidationError::new("username_characters"));
    }
    Ok(())
}

/// User roles enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
    Moderator,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => ROLE_USER,
            UserRole::Admin => ROLE_ADMIN,
            UserRole::Moderator => ROLE_MODERATOR,
        }
    }

    /// Check if this role has admin privileges
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }

    /// Check if this role can act where `required` is needed.
    ///
    /// Admins can do everything, moderators everything a user can.
    pub fn can_access(&self, required: &UserRole) -> bool {
        match self {
            UserRole::Admin => true,
            UserRole::Moderator => !matches!(required, UserRole::Admin),
            UserRole::User => matches!(required, UserRole::User),
        }
    }
}

impl FromStr for UserRole {
    type Err = DomainError;

    fn from_str(s: &str) -> DomainResult<Self> {
        match s {
            ROLE_USER => Ok(UserRole::User),
            ROLE_ADMIN => Ok(UserRole::Admin),
            ROLE_MODERATOR => Ok(UserRole::Moderator),
            other => Err(DomainError::invalid_value("role", other)),
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account status. New accounts start as `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
    Suspended,
    #[default]
    Pending,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => USER_STATUS_ACTIVE,
            UserStatus::Inactive => USER_STATUS_INACTIVE,
            UserStatus::Suspended => USER_STATUS_SUSPENDED,
            UserStatus::Pending => USER_STATUS_PENDING,
        }
    }

    /// Suspended and inactive accounts cannot log in.
    pub fn allows_login(&self) -> bool {
        matches!(self, UserStatus::Active | UserStatus::Pending)
    }
}

impl FromStr for UserStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> DomainResult<Self> {
        match s {
            USER_STATUS_ACTIVE => Ok(UserStatus::Active),
            USER_STATUS_INACTIVE => Ok(UserStatus::Inactive),
            USER_STATUS_SUSPENDED => Ok(UserStatus::Suspended),
            USER_STATUS_PENDING => Ok(UserStatus::Pending),
            other => Err(DomainError::invalid_value("status", other)),
        }
    }
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User domain entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: UserRole,
    pub status: UserStatus,
    pub email_verified: bool,
    #[serde(skip_serializing)]
    pub email_verification_token: Option<String>,
    pub email_verification_expires: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub password_reset_token: Option<String>,
    pub password_reset_expires: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub preferences: Document,
    pub metadata: Document,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft delete timestamp (None = live, Some = deleted)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// Check a plain text password against the stored hash.
    pub fn verify_password(&self, plain_text: &str) -> bool {
        Password::from_hash(self.password_hash.clone()).verify(plain_text)
    }

    /// Check if user has admin role
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Check if user is soft deleted
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether `locked_until` is still in the future at `now`.
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    pub fn is_locked(&self) -> bool {
        self.is_locked_at(Utc::now())
    }

    /// A lock was set and has run out by `now`.
    pub fn lock_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until <= now)
    }

    /// Failure count once one more failed login is recorded at `now`.
    ///
    /// Failures from before an expired lock do not carry over.
    pub fn failed_attempts_after_failure_at(&self, now: DateTime<Utc>) -> i32 {
        if self.lock_expired_at(now) {
            1
        } else {
            self.login_attempts + 1
        }
    }

    /// Not deleted, status allows login and not locked out.
    pub fn can_log_in_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_deleted() && self.status.allows_login() && !self.is_locked_at(now)
    }

    /// A reset token is only meaningful alongside an unexpired deadline.
    pub fn has_pending_password_reset_at(&self, now: DateTime<Utc>) -> bool {
        self.password_reset_token.is_some()
            && self.password_reset_expires.is_some_and(|expires| expires > now)
    }

    pub fn has_pending_email_verification_at(&self, now: DateTime<Utc>) -> bool {
        !self.email_verified
            && self.email_verification_token.is_some()
            && self.email_verification_expires.is_some_and(|expires| expires > now)
    }

    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => self.username.clone(),
        }
    }
}

/// User creation input. Carries the plain text password until it is hashed.
#[derive(Clone, Default, Deserialize, Validate)]
pub struct CreateUser {
    #[validate(custom(function = "validate_username"))]
    pub username: String,
    #[validate(email(message = "Invalid email format"), length(max = 255))]
    pub email: String,
    pub password: String,
    #[validate(length(max = 100))]
    pub first_name: Option<String>,
    #[validate(length(max = 100))]
    pub last_name: Option<String>,
    #[serde(default)]
    pub preferences: Document,
    #[serde(default)]
    pub metadata: Document,
}

impl std::fmt::Debug for CreateUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateUser")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// A validated, hashed user ready to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: UserRole,
    pub status: UserStatus,
    pub preferences: Document,
    pub metadata: Document,
}

impl NewUser {
    /// Validate input, normalize the email and hash the password.
    pub fn from_input(mut input: CreateUser) -> DomainResult<Self> {
        input.username = input.username.trim().to_string();
        input.email = normalize_email(&input.email);
        input.validate()?;
        let password = Password::new(&input.password)?;

        Ok(Self {
            username: input.username,
            email: input.email,
            password_hash: password.into_string(),
            first_name: input.first_name,
            last_name: input.last_name,
            role: UserRole::default(),
            status: UserStatus::default(),
            preferences: input.preferences,
            metadata: input.metadata,
        })
    }
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateUser {
    #[validate(custom(function = "validate_username"))]
    pub username: Option<String>,
    #[validate(email(message = "Invalid email format"), length(max = 255))]
    pub email: Option<String>,
    #[validate(length(max = 100))]
    pub first_name: Option<String>,
    #[validate(length(max = 100))]
    pub last_name: Option<String>,
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
    pub preferences: Option<Document>,
    pub metadata: Option<Document>,
}

impl UpdateUser {
    /// Validate and normalize in place.
    pub fn normalized(mut self) -> DomainResult<Self> {
        self.email = self.email.as_deref().map(normalize_email);
        self.username = self.username.map(|u| u.trim().to_string());
        self.validate()?;
        Ok(self)
    }
}

/// Failed-login bookkeeping rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginPolicy {
    pub max_attempts: i32,
    pub lockout_duration: Duration,
}

impl Default for LoginPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_LOGIN_ATTEMPTS,
            lockout_duration: Duration::minutes(DEFAULT_LOCKOUT_MINUTES),
        }
    }
}

impl LoginPolicy {
    /// Lock deadline once `attempts` failures have been recorded, if any.
    pub fn lock_deadline(&self, attempts: i32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        (attempts >= self.max_attempts).then(|| now + self.lockout_duration)
    }
}
