//! Domain-level constants.
//!
//! These constants define business rules and the value sets persisted in the
//! `users` and `user_sessions` tables. Other services sharing the store depend
//! on the exact strings.

// =============================================================================
// User Roles
// =============================================================================

/// Default role assigned to new users
pub const ROLE_USER: &str = "user";

/// Administrator role with elevated privileges
pub const ROLE_ADMIN: &str = "admin";

/// Moderator role
pub const ROLE_MODERATOR: &str = "moderator";

/// All valid role values
pub const VALID_ROLES: &[&str] = &[ROLE_USER, ROLE_ADMIN, ROLE_MODERATOR];

// =============================================================================
// User Status
// =============================================================================

pub const USER_STATUS_ACTIVE: &str = "active";
pub const USER_STATUS_INACTIVE: &str = "inactive";
pub const USER_STATUS_SUSPENDED: &str = "suspended";
pub const USER_STATUS_PENDING: &str = "pending";

/// All valid account status values
pub const VALID_USER_STATUSES: &[&str] = &[
    USER_STATUS_ACTIVE,
    USER_STATUS_INACTIVE,
    USER_STATUS_SUSPENDED,
    USER_STATUS_PENDING,
];

// =============================================================================
// Session Status
// =============================================================================

pub const SESSION_STATUS_ACTIVE: &str = "active";
pub const SESSION_STATUS_EXPIRED: &str = "expired";
pub const SESSION_STATUS_REVOKED: &str = "revoked";

/// All valid session status values
pub const VALID_SESSION_STATUSES: &[&str] = &[
    SESSION_STATUS_ACTIVE,
    SESSION_STATUS_EXPIRED,
    SESSION_STATUS_REVOKED,
];

// =============================================================================
// Validation
// =============================================================================

/// Minimum password length requirement
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Username length bounds (column is varchar(50))
pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: u32 = 50;

/// Email column width
pub const MAX_EMAIL_LENGTH: u32 = 255;

/// Session column widths
pub const MAX_REFRESH_TOKEN_LENGTH: u32 = 512;
pub const MAX_IP_ADDRESS_LENGTH: u32 = 45;

// =============================================================================
// Authentication
// =============================================================================

/// Failed logins allowed before the account is locked
pub const DEFAULT_MAX_LOGIN_ATTEMPTS: i32 = 5;

/// How long an account stays locked once the attempt limit is hit
pub const DEFAULT_LOCKOUT_MINUTES: i64 = 15;

/// Lifetime of an email verification token
pub const EMAIL_VERIFICATION_TTL_HOURS: i64 = 24;

// =============================================================================
// Session revoke reasons
// =============================================================================

pub const REVOKE_REASON_LOGOUT: &str = "logout";
pub const REVOKE_REASON_PASSWORD_CHANGED: &str = "password_changed";
pub const REVOKE_REASON_ACCOUNT_DELETED: &str = "account_deleted";
