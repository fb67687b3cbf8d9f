//! Domain layer - Core account and session entities.
//!
//! This crate contains pure domain logic with no infrastructure dependencies:
//! password hashing, lookup normalization and the session validity rules.

pub mod constants;
pub mod document;
pub mod error;
pub mod password;
pub mod session;
pub mod user;

pub use constants::*;
pub use document::{DocValue, Document};
pub use error::{DomainError, DomainResult};
pub use password::Password;
pub use session::{NewSession, SessionStatus, UserSession};
pub use user::{
    normalize_email, CreateUser, LoginPolicy, NewUser, UpdateUser, User, UserRole, UserStatus,
};
