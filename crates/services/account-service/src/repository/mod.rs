//! Repository layer for data access.

pub mod entities;
mod session_repository;
mod user_repository;

pub use session_repository::{SessionRepository, SessionStore};
pub use user_repository::{UserRepository, UserStore};

#[cfg(any(test, feature = "test-utils"))]
pub use session_repository::MockSessionRepository;
#[cfg(any(test, feature = "test-utils"))]
pub use user_repository::MockUserRepository;
