//! Service layer - business logic over the repositories.

mod session_service;
mod user_service;

pub use session_service::{SessionManager, SessionService};
pub use user_service::{UserManager, UserService};
