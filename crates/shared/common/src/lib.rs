//! Common utilities shared across the workspace.
//!
//! This crate provides:
//! - Unified error handling with store error classification
//! - Configuration structures

pub mod config;
pub mod error;

pub use config::*;
pub use error::{conflict_subject, AppError, AppResult, OptionExt};
