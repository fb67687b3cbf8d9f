//! SeaORM entity definitions
//!
//! These are database-specific entities separate from domain models.

pub mod user;
pub mod user_session;

use common::AppResult;
use domain::Document;
use sea_orm::prelude::Json;

/// Encode a document for a JSON column; non-finite numbers are rejected.
pub(crate) fn document_json(document: Document) -> AppResult<Json> {
    Ok(Json::try_from(document)?)
}
