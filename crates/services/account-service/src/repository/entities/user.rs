//! User database entity for SeaORM.

use sea_orm::entity::prelude::*;

use domain::{Document, DomainError, User};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub username: String,
    /// Always stored lowercase
    #[sea_orm(unique)]
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: String,
    pub status: String,
    pub email_verified: bool,
    pub email_verification_token: Option<String>,
    pub email_verification_expires: Option<DateTimeUtc>,
    pub password_reset_token: Option<String>,
    pub password_reset_expires: Option<DateTimeUtc>,
    pub last_login_at: Option<DateTimeUtc>,
    pub login_attempts: i32,
    pub locked_until: Option<DateTimeUtc>,
    #[sea_orm(column_type = "JsonBinary")]
    pub preferences: Json,
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: Json,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    /// Soft delete timestamp (NULL = live, set = deleted)
    pub deleted_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::user_session::Entity")]
    Sessions,
}

impl Related<super::user_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sessions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Convert database model to domain entity.
///
/// Fails only when a stored value falls outside its value set.
impl TryFrom<Model> for User {
    type Error = DomainError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(User {
            id: model.id,
            username: model.username,
            email: model.email,
            password_hash: model.password_hash,
            first_name: model.first_name,
            last_name: model.last_name,
            role: model.role.parse()?,
            status: model.status.parse()?,
            email_verified: model.email_verified,
            email_verification_token: model.email_verification_token,
            email_verification_expires: model.email_verification_expires,
            password_reset_token: model.password_reset_token,
            password_reset_expires: model.password_reset_expires,
            last_login_at: model.last_login_at,
            login_attempts: model.login_attempts,
            locked_until: model.locked_until,
            preferences: Document::try_from(model.preferences)?,
            metadata: Document::try_from(model.metadata)?,
            created_at: model.created_at,
            updated_at: model.updated_at,
            deleted_at: model.deleted_at,
        })
    }
}
