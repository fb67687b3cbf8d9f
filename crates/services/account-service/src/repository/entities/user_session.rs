//! User session database entity for SeaORM.

use sea_orm::entity::prelude::*;

use domain::{Document, DomainError, UserSession};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "user_sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(indexed)]
    pub user_id: Uuid,
    #[sea_orm(unique)]
    pub refresh_token: String,
    pub status: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub device_info: Json,
    #[sea_orm(column_type = "JsonBinary")]
    pub location_info: Json,
    pub ip_address: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub user_agent: Option<String>,
    pub expires_at: DateTimeUtc,
    pub last_activity_at: DateTimeUtc,
    pub revoked_at: Option<DateTimeUtc>,
    pub revoke_reason: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for UserSession {
    type Error = DomainError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(UserSession {
            id: model.id,
            user_id: model.user_id,
            refresh_token: model.refresh_token,
            status: model.status.parse()?,
            device_info: Document::try_from(model.device_info)?,
            location_info: Document::try_from(model.location_info)?,
            ip_address: model.ip_address,
            user_agent: model.user_agent,
            expires_at: model.expires_at,
            last_activity_at: model.last_activity_at,
            revoked_at: model.revoked_at,
            revoke_reason: model.revoke_reason,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}
