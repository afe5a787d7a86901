use chrono::Utc;
use rollcall_core::EnrollmentStatus as CoreStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "enrollments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub status: EnrollmentStatus,
    /// 创建或重新激活时写入，决定候补顺序
    pub enrolled_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum EnrollmentStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "CONFIRMED")]
    Confirmed,
    #[sea_orm(string_value = "CANCELED")]
    Canceled,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::events::Entity",
        from = "Column::EventId",
        to = "super::events::Column::Id"
    )]
    Event,
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id"
    )]
    User,
}

impl Related<super::events::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Event.def()
    }
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<CoreStatus> for EnrollmentStatus {
    fn from(status: CoreStatus) -> Self {
        match status {
            CoreStatus::Pending => EnrollmentStatus::Pending,
            CoreStatus::Confirmed => EnrollmentStatus::Confirmed,
            CoreStatus::Canceled => EnrollmentStatus::Canceled,
        }
    }
}

impl From<EnrollmentStatus> for CoreStatus {
    fn from(status: EnrollmentStatus) -> Self {
        match status {
            EnrollmentStatus::Pending => CoreStatus::Pending,
            EnrollmentStatus::Confirmed => CoreStatus::Confirmed,
            EnrollmentStatus::Canceled => CoreStatus::Canceled,
        }
    }
}
