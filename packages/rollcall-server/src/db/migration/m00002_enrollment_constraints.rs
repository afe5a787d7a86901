use crate::db::{enrollments, events};
use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, DbErr, DeriveMigrationName};
use sea_orm_migration::{MigrationTrait, SchemaManager};

#[derive(DeriveMigrationName)]
pub(crate) struct Migration;

/// 每个用户在同一活动下最多一条候补或已确认的记录
const UNIQUE_ACTIVE_ENROLLMENT: &str = "CREATE UNIQUE INDEX IF NOT EXISTS \
     idx_enrollments_active_pair ON enrollments (user_id, event_id) \
     WHERE status <> 'CANCELED'";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(UNIQUE_ACTIVE_ENROLLMENT)
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_enrollments_event_status")
                    .table(enrollments::Entity)
                    .col(enrollments::Column::EventId)
                    .col(enrollments::Column::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_events_organizer")
                    .table(events::Entity)
                    .col(events::Column::OrganizerId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP INDEX IF EXISTS idx_enrollments_active_pair")
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_enrollments_event_status")
                    .table(enrollments::Entity)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_events_organizer")
                    .table(events::Entity)
                    .to_owned(),
            )
            .await
    }
}
