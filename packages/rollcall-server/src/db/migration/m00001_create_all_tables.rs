use crate::db::{enrollments, events, tokens, users};
use sea_orm::sea_query::{ForeignKey, ForeignKeyAction, Table};
use sea_orm::{DbErr, DeriveMigrationName};
use sea_orm_migration::{MigrationTrait, SchemaManager, schema};

#[derive(DeriveMigrationName)]
pub(crate) struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let users_table = Table::create()
            .table(users::Entity)
            .if_not_exists()
            .col(schema::uuid(users::Column::Id).primary_key())
            .col(schema::string_len(users::Column::Name, 100))
            .col(schema::string_len_uniq(users::Column::Email, 100))
            .col(schema::string(users::Column::PasswordHash))
            .col(schema::string_len(users::Column::Role, 16))
            .col(schema::timestamp_with_time_zone(users::Column::CreatedAt))
            .col(schema::timestamp_with_time_zone(users::Column::UpdatedAt))
            .to_owned();

        let events_table = Table::create()
            .table(events::Entity)
            .if_not_exists()
            .col(schema::uuid(events::Column::Id).primary_key())
            .col(schema::string_len(events::Column::Title, 100))
            .col(schema::string_len(events::Column::Description, 500))
            .col(schema::timestamp_with_time_zone(events::Column::StartDateTime))
            .col(schema::timestamp_with_time_zone(events::Column::EndDateTime))
            .col(schema::string_len(events::Column::Location, 200))
            .col(schema::integer(events::Column::Capacity))
            .col(schema::boolean(events::Column::IsActive).default(true))
            .col(schema::uuid(events::Column::OrganizerId))
            .col(schema::timestamp_with_time_zone(events::Column::CreatedAt))
            .col(schema::timestamp_with_time_zone(events::Column::UpdatedAt))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_events_organizer")
                    .from(events::Entity, events::Column::OrganizerId)
                    .to(users::Entity, users::Column::Id)
                    .on_delete(ForeignKeyAction::Restrict),
            )
            .to_owned();

        let enrollments_table = Table::create()
            .table(enrollments::Entity)
            .if_not_exists()
            .col(schema::uuid(enrollments::Column::Id).primary_key())
            .col(schema::uuid(enrollments::Column::EventId))
            .col(schema::uuid(enrollments::Column::UserId))
            .col(schema::string_len(enrollments::Column::Status, 16))
            .col(schema::timestamp_with_time_zone(enrollments::Column::EnrolledAt))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_enrollments_event")
                    .from(enrollments::Entity, enrollments::Column::EventId)
                    .to(events::Entity, events::Column::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_enrollments_user")
                    .from(enrollments::Entity, enrollments::Column::UserId)
                    .to(users::Entity, users::Column::Id)
                    .on_delete(ForeignKeyAction::Restrict),
            )
            .to_owned();

        let tokens_table = Table::create()
            .table(tokens::Entity)
            .if_not_exists()
            .col(schema::pk_auto(tokens::Column::Id))
            .col(schema::string_uniq(tokens::Column::TokenHash))
            .col(schema::uuid(tokens::Column::UserId))
            .col(schema::timestamp_with_time_zone(tokens::Column::CreatedAt))
            .col(schema::timestamp_with_time_zone(tokens::Column::ExpiresAt))
            .col(schema::timestamp_with_time_zone_null(tokens::Column::LastUsedAt))
            .to_owned();

        manager.create_table(users_table).await?;
        manager.create_table(events_table).await?;
        manager.create_table(enrollments_table).await?;
        manager.create_table(tokens_table).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(tokens::Entity).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(enrollments::Entity).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(events::Entity).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(users::Entity).to_owned())
            .await
    }
}
