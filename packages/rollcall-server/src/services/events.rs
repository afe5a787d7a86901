use std::collections::HashMap;

use chrono::Utc;
use rollcall_core::{
    EventCreateRequest, EventResponse, EventStats, EventUpdateRequest, Page, PageQuery, UserRole,
};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ExprTrait,
    FromQueryResult, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
    Value,
};
use tracing::info;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::db::enrollments::{self, EnrollmentStatus};
use crate::db::events::{self, Model as EventModel};
use crate::db::{Enrollments, Events, Users, users};
use crate::error::{AppError, AppResult};
use crate::services::{enrollments as ledger, fetch_page};

/// 删除结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// 存在报名记录，只做停用
    Deactivated,
    Deleted,
}

fn check_schedule(start: chrono::DateTime<Utc>, end: chrono::DateTime<Utc>) -> AppResult<()> {
    if start > end {
        return Err(AppError::Validation(
            "start date must not be after end date".to_string(),
        ));
    }
    Ok(())
}

fn check_future_start(start: chrono::DateTime<Utc>) -> AppResult<()> {
    if start <= Utc::now() {
        return Err(AppError::Validation(
            "start date must be in the future".to_string(),
        ));
    }
    Ok(())
}

pub async fn create_event<C: ConnectionTrait>(
    db: &C,
    organizer: &CurrentUser,
    request: EventCreateRequest,
) -> AppResult<EventModel> {
    organizer.require_role(UserRole::Organizer)?;
    check_future_start(request.start_date_time)?;
    check_schedule(request.start_date_time, request.end_date_time)?;

    let now = Utc::now();
    let event = events::ActiveModel {
        id: Set(Uuid::new_v4()),
        title: Set(request.title.trim().to_string()),
        description: Set(request.description.trim().to_string()),
        start_date_time: Set(request.start_date_time),
        end_date_time: Set(request.end_date_time),
        location: Set(request.location.trim().to_string()),
        capacity: Set(request.capacity),
        is_active: Set(true),
        organizer_id: Set(organizer.id),
        created_at: Set(now),
        updated_at: Set(now),
    };
    let event = event.insert(db).await?;

    info!(
        "Organizer {} created event {} with capacity {}",
        organizer.id, event.id, event.capacity
    );
    Ok(event)
}

pub async fn get_event<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<EventModel> {
    Events::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("event {id} not found")))
}

/// 读取活动并校验 `actor` 是组织者
pub async fn get_owned_event<C: ConnectionTrait>(
    db: &C,
    actor: &CurrentUser,
    id: Uuid,
) -> AppResult<EventModel> {
    let event = get_event(db, id).await?;
    if !event.is_owned_by(actor.id) {
        return Err(AppError::Forbidden(
            "only the event organizer can perform this action".to_string(),
        ));
    }
    Ok(event)
}

pub async fn list_active<C: ConnectionTrait>(
    db: &C,
    page: PageQuery,
) -> AppResult<Page<EventModel>> {
    let select = Events::find()
        .filter(events::Column::IsActive.eq(true))
        .order_by_asc(events::Column::StartDateTime)
        .order_by_asc(events::Column::Id);
    fetch_page(db, select, page).await
}

/// 标题或地点包含 `query` 的有效活动，忽略 ASCII 大小写
pub async fn search_active<C: ConnectionTrait>(
    db: &C,
    query: &str,
    page: PageQuery,
) -> AppResult<Page<EventModel>> {
    let query = query.trim();
    let select = Events::find()
        .filter(events::Column::IsActive.eq(true))
        .filter(
            events::Column::Title
                .contains(query)
                .or(events::Column::Location.contains(query)),
        )
        .order_by_asc(events::Column::StartDateTime)
        .order_by_asc(events::Column::Id);
    fetch_page(db, select, page).await
}

/// 组织者名下的全部活动，包括已停用的
pub async fn list_by_organizer<C: ConnectionTrait>(
    db: &C,
    organizer: &CurrentUser,
    page: PageQuery,
) -> AppResult<Page<EventModel>> {
    organizer.require_role(UserRole::Organizer)?;
    let select = Events::find()
        .filter(events::Column::OrganizerId.eq(organizer.id))
        .order_by_desc(events::Column::CreatedAt);
    fetch_page(db, select, page).await
}

/// 部分更新，只写入 `patch` 中出现的列
pub async fn update_event(
    db: &DatabaseConnection,
    actor: &CurrentUser,
    id: Uuid,
    patch: EventUpdateRequest,
) -> AppResult<EventModel> {
    if patch.is_empty() {
        return get_owned_event(db, actor, id).await;
    }
    if let Some(start) = patch.start_date_time {
        check_future_start(start)?;
    }

    let txn = db.begin().await?;
    let current = get_owned_event(&txn, actor, id).await?;
    check_schedule(
        patch.start_date_time.unwrap_or(current.start_date_time),
        patch.end_date_time.unwrap_or(current.end_date_time),
    )?;

    let mut update = Events::update_many()
        .col_expr(events::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(events::Column::Id.eq(id));
    if let Some(title) = patch.title {
        update = update.col_expr(events::Column::Title, Expr::value(title.trim().to_string()));
    }
    if let Some(description) = patch.description {
        update = update.col_expr(
            events::Column::Description,
            Expr::value(description.trim().to_string()),
        );
    }
    if let Some(start) = patch.start_date_time {
        update = update.col_expr(events::Column::StartDateTime, Expr::value(start));
    }
    if let Some(end) = patch.end_date_time {
        update = update.col_expr(events::Column::EndDateTime, Expr::value(end));
    }
    if let Some(location) = patch.location {
        update = update.col_expr(
            events::Column::Location,
            Expr::value(location.trim().to_string()),
        );
    }
    if let Some(is_active) = patch.is_active {
        update = update.col_expr(events::Column::IsActive, Expr::value(is_active));
    }
    if let Some(capacity) = patch.capacity {
        update = update
            .col_expr(events::Column::Capacity, Expr::value(capacity))
            .filter(Expr::cust_with_values(
                "(SELECT COUNT(*) FROM enrollments WHERE event_id = ? AND status = 'CONFIRMED') <= ?",
                [Value::from(id), Value::from(capacity)],
            ));
    }

    let result = update.exec(&txn).await?;
    if result.rows_affected == 0 {
        return Err(AppError::Conflict(
            "capacity cannot drop below the number of confirmed enrollments".to_string(),
        ));
    }

    let promoted = ledger::fill_waiting_list(&txn, id).await?;
    let updated = get_event(&txn, id).await?;
    txn.commit().await?;

    info!(
        "Event {} updated by {}, {} waiting enrollments promoted",
        id, actor.id, promoted
    );
    Ok(updated)
}

/// 有报名记录时停用，否则直接删除
pub async fn delete_event(
    db: &DatabaseConnection,
    actor: &CurrentUser,
    id: Uuid,
) -> AppResult<Removal> {
    get_owned_event(db, actor, id).await?;

    let txn = db.begin().await?;
    let referenced = Enrollments::find()
        .filter(enrollments::Column::EventId.eq(id))
        .count(&txn)
        .await?;

    let removal = if referenced > 0 {
        Events::update_many()
            .col_expr(events::Column::IsActive, Expr::value(false))
            .col_expr(events::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(events::Column::Id.eq(id))
            .exec(&txn)
            .await?;
        Removal::Deactivated
    } else {
        Events::delete_by_id(id).exec(&txn).await?;
        Removal::Deleted
    };
    txn.commit().await?;

    info!("Event {} removed by {}: {:?}", id, actor.id, removal);
    Ok(removal)
}

pub async fn count_with_status<C: ConnectionTrait>(
    db: &C,
    event_id: Uuid,
    status: EnrollmentStatus,
) -> AppResult<u64> {
    let count = Enrollments::find()
        .filter(enrollments::Column::EventId.eq(event_id))
        .filter(enrollments::Column::Status.eq(status))
        .count(db)
        .await?;
    Ok(count)
}

fn spots_left(capacity: i32, confirmed: u64) -> u64 {
    u64::try_from(capacity).unwrap_or(0).saturating_sub(confirmed)
}

pub async fn event_stats<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<EventStats> {
    let event = get_event(db, id).await?;
    let confirmed = count_with_status(db, id, EnrollmentStatus::Confirmed).await?;
    let pending = count_with_status(db, id, EnrollmentStatus::Pending).await?;

    Ok(EventStats {
        event_id: id,
        capacity: event.capacity,
        confirmed,
        pending,
        available_spots: spots_left(event.capacity, confirmed),
    })
}

#[derive(Debug, FromQueryResult)]
struct ConfirmedCount {
    event_id: Uuid,
    confirmed: i64,
}

/// 为一批活动补充组织者信息和已确认人数
pub async fn to_responses<C: ConnectionTrait>(
    db: &C,
    events: Vec<EventModel>,
) -> AppResult<Vec<EventResponse>> {
    if events.is_empty() {
        return Ok(Vec::new());
    }

    let event_ids: Vec<Uuid> = events.iter().map(|event| event.id).collect();
    let organizer_ids: Vec<Uuid> = events.iter().map(|event| event.organizer_id).collect();

    let organizers: HashMap<Uuid, users::Model> = Users::find()
        .filter(users::Column::Id.is_in(organizer_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|user| (user.id, user))
        .collect();

    let counts: HashMap<Uuid, u64> = Enrollments::find()
        .select_only()
        .column(enrollments::Column::EventId)
        .column_as(enrollments::Column::Id.count(), "confirmed")
        .filter(enrollments::Column::EventId.is_in(event_ids))
        .filter(enrollments::Column::Status.eq(EnrollmentStatus::Confirmed))
        .group_by(enrollments::Column::EventId)
        .into_model::<ConfirmedCount>()
        .all(db)
        .await?
        .into_iter()
        .map(|row| (row.event_id, u64::try_from(row.confirmed).unwrap_or(0)))
        .collect();

    let responses = events
        .into_iter()
        .map(|event| {
            let organizer = organizers.get(&event.organizer_id);
            EventResponse {
                current_enrollments: counts.get(&event.id).copied().unwrap_or(0),
                organizer_name: organizer.map(|o| o.name.clone()).unwrap_or_default(),
                organizer_email: organizer.map(|o| o.email.clone()).unwrap_or_default(),
                id: event.id,
                title: event.title,
                description: event.description,
                start_date_time: event.start_date_time,
                end_date_time: event.end_date_time,
                location: event.location,
                capacity: event.capacity,
                is_active: event.is_active,
                organizer_id: event.organizer_id,
                created_at: event.created_at,
            }
        })
        .collect();
    Ok(responses)
}

pub async fn to_response<C: ConnectionTrait>(db: &C, event: EventModel) -> AppResult<EventResponse> {
    to_responses(db, vec![event])
        .await?
        .pop()
        .ok_or_else(|| AppError::Internal("event response missing".to_string()))
}

pub async fn to_page_response<C: ConnectionTrait>(
    db: &C,
    page: Page<EventModel>,
) -> AppResult<Page<EventResponse>> {
    let Page {
        content,
        total_pages,
        total_elements,
        size,
        number,
    } = page;
    Ok(Page {
        content: to_responses(db, content).await?,
        total_pages,
        total_elements,
        size,
        number,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{event, event_request, memory_state, user};
    use chrono::Duration;
    use rollcall_core::EnrollmentCreateRequest;

    #[tokio::test]
    async fn test_only_organizers_create_events() {
        let state = memory_state().await;
        let ana = user(&state, "Ana", UserRole::Participant).await;

        let result = create_event(&state.db, &ana, event_request(10)).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_create_validates_schedule() {
        let state = memory_state().await;
        let org = user(&state, "Olga", UserRole::Organizer).await;

        let mut past = event_request(10);
        past.start_date_time = Utc::now() - Duration::hours(1);
        assert!(matches!(
            create_event(&state.db, &org, past).await,
            Err(AppError::Validation(_))
        ));

        let mut inverted = event_request(10);
        inverted.end_date_time = inverted.start_date_time - Duration::hours(1);
        assert!(matches!(
            create_event(&state.db, &org, inverted).await,
            Err(AppError::Validation(_))
        ));

        let created = create_event(&state.db, &org, event_request(10)).await.unwrap();
        assert!(created.is_active);
        assert_eq!(created.organizer_id, org.id);
    }

    #[tokio::test]
    async fn test_partial_update_changes_only_capacity() {
        let state = memory_state().await;
        let org = user(&state, "Olga", UserRole::Organizer).await;
        let original = event(&state, &org, 10).await;

        let updated = update_event(
            &state.db,
            &org,
            original.id,
            EventUpdateRequest {
                capacity: Some(50),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.capacity, 50);
        assert_eq!(updated.title, original.title);
        assert_eq!(updated.description, original.description);
        assert_eq!(updated.location, original.location);
        assert_eq!(updated.start_date_time, original.start_date_time);
        assert_eq!(updated.end_date_time, original.end_date_time);
        assert!(updated.is_active);
    }

    #[tokio::test]
    async fn test_update_requires_ownership() {
        let state = memory_state().await;
        let owner = user(&state, "Olga", UserRole::Organizer).await;
        let other = user(&state, "Otto", UserRole::Organizer).await;
        let target = event(&state, &owner, 10).await;

        let result = update_event(
            &state.db,
            &other,
            target.id,
            EventUpdateRequest {
                capacity: Some(1),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_capacity_cannot_drop_below_confirmed() {
        let state = memory_state().await;
        let org = user(&state, "Olga", UserRole::Organizer).await;
        let target = event(&state, &org, 3).await;
        for name in ["Ana", "Bia"] {
            let participant = user(&state, name, UserRole::Participant).await;
            ledger::create_enrollment(
                &state.db,
                &participant,
                EnrollmentCreateRequest { event_id: target.id },
            )
            .await
            .unwrap();
        }

        let result = update_event(
            &state.db,
            &org,
            target.id,
            EventUpdateRequest {
                capacity: Some(1),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(get_event(&state.db, target.id).await.unwrap().capacity, 3);

        let lowered = update_event(
            &state.db,
            &org,
            target.id,
            EventUpdateRequest {
                capacity: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(lowered.capacity, 2);
    }

    #[tokio::test]
    async fn test_delete_is_soft_when_enrollments_exist() {
        let state = memory_state().await;
        let org = user(&state, "Olga", UserRole::Organizer).await;
        let ana = user(&state, "Ana", UserRole::Participant).await;
        let busy = event(&state, &org, 3).await;
        let empty = event(&state, &org, 3).await;
        ledger::create_enrollment(&state.db, &ana, EnrollmentCreateRequest { event_id: busy.id })
            .await
            .unwrap();

        assert_eq!(
            delete_event(&state.db, &org, busy.id).await.unwrap(),
            Removal::Deactivated
        );
        assert!(!get_event(&state.db, busy.id).await.unwrap().is_active);

        assert_eq!(
            delete_event(&state.db, &org, empty.id).await.unwrap(),
            Removal::Deleted
        );
        assert!(matches!(
            get_event(&state.db, empty.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_patch_keeps_deactivation() {
        let state = memory_state().await;
        let org = user(&state, "Olga", UserRole::Organizer).await;
        let ana = user(&state, "Ana", UserRole::Participant).await;
        let target = event(&state, &org, 3).await;
        ledger::create_enrollment(&state.db, &ana, EnrollmentCreateRequest { event_id: target.id })
            .await
            .unwrap();

        // 停用前读取的旧数据
        let stale = get_event(&state.db, target.id).await.unwrap();
        assert!(stale.is_active);
        delete_event(&state.db, &org, target.id).await.unwrap();

        let updated = update_event(
            &state.db,
            &org,
            stale.id,
            EventUpdateRequest {
                title: Some("Renamed meetup".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.title, "Renamed meetup");
        assert!(!updated.is_active);
        assert_eq!(updated.capacity, stale.capacity);
        assert_eq!(updated.location, stale.location);
    }

    #[tokio::test]
    async fn test_empty_patch_changes_nothing() {
        let state = memory_state().await;
        let org = user(&state, "Olga", UserRole::Organizer).await;
        let target = event(&state, &org, 3).await;

        let unchanged = update_event(&state.db, &org, target.id, EventUpdateRequest::default())
            .await
            .unwrap();
        assert_eq!(unchanged.id, target.id);
        assert_eq!(unchanged.title, target.title);
        assert_eq!(unchanged.capacity, target.capacity);
        assert!(unchanged.is_active);
    }

    #[tokio::test]
    async fn test_patch_end_before_stored_start_is_rejected() {
        let state = memory_state().await;
        let org = user(&state, "Olga", UserRole::Organizer).await;
        let target = event(&state, &org, 3).await;

        let result = update_event(
            &state.db,
            &org,
            target.id,
            EventUpdateRequest {
                end_date_time: Some(target.start_date_time - Duration::hours(1)),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(
            get_event(&state.db, target.id).await.unwrap().end_date_time,
            target.end_date_time
        );
    }

    #[tokio::test]
    async fn test_huge_page_index_is_rejected() {
        let state = memory_state().await;
        let org = user(&state, "Olga", UserRole::Organizer).await;
        event(&state, &org, 3).await;

        for page in [u64::MAX, 1 << 62] {
            let result = list_active(&state.db, PageQuery::new(page, 10)).await;
            assert!(matches!(result, Err(AppError::Validation(_))));
        }

        let last = list_active(&state.db, PageQuery::new(5, 10)).await.unwrap();
        assert!(last.content.is_empty());
        assert_eq!(last.total_elements, 1);
    }

    #[tokio::test]
    async fn test_search_matches_title_or_location_case_insensitive() {
        let state = memory_state().await;
        let org = user(&state, "Olga", UserRole::Organizer).await;

        let mut concert = event_request(10);
        concert.title = "Jazz night".to_string();
        concert.location = "Riverside park".to_string();
        create_event(&state.db, &org, concert).await.unwrap();

        let mut talk = event_request(10);
        talk.title = "Compiler talk".to_string();
        talk.location = "Jazz club basement".to_string();
        create_event(&state.db, &org, talk).await.unwrap();

        let mut hidden = event_request(10);
        hidden.title = "Jazz rehearsal".to_string();
        let hidden = create_event(&state.db, &org, hidden).await.unwrap();
        update_event(
            &state.db,
            &org,
            hidden.id,
            EventUpdateRequest {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let page = search_active(&state.db, "JAZZ", PageQuery::default())
            .await
            .unwrap();
        assert_eq!(page.total_elements, 2);

        let page = list_active(&state.db, PageQuery::new(0, 1)).await.unwrap();
        assert_eq!(page.content.len(), 1);
        assert_eq!(page.total_elements, 2);
        assert_eq!(page.total_pages, 2);

        let mine = list_by_organizer(&state.db, &org, PageQuery::default())
            .await
            .unwrap();
        assert_eq!(mine.total_elements, 3);
    }

    #[tokio::test]
    async fn test_stats_and_responses() {
        let state = memory_state().await;
        let org = user(&state, "Olga", UserRole::Organizer).await;
        let ana = user(&state, "Ana", UserRole::Participant).await;
        let target = event(&state, &org, 4).await;
        ledger::create_enrollment(&state.db, &ana, EnrollmentCreateRequest { event_id: target.id })
            .await
            .unwrap();

        let stats = event_stats(&state.db, target.id).await.unwrap();
        assert_eq!(stats.confirmed, 1);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.available_spots, 3);
        assert!(get_owned_event(&state.db, &org, target.id).await.is_ok());
        assert!(matches!(
            get_owned_event(&state.db, &ana, target.id).await,
            Err(AppError::Forbidden(_))
        ));

        let response = to_response(&state.db, target).await.unwrap();
        assert_eq!(response.current_enrollments, 1);
        assert_eq!(response.organizer_name, "Olga");
        assert_eq!(response.organizer_email, "olga@example.com");
    }
}
