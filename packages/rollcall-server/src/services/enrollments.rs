//! 报名记录
//!
//! 进入 CONFIRMED 的每一步都是一条条件更新，只在活动有效且仍有名额时命中，
//! 并发请求不会超卖。部分唯一索引 `(user_id, event_id) WHERE status <> 'CANCELED'`
//! 保证同一用户在同一活动下只有一条有效记录。

use std::collections::HashMap;

use chrono::Utc;
use rollcall_core::{
    EnrollmentCreateRequest, EnrollmentResponse, EnrollmentStats, EnrollmentStatus as Status, Page,
    PageQuery, UserRole,
};
use sea_orm::sea_query::{Expr, IntoCondition};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr,
    EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::info;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::db::enrollments::{self, EnrollmentStatus, Model as EnrollmentModel};
use crate::db::{Enrollments, Events, Users, events, users};
use crate::error::{AppError, AppResult};
use crate::services::events::{count_with_status, get_event, get_owned_event};
use crate::services::{fetch_page, is_unique_violation};

/// 仅在活动有效且未满员时成立
fn has_free_spot(event_id: Uuid) -> impl IntoCondition {
    Expr::cust_with_values(
        "(SELECT COUNT(*) FROM enrollments WHERE event_id = ? AND status = 'CONFIRMED') \
         < (SELECT capacity FROM events WHERE id = ? AND is_active = 1)",
        [event_id, event_id],
    )
}

fn map_duplicate(err: DbErr) -> AppError {
    if is_unique_violation(&err) {
        AppError::AlreadyEnrolled
    } else {
        err.into()
    }
}

fn invalid_transition(from: EnrollmentStatus, to: Status) -> AppError {
    AppError::InvalidTransition {
        from: Status::from(from).to_string(),
        to: to.to_string(),
    }
}

pub async fn get_enrollment<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<EnrollmentModel> {
    Enrollments::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("enrollment {id} not found")))
}

async fn find_pair<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
    event_id: Uuid,
) -> AppResult<Option<EnrollmentModel>> {
    let record = Enrollments::find()
        .filter(enrollments::Column::UserId.eq(user_id))
        .filter(enrollments::Column::EventId.eq(event_id))
        .order_by_desc(enrollments::Column::EnrolledAt)
        .one(db)
        .await?;
    Ok(record)
}

/// 记录仍处于 `from` 且有空位时转为 CONFIRMED
async fn promote(
    txn: &DatabaseTransaction,
    record: &EnrollmentModel,
    from: EnrollmentStatus,
    refresh_timestamp: bool,
) -> AppResult<bool> {
    let mut update = Enrollments::update_many()
        .col_expr(
            enrollments::Column::Status,
            Expr::value(EnrollmentStatus::Confirmed),
        )
        .filter(enrollments::Column::Id.eq(record.id))
        .filter(enrollments::Column::Status.eq(from))
        .filter(has_free_spot(record.event_id));
    if refresh_timestamp {
        update = update.col_expr(enrollments::Column::EnrolledAt, Expr::value(Utc::now()));
    }

    let result = update.exec(txn).await.map_err(map_duplicate)?;
    Ok(result.rows_affected == 1)
}

async fn load_open_event<C: ConnectionTrait>(db: &C, event_id: Uuid) -> AppResult<events::Model> {
    let event = get_event(db, event_id).await?;
    if !event.is_active {
        return Err(AppError::EventInactive);
    }
    Ok(event)
}

/// 直接报名为 CONFIRMED，已取消的旧记录会被复用并刷新时间，满员时拒绝
pub async fn create_enrollment(
    db: &DatabaseConnection,
    actor: &CurrentUser,
    request: EnrollmentCreateRequest,
) -> AppResult<EnrollmentResponse> {
    actor.require_role(UserRole::Participant)?;
    let event = load_open_event(db, request.event_id).await?;

    let txn = db.begin().await?;
    let record = match find_pair(&txn, actor.id, event.id).await? {
        Some(existing) if Status::from(existing.status).is_active() => {
            return Err(AppError::AlreadyEnrolled);
        }
        Some(cancelled) => {
            if !promote(&txn, &cancelled, EnrollmentStatus::Canceled, true).await? {
                let current = get_enrollment(&txn, cancelled.id).await?;
                return Err(if current.status == EnrollmentStatus::Canceled {
                    AppError::EventFull
                } else {
                    AppError::AlreadyEnrolled
                });
            }
            cancelled.id
        }
        None => {
            let pending = enrollments::ActiveModel {
                id: Set(Uuid::new_v4()),
                event_id: Set(event.id),
                user_id: Set(actor.id),
                status: Set(EnrollmentStatus::Pending),
                enrolled_at: Set(Utc::now()),
            }
            .insert(&txn)
            .await
            .map_err(map_duplicate)?;

            if !promote(&txn, &pending, EnrollmentStatus::Pending, false).await? {
                return Err(AppError::EventFull);
            }
            pending.id
        }
    };
    let record = get_enrollment(&txn, record).await?;
    txn.commit().await?;

    info!(
        "Participant {} enrolled in event {} ({})",
        actor.id, event.id, record.id
    );
    to_response(db, record).await
}

/// 加入候补，复用已取消的旧记录
pub async fn put_on_waiting_list(
    db: &DatabaseConnection,
    actor: &CurrentUser,
    request: EnrollmentCreateRequest,
) -> AppResult<EnrollmentResponse> {
    actor.require_role(UserRole::Participant)?;
    let event = load_open_event(db, request.event_id).await?;

    let txn = db.begin().await?;
    let record = match find_pair(&txn, actor.id, event.id).await? {
        Some(existing) if Status::from(existing.status).is_active() => {
            return Err(AppError::AlreadyEnrolled);
        }
        Some(cancelled) => {
            let result = Enrollments::update_many()
                .col_expr(
                    enrollments::Column::Status,
                    Expr::value(EnrollmentStatus::Pending),
                )
                .col_expr(enrollments::Column::EnrolledAt, Expr::value(Utc::now()))
                .filter(enrollments::Column::Id.eq(cancelled.id))
                .filter(enrollments::Column::Status.eq(EnrollmentStatus::Canceled))
                .exec(&txn)
                .await
                .map_err(map_duplicate)?;
            if result.rows_affected == 0 {
                return Err(AppError::AlreadyEnrolled);
            }
            get_enrollment(&txn, cancelled.id).await?
        }
        None => enrollments::ActiveModel {
            id: Set(Uuid::new_v4()),
            event_id: Set(event.id),
            user_id: Set(actor.id),
            status: Set(EnrollmentStatus::Pending),
            enrolled_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await
        .map_err(map_duplicate)?,
    };
    txn.commit().await?;

    info!(
        "Participant {} joined the waiting list of event {}",
        actor.id, event.id
    );
    to_response(db, record).await
}

/// 组织者确认候补记录，重新检查容量
pub async fn confirm_enrollment(
    db: &DatabaseConnection,
    actor: &CurrentUser,
    id: Uuid,
) -> AppResult<EnrollmentResponse> {
    let record = get_enrollment(db, id).await?;
    let event = get_owned_event(db, actor, record.event_id).await?;
    if record.status != EnrollmentStatus::Pending {
        return Err(invalid_transition(record.status, Status::Confirmed));
    }
    if !event.is_active {
        return Err(AppError::EventInactive);
    }

    let txn = db.begin().await?;
    if !promote(&txn, &record, EnrollmentStatus::Pending, false).await? {
        let current = get_enrollment(&txn, id).await?;
        return Err(if current.status == EnrollmentStatus::Pending {
            AppError::EventFull
        } else {
            invalid_transition(current.status, Status::Confirmed)
        });
    }
    let record = get_enrollment(&txn, id).await?;
    txn.commit().await?;

    info!("Organizer {} confirmed enrollment {}", actor.id, id);
    to_response(db, record).await
}

/// 参与者取消自己的报名
pub async fn cancel_enrollment(
    db: &DatabaseConnection,
    actor: &CurrentUser,
    id: Uuid,
) -> AppResult<EnrollmentResponse> {
    let record = get_enrollment(db, id).await?;
    if record.user_id != actor.id {
        return Err(AppError::Forbidden(
            "only the enrolled participant can cancel this enrollment".to_string(),
        ));
    }

    let record = withdraw(db, record).await?;
    info!("Participant {} cancelled enrollment {}", actor.id, id);
    to_response(db, record).await
}

/// 组织者拒绝报名
pub async fn reject_enrollment(
    db: &DatabaseConnection,
    actor: &CurrentUser,
    id: Uuid,
) -> AppResult<EnrollmentResponse> {
    let record = get_enrollment(db, id).await?;
    get_owned_event(db, actor, record.event_id).await?;

    let record = withdraw(db, record).await?;
    info!("Organizer {} rejected enrollment {}", actor.id, id);
    to_response(db, record).await
}

/// PENDING 或 CONFIRMED 转为 CANCELED，空出的名额交给候补
async fn withdraw(
    db: &DatabaseConnection,
    record: EnrollmentModel,
) -> AppResult<EnrollmentModel> {
    if !Status::from(record.status).can_transition_to(Status::Canceled) {
        return Err(invalid_transition(record.status, Status::Canceled));
    }

    let txn = db.begin().await?;
    let result = Enrollments::update_many()
        .col_expr(
            enrollments::Column::Status,
            Expr::value(EnrollmentStatus::Canceled),
        )
        .filter(enrollments::Column::Id.eq(record.id))
        .filter(enrollments::Column::Status.eq(record.status))
        .exec(&txn)
        .await?;
    if result.rows_affected == 0 {
        let current = get_enrollment(&txn, record.id).await?;
        return Err(invalid_transition(current.status, Status::Canceled));
    }

    if record.status == EnrollmentStatus::Confirmed {
        if let Some(promoted) = process_waiting_list(&txn, record.event_id).await? {
            info!(
                "Enrollment {} promoted from the waiting list of event {}",
                promoted.id, record.event_id
            );
        }
    }
    let record = get_enrollment(&txn, record.id).await?;
    txn.commit().await?;
    Ok(record)
}

/// 有空位时转正最早的候补记录，每次最多一条
pub async fn process_waiting_list(
    txn: &DatabaseTransaction,
    event_id: Uuid,
) -> AppResult<Option<EnrollmentModel>> {
    let next = Enrollments::find()
        .filter(enrollments::Column::EventId.eq(event_id))
        .filter(enrollments::Column::Status.eq(EnrollmentStatus::Pending))
        .order_by_asc(enrollments::Column::EnrolledAt)
        .order_by_asc(enrollments::Column::Id)
        .one(txn)
        .await?;

    let Some(next) = next else {
        return Ok(None);
    };
    if !promote(txn, &next, EnrollmentStatus::Pending, false).await? {
        return Ok(None);
    }
    Ok(Some(get_enrollment(txn, next.id).await?))
}

/// 持续转正候补，直到满员或候补为空
pub async fn fill_waiting_list(txn: &DatabaseTransaction, event_id: Uuid) -> AppResult<u64> {
    let mut promoted = 0;
    while process_waiting_list(txn, event_id).await?.is_some() {
        promoted += 1;
    }
    Ok(promoted)
}

/// 组织者手动处理候补
pub async fn process_waiting_list_for(
    db: &DatabaseConnection,
    actor: &CurrentUser,
    event_id: Uuid,
) -> AppResult<Option<EnrollmentResponse>> {
    get_owned_event(db, actor, event_id).await?;

    let txn = db.begin().await?;
    let promoted = process_waiting_list(&txn, event_id).await?;
    txn.commit().await?;

    match promoted {
        Some(record) => {
            info!(
                "Organizer {} promoted enrollment {} on event {}",
                actor.id, record.id, event_id
            );
            Ok(Some(to_response(db, record).await?))
        }
        None => Ok(None),
    }
}

pub async fn my_enrollments<C: ConnectionTrait>(
    db: &C,
    actor: &CurrentUser,
    page: PageQuery,
) -> AppResult<Page<EnrollmentResponse>> {
    let select = Enrollments::find()
        .filter(enrollments::Column::UserId.eq(actor.id))
        .order_by_desc(enrollments::Column::EnrolledAt)
        .order_by_desc(enrollments::Column::Id);
    let page = fetch_page(db, select, page).await?;
    to_page_response(db, page).await
}

/// 组织者查看活动报名，按报名时间排序
pub async fn event_enrollments<C: ConnectionTrait>(
    db: &C,
    actor: &CurrentUser,
    event_id: Uuid,
    page: PageQuery,
) -> AppResult<Page<EnrollmentResponse>> {
    get_owned_event(db, actor, event_id).await?;
    let select = Enrollments::find()
        .filter(enrollments::Column::EventId.eq(event_id))
        .order_by_asc(enrollments::Column::EnrolledAt)
        .order_by_asc(enrollments::Column::Id);
    let page = fetch_page(db, select, page).await?;
    to_page_response(db, page).await
}

pub async fn enrollment_stats<C: ConnectionTrait>(
    db: &C,
    actor: &CurrentUser,
    event_id: Uuid,
) -> AppResult<EnrollmentStats> {
    get_owned_event(db, actor, event_id).await?;
    stats(db, event_id).await
}

pub async fn stats<C: ConnectionTrait>(db: &C, event_id: Uuid) -> AppResult<EnrollmentStats> {
    let confirmed = count_with_status(db, event_id, EnrollmentStatus::Confirmed).await?;
    let pending = count_with_status(db, event_id, EnrollmentStatus::Pending).await?;
    let cancelled = count_with_status(db, event_id, EnrollmentStatus::Canceled).await?;

    Ok(EnrollmentStats {
        confirmed,
        pending,
        cancelled,
        total: confirmed + pending + cancelled,
    })
}

async fn to_responses<C: ConnectionTrait>(
    db: &C,
    records: Vec<EnrollmentModel>,
) -> AppResult<Vec<EnrollmentResponse>> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let event_ids: Vec<Uuid> = records.iter().map(|record| record.event_id).collect();
    let user_ids: Vec<Uuid> = records.iter().map(|record| record.user_id).collect();

    let events: HashMap<Uuid, events::Model> = Events::find()
        .filter(events::Column::Id.is_in(event_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|event| (event.id, event))
        .collect();
    let participants: HashMap<Uuid, users::Model> = Users::find()
        .filter(users::Column::Id.is_in(user_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|user| (user.id, user))
        .collect();

    records
        .into_iter()
        .map(|record| {
            let event = events.get(&record.event_id).ok_or_else(|| {
                AppError::Internal(format!("event {} missing for enrollment", record.event_id))
            })?;
            let participant = participants.get(&record.user_id).ok_or_else(|| {
                AppError::Internal(format!("user {} missing for enrollment", record.user_id))
            })?;
            Ok(EnrollmentResponse {
                id: record.id,
                event_id: event.id,
                event_title: event.title.clone(),
                event_start_date_time: event.start_date_time,
                event_location: event.location.clone(),
                participant_id: participant.id,
                participant_name: participant.name.clone(),
                participant_email: participant.email.clone(),
                status: record.status.into(),
                enrollment_date: record.enrolled_at,
            })
        })
        .collect()
}

async fn to_response<C: ConnectionTrait>(
    db: &C,
    record: EnrollmentModel,
) -> AppResult<EnrollmentResponse> {
    to_responses(db, vec![record])
        .await?
        .pop()
        .ok_or_else(|| AppError::Internal("enrollment response missing".to_string()))
}

async fn to_page_response<C: ConnectionTrait>(
    db: &C,
    page: Page<EnrollmentModel>,
) -> AppResult<Page<EnrollmentResponse>> {
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
