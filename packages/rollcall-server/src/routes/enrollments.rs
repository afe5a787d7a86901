use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use rollcall_core::{ApiResponse, EnrollmentCreateRequest, PageQuery};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{CurrentUser, auth_middleware};
use crate::error::AppError;
use crate::extract::{ApiPath, ApiQuery, ValidJson};
use crate::services::enrollments as ledger;
use crate::state::AppState;

pub(crate) fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(enroll))
        .route("/waiting-list", post(join_waiting_list))
        .route("/my-enrollments", get(my_enrollments))
        .route("/event/{event_id}", get(event_enrollments))
        .route("/event/{event_id}/stats", get(enrollment_stats))
        .route("/{id}/confirm", put(confirm_enrollment))
        .route("/{id}/reject", put(reject_enrollment))
        .route("/{id}", delete(cancel_enrollment))
        .layer(middleware::from_fn_with_state(state, auth_middleware))
}

async fn enroll(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ValidJson(request): ValidJson<EnrollmentCreateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let enrollment = ledger::create_enrollment(&state.db, &current, request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("enrollment confirmed", enrollment)),
    ))
}

async fn join_waiting_list(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ValidJson(request): ValidJson<EnrollmentCreateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let enrollment = ledger::put_on_waiting_list(&state.db, &current, request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("added to the waiting list", enrollment)),
    ))
}

async fn my_enrollments(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = ledger::my_enrollments(&state.db, &current, page).await?;
    Ok(Json(ApiResponse::success("enrollments retrieved", page)))
}

async fn event_enrollments(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath(event_id): ApiPath<Uuid>,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = ledger::event_enrollments(&state.db, &current, event_id, page).await?;
    Ok(Json(ApiResponse::success("enrollments retrieved", page)))
}

async fn enrollment_stats(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath(event_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let stats = ledger::enrollment_stats(&state.db, &current, event_id).await?;
    Ok(Json(ApiResponse::success("enrollment statistics", stats)))
}

async fn confirm_enrollment(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let enrollment = ledger::confirm_enrollment(&state.db, &current, id).await?;
    Ok(Json(ApiResponse::success("enrollment confirmed", enrollment)))
}

async fn reject_enrollment(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let enrollment = ledger::reject_enrollment(&state.db, &current, id).await?;
    Ok(Json(ApiResponse::success("enrollment rejected", enrollment)))
}

async fn cancel_enrollment(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let enrollment = ledger::cancel_enrollment(&state.db, &current, id).await?;
    Ok(Json(ApiResponse::success("enrollment cancelled", enrollment)))
}
