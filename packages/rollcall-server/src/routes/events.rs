use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use rollcall_core::{
    ApiResponse, EventCreateRequest, EventSearchQuery, EventUpdateRequest, PageQuery,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{CurrentUser, auth_middleware};
use crate::error::AppError;
use crate::extract::{ApiPath, ApiQuery, ValidJson};
use crate::services::enrollments as ledger;
use crate::services::events::{self, Removal};
use crate::state::AppState;

pub(crate) fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let protected_router = Router::new()
        .route("/", post(create_event))
        .route("/my-events", get(my_events))
        .route("/{id}", put(update_event).delete(delete_event))
        .route("/{id}/waiting-list/process", post(process_waiting_list))
        .layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        .route("/", get(list_events))
        .route("/search", get(search_events))
        .route("/{id}", get(get_event))
        .route("/{id}/stats", get(event_stats))
        .merge(protected_router)
}

async fn create_event(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ValidJson(request): ValidJson<EventCreateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let event = events::create_event(&state.db, &current, request).await?;
    let event = events::to_response(&state.db, event).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("event created", event)),
    ))
}

async fn list_events(
    State(state): State<Arc<AppState>>,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = events::list_active(&state.db, page).await?;
    let page = events::to_page_response(&state.db, page).await?;
    Ok(Json(ApiResponse::success("events retrieved", page)))
}

async fn search_events(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<EventSearchQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = events::search_active(&state.db, &query.query, query.page_query()).await?;
    let page = events::to_page_response(&state.db, page).await?;
    Ok(Json(ApiResponse::success("events retrieved", page)))
}

async fn my_events(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = events::list_by_organizer(&state.db, &current, page).await?;
    let page = events::to_page_response(&state.db, page).await?;
    Ok(Json(ApiResponse::success("events retrieved", page)))
}

async fn get_event(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let event = events::get_event(&state.db, id).await?;
    let event = events::to_response(&state.db, event).await?;
    Ok(Json(ApiResponse::success("event retrieved", event)))
}

async fn event_stats(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let stats = events::event_stats(&state.db, id).await?;
    Ok(Json(ApiResponse::success("event statistics", stats)))
}

async fn update_event(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ValidJson(patch): ValidJson<EventUpdateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let event = events::update_event(&state.db, &current, id, patch).await?;
    let event = events::to_response(&state.db, event).await?;
    Ok(Json(ApiResponse::success("event updated", event)))
}

async fn delete_event(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let message = match events::delete_event(&state.db, &current, id).await? {
        Removal::Deactivated => "event has enrollments and was deactivated",
        Removal::Deleted => "event deleted",
    };
    Ok(Json(ApiResponse::done(message)))
}

async fn process_waiting_list(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let promoted = ledger::process_waiting_list_for(&state.db, &current, id).await?;
    let message = if promoted.is_some() {
        "waiting list processed, one enrollment promoted"
    } else {
        "waiting list processed, nothing to promote"
    };
    Ok(Json(ApiResponse {
        success: true,
        message: Some(message.to_string()),
        data: promoted,
        error: None,
    }))
}
