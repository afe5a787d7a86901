use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use rollcall_core::{
    ApiResponse, EmailQuery, LoginRequest, PasswordCheckRequest, UserCreateRequest,
    UserListQuery, UserResponse, UserSearchQuery, UserUpdateRequest,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{CurrentUser, SessionToken, auth_middleware};
use crate::error::AppError;
use crate::extract::{ApiPath, ApiQuery, ValidJson};
use crate::services::users;
use crate::state::AppState;

pub(crate) fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let protected_router = Router::new()
        .route("/", get(list_users))
        .route("/search", get(search_users))
        .route("/email/{email}", get(get_user_by_email))
        .route("/logout", post(logout_user))
        .route("/{id}", get(get_user).put(update_user).delete(delete_user))
        .route("/{id}/validate-password", post(validate_password))
        .layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        .route("/", post(register_user))
        .route("/login", post(login_user))
        .route("/check-email", get(check_email))
        .merge(protected_router)
}

async fn register_user(
    State(state): State<Arc<AppState>>,
    ValidJson(request): ValidJson<UserCreateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = users::register(&state, request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            "user registered",
            UserResponse::from(&user),
        )),
    ))
}

async fn login_user(
    State(state): State<Arc<AppState>>,
    ValidJson(request): ValidJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = users::login(&state, request).await?;
    Ok(Json(ApiResponse::success("login successful", response)))
}

/// 邮箱未被占用时 `data` 为 true
async fn check_email(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<EmailQuery>,
) -> Result<impl IntoResponse, AppError> {
    let available = !users::is_email_taken(&state.db, &query.email).await?;
    let message = if available {
        "email is available"
    } else {
        "email is already registered"
    };
    Ok(Json(ApiResponse::success(message, available)))
}

async fn logout_user(
    State(state): State<Arc<AppState>>,
    SessionToken(token_hash): SessionToken,
) -> Result<impl IntoResponse, AppError> {
    users::logout(&state.db, &token_hash).await?;
    Ok(Json(ApiResponse::done("logged out")))
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<UserListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let users = users::list_users(&state.db, query.role).await?;
    let users: Vec<UserResponse> = users.iter().map(UserResponse::from).collect();
    Ok(Json(ApiResponse::success("users retrieved", users)))
}

async fn search_users(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<UserSearchQuery>,
) -> Result<impl IntoResponse, AppError> {
    let users = users::search_by_name(&state.db, &query.name).await?;
    let users: Vec<UserResponse> = users.iter().map(UserResponse::from).collect();
    Ok(Json(ApiResponse::success("users retrieved", users)))
}

async fn get_user_by_email(
    State(state): State<Arc<AppState>>,
    ApiPath(email): ApiPath<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = users::find_by_email(&state.db, &email).await?;
    Ok(Json(ApiResponse::success(
        "user retrieved",
        UserResponse::from(&user),
    )))
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let user = users::get_user(&state.db, id).await?;
    Ok(Json(ApiResponse::success(
        "user retrieved",
        UserResponse::from(&user),
    )))
}

async fn update_user(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ValidJson(patch): ValidJson<UserUpdateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = users::update_user(&state, &current, id, patch).await?;
    Ok(Json(ApiResponse::success(
        "user updated",
        UserResponse::from(&user),
    )))
}

async fn delete_user(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    users::delete_user(&state, &current, id).await?;
    Ok(Json(ApiResponse::done("user deleted")))
}

async fn validate_password(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ValidJson(request): ValidJson<PasswordCheckRequest>,
) -> Result<impl IntoResponse, AppError> {
    let valid = users::validate_password(&state, &current, id, &request.password).await?;
    Ok(Json(ApiResponse::success("password checked", valid)))
}
