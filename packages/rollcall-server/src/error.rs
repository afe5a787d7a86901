use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use rollcall_core::ApiResponse;
use sea_orm::DbErr;
use thiserror::Error;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    #[error("event is full, no spots available")]
    EventFull,
    #[error("user is already enrolled in this event")]
    AlreadyEnrolled,
    #[error("event is not active")]
    EventInactive,
    #[error("enrollment cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("database error: {0}")]
    Db(#[from] DbErr),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::EventInactive => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_)
            | AppError::EventFull
            | AppError::AlreadyEnrolled
            | AppError::InvalidTransition { .. } => StatusCode::CONFLICT,
            AppError::Db(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |err| match &err.message {
                    Some(message) => message.to_string(),
                    None => format!("{field} is invalid"),
                })
            })
            .collect();
        messages.sort();
        Self::Validation(messages.join("; "))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let message = match &self {
            AppError::Db(err) => {
                error!(error = %err, "database error");
                "internal server error".to_string()
            }
            AppError::Internal(msg) => {
                error!(error = %msg, "internal error");
                "internal server error".to_string()
            }
            AppError::Unauthorized(msg) => {
                warn!(error = %msg, "authentication error");
                msg.clone()
            }
            AppError::Forbidden(msg) => {
                warn!(error = %msg, "authorization error");
                msg.clone()
            }
            other => other.to_string(),
        };
        (status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}
