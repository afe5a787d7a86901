use axum::Json;
use rollcall_core::ApiResponse;
use serde_json::{Value, json};

pub(crate) async fn handler() -> Json<ApiResponse<Value>> {
    Json(ApiResponse::success(
        "rollcall is running",
        json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        }),
    ))
}
