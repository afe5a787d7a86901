//! 自定义提取器，错误时返回统一响应结构而非 axum 默认的纯文本

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::AppError;

/// 反序列化后再做校验的 JSON 请求体
#[derive(Debug, Clone)]
pub struct ValidJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| AppError::Validation(rejection.body_text()))?;
        value.validate()?;
        Ok(Self(value))
    }
}

#[derive(Debug, Clone)]
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection: QueryRejection| AppError::Validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

#[derive(Debug, Clone)]
pub struct ApiPath<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection: PathRejection| AppError::Validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::header::CONTENT_TYPE;
    use rollcall_core::{LoginRequest, PageQuery};

    #[tokio::test]
    async fn test_valid_json_runs_validation() {
        let request = Request::builder()
            .method("POST")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"email":"","password":""}"#))
            .unwrap();

        let result = ValidJson::<LoginRequest>::from_request(request, &()).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_valid_json_maps_malformed_body() {
        let request = Request::builder()
            .method("POST")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let result = ValidJson::<LoginRequest>::from_request(request, &()).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_api_query_parses_numbers() {
        let request = Request::builder()
            .uri("/v1/events?page=2&size=5")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let ApiQuery(query) = ApiQuery::<PageQuery>::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(query.page_index(), 2);
        assert_eq!(query.page_size(), 5);
    }

    #[tokio::test]
    async fn test_api_query_rejects_bad_numbers() {
        let request = Request::builder()
            .uri("/v1/events?page=abc")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let result = ApiQuery::<PageQuery>::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
