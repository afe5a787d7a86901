use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::PageQuery;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EventCreateRequest {
    #[validate(length(min = 3, max = 100, message = "title must be between 3 and 100 characters"))]
    pub title: String,
    #[validate(length(
        min = 10,
        max = 500,
        message = "description must be between 10 and 500 characters"
    ))]
    pub description: String,
    pub start_date_time: DateTime<Utc>,
    pub end_date_time: DateTime<Utc>,
    #[validate(length(min = 5, max = 200, message = "location must be between 5 and 200 characters"))]
    pub location: String,
    #[validate(range(min = 1, message = "capacity must be at least 1"))]
    pub capacity: i32,
}

/// 活动的部分更新，`None` 表示保留原值
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EventUpdateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 3, max = 100, message = "title must be between 3 and 100 characters"))]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(
        min = 10,
        max = 500,
        message = "description must be between 10 and 500 characters"
    ))]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 5, max = 200, message = "location must be between 5 and 200 characters"))]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, message = "capacity must be at least 1"))]
    pub capacity: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl EventUpdateRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.start_date_time.is_none()
            && self.end_date_time.is_none()
            && self.location.is_none()
            && self.capacity.is_none()
            && self.is_active.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub start_date_time: DateTime<Utc>,
    pub end_date_time: DateTime<Utc>,
    pub location: String,
    pub capacity: i32,
    /// 读取时已确认的报名数
    pub current_enrollments: u64,
    pub is_active: bool,
    pub organizer_id: Uuid,
    pub organizer_name: String,
    pub organizer_email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStats {
    pub event_id: Uuid,
    pub capacity: i32,
    pub confirmed: u64,
    pub pending: u64,
    pub available_spots: u64,
}

/// `GET /v1/events/search` 查询参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSearchQuery {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl EventSearchQuery {
    pub fn page_query(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            size: self.size,
        }
    }
}
