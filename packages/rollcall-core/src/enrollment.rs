use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

/// 报名记录的生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    /// 候补中
    Pending,
    /// 占用活动的一个名额
    Confirmed,
    /// 参与者取消或组织者拒绝
    Canceled,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Pending => "PENDING",
            EnrollmentStatus::Confirmed => "CONFIRMED",
            EnrollmentStatus::Canceled => "CANCELED",
        }
    }

    /// 候补与已确认的记录会阻止同一用户对同一活动再次报名
    pub fn is_active(&self) -> bool {
        !matches!(self, EnrollmentStatus::Canceled)
    }

    pub fn can_transition_to(&self, next: EnrollmentStatus) -> bool {
        use EnrollmentStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Canceled)
                | (Confirmed, Canceled)
                | (Canceled, Confirmed)
                | (Canceled, Pending)
        )
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentCreateRequest {
    pub event_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentResponse {
    pub id: Uuid,
    pub event_id: Uuid,
    pub event_title: String,
    pub event_start_date_time: DateTime<Utc>,
    pub event_location: String,
    pub participant_id: Uuid,
    pub participant_name: String,
    pub participant_email: String,
    pub status: EnrollmentStatus,
    pub enrollment_date: DateTime<Utc>,
}

/// 单个活动按状态统计的人数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentStats {
    pub confirmed: u64,
    pub pending: u64,
    pub cancelled: u64,
    pub total: u64,
}
