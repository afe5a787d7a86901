use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// 用户角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    /// 创建活动并审核报名
    Organizer,
    /// 报名参加活动
    Participant,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Organizer => "ORGANIZER",
            UserRole::Participant => "PARTICIPANT",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ORGANIZER" => Ok(UserRole::Organizer),
            "PARTICIPANT" => Ok(UserRole::Participant),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// 注册请求
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UserCreateRequest {
    #[validate(length(min = 2, max = 100, message = "name must be between 2 and 100 characters"))]
    pub name: String,
    #[validate(
        email(message = "email must be a valid address"),
        length(max = 100, message = "email must be at most 100 characters")
    )]
    pub email: String,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub password: String,
    pub role: UserRole,
}

/// 资料更新请求，缺省字段保留原值，空密码不修改密码
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 2, max = 100, message = "name must be between 2 and 100 characters"))]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(
        email(message = "email must be a valid address"),
        length(max = 100, message = "email must be at most 100 characters")
    )]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_new_password"))]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
}

fn validate_new_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() || password.chars().count() >= 6 {
        return Ok(());
    }
    let mut err = ValidationError::new("length");
    err.message = Some("password must be at least 6 characters".into());
    Err(err)
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: UserResponse,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// `POST /users/{id}/validate-password` 请求体
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PasswordCheckRequest {
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserListQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSearchQuery {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailQuery {
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_wire_names() {
        assert_eq!(
            serde_json::to_string(&UserRole::Organizer).unwrap(),
            "\"ORGANIZER\""
        );
        let role: UserRole = serde_json::from_str("\"PARTICIPANT\"").unwrap();
        assert_eq!(role, UserRole::Participant);
        assert_eq!("organizer".parse::<UserRole>().unwrap(), UserRole::Organizer);
        assert!("admin".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_create_request_validation() {
        let request = UserCreateRequest {
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            password: "secret1".to_string(),
            role: UserRole::Participant,
        };
        assert!(request.validate().is_ok());

        let bad = UserCreateRequest {
            email: "not-an-email".to_string(),
            password: "123".to_string(),
            ..request
        };
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }

    #[test]
    fn test_update_request_allows_empty_password() {
        let keep = UserUpdateRequest {
            password: Some(String::new()),
            ..Default::default()
        };
        assert!(keep.validate().is_ok());

        let short = UserUpdateRequest {
            password: Some("abc".to_string()),
            ..Default::default()
        };
        assert!(short.validate().is_err());

        let nothing = UserUpdateRequest::default();
        assert!(nothing.validate().is_ok());
    }
}
