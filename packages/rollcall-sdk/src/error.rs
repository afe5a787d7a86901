use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("API returned {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Response carried no data")]
    MissingData,
}

impl SdkError {
    /// API 错误的 HTTP 状态码
    pub fn status(&self) -> Option<u16> {
        match self {
            SdkError::ApiError { status, .. } => Some(*status),
            SdkError::HttpError(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            SdkError::ApiError { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

pub type SdkResult<T> = Result<T, SdkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_exposes_status() {
        let err = SdkError::ApiError {
            status: 409,
            message: "event is full, no spots available".to_string(),
        };
        assert_eq!(err.status(), Some(409));
        assert_eq!(err.message(), "event is full, no spots available");
        assert_eq!(SdkError::MissingData.status(), None);
    }
}
